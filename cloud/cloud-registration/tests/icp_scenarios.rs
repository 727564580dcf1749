//! End-to-end registration scenarios.
//!
//! Each test wires a full strategy and checks the driver against a known
//! ground-truth transform.

use approx::assert_relative_eq;
use cloud_registration::{
    icp, BoundCheck, ConvergenceCheck, ConvergenceChecks, CounterCheck, DeltaTransformCheck,
    KdTreeMatcher, MaxDistOutlierFilter, RegistrationError, Strategy, SurfaceNormalFilter,
    TransformFeatures, Transformation, TrimmedDistOutlierFilter,
};
use cloud_types::{PointCloud, RigidTransform};
use nalgebra::{DMatrix, DVector, Point2, Point3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn planar_transform(angle: f64, tx: f64, ty: f64) -> RigidTransform<f64> {
    let (s, c) = angle.sin_cos();
    let rotation = DMatrix::from_row_slice(2, 2, &[c, -s, s, c]);
    let translation = DVector::from_row_slice(&[tx, ty]);
    RigidTransform::from_parts(&rotation, &translation).unwrap()
}

fn random_planar_cloud(count: usize, extent: f64, seed: u64) -> PointCloud<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let points: Vec<Point2<f64>> = (0..count)
        .map(|_| Point2::new(rng.gen_range(0.0..extent), rng.gen_range(0.0..extent)))
        .collect();
    PointCloud::from_planar_points(&points)
}

fn transformed(cloud: &PointCloud<f64>, transform: &RigidTransform<f64>) -> PointCloud<f64> {
    TransformFeatures.compute(cloud, transform).unwrap()
}

fn unit_square() -> PointCloud<f64> {
    PointCloud::from_planar_points(&[
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(0.0, 1.0),
        Point2::new(1.0, 1.0),
    ])
}

#[test]
fn identity_fixed_point() {
    let reference = unit_square();
    let reading = reference.clone();

    let mut strategy = Strategy::<f64>::point_to_point();
    strategy.convergence_checks =
        ConvergenceChecks::from(vec![
            Box::new(CounterCheck::new(5)) as Box<dyn ConvergenceCheck<f64>>
        ]);

    let transform = icp(
        &RigidTransform::identity(2),
        &reading,
        &reference,
        &mut strategy,
    )
    .unwrap();

    let identity = RigidTransform::identity(2);
    assert_relative_eq!(transform.matrix(), identity.matrix(), epsilon = 1e-6);
}

#[test]
fn pure_translation_recovery() {
    let reference = random_planar_cloud(60, 4.0, 7);
    let ground_truth = planar_transform(0.0, 0.5, 0.3);
    let reading = transformed(&reference, &ground_truth);

    let mut strategy = Strategy::<f64>::point_to_point();
    strategy.matcher = Box::new(KdTreeMatcher::new(1, 0.0));
    strategy
        .feature_outlier_filters
        .push(Box::new(MaxDistOutlierFilter::new(10.0)));

    let transform = icp(
        &RigidTransform::identity(2),
        &reading,
        &reference,
        &mut strategy,
    )
    .unwrap();

    assert_relative_eq!(transform.translation()[0], -0.5, epsilon = 1e-6);
    assert_relative_eq!(transform.translation()[1], -0.3, epsilon = 1e-6);
    assert_relative_eq!(transform.rotation_quaternion().angle(), 0.0, epsilon = 1e-6);
}

#[test]
fn small_rotation_and_translation_recovery() {
    let reference = random_planar_cloud(250, 2.0, 11);
    let ground_truth = planar_transform(0.2, 0.2, -0.1);
    let reading = transformed(&reference, &ground_truth);

    let mut strategy = Strategy::<f64>::point_to_point();
    strategy.convergence_checks = ConvergenceChecks::from(vec![
        Box::new(CounterCheck::new(60)) as Box<dyn ConvergenceCheck<f64>>,
        Box::new(DeltaTransformCheck::new(1e-6, 1e-6, 3)),
    ]);

    let transform = icp(
        &RigidTransform::identity(2),
        &reading,
        &reference,
        &mut strategy,
    )
    .unwrap();

    // The recovered transform inverts the ground truth.
    let roundtrip = transform.compose(&ground_truth);
    let identity = RigidTransform::identity(2);
    assert_relative_eq!(roundtrip.matrix(), identity.matrix(), epsilon = 1e-3);
    assert_relative_eq!(transform.rotation_quaternion().angle(), 0.2, epsilon = 1e-3);
}

#[test]
fn trimmed_outlier_rejection() {
    let reference = random_planar_cloud(100, 2.0, 23);
    let mut rng = StdRng::seed_from_u64(24);

    // The reading is the reference plus 30% uniform-random outliers.
    let mut points: Vec<Point2<f64>> = (0..reference.point_count())
        .map(|i| Point2::new(reference.features()[(0, i)], reference.features()[(1, i)]))
        .collect();
    for _ in 0..30 {
        points.push(Point2::new(
            rng.gen_range(0.0..2.0),
            rng.gen_range(0.0..2.0),
        ));
    }
    let reading = PointCloud::from_planar_points(&points);

    let mut strategy = Strategy::<f64>::point_to_point();
    strategy
        .feature_outlier_filters
        .push(Box::new(TrimmedDistOutlierFilter::new(0.7)));

    let transform = icp(
        &RigidTransform::identity(2),
        &reading,
        &reference,
        &mut strategy,
    )
    .unwrap();

    let identity = RigidTransform::identity(2);
    assert_relative_eq!(transform.matrix(), identity.matrix(), epsilon = 1e-3);
}

#[test]
fn bound_check_trips_on_large_correction() {
    let reference = random_planar_cloud(250, 2.0, 11);
    let ground_truth = planar_transform(0.2, 0.2, -0.1);
    let reading = transformed(&reference, &ground_truth);

    let mut strategy = Strategy::<f64>::point_to_point();
    strategy.convergence_checks = ConvergenceChecks::from(vec![
        Box::new(CounterCheck::new(60)) as Box<dyn ConvergenceCheck<f64>>,
        Box::new(BoundCheck::new(0.01, 0.01)),
    ]);

    let result = icp(
        &RigidTransform::identity(2),
        &reading,
        &reference,
        &mut strategy,
    );
    assert!(matches!(result, Err(RegistrationError::Diverged { .. })));
}

#[test]
fn point_to_plane_on_planar_reference() {
    // A dense plane with slight per-point jitter so the kd-tree can
    // split along z.
    let n = 12;
    #[allow(clippy::cast_precision_loss)]
    let base: Vec<Point3<f64>> = (0..n)
        .flat_map(|i| {
            (0..n).map(move |j| {
                let jitter = (i * n + j) as f64 * 1.0e-6;
                Point3::new(i as f64 * 0.5, j as f64 * 0.5, jitter)
            })
        })
        .collect();
    let reference = PointCloud::from_spatial_points(&base);

    // Reading: the plane lifted 0.4 along its normal and tilted 0.05 rad
    // about the in-plane x axis.
    let angle: f64 = 0.05;
    let (s, c) = angle.sin_cos();
    let lifted: Vec<Point3<f64>> = base
        .iter()
        .map(|p| Point3::new(p.x, c * p.y - s * p.z, s * p.y + c * p.z + 0.4))
        .collect();
    let reading = PointCloud::from_spatial_points(&lifted);

    let mut strategy = Strategy::<f64>::point_to_plane();
    strategy
        .reference_filters
        .push(Box::new(SurfaceNormalFilter::new(9, 0.0)));
    strategy.convergence_checks = ConvergenceChecks::from(vec![
        Box::new(CounterCheck::new(10)) as Box<dyn ConvergenceCheck<f64>>,
        Box::new(DeltaTransformCheck::new(1e-7, 1e-7, 3)),
    ]);

    let transform = icp(
        &RigidTransform::identity(3),
        &reading,
        &reference,
        &mut strategy,
    )
    .unwrap();

    // Apply the recovered transform; every point must be back on the
    // plane (residual displacement along the plane normal only).
    let aligned = TransformFeatures.compute(&reading, &transform).unwrap();
    let mut worst: f64 = 0.0;
    for i in 0..aligned.point_count() {
        worst = worst.max(aligned.features()[(2, i)].abs());
    }
    assert!(worst < 1e-3, "residual normal displacement {worst}");
}

#[test]
fn single_precision_smoke() {
    let points: Vec<Point2<f32>> = vec![
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(0.0, 1.0),
        Point2::new(1.0, 1.0),
        Point2::new(0.4, 0.7),
    ];
    let reference = PointCloud::from_planar_points(&points);
    let shifted: Vec<Point2<f32>> = points
        .iter()
        .map(|p| Point2::new(p.x + 0.05, p.y - 0.02))
        .collect();
    let reading = PointCloud::from_planar_points(&shifted);

    let mut strategy = Strategy::<f32>::point_to_point();
    let transform = icp(
        &RigidTransform::identity(2),
        &reading,
        &reference,
        &mut strategy,
    )
    .unwrap();

    assert_relative_eq!(transform.translation()[0], -0.05, epsilon = 1e-3);
    assert_relative_eq!(transform.translation()[1], 0.02, epsilon = 1e-3);
}

#[test]
fn usage_ratios_reported_after_run() {
    let reference = random_planar_cloud(40, 2.0, 3);
    let reading = reference.clone();

    let mut strategy = Strategy::<f64>::point_to_point();
    let _ = icp(
        &RigidTransform::identity(2),
        &reading,
        &reference,
        &mut strategy,
    )
    .unwrap();

    let ratios = strategy.error_minimizer.usage_ratios().unwrap();
    assert_relative_eq!(ratios.point_used, 1.0);
    assert_relative_eq!(ratios.weighted_point_used, 1.0);
}
