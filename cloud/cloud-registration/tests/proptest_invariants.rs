//! Property-based tests for the registration invariants.
//!
//! These tests generate random clouds, transforms, and match sets and
//! verify the universal properties of the pipeline.

use cloud_registration::{
    KdTreeMatcher, Matcher, Matches, PointToPointMinimizer, TransformFeatures, Transformation,
    TrimmedDistOutlierFilter,
};
use cloud_registration::{ErrorMinimizer, OutlierFilter};
use cloud_types::{Label, Labels, PointCloud, RigidTransform};
use nalgebra::{DMatrix, DVector, Point2};
use proptest::prelude::*;

fn arb_point() -> impl Strategy<Value = Point2<f64>> {
    (-100.0..100.0f64, -100.0..100.0f64).prop_map(|(x, y)| Point2::new(x, y))
}

fn arb_cloud(min_points: usize, max_points: usize) -> impl Strategy<Value = PointCloud<f64>> {
    prop::collection::vec(arb_point(), min_points..=max_points)
        .prop_map(|points| PointCloud::from_planar_points(&points))
}

fn arb_transform() -> impl Strategy<Value = RigidTransform<f64>> {
    (
        -std::f64::consts::PI..std::f64::consts::PI,
        -50.0..50.0f64,
        -50.0..50.0f64,
    )
        .prop_map(|(angle, tx, ty)| {
            let (s, c) = angle.sin_cos();
            let rotation = DMatrix::from_row_slice(2, 2, &[c, -s, s, c]);
            let translation = DVector::from_row_slice(&[tx, ty]);
            RigidTransform::from_parts(&rotation, &translation).unwrap()
        })
}

proptest! {
    #[test]
    fn rigid_transform_preserves_distances(
        cloud in arb_cloud(2, 12),
        transform in arb_transform(),
    ) {
        let moved = TransformFeatures.compute(&cloud, &transform).unwrap();
        let n = cloud.point_count();
        for i in 0..n {
            for j in (i + 1)..n {
                let before = ((cloud.features()[(0, i)] - cloud.features()[(0, j)]).powi(2)
                    + (cloud.features()[(1, i)] - cloud.features()[(1, j)]).powi(2))
                .sqrt();
                let after = ((moved.features()[(0, i)] - moved.features()[(0, j)]).powi(2)
                    + (moved.features()[(1, i)] - moved.features()[(1, j)]).powi(2))
                .sqrt();
                prop_assert!((before - after).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn label_spans_cover_descriptor_lookup(
        spans in prop::collection::vec(1usize..4, 1..5),
        columns in 1usize..6,
    ) {
        let total: usize = spans.iter().sum();
        #[allow(clippy::cast_precision_loss)]
        let descriptors = DMatrix::from_fn(total, columns, |r, c| (r * columns + c) as f64);
        let labels: Labels = spans
            .iter()
            .enumerate()
            .map(|(i, &span)| Label::new(format!("block{i}"), span))
            .collect();
        prop_assert_eq!(labels.total_span(), total);

        let features = DMatrix::from_fn(3, columns, |r, _| if r == 2 { 1.0 } else { 0.0 });
        let feature_labels = Labels::from(vec![Label::new("xy", 2), Label::new("pad", 1)]);
        let cloud =
            PointCloud::with_descriptors(features, feature_labels, descriptors.clone(), labels)
                .unwrap();

        let mut offset = 0;
        for (i, &span) in spans.iter().enumerate() {
            let block = cloud.descriptor(&format!("block{i}")).unwrap();
            prop_assert_eq!(block.nrows(), span);
            for r in 0..span {
                for c in 0..columns {
                    prop_assert_eq!(block[(r, c)], descriptors[(offset + r, c)]);
                }
            }
            offset += span;
        }
    }

    #[test]
    fn matcher_ids_stay_in_range(
        reading in arb_cloud(1, 16),
        reference in arb_cloud(1, 16),
        knn in 1usize..4,
    ) {
        let mut matcher = KdTreeMatcher::new(knn, 0.0);
        matcher.init(&reading, &reference).unwrap();
        let matches = matcher.find_closest(&reading, &reference).unwrap();
        for i in 0..matches.point_count() {
            for k in 0..matches.knn() {
                if matches.is_valid(k, i) {
                    prop_assert!(matches.ids[(k, i)] < reference.point_count());
                }
            }
        }
    }

    #[test]
    fn trimmed_filter_retains_exact_count(
        dists in prop::collection::vec(0.0..1000.0f64, 1..40),
        ratio in 0.05..1.0f64,
    ) {
        let n = dists.len();
        let matches = Matches::new(
            DMatrix::from_row_slice(1, n, &dists),
            DMatrix::zeros(1, n),
        )
        .unwrap();
        let cloud = PointCloud::from_planar_points(
            &std::iter::repeat(Point2::new(0.0, 0.0)).take(n).collect::<Vec<_>>(),
        );

        let filter = TrimmedDistOutlierFilter::new(ratio);
        let weights = filter.compute(&cloud, &cloud, &matches).unwrap();

        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
        #[allow(clippy::cast_possible_truncation)]
        let expected = ((ratio * n as f64).ceil() as usize).min(n);
        let kept = weights.iter().filter(|w| **w > 0.0).count();
        prop_assert_eq!(kept, expected);
    }

    #[test]
    fn point_to_point_returns_proper_rotation(
        cloud in arb_cloud(4, 12),
        transform in arb_transform(),
    ) {
        let reference = TransformFeatures.compute(&cloud, &transform).unwrap();
        let n = cloud.point_count();
        let matches = Matches::new(
            DMatrix::zeros(1, n),
            DMatrix::from_fn(1, n, |_, c| c),
        )
        .unwrap();
        let weights = DMatrix::from_element(1, n, 1.0);

        let mut minimizer = PointToPointMinimizer::new();
        let estimated = minimizer
            .compute(&cloud, &reference, &weights, &matches)
            .unwrap();

        let rotation = estimated.rotation();
        let gram = rotation.transpose() * &rotation;
        prop_assert!((gram - DMatrix::identity(2, 2)).norm() < 1e-6);
        prop_assert!((rotation.determinant() - 1.0).abs() < 1e-6);
    }
}
