//! The iterative-closest-point driver.

use cloud_types::{PointCloud, Real, RigidTransform};
use tracing::debug;

use crate::error::{RegistrationError, RegistrationResult};
use crate::inspector::IterationSnapshot;
use crate::strategy::Strategy;

/// Aligns `reading` onto `reference`, starting from `initial`.
///
/// Runs the full pipeline owned by `strategy`: pre-filters both clouds,
/// then iterates match -> reject outliers -> minimize -> re-transform
/// until the convergence checks stop it. The returned transform maps the
/// original reading onto the reference; each iteration composes the
/// incremental estimate on the left (`T <- dT * T`) and advances the
/// working reading by the increment alone.
///
/// # Errors
///
/// Returns an error when the clouds or the initial transform disagree in
/// dimension, a cloud is empty, no convergence check is configured, a
/// check reports divergence, or the minimizer finds the matched set
/// degenerate.
///
/// # Example
///
/// ```
/// use cloud_registration::{icp, Strategy};
/// use cloud_types::{PointCloud, RigidTransform};
/// use nalgebra::Point2;
///
/// let reference = PointCloud::from_planar_points(&[
///     Point2::new(0.0, 0.0),
///     Point2::new(1.0, 0.0),
///     Point2::new(0.0, 1.0),
///     Point2::new(1.0, 1.0),
/// ]);
/// let reading = reference.clone();
///
/// let mut strategy = Strategy::<f64>::point_to_point();
/// let transform = icp(
///     &RigidTransform::identity(2),
///     &reading,
///     &reference,
///     &mut strategy,
/// )
/// .unwrap();
/// assert!(transform.translation().norm() < 1e-6);
/// ```
pub fn icp<T: Real>(
    initial: &RigidTransform<T>,
    reading: &PointCloud<T>,
    reference: &PointCloud<T>,
    strategy: &mut Strategy<T>,
) -> RegistrationResult<RigidTransform<T>> {
    if reading.feature_dim() != reference.feature_dim() {
        return Err(RegistrationError::ShapeMismatch {
            context: "reading vs reference feature rows",
            expected: reference.feature_dim(),
            actual: reading.feature_dim(),
        });
    }
    if initial.dim() != reading.point_dim() {
        return Err(RegistrationError::ShapeMismatch {
            context: "initial transform vs point dimension",
            expected: reading.point_dim(),
            actual: initial.dim(),
        });
    }
    if reading.is_empty() {
        return Err(RegistrationError::InvalidParameter(
            "reading cloud is empty".to_string(),
        ));
    }
    if reference.is_empty() {
        return Err(RegistrationError::InvalidParameter(
            "reference cloud is empty".to_string(),
        ));
    }
    if strategy.convergence_checks.is_empty() {
        return Err(RegistrationError::InvalidParameter(
            "at least one convergence check is required".to_string(),
        ));
    }

    let mut reading_current = reading.clone();
    let mut reference_filtered = reference.clone();
    let mut keep_iterating = strategy.reading_filters.apply_pre(&mut reading_current)?;
    keep_iterating =
        strategy.reference_filters.apply_pre(&mut reference_filtered)? && keep_iterating;

    strategy.inspector.init();
    strategy.inspector.dump_filtered_reference(&reference_filtered);

    let mut transform = initial.clone();
    strategy
        .transformations
        .apply(&mut reading_current, &transform)?;
    strategy
        .matcher
        .init(&reading_current, &reference_filtered)?;
    strategy.convergence_checks.init_all(&transform)?;

    let alpha = strategy.outlier_mixing_weight.clamp(T::zero(), T::one());
    let mut iteration = 0usize;

    while keep_iterating {
        let step_keep = strategy.reading_filters.apply_step(&mut reading_current)?;

        let matches = strategy
            .matcher
            .find_closest(&reading_current, &reference_filtered)?;
        let feature_weights = strategy.feature_outlier_filters.compute(
            &reading_current,
            &reference_filtered,
            &matches,
        )?;
        let descriptor_weights = strategy.descriptor_outlier_filter.compute(
            &reading_current,
            &reference_filtered,
            &matches,
        )?;
        let weights = &feature_weights * alpha + &descriptor_weights * (T::one() - alpha);

        let delta = strategy.error_minimizer.compute(
            &reading_current,
            &reference_filtered,
            &weights,
            &matches,
        )?;
        transform = delta.compose(&transform);
        strategy.transformations.apply(&mut reading_current, &delta)?;

        iteration += 1;
        strategy.inspector.dump_iteration(&IterationSnapshot {
            iteration,
            transform: &transform,
            reference: &reference_filtered,
            reading: &reading_current,
            matches: &matches,
            feature_weights: &feature_weights,
            descriptor_weights: &descriptor_weights,
            checks: &strategy.convergence_checks,
        });
        debug!(iteration, "icp iteration complete");

        let checks_keep = strategy.convergence_checks.check_all(&transform)?;
        keep_iterating = step_keep && checks_keep;
    }

    strategy.inspector.finish(iteration);
    debug!(iterations = iteration, "registration finished");
    Ok(transform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Strategy;
    use nalgebra::Point2;

    fn square() -> PointCloud<f64> {
        PointCloud::from_planar_points(&[
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 1.0),
            Point2::new(1.0, 1.0),
        ])
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let reading = square();
        let reference = square();
        let mut strategy = Strategy::default();
        let initial = RigidTransform::identity(3);
        assert!(matches!(
            icp(&initial, &reading, &reference, &mut strategy),
            Err(RegistrationError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_reading_rejected() {
        let reading = PointCloud::<f64>::from_planar_points(&[]);
        let reference = square();
        let mut strategy = Strategy::default();
        let initial = RigidTransform::identity(2);
        assert!(matches!(
            icp(&initial, &reading, &reference, &mut strategy),
            Err(RegistrationError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_missing_checks_rejected() {
        let reading = square();
        let reference = square();
        let mut strategy = Strategy::default();
        strategy.convergence_checks = crate::checker::ConvergenceChecks::new();
        let initial = RigidTransform::identity(2);
        assert!(matches!(
            icp(&initial, &reading, &reference, &mut strategy),
            Err(RegistrationError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_inert_default_strategy_terminates() {
        let reading = square();
        let reference = square();
        let mut strategy = Strategy::default();
        let initial = RigidTransform::identity(2);
        let transform = icp(&initial, &reading, &reference, &mut strategy).unwrap();
        // Null matcher + identity minimizer: the counter stops the loop
        // and the initial transform comes back unchanged.
        assert_eq!(transform, initial);
    }
}
