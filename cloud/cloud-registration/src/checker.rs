//! Convergence checks steering the ICP loop.
//!
//! Each check exposes mirror state: the current `values`, the
//! corresponding `limits`, and parallel name lists, so inspectors can
//! log the convergence behavior without knowing the check types.

use std::collections::VecDeque;

use cloud_types::{real, Real, RigidTransform};
use nalgebra::{DVector, UnitQuaternion};

use crate::error::{RegistrationError, RegistrationResult};

/// Decides whether the ICP loop keeps iterating.
pub trait ConvergenceCheck<T: Real> {
    /// Resets the check with the initial transform.
    fn init(&mut self, transform: &RigidTransform<T>) -> RegistrationResult<()>;

    /// Inspects the accumulated transform after an iteration.
    ///
    /// Returns false to request a stop.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Diverged`] when the solution cannot
    /// converge anymore.
    fn check(&mut self, transform: &RigidTransform<T>) -> RegistrationResult<bool>;

    /// Current readings, parallel to [`value_names`](Self::value_names).
    fn values(&self) -> &[T];

    /// Thresholds, parallel to [`limit_names`](Self::limit_names).
    fn limits(&self) -> &[T];

    /// Names of the entries in [`values`](Self::values).
    fn value_names(&self) -> &[&'static str];

    /// Names of the entries in [`limits`](Self::limits).
    fn limit_names(&self) -> &[&'static str];
}

/// Stops after a fixed number of iterations.
#[derive(Debug, Clone)]
pub struct CounterCheck<T: Real> {
    max_iterations: usize,
    iteration: usize,
    values: [T; 1],
    limits: [T; 1],
}

impl<T: Real> CounterCheck<T> {
    /// Creates a check stopping after `max_iterations` iterations.
    #[must_use]
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            iteration: 0,
            values: [T::zero()],
            limits: [real(max_iterations as f64)],
        }
    }
}

impl<T: Real> Default for CounterCheck<T> {
    fn default() -> Self {
        Self::new(20)
    }
}

impl<T: Real> ConvergenceCheck<T> for CounterCheck<T> {
    fn init(&mut self, _transform: &RigidTransform<T>) -> RegistrationResult<()> {
        self.iteration = 0;
        self.values = [T::zero()];
        Ok(())
    }

    fn check(&mut self, _transform: &RigidTransform<T>) -> RegistrationResult<bool> {
        self.iteration += 1;
        self.values = [real(self.iteration as f64)];
        Ok(self.iteration < self.max_iterations)
    }

    fn values(&self) -> &[T] {
        &self.values
    }

    fn limits(&self) -> &[T] {
        &self.limits
    }

    fn value_names(&self) -> &[&'static str] {
        &["iteration count"]
    }

    fn limit_names(&self) -> &[&'static str] {
        &["max iteration count"]
    }
}

/// Stops once the transform stops moving.
///
/// Keeps the last `tail + 1` rotations and translations; the values are
/// the mean quaternion-angle delta and the mean translation delta over
/// that window. Both must fall below their limits, and at least
/// `tail + 1` iterations must have run.
#[derive(Debug, Clone)]
pub struct DeltaTransformCheck<T: Real> {
    tail: usize,
    history: VecDeque<(UnitQuaternion<T>, DVector<T>)>,
    values: [T; 2],
    limits: [T; 2],
}

impl<T: Real> DeltaTransformCheck<T> {
    /// Creates a check with rotation and translation thresholds, averaged
    /// over a window of `tail` deltas (at least 1).
    #[must_use]
    pub fn new(min_rotation_delta: T, min_translation_delta: T, tail: usize) -> Self {
        Self {
            tail: tail.max(1),
            history: VecDeque::new(),
            values: [T::zero(), T::zero()],
            limits: [min_rotation_delta, min_translation_delta],
        }
    }
}

impl<T: Real> ConvergenceCheck<T> for DeltaTransformCheck<T> {
    fn init(&mut self, _transform: &RigidTransform<T>) -> RegistrationResult<()> {
        self.history.clear();
        self.values = [T::zero(), T::zero()];
        Ok(())
    }

    fn check(&mut self, transform: &RigidTransform<T>) -> RegistrationResult<bool> {
        self.history
            .push_back((transform.rotation_quaternion(), transform.translation()));
        if self.history.len() > self.tail + 1 {
            self.history.pop_front();
        }
        if self.history.len() < self.tail + 1 {
            return Ok(true);
        }

        let mut rotation_sum = T::zero();
        let mut translation_sum = T::zero();
        for window in 0..self.tail {
            let (ref q0, ref t0) = self.history[window];
            let (ref q1, ref t1) = self.history[window + 1];
            rotation_sum += q0.angle_to(q1);
            translation_sum += (t1 - t0).norm();
        }
        let count = real::<T>(self.tail as f64);
        self.values = [rotation_sum / count, translation_sum / count];
        Ok(self.values[0] >= self.limits[0] || self.values[1] >= self.limits[1])
    }

    fn values(&self) -> &[T] {
        &self.values
    }

    fn limits(&self) -> &[T] {
        &self.limits
    }

    fn value_names(&self) -> &[&'static str] {
        &["mean rotation delta", "mean translation delta"]
    }

    fn limit_names(&self) -> &[&'static str] {
        &["min rotation delta", "min translation delta"]
    }
}

/// Aborts when the transform runs away from its starting point.
///
/// Captures the initial rotation and translation on `init`; every check
/// measures the angular and translational displacement from there and
/// raises [`RegistrationError::Diverged`] when either exceeds its bound.
#[derive(Debug, Clone)]
pub struct BoundCheck<T: Real> {
    initial: Option<(UnitQuaternion<T>, DVector<T>)>,
    values: [T; 2],
    limits: [T; 2],
}

impl<T: Real> BoundCheck<T> {
    /// Creates a check bounding the rotation angle and translation norm
    /// reachable from the initial transform.
    #[must_use]
    pub fn new(max_rotation_norm: T, max_translation_norm: T) -> Self {
        Self {
            initial: None,
            values: [T::zero(), T::zero()],
            limits: [max_rotation_norm, max_translation_norm],
        }
    }
}

impl<T: Real> ConvergenceCheck<T> for BoundCheck<T> {
    fn init(&mut self, transform: &RigidTransform<T>) -> RegistrationResult<()> {
        self.initial = Some((transform.rotation_quaternion(), transform.translation()));
        self.values = [T::zero(), T::zero()];
        Ok(())
    }

    fn check(&mut self, transform: &RigidTransform<T>) -> RegistrationResult<bool> {
        let (initial_rotation, initial_translation) =
            self.initial.as_ref().ok_or_else(|| {
                RegistrationError::InvalidParameter(
                    "BoundCheck::check called before init".to_string(),
                )
            })?;
        let rotation_dist = initial_rotation.angle_to(&transform.rotation_quaternion());
        let translation_dist = (transform.translation() - initial_translation).norm();
        self.values = [rotation_dist, translation_dist];
        if rotation_dist > self.limits[0] || translation_dist > self.limits[1] {
            return Err(RegistrationError::Diverged {
                check: "bound",
                reason: format!(
                    "displacement from initial transform exceeded its bound \
                     (rotation {rotation_dist}, translation {translation_dist})"
                ),
            });
        }
        Ok(true)
    }

    fn values(&self) -> &[T] {
        &self.values
    }

    fn limits(&self) -> &[T] {
        &self.limits
    }

    fn value_names(&self) -> &[&'static str] {
        &["rotation displacement", "translation displacement"]
    }

    fn limit_names(&self) -> &[&'static str] {
        &["max rotation displacement", "max translation displacement"]
    }
}

/// An ordered set of convergence checks composed conjunctively.
#[derive(Default)]
pub struct ConvergenceChecks<T: Real>(Vec<Box<dyn ConvergenceCheck<T>>>);

impl<T: Real> ConvergenceChecks<T> {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a check.
    pub fn push(&mut self, check: Box<dyn ConvergenceCheck<T>>) {
        self.0.push(check);
    }

    /// Number of checks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when the set holds no checks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The checks, for inspection of their mirror state.
    #[must_use]
    pub fn checks(&self) -> &[Box<dyn ConvergenceCheck<T>>] {
        &self.0
    }

    /// Initializes every check with the initial transform.
    ///
    /// # Errors
    ///
    /// Propagates the first check error.
    pub fn init_all(&mut self, transform: &RigidTransform<T>) -> RegistrationResult<()> {
        for check in &mut self.0 {
            check.init(transform)?;
        }
        Ok(())
    }

    /// Runs every check; returns false when any requests a stop.
    ///
    /// # Errors
    ///
    /// Propagates [`RegistrationError::Diverged`] from any check.
    pub fn check_all(&mut self, transform: &RigidTransform<T>) -> RegistrationResult<bool> {
        let mut keep_iterating = true;
        for check in &mut self.0 {
            keep_iterating = check.check(transform)? && keep_iterating;
        }
        Ok(keep_iterating)
    }
}

impl<T: Real> From<Vec<Box<dyn ConvergenceCheck<T>>>> for ConvergenceChecks<T> {
    fn from(checks: Vec<Box<dyn ConvergenceCheck<T>>>) -> Self {
        Self(checks)
    }
}
