//! Cloud filters: stages that reshape a cloud before or during iteration.
//!
//! A filter may drop points, add descriptor rows, or pass its input
//! through untouched; it must preserve the label-span invariant of the
//! cloud. `pre_filter` runs once per side before the ICP loop,
//! `step_filter` runs on the reading every iteration. Both return the
//! filtered cloud together with a flag requesting that iteration
//! continue.

mod normals;
mod sampling;

pub use normals::{OrientNormalsFilter, SamplingSurfaceNormalFilter, SurfaceNormalFilter};
pub use sampling::{FixstepSamplingFilter, RandomSamplingFilter};

use cloud_types::{PointCloud, Real};

use crate::error::RegistrationResult;

/// A point-cloud filter stage.
pub trait CloudFilter<T: Real> {
    /// Runs once before the ICP loop.
    fn pre_filter(&self, input: PointCloud<T>) -> RegistrationResult<(PointCloud<T>, bool)>;

    /// Runs on the reading cloud each iteration. Defaults to a pass-through.
    fn step_filter(&self, input: PointCloud<T>) -> RegistrationResult<(PointCloud<T>, bool)> {
        Ok((input, true))
    }
}

/// A filter that returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityFilter;

impl<T: Real> CloudFilter<T> for IdentityFilter {
    fn pre_filter(&self, input: PointCloud<T>) -> RegistrationResult<(PointCloud<T>, bool)> {
        Ok((input, true))
    }
}

/// An ordered chain of cloud filters.
#[derive(Default)]
pub struct CloudFilters<T: Real>(Vec<Box<dyn CloudFilter<T>>>);

impl<T: Real> CloudFilters<T> {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a filter to the chain.
    pub fn push(&mut self, filter: Box<dyn CloudFilter<T>>) {
        self.0.push(filter);
    }

    /// Number of filters in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when the chain holds no filters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Runs every `pre_filter` in order, replacing the cloud in place.
    ///
    /// Returns false when any filter requests that iteration stop.
    ///
    /// # Errors
    ///
    /// Propagates the first filter error.
    pub fn apply_pre(&self, cloud: &mut PointCloud<T>) -> RegistrationResult<bool> {
        let mut keep_iterating = true;
        for filter in &self.0 {
            let (next, keep) = filter.pre_filter(std::mem::take(cloud))?;
            *cloud = next;
            keep_iterating = keep_iterating && keep;
        }
        Ok(keep_iterating)
    }

    /// Runs every `step_filter` in order, replacing the cloud in place.
    ///
    /// # Errors
    ///
    /// Propagates the first filter error.
    pub fn apply_step(&self, cloud: &mut PointCloud<T>) -> RegistrationResult<bool> {
        let mut keep_iterating = true;
        for filter in &self.0 {
            let (next, keep) = filter.step_filter(std::mem::take(cloud))?;
            *cloud = next;
            keep_iterating = keep_iterating && keep;
        }
        Ok(keep_iterating)
    }
}

impl<T: Real> From<Vec<Box<dyn CloudFilter<T>>>> for CloudFilters<T> {
    fn from(filters: Vec<Box<dyn CloudFilter<T>>>) -> Self {
        Self(filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    #[test]
    fn test_identity_passes_through() {
        let cloud = PointCloud::from_planar_points(&[Point2::new(1.0, 2.0)]);
        let (out, keep) = IdentityFilter.pre_filter(cloud.clone()).unwrap();
        assert!(keep);
        assert_eq!(out, cloud);
    }

    #[test]
    fn test_chain_applies_in_order() {
        let mut cloud = PointCloud::<f64>::from_planar_points(&[
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(3.0, 0.0),
        ]);
        let mut chain: CloudFilters<f64> = CloudFilters::new();
        chain.push(Box::new(FixstepSamplingFilter::new(2, true, false)));
        chain.push(Box::new(FixstepSamplingFilter::new(2, true, false)));
        let keep = chain.apply_pre(&mut cloud).unwrap();
        assert!(keep);
        assert_eq!(cloud.point_count(), 1);
    }
}
