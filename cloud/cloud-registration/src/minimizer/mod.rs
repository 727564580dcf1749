//! Estimation of the incremental transform from weighted matches.

mod point_to_plane;
mod point_to_point;

pub use point_to_plane::PointToPlaneMinimizer;
pub use point_to_point::PointToPointMinimizer;

use cloud_types::{real, PointCloud, Real, RigidTransform};
use nalgebra::DVector;

use crate::error::{RegistrationError, RegistrationResult};
use crate::matches::{Matches, OutlierWeights};

/// How much of the matched set actually drove the minimization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageRatios<T> {
    /// Fraction of reading points with at least one non-zero weight.
    pub point_used: T,
    /// Sum of all weights over the total slot count NxK.
    pub weighted_point_used: T,
}

impl<T: Real> UsageRatios<T> {
    /// Computes both ratios from a weight matrix.
    #[must_use]
    pub fn from_weights(weights: &OutlierWeights<T>) -> Self {
        let n = weights.ncols();
        let k = weights.nrows();
        if n == 0 || k == 0 {
            return Self {
                point_used: T::zero(),
                weighted_point_used: T::zero(),
            };
        }
        let mut used = 0usize;
        for i in 0..n {
            if (0..k).any(|r| weights[(r, i)] > T::zero()) {
                used += 1;
            }
        }
        Self {
            point_used: real::<T>(used as f64) / real(n as f64),
            weighted_point_used: weights.sum() / real((n * k) as f64),
        }
    }
}

/// The paired-up view minimizers work on: co-indexed reading and
/// reference clouds with one column per kept match, plus the weights.
///
/// Pairs are ordered point-major, neighbor-minor; slots with zero weight
/// or an invalid distance are dropped. The gathered reference cloud
/// keeps its descriptors, so plane-based minimizers can read normals per
/// pair.
#[derive(Debug, Clone)]
pub struct MatchedPairs<T: Real> {
    /// Reading columns, one per pair.
    pub reading: PointCloud<T>,
    /// Matched reference columns, one per pair.
    pub reference: PointCloud<T>,
    /// Weight of each pair.
    pub weights: DVector<T>,
}

impl<T: Real> MatchedPairs<T> {
    /// Expands each reading column into its kept matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the weight shape differs from the match shape,
    /// the match count differs from the reading, or a match id falls
    /// outside the reference.
    pub fn gather(
        reading: &PointCloud<T>,
        reference: &PointCloud<T>,
        matches: &Matches<T>,
        weights: &OutlierWeights<T>,
    ) -> RegistrationResult<Self> {
        if weights.nrows() != matches.knn() || weights.ncols() != matches.point_count() {
            return Err(RegistrationError::ShapeMismatch {
                context: "outlier weight shape",
                expected: matches.knn() * matches.point_count(),
                actual: weights.nrows() * weights.ncols(),
            });
        }
        if matches.point_count() != reading.point_count() {
            return Err(RegistrationError::ShapeMismatch {
                context: "match columns vs reading points",
                expected: reading.point_count(),
                actual: matches.point_count(),
            });
        }

        let mut reading_columns = Vec::new();
        let mut reference_columns = Vec::new();
        let mut pair_weights = Vec::new();
        for i in 0..matches.point_count() {
            for k in 0..matches.knn() {
                let weight = weights[(k, i)];
                if weight <= T::zero() || !matches.is_valid(k, i) {
                    continue;
                }
                let id = matches.ids[(k, i)];
                if id >= reference.point_count() {
                    return Err(RegistrationError::ShapeMismatch {
                        context: "match id vs reference points",
                        expected: reference.point_count(),
                        actual: id,
                    });
                }
                reading_columns.push(i);
                reference_columns.push(id);
                pair_weights.push(weight);
            }
        }

        Ok(Self {
            reading: reading.select_columns(&reading_columns),
            reference: reference.select_columns(&reference_columns),
            weights: DVector::from_vec(pair_weights),
        })
    }

    /// Number of kept pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Returns true when no pairs survived.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.len() == 0
    }
}

/// Refines the transform from the matched, weighted point pairs.
pub trait ErrorMinimizer<T: Real> {
    /// Computes the incremental transform aligning the reading onto the
    /// reference.
    fn compute(
        &mut self,
        reading: &PointCloud<T>,
        reference: &PointCloud<T>,
        weights: &OutlierWeights<T>,
        matches: &Matches<T>,
    ) -> RegistrationResult<RigidTransform<T>>;

    /// Usage ratios of the last `compute` call, if any.
    fn usage_ratios(&self) -> Option<UsageRatios<T>>;
}

/// A minimizer that always returns the identity transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMinimizer<T: Real> {
    usage: Option<UsageRatios<T>>,
}

impl<T: Real> IdentityMinimizer<T> {
    /// Creates the identity minimizer.
    #[must_use]
    pub fn new() -> Self {
        Self { usage: None }
    }
}

impl<T: Real> ErrorMinimizer<T> for IdentityMinimizer<T> {
    fn compute(
        &mut self,
        reading: &PointCloud<T>,
        _reference: &PointCloud<T>,
        weights: &OutlierWeights<T>,
        _matches: &Matches<T>,
    ) -> RegistrationResult<RigidTransform<T>> {
        self.usage = Some(UsageRatios::from_weights(weights));
        Ok(RigidTransform::identity(reading.point_dim()))
    }

    fn usage_ratios(&self) -> Option<UsageRatios<T>> {
        self.usage
    }
}
