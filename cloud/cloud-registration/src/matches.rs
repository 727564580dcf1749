//! Nearest-neighbor match sets and their reliability weights.

use cloud_types::{real, Real};
use nalgebra::DMatrix;

use crate::error::{RegistrationError, RegistrationResult};

/// Per-match reliability weights, shaped like [`Matches::dists`].
///
/// Weights are nonnegative; `0` means "rejected".
pub type OutlierWeights<T> = DMatrix<T>;

/// K-nearest-neighbor associations from a reading cloud to a reference.
///
/// Both matrices are KxN: `dists[(k, i)]` is the squared distance from
/// reading point `i` to its k-th nearest reference point, `ids[(k, i)]`
/// the reference column index. Row 0 is the nearest neighbor. Slots with
/// an infinite distance are invalid (fewer than K neighbors existed).
#[derive(Debug, Clone, PartialEq)]
pub struct Matches<T: Real> {
    /// Squared distances, KxN.
    pub dists: DMatrix<T>,
    /// Reference column indices, KxN.
    pub ids: DMatrix<usize>,
}

impl<T: Real> Matches<T> {
    /// Creates a match set from its two matrices.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrices have different shapes.
    pub fn new(dists: DMatrix<T>, ids: DMatrix<usize>) -> RegistrationResult<Self> {
        if dists.nrows() != ids.nrows() {
            return Err(RegistrationError::ShapeMismatch {
                context: "match id rows",
                expected: dists.nrows(),
                actual: ids.nrows(),
            });
        }
        if dists.ncols() != ids.ncols() {
            return Err(RegistrationError::ShapeMismatch {
                context: "match id columns",
                expected: dists.ncols(),
                actual: ids.ncols(),
            });
        }
        Ok(Self { dists, ids })
    }

    /// An empty match set (no neighbors, no points).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            dists: DMatrix::zeros(0, 0),
            ids: DMatrix::zeros(0, 0),
        }
    }

    /// The sentinel distance marking an invalid slot.
    #[must_use]
    pub fn invalid_distance() -> T {
        real(f64::INFINITY)
    }

    /// Number of neighbors per point (K).
    #[must_use]
    pub fn knn(&self) -> usize {
        self.dists.nrows()
    }

    /// Number of reading points covered (N).
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.dists.ncols()
    }

    /// Returns true when slot `(k, i)` holds a real neighbor.
    #[must_use]
    pub fn is_valid(&self, k: usize, i: usize) -> bool {
        self.dists[(k, i)] < Self::invalid_distance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_validation() {
        let dists = DMatrix::<f64>::zeros(1, 3);
        let ids = DMatrix::<usize>::zeros(2, 3);
        assert!(matches!(
            Matches::new(dists, ids),
            Err(RegistrationError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_slots() {
        let mut dists = DMatrix::<f64>::zeros(1, 2);
        dists[(0, 1)] = Matches::<f64>::invalid_distance();
        let ids = DMatrix::<usize>::zeros(1, 2);
        let matches = Matches::new(dists, ids).unwrap();
        assert!(matches.is_valid(0, 0));
        assert!(!matches.is_valid(0, 1));
    }

    #[test]
    fn test_empty() {
        let matches = Matches::<f32>::empty();
        assert_eq!(matches.knn(), 0);
        assert_eq!(matches.point_count(), 0);
    }
}
