//! Point-to-plane minimization by small-angle linearization.

use cloud_types::{PointCloud, Real, RigidTransform};
use nalgebra::{DMatrix, DVector, Rotation2, Rotation3, Vector3};

use super::{ErrorMinimizer, MatchedPairs, UsageRatios};
use crate::error::{RegistrationError, RegistrationResult};
use crate::matches::{Matches, OutlierWeights};

/// Minimizes the weighted squared distances along the reference normals.
///
/// The rotation is linearized around the identity (R = I + [w]x), the
/// resulting normal equations (3x3 in 2D, 6x6 in 3D) are solved for the
/// rotation vector and translation, and the rotation vector is
/// exponentiated back to a proper rotation. Requires a `normals`
/// descriptor on the reference; in 2D the "plane" is a line.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointToPlaneMinimizer<T: Real> {
    usage: Option<UsageRatios<T>>,
}

impl<T: Real> PointToPlaneMinimizer<T> {
    /// Creates the minimizer.
    #[must_use]
    pub fn new() -> Self {
        Self { usage: None }
    }
}

impl<T: Real> ErrorMinimizer<T> for PointToPlaneMinimizer<T> {
    fn compute(
        &mut self,
        reading: &PointCloud<T>,
        reference: &PointCloud<T>,
        weights: &OutlierWeights<T>,
        matches: &Matches<T>,
    ) -> RegistrationResult<RigidTransform<T>> {
        if reference.descriptor("normals").is_none() {
            return Err(RegistrationError::MissingDescriptor {
                stage: "point-to-plane minimizer",
                name: "normals".to_string(),
            });
        }

        let ratios = UsageRatios::from_weights(weights);
        let pairs = MatchedPairs::gather(reading, reference, matches, weights)?;
        let dim = reading.point_dim();
        if pairs.len() < dim + 1 {
            return Err(RegistrationError::Degenerate(format!(
                "{} weighted pairs left, need at least {}",
                pairs.len(),
                dim + 1
            )));
        }

        let normals = pairs.reference.descriptor("normals").ok_or_else(|| {
            RegistrationError::MissingDescriptor {
                stage: "point-to-plane minimizer",
                name: "normals".to_string(),
            }
        })?;
        if normals.nrows() != dim {
            return Err(RegistrationError::ShapeMismatch {
                context: "normals descriptor rows",
                expected: dim,
                actual: normals.nrows(),
            });
        }

        let dof = if dim == 2 { 3 } else { 6 };
        let p = pairs.reading.features();
        let q = pairs.reference.features();
        let mut lhs = DMatrix::zeros(dof, dof);
        let mut rhs = DVector::zeros(dof);
        let mut row = vec![T::zero(); dof];
        for j in 0..pairs.len() {
            let w = pairs.weights[j];
            if dim == 2 {
                row[0] = p[(0, j)] * normals[(1, j)] - p[(1, j)] * normals[(0, j)];
                row[1] = normals[(0, j)];
                row[2] = normals[(1, j)];
            } else {
                // p x n, then n.
                row[0] = p[(1, j)] * normals[(2, j)] - p[(2, j)] * normals[(1, j)];
                row[1] = p[(2, j)] * normals[(0, j)] - p[(0, j)] * normals[(2, j)];
                row[2] = p[(0, j)] * normals[(1, j)] - p[(1, j)] * normals[(0, j)];
                row[3] = normals[(0, j)];
                row[4] = normals[(1, j)];
                row[5] = normals[(2, j)];
            }
            let mut residual = T::zero();
            for r in 0..dim {
                residual += (p[(r, j)] - q[(r, j)]) * normals[(r, j)];
            }
            let b = -residual;
            for r in 0..dof {
                rhs[r] += row[r] * b * w;
                for c in 0..dof {
                    lhs[(r, c)] += row[r] * row[c] * w;
                }
            }
        }

        // Least-squares solve: a pure plane leaves the in-plane motion
        // unconstrained, and the minimum-norm solution keeps those
        // components at zero instead of failing.
        let solution = lhs
            .svd(true, true)
            .solve(&rhs, cloud_types::real(1.0e-10))
            .map_err(|reason| RegistrationError::Degenerate(reason.to_string()))?;

        let (rotation, translation) = if dim == 2 {
            let rot = Rotation2::new(solution[0]);
            let rotation = DMatrix::from_fn(2, 2, |r, c| rot.matrix()[(r, c)]);
            let translation = DVector::from_row_slice(&[solution[1], solution[2]]);
            (rotation, translation)
        } else {
            let rot = Rotation3::new(Vector3::new(solution[0], solution[1], solution[2]));
            let rotation = DMatrix::from_fn(3, 3, |r, c| rot.matrix()[(r, c)]);
            let translation =
                DVector::from_row_slice(&[solution[3], solution[4], solution[5]]);
            (rotation, translation)
        };

        self.usage = Some(ratios);
        Ok(RigidTransform::from_parts(&rotation, &translation)?)
    }

    fn usage_ratios(&self) -> Option<UsageRatios<T>> {
        self.usage
    }
}
