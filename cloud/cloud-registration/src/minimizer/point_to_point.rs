//! Closed-form point-to-point minimization via SVD.

use cloud_types::{PointCloud, Real, RigidTransform};
use nalgebra::{DMatrix, DVector};

use super::{ErrorMinimizer, MatchedPairs, UsageRatios};
use crate::error::{RegistrationError, RegistrationResult};
use crate::matches::{Matches, OutlierWeights};

/// Minimizes the weighted sum of squared point-to-point distances.
///
/// Uses the Kabsch construction: weighted centroids, the weighted cross
/// covariance H of the centered pairs, and its SVD. The determinant sign
/// fix guarantees a proper rotation even when the SVD lands on a
/// reflection.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointToPointMinimizer<T: Real> {
    usage: Option<UsageRatios<T>>,
}

impl<T: Real> PointToPointMinimizer<T> {
    /// Creates the minimizer.
    #[must_use]
    pub fn new() -> Self {
        Self { usage: None }
    }
}

impl<T: Real> ErrorMinimizer<T> for PointToPointMinimizer<T> {
    fn compute(
        &mut self,
        reading: &PointCloud<T>,
        reference: &PointCloud<T>,
        weights: &OutlierWeights<T>,
        matches: &Matches<T>,
    ) -> RegistrationResult<RigidTransform<T>> {
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

        let total_weight = pairs.weights.sum();
        if total_weight <= T::zero() {
            return Err(RegistrationError::Degenerate(
                "total pair weight is zero".to_string(),
            ));
        }

        let p = pairs.reading.features();
        let q = pairs.reference.features();
        let mut mu_p = DVector::zeros(dim);
        let mut mu_q = DVector::zeros(dim);
        for j in 0..pairs.len() {
            let w = pairs.weights[j];
            for r in 0..dim {
                mu_p[r] += p[(r, j)] * w;
                mu_q[r] += q[(r, j)] * w;
            }
        }
        mu_p /= total_weight;
        mu_q /= total_weight;

        let mut cross = DMatrix::zeros(dim, dim);
        for j in 0..pairs.len() {
            let w = pairs.weights[j];
            let dp = DVector::from_fn(dim, |r, _| p[(r, j)] - mu_p[r]);
            let dq = DVector::from_fn(dim, |r, _| q[(r, j)] - mu_q[r]);
            cross += &dp * dq.transpose() * w;
        }

        let svd = cross.svd(true, true);
        let u = svd.u.ok_or_else(|| {
            RegistrationError::Degenerate("SVD of the cross covariance failed".to_string())
        })?;
        let v_t = svd.v_t.ok_or_else(|| {
            RegistrationError::Degenerate("SVD of the cross covariance failed".to_string())
        })?;

        let mut rotation = v_t.transpose() * u.transpose();
        if rotation.determinant() < T::zero() {
            let mut v = v_t.transpose();
            for r in 0..dim {
                v[(r, dim - 1)] = -v[(r, dim - 1)];
            }
            rotation = v * u.transpose();
        }

        let translation = &mu_q - &rotation * &mu_p;
        self.usage = Some(ratios);
        Ok(RigidTransform::from_parts(&rotation, &translation)?)
    }

    fn usage_ratios(&self) -> Option<UsageRatios<T>> {
        self.usage
    }
}
