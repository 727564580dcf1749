//! Rejection of unreliable matches.
//!
//! Outlier filters turn a match set into per-match weights in `[0, 1]`,
//! with `0` meaning "rejected". The same contract serves both the
//! feature-based filter chain and the descriptor-based filter slot of a
//! strategy; the driver blends the two with the strategy's mixing
//! weight.

use cloud_types::{PointCloud, Real};
use nalgebra::DMatrix;

use crate::error::RegistrationResult;
use crate::matches::{Matches, OutlierWeights};

/// Computes per-match reliability weights.
pub trait OutlierFilter<T: Real> {
    /// Weights of shape equal to `matches.dists`.
    fn compute(
        &self,
        reading: &PointCloud<T>,
        reference: &PointCloud<T>,
        matches: &Matches<T>,
    ) -> RegistrationResult<OutlierWeights<T>>;
}

/// Accepts every match with weight 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOutlierFilter;

impl<T: Real> OutlierFilter<T> for NullOutlierFilter {
    fn compute(
        &self,
        _reading: &PointCloud<T>,
        _reference: &PointCloud<T>,
        matches: &Matches<T>,
    ) -> RegistrationResult<OutlierWeights<T>> {
        Ok(DMatrix::from_element(
            matches.knn(),
            matches.point_count(),
            T::one(),
        ))
    }
}

/// Rejects matches farther than a fixed distance.
#[derive(Debug, Clone, Copy)]
pub struct MaxDistOutlierFilter<T: Real> {
    max_dist: T,
}

impl<T: Real> MaxDistOutlierFilter<T> {
    /// Creates a filter keeping matches with distance at most `max_dist`.
    #[must_use]
    pub fn new(max_dist: T) -> Self {
        Self { max_dist }
    }
}

impl<T: Real> OutlierFilter<T> for MaxDistOutlierFilter<T> {
    fn compute(
        &self,
        _reading: &PointCloud<T>,
        _reference: &PointCloud<T>,
        matches: &Matches<T>,
    ) -> RegistrationResult<OutlierWeights<T>> {
        let limit = self.max_dist * self.max_dist;
        Ok(matches
            .dists
            .map(|d| if d <= limit { T::one() } else { T::zero() }))
    }
}

/// Rejects matches closer than a fixed distance.
///
/// Suppresses self-matches when the reading and the reference are the
/// same cloud.
#[derive(Debug, Clone, Copy)]
pub struct MinDistOutlierFilter<T: Real> {
    min_dist: T,
}

impl<T: Real> MinDistOutlierFilter<T> {
    /// Creates a filter keeping matches with distance at least `min_dist`.
    #[must_use]
    pub fn new(min_dist: T) -> Self {
        Self { min_dist }
    }
}

impl<T: Real> OutlierFilter<T> for MinDistOutlierFilter<T> {
    fn compute(
        &self,
        _reading: &PointCloud<T>,
        _reference: &PointCloud<T>,
        matches: &Matches<T>,
    ) -> RegistrationResult<OutlierWeights<T>> {
        let limit = self.min_dist * self.min_dist;
        let invalid = Matches::<T>::invalid_distance();
        Ok(matches.dists.map(|d| {
            if d >= limit && d < invalid {
                T::one()
            } else {
                T::zero()
            }
        }))
    }
}

/// Rejects matches farther than a factor of the median match distance.
#[derive(Debug, Clone, Copy)]
pub struct MedianDistOutlierFilter<T: Real> {
    factor: T,
}

impl<T: Real> MedianDistOutlierFilter<T> {
    /// Creates a filter keeping matches within `factor` times the median
    /// distance.
    #[must_use]
    pub fn new(factor: T) -> Self {
        Self { factor }
    }
}

impl<T: Real> OutlierFilter<T> for MedianDistOutlierFilter<T> {
    fn compute(
        &self,
        _reading: &PointCloud<T>,
        _reference: &PointCloud<T>,
        matches: &Matches<T>,
    ) -> RegistrationResult<OutlierWeights<T>> {
        let invalid = Matches::<T>::invalid_distance();
        let mut dists: Vec<T> = matches
            .dists
            .iter()
            .copied()
            .filter(|d| *d < invalid)
            .map(|d| d.sqrt())
            .collect();
        if dists.is_empty() {
            return Ok(DMatrix::zeros(matches.knn(), matches.point_count()));
        }
        dists.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = dists[dists.len() / 2];
        let limit = self.factor * median;
        Ok(matches.dists.map(|d| {
            if d < invalid && d.sqrt() <= limit {
                T::one()
            } else {
                T::zero()
            }
        }))
    }
}

/// Keeps the closest fraction of matches and rejects the rest.
#[derive(Debug, Clone, Copy)]
pub struct TrimmedDistOutlierFilter {
    ratio: f64,
}

impl TrimmedDistOutlierFilter {
    /// Creates a filter keeping the closest `ratio` of all match slots.
    ///
    /// The ratio is clamped into `(0, 1]`.
    #[must_use]
    pub fn new(ratio: f64) -> Self {
        Self {
            ratio: ratio.clamp(f64::EPSILON, 1.0),
        }
    }
}

impl<T: Real> OutlierFilter<T> for TrimmedDistOutlierFilter {
    fn compute(
        &self,
        _reading: &PointCloud<T>,
        _reference: &PointCloud<T>,
        matches: &Matches<T>,
    ) -> RegistrationResult<OutlierWeights<T>> {
        let invalid = Matches::<T>::invalid_distance();
        let total = matches.knn() * matches.point_count();
        let mut slots: Vec<(T, usize, usize)> = Vec::with_capacity(total);
        for i in 0..matches.point_count() {
            for k in 0..matches.knn() {
                let d = matches.dists[(k, i)];
                if d < invalid {
                    slots.push((d, k, i));
                }
            }
        }
        slots.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
        #[allow(clippy::cast_possible_truncation)]
        let keep = ((self.ratio * total as f64).ceil() as usize).min(slots.len());

        let mut weights = DMatrix::zeros(matches.knn(), matches.point_count());
        for &(_, k, i) in &slots[..keep] {
            weights[(k, i)] = T::one();
        }
        Ok(weights)
    }
}

/// An ordered chain of outlier filters composed by elementwise product.
#[derive(Default)]
pub struct OutlierFilters<T: Real>(Vec<Box<dyn OutlierFilter<T>>>);

impl<T: Real> OutlierFilters<T> {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a filter to the chain.
    pub fn push(&mut self, filter: Box<dyn OutlierFilter<T>>) {
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

    /// Runs every filter and multiplies their weights elementwise.
    ///
    /// An empty chain accepts every match.
    ///
    /// # Errors
    ///
    /// Propagates the first filter error.
    pub fn compute(
        &self,
        reading: &PointCloud<T>,
        reference: &PointCloud<T>,
        matches: &Matches<T>,
    ) -> RegistrationResult<OutlierWeights<T>> {
        let mut weights =
            DMatrix::from_element(matches.knn(), matches.point_count(), T::one());
        for filter in &self.0 {
            let partial = filter.compute(reading, reference, matches)?;
            weights.component_mul_assign(&partial);
        }
        Ok(weights)
    }
}

impl<T: Real> From<Vec<Box<dyn OutlierFilter<T>>>> for OutlierFilters<T> {
    fn from(filters: Vec<Box<dyn OutlierFilter<T>>>) -> Self {
        Self(filters)
    }
}
