//! Point-count reduction by sampling.

use cloud_types::{PointCloud, Real};
use rand::Rng;

use super::CloudFilter;
use crate::error::RegistrationResult;

/// Keeps each point independently with a fixed probability.
///
/// Descriptors are kept in lockstep with features. The filter can be
/// enabled for the pre pass, the per-iteration step pass, or both; a
/// disabled pass returns its input unchanged.
#[derive(Debug, Clone, Copy)]
pub struct RandomSamplingFilter {
    ratio: f64,
    enable_pre: bool,
    enable_step: bool,
}

impl RandomSamplingFilter {
    /// Creates a filter keeping points with probability `ratio`,
    /// clamped into `[0, 1]`.
    #[must_use]
    pub fn new(ratio: f64, enable_pre: bool, enable_step: bool) -> Self {
        Self {
            ratio: ratio.clamp(0.0, 1.0),
            enable_pre,
            enable_step,
        }
    }

    fn sample<T: Real>(&self, input: &PointCloud<T>) -> PointCloud<T> {
        let mut rng = rand::thread_rng();
        let kept: Vec<usize> =
            (0..input.point_count()).filter(|_| rng.gen::<f64>() < self.ratio).collect();
        input.select_columns(&kept)
    }
}

impl Default for RandomSamplingFilter {
    fn default() -> Self {
        Self::new(0.5, true, false)
    }
}

impl<T: Real> CloudFilter<T> for RandomSamplingFilter {
    fn pre_filter(&self, input: PointCloud<T>) -> RegistrationResult<(PointCloud<T>, bool)> {
        if self.enable_pre {
            Ok((self.sample(&input), true))
        } else {
            Ok((input, true))
        }
    }

    fn step_filter(&self, input: PointCloud<T>) -> RegistrationResult<(PointCloud<T>, bool)> {
        if self.enable_step {
            Ok((self.sample(&input), true))
        } else {
            Ok((input, true))
        }
    }
}

/// Keeps every `step`-th point.
#[derive(Debug, Clone, Copy)]
pub struct FixstepSamplingFilter {
    step: usize,
    enable_pre: bool,
    enable_step: bool,
}

impl FixstepSamplingFilter {
    /// Creates a filter keeping points whose index is a multiple of
    /// `step` (at least 1).
    #[must_use]
    pub fn new(step: usize, enable_pre: bool, enable_step: bool) -> Self {
        Self {
            step: step.max(1),
            enable_pre,
            enable_step,
        }
    }

    fn sample<T: Real>(&self, input: &PointCloud<T>) -> PointCloud<T> {
        let kept: Vec<usize> = (0..input.point_count()).step_by(self.step).collect();
        input.select_columns(&kept)
    }
}

impl Default for FixstepSamplingFilter {
    fn default() -> Self {
        Self::new(10, true, false)
    }
}

impl<T: Real> CloudFilter<T> for FixstepSamplingFilter {
    fn pre_filter(&self, input: PointCloud<T>) -> RegistrationResult<(PointCloud<T>, bool)> {
        if self.enable_pre {
            Ok((self.sample(&input), true))
        } else {
            Ok((input, true))
        }
    }

    fn step_filter(&self, input: PointCloud<T>) -> RegistrationResult<(PointCloud<T>, bool)> {
        if self.enable_step {
            Ok((self.sample(&input), true))
        } else {
            Ok((input, true))
        }
    }
}
