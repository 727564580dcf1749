//! The owned bundle of pipeline stages driving one registration.

use cloud_types::{real, Real};
use kiddo::float::kdtree::Axis;

use crate::checker::{ConvergenceCheck, ConvergenceChecks, CounterCheck, DeltaTransformCheck};
use crate::filter::CloudFilters;
use crate::inspector::{Inspector, NullInspector};
use crate::matcher::{KdTreeMatcher, Matcher, NullMatcher};
use crate::minimizer::{ErrorMinimizer, IdentityMinimizer, PointToPlaneMinimizer, PointToPointMinimizer};
use crate::outlier::{NullOutlierFilter, OutlierFilter, OutlierFilters};
use crate::transformation::Transformations;

/// Owns every stage of one registration pipeline.
///
/// All stages are released with the strategy. The driver consults the
/// stages strictly through their contracts, so any combination of
/// custom and built-in stages works.
///
/// `Default` builds an inert but total pipeline (null matcher, identity
/// minimizer); use [`Strategy::point_to_point`] or
/// [`Strategy::point_to_plane`] for working presets, or assemble the
/// fields directly.
pub struct Strategy<T: Real> {
    /// Filters applied to the reading cloud (pre pass and step pass).
    pub reading_filters: CloudFilters<T>,
    /// Filters applied once to the reference cloud.
    pub reference_filters: CloudFilters<T>,
    /// Transformations applied after each minimization.
    pub transformations: Transformations<T>,
    /// The point associator.
    pub matcher: Box<dyn Matcher<T>>,
    /// Feature-based outlier filters, composed by elementwise product.
    pub feature_outlier_filters: OutlierFilters<T>,
    /// Descriptor-based outlier filter.
    pub descriptor_outlier_filter: Box<dyn OutlierFilter<T>>,
    /// The transform estimator.
    pub error_minimizer: Box<dyn ErrorMinimizer<T>>,
    /// Convergence checks, composed conjunctively.
    pub convergence_checks: ConvergenceChecks<T>,
    /// Observation hook.
    pub inspector: Box<dyn Inspector<T>>,
    /// Blend factor between feature and descriptor weights, in `[0, 1]`:
    /// `weight = alpha * feature + (1 - alpha) * descriptor`.
    pub outlier_mixing_weight: T,
}

impl<T: Real> Default for Strategy<T> {
    fn default() -> Self {
        Self {
            reading_filters: CloudFilters::new(),
            reference_filters: CloudFilters::new(),
            transformations: Transformations::standard(),
            matcher: Box::new(NullMatcher),
            feature_outlier_filters: OutlierFilters::new(),
            descriptor_outlier_filter: Box::new(NullOutlierFilter),
            error_minimizer: Box::new(IdentityMinimizer::new()),
            convergence_checks: ConvergenceChecks::from(vec![
                Box::new(CounterCheck::new(20)) as Box<dyn ConvergenceCheck<T>>,
            ]),
            inspector: Box::new(NullInspector),
            outlier_mixing_weight: real(0.5),
        }
    }
}

impl<T: Real + Axis> Strategy<T> {
    /// The standard point-to-point pipeline: kd-tree matching, SVD
    /// minimization, an iteration cap of 40 and a delta-transform stop.
    #[must_use]
    pub fn point_to_point() -> Self {
        Self {
            matcher: Box::new(KdTreeMatcher::new(1, 0.0)),
            error_minimizer: Box::new(PointToPointMinimizer::new()),
            convergence_checks: ConvergenceChecks::from(vec![
                Box::new(CounterCheck::new(40)) as Box<dyn ConvergenceCheck<T>>,
                Box::new(DeltaTransformCheck::new(real(1.0e-4), real(1.0e-4), 3)),
            ]),
            outlier_mixing_weight: T::one(),
            ..Self::default()
        }
    }

    /// The standard point-to-plane pipeline. The reference cloud must
    /// carry a `normals` descriptor (for instance from the
    /// surface-normal filter).
    #[must_use]
    pub fn point_to_plane() -> Self {
        Self {
            error_minimizer: Box::new(PointToPlaneMinimizer::new()),
            ..Self::point_to_point()
        }
    }
}
