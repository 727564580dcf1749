//! Iterative closest point registration for labelled point clouds.
//!
//! This crate aligns a *reading* cloud onto a *reference* cloud by
//! repeatedly associating points, rejecting unreliable associations, and
//! minimizing an error criterion, until convergence. Every stage is
//! pluggable through a [`Strategy`]:
//!
//! - **Cloud filters** reshape the clouds before and during iteration
//!   (sampling, surface-normal estimation, normal orientation)
//! - **Matchers** associate reading points with reference points
//!   (kd-tree k-nearest-neighbor search)
//! - **Outlier filters** weight or reject associations (max/min/median/
//!   trimmed distance)
//! - **Error minimizers** estimate the incremental rigid transform
//!   (point-to-point SVD, point-to-plane least squares)
//! - **Convergence checks** stop or abort the loop (iteration counter,
//!   transform deltas, divergence bounds)
//! - **Inspectors** observe each iteration without affecting it
//!
//! The whole pipeline is generic over the scalar (`f32` or `f64`) and
//! handles 2D and 3D clouds through one code path.
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with zero engine dependencies.
//!
//! # Quick Start
//!
//! ```
//! use cloud_registration::{icp, Strategy};
//! use cloud_types::{PointCloud, RigidTransform};
//! use nalgebra::Point2;
//!
//! // The reference cloud, and a reading shifted by (0.1, 0.0).
//! let reference = PointCloud::from_planar_points(&[
//!     Point2::new(0.0, 0.0),
//!     Point2::new(1.0, 0.0),
//!     Point2::new(0.0, 1.0),
//!     Point2::new(1.0, 1.0),
//! ]);
//! let reading = PointCloud::from_planar_points(&[
//!     Point2::new(0.1, 0.0),
//!     Point2::new(1.1, 0.0),
//!     Point2::new(0.1, 1.0),
//!     Point2::new(1.1, 1.0),
//! ]);
//!
//! let mut strategy = Strategy::<f64>::point_to_point();
//! let transform = icp(
//!     &RigidTransform::identity(2),
//!     &reading,
//!     &reference,
//!     &mut strategy,
//! )
//! .unwrap();
//!
//! // The recovered transform moves the reading back onto the reference.
//! assert!((transform.translation()[0] + 0.1).abs() < 1e-6);
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod checker;
mod error;
mod filter;
mod icp;
mod index;
mod inspector;
mod matcher;
mod matches;
mod minimizer;
mod outlier;
mod strategy;
mod transformation;

pub use checker::{
    BoundCheck, ConvergenceCheck, ConvergenceChecks, CounterCheck, DeltaTransformCheck,
};
pub use error::{RegistrationError, RegistrationResult};
pub use filter::{
    CloudFilter, CloudFilters, FixstepSamplingFilter, IdentityFilter, OrientNormalsFilter,
    RandomSamplingFilter, SamplingSurfaceNormalFilter, SurfaceNormalFilter,
};
pub use icp::icp;
pub use index::FeatureIndex;
pub use inspector::{Inspector, IterationSnapshot, NullInspector, VtkFileInspector};
pub use matcher::{KdTreeMatcher, Matcher, NullMatcher};
pub use matches::{Matches, OutlierWeights};
pub use minimizer::{
    ErrorMinimizer, IdentityMinimizer, MatchedPairs, PointToPlaneMinimizer,
    PointToPointMinimizer, UsageRatios,
};
pub use outlier::{
    MaxDistOutlierFilter, MedianDistOutlierFilter, MinDistOutlierFilter, NullOutlierFilter,
    OutlierFilter, OutlierFilters, TrimmedDistOutlierFilter,
};
pub use strategy::Strategy;
pub use transformation::{
    TransformDescriptors, TransformFeatures, Transformation, Transformations,
};
