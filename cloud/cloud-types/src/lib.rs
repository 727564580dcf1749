//! Core data model for rigid point-cloud registration.
//!
//! This crate provides the types the registration pipeline exchanges:
//! - [`PointCloud`] - a column-major feature matrix plus optional
//!   descriptors, both annotated with named row ranges ([`Label`],
//!   [`Labels`])
//! - [`RigidTransform`] - a homogeneous rotation + translation matrix
//!   for 2D or 3D points
//! - [`Real`] - the scalar trait the whole stack is generic over
//!   (`f32` or `f64`)
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with zero engine dependencies.
//!
//! # Example
//!
//! ```
//! use cloud_types::{PointCloud, RigidTransform};
//! use nalgebra::Point2;
//!
//! let cloud = PointCloud::from_planar_points(&[
//!     Point2::new(0.0, 0.0),
//!     Point2::new(1.0, 0.0),
//! ]);
//!
//! let transform = RigidTransform::<f64>::identity(cloud.point_dim());
//! assert_eq!(transform.dim(), 2);
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod cloud;
mod error;
mod label;
mod scalar;
mod transform;

pub use cloud::PointCloud;
pub use error::{CloudError, CloudResult};
pub use label::{Label, Labels};
pub use scalar::{real, Real};
pub use transform::RigidTransform;
