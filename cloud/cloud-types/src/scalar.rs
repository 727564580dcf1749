//! Scalar parameterization of the registration stack.

use nalgebra::RealField;
use simba::scalar::SupersetOf;

/// Floating-point scalar the whole registration stack is generic over.
///
/// Implemented for `f32` and `f64`. Every stage uses a single precision
/// end to end; nothing mixes scalars internally.
pub trait Real: RealField + SupersetOf<f64> + Copy + Send + Sync {}

impl Real for f32 {}
impl Real for f64 {}

/// Converts an `f64` constant into the working scalar.
#[inline]
#[must_use]
pub fn real<T: Real>(value: f64) -> T {
    nalgebra::convert(value)
}
