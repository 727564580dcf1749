//! Rigid transformation as a homogeneous matrix.

use nalgebra::{DMatrix, DVector, Matrix3, Rotation3, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{CloudError, CloudResult};
use crate::scalar::{real, Real};

/// A rigid transformation stored as a (D+1)x(D+1) homogeneous matrix.
///
/// The rotation sub-block is orthonormal with determinant +1 and the
/// bottom row is `[0 .. 0 1]`. The dimension D is 2 or 3 and is carried
/// at runtime so that planar and spatial registration share one code
/// path.
///
/// # Example
///
/// ```
/// use cloud_types::RigidTransform;
/// use nalgebra::DVector;
///
/// let t = RigidTransform::<f64>::identity(2);
/// assert_eq!(t.dim(), 2);
/// assert_eq!(t.translation(), DVector::zeros(2));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidTransform<T: Real> {
    matrix: DMatrix<T>,
}

impl<T: Real> RigidTransform<T> {
    /// The identity transform for points of dimension `dim` (2 or 3).
    #[must_use]
    pub fn identity(dim: usize) -> Self {
        debug_assert!(dim == 2 || dim == 3, "point dimension must be 2 or 3");
        Self {
            matrix: DMatrix::identity(dim + 1, dim + 1),
        }
    }

    /// Wraps a homogeneous matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix is not square of size 3 or 4, or if
    /// its bottom row deviates from `[0 .. 0 1]`.
    pub fn from_matrix(matrix: DMatrix<T>) -> CloudResult<Self> {
        if matrix.nrows() != matrix.ncols() {
            return Err(CloudError::NotHomogeneous {
                rows: matrix.nrows(),
                cols: matrix.ncols(),
            });
        }
        let size = matrix.nrows();
        if size != 3 && size != 4 {
            return Err(CloudError::UnsupportedDimension {
                dim: size.saturating_sub(1),
            });
        }
        let tol = real::<T>(1.0e-6);
        for j in 0..size {
            let expected = if j == size - 1 { T::one() } else { T::zero() };
            if (matrix[(size - 1, j)] - expected).abs() > tol {
                return Err(CloudError::NotHomogeneous {
                    rows: size,
                    cols: size,
                });
            }
        }
        Ok(Self { matrix })
    }

    /// Assembles a transform from a rotation block and a translation vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the rotation is not square, the translation
    /// length differs from the rotation size, or the dimension is not 2
    /// or 3.
    pub fn from_parts(rotation: &DMatrix<T>, translation: &DVector<T>) -> CloudResult<Self> {
        let dim = rotation.nrows();
        if rotation.ncols() != dim || translation.len() != dim {
            return Err(CloudError::NotHomogeneous {
                rows: rotation.nrows(),
                cols: rotation.ncols().max(translation.len()),
            });
        }
        if dim != 2 && dim != 3 {
            return Err(CloudError::UnsupportedDimension { dim });
        }
        let mut matrix = DMatrix::identity(dim + 1, dim + 1);
        for i in 0..dim {
            for j in 0..dim {
                matrix[(i, j)] = rotation[(i, j)];
            }
            matrix[(i, dim)] = translation[i];
        }
        Ok(Self { matrix })
    }

    /// Geometric dimension of the points this transform moves.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.matrix.nrows() - 1
    }

    /// The homogeneous matrix.
    #[must_use]
    pub fn matrix(&self) -> &DMatrix<T> {
        &self.matrix
    }

    /// Consumes the transform, returning the homogeneous matrix.
    #[must_use]
    pub fn into_matrix(self) -> DMatrix<T> {
        self.matrix
    }

    /// The DxD rotation sub-block.
    #[must_use]
    pub fn rotation(&self) -> DMatrix<T> {
        let d = self.dim();
        self.matrix.view((0, 0), (d, d)).clone_owned()
    }

    /// The translation column.
    #[must_use]
    pub fn translation(&self) -> DVector<T> {
        let d = self.dim();
        DVector::from_fn(d, |i, _| self.matrix[(i, d)])
    }

    /// Composes this transform with another (`self * other`): the result
    /// applies `other` first, then `self`.
    ///
    /// # Panics
    ///
    /// Panics if the two transforms have different dimensions.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            matrix: &self.matrix * &other.matrix,
        }
    }

    /// The inverse transform.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let d = self.dim();
        let mut matrix = DMatrix::identity(d + 1, d + 1);
        for i in 0..d {
            for j in 0..d {
                matrix[(i, j)] = self.matrix[(j, i)];
            }
        }
        for i in 0..d {
            let mut acc = T::zero();
            for k in 0..d {
                acc += self.matrix[(k, i)] * self.matrix[(k, d)];
            }
            matrix[(i, d)] = -acc;
        }
        Self { matrix }
    }

    /// The rotation as a unit quaternion.
    ///
    /// Planar rotations embed as quaternions about the z axis, so angular
    /// comparisons work uniformly across dimensions.
    #[must_use]
    pub fn rotation_quaternion(&self) -> UnitQuaternion<T> {
        if self.dim() == 2 {
            let angle = self.matrix[(1, 0)].atan2(self.matrix[(0, 0)]);
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle)
        } else {
            let block = Matrix3::from_fn(|i, j| self.matrix[(i, j)]);
            UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(block))
        }
    }

    /// Returns true when the rotation block is orthonormal with
    /// determinant +1 within `eps`.
    #[must_use]
    pub fn is_rigid(&self, eps: T) -> bool {
        let d = self.dim();
        let rotation = self.rotation();
        let gram = rotation.transpose() * &rotation;
        let ortho_err = (gram - DMatrix::identity(d, d)).norm();
        let det_err = (rotation.determinant() - T::one()).abs();
        ortho_err <= eps && det_err <= eps
    }
}
