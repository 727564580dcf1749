//! Labelled point-cloud container.

use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut, Point2, Point3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{CloudError, CloudResult};
use crate::label::{Label, Labels};
use crate::scalar::Real;

/// A labelled point cloud: a column-major feature matrix plus an optional
/// descriptor matrix, each annotated with named row ranges.
///
/// Columns are points. Features hold geometry in homogeneous form: a cloud
/// of dimension D stores a (D+1)xN matrix whose trailing row is the
/// homogeneous 1. Descriptors hold any per-point attribute (normals,
/// densities, eigen decompositions, ids) and share the column count with
/// the features, or are empty.
///
/// # Example
///
/// ```
/// use cloud_types::PointCloud;
/// use nalgebra::Point2;
///
/// let cloud = PointCloud::from_planar_points(&[
///     Point2::new(0.0, 0.0),
///     Point2::new(1.0, 0.0),
///     Point2::new(0.0, 1.0),
/// ]);
///
/// assert_eq!(cloud.point_count(), 3);
/// assert_eq!(cloud.point_dim(), 2);
/// assert!(cloud.descriptor("normals").is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointCloud<T: Real> {
    features: DMatrix<T>,
    feature_labels: Labels,
    descriptors: DMatrix<T>,
    descriptor_labels: Labels,
}

impl<T: Real> Default for PointCloud<T> {
    fn default() -> Self {
        Self {
            features: DMatrix::zeros(0, 0),
            feature_labels: Labels::new(),
            descriptors: DMatrix::zeros(0, 0),
            descriptor_labels: Labels::new(),
        }
    }
}

impl<T: Real> PointCloud<T> {
    /// Creates a cloud from a feature matrix and its labels.
    ///
    /// # Errors
    ///
    /// Returns an error if the label spans do not cover the feature rows.
    pub fn new(features: DMatrix<T>, feature_labels: Labels) -> CloudResult<Self> {
        Self::with_descriptors(features, feature_labels, DMatrix::zeros(0, 0), Labels::new())
    }

    /// Creates a cloud from feature and descriptor matrices with their labels.
    ///
    /// # Errors
    ///
    /// Returns an error if a label list does not cover its matrix rows, or
    /// if the descriptor matrix is non-empty with a column count different
    /// from the feature matrix.
    pub fn with_descriptors(
        features: DMatrix<T>,
        feature_labels: Labels,
        descriptors: DMatrix<T>,
        descriptor_labels: Labels,
    ) -> CloudResult<Self> {
        feature_labels.validate(features.nrows())?;
        if descriptors.nrows() == 0 && descriptors.ncols() == 0 {
            descriptor_labels.validate(0)?;
        } else {
            if descriptors.ncols() != features.ncols() {
                return Err(CloudError::ColumnMismatch {
                    features: features.ncols(),
                    descriptors: descriptors.ncols(),
                });
            }
            descriptor_labels.validate(descriptors.nrows())?;
        }
        Ok(Self {
            features,
            feature_labels,
            descriptors,
            descriptor_labels,
        })
    }

    /// Builds a 2D cloud from points, appending the homogeneous row.
    #[must_use]
    pub fn from_planar_points(points: &[Point2<T>]) -> Self {
        let features = DMatrix::from_fn(3, points.len(), |r, c| match r {
            0 => points[c].x,
            1 => points[c].y,
            _ => T::one(),
        });
        Self {
            features,
            feature_labels: Labels::from(vec![Label::new("xy", 2), Label::new("pad", 1)]),
            descriptors: DMatrix::zeros(0, 0),
            descriptor_labels: Labels::new(),
        }
    }

    /// Builds a 3D cloud from points, appending the homogeneous row.
    #[must_use]
    pub fn from_spatial_points(points: &[Point3<T>]) -> Self {
        let features = DMatrix::from_fn(4, points.len(), |r, c| match r {
            0 => points[c].x,
            1 => points[c].y,
            2 => points[c].z,
            _ => T::one(),
        });
        Self {
            features,
            feature_labels: Labels::from(vec![Label::new("xyz", 3), Label::new("pad", 1)]),
            descriptors: DMatrix::zeros(0, 0),
            descriptor_labels: Labels::new(),
        }
    }

    /// The feature matrix, one column per point.
    #[must_use]
    pub fn features(&self) -> &DMatrix<T> {
        &self.features
    }

    /// Labels describing the feature rows.
    #[must_use]
    pub fn feature_labels(&self) -> &Labels {
        &self.feature_labels
    }

    /// The descriptor matrix (0x0 when the cloud carries no descriptors).
    #[must_use]
    pub fn descriptors(&self) -> &DMatrix<T> {
        &self.descriptors
    }

    /// Labels describing the descriptor rows.
    #[must_use]
    pub fn descriptor_labels(&self) -> &Labels {
        &self.descriptor_labels
    }

    /// Number of points (columns).
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.features.ncols()
    }

    /// Returns true when the cloud holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.ncols() == 0
    }

    /// Number of feature rows, homogeneous row included.
    #[must_use]
    pub fn feature_dim(&self) -> usize {
        self.features.nrows()
    }

    /// Geometric dimension of the points (feature rows minus the
    /// homogeneous row).
    #[must_use]
    pub fn point_dim(&self) -> usize {
        self.features.nrows().saturating_sub(1)
    }

    /// Returns true when the cloud carries descriptor rows.
    #[must_use]
    pub fn has_descriptors(&self) -> bool {
        self.descriptors.nrows() > 0
    }

    /// The contiguous descriptor row block owned by `name`, or `None`
    /// when no descriptor label matches. Never fails.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<DMatrixView<'_, T>> {
        let range = self.descriptor_labels.range_of(name)?;
        Some(self.descriptors.rows_range(range))
    }

    /// Mutable view of the descriptor row block owned by `name`.
    #[must_use]
    pub fn descriptor_mut(&mut self, name: &str) -> Option<DMatrixViewMut<'_, T>> {
        let range = self.descriptor_labels.range_of(name)?;
        Some(self.descriptors.rows_range_mut(range))
    }

    /// Appends a labelled descriptor block below the existing descriptors.
    ///
    /// # Errors
    ///
    /// Returns an error if the label is malformed, the label span differs
    /// from the block's row count, or the block's column count differs
    /// from the cloud's point count.
    pub fn append_descriptors(&mut self, label: Label, rows: DMatrix<T>) -> CloudResult<()> {
        label.validate()?;
        if label.span != rows.nrows() {
            return Err(CloudError::LabelSpanMismatch {
                labelled: label.span,
                rows: rows.nrows(),
            });
        }
        if rows.ncols() != self.point_count() {
            return Err(CloudError::ColumnMismatch {
                features: self.point_count(),
                descriptors: rows.ncols(),
            });
        }
        let old_rows = self.descriptors.nrows();
        let stacked = DMatrix::from_fn(old_rows + rows.nrows(), self.point_count(), |r, c| {
            if r < old_rows {
                self.descriptors[(r, c)]
            } else {
                rows[(r - old_rows, c)]
            }
        });
        self.descriptors = stacked;
        self.descriptor_labels.push(label);
        Ok(())
    }

    /// Replaces the feature matrix, keeping labels and descriptors.
    ///
    /// # Errors
    ///
    /// Returns an error if the new matrix has a different shape.
    pub fn with_features(&self, features: DMatrix<T>) -> CloudResult<Self> {
        if features.nrows() != self.features.nrows() {
            return Err(CloudError::LabelSpanMismatch {
                labelled: self.feature_labels.total_span(),
                rows: features.nrows(),
            });
        }
        if features.ncols() != self.features.ncols() {
            return Err(CloudError::ColumnMismatch {
                features: features.ncols(),
                descriptors: self.descriptors.ncols(),
            });
        }
        Ok(Self {
            features,
            feature_labels: self.feature_labels.clone(),
            descriptors: self.descriptors.clone(),
            descriptor_labels: self.descriptor_labels.clone(),
        })
    }

    /// Gathers the given columns into a new cloud, features and
    /// descriptors in lockstep.
    #[must_use]
    pub fn select_columns(&self, indices: &[usize]) -> Self {
        let features = self.features.select_columns(indices);
        let descriptors = if self.has_descriptors() {
            self.descriptors.select_columns(indices)
        } else {
            DMatrix::zeros(0, 0)
        };
        Self {
            features,
            feature_labels: self.feature_labels.clone(),
            descriptors,
            descriptor_labels: if self.has_descriptors() {
                self.descriptor_labels.clone()
            } else {
                Labels::new()
            },
        }
    }

    /// Exchanges features, descriptors, and both label lists with `other`.
    ///
    /// Used to replace a cloud with its filtered successor without
    /// reallocating the surrounding structure.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.features, &mut other.features);
        std::mem::swap(&mut self.feature_labels, &mut other.feature_labels);
        std::mem::swap(&mut self.descriptors, &mut other.descriptors);
        std::mem::swap(&mut self.descriptor_labels, &mut other.descriptor_labels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cloud_with_normals() -> PointCloud<f64> {
        let mut cloud = PointCloud::from_planar_points(&[
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 1.0),
        ]);
        let normals = DMatrix::from_row_slice(2, 3, &[0.0, 0.0, 1.0, 1.0, 1.0, 0.0]);
        cloud
            .append_descriptors(Label::new("normals", 2), normals)
            .unwrap();
        cloud
    }

    #[test]
    fn test_from_planar_points_homogeneous_row() {
        let cloud = PointCloud::from_planar_points(&[Point2::new(2.0, 3.0)]);
        assert_eq!(cloud.feature_dim(), 3);
        assert_relative_eq!(cloud.features()[(0, 0)], 2.0);
        assert_relative_eq!(cloud.features()[(1, 0)], 3.0);
        assert_relative_eq!(cloud.features()[(2, 0)], 1.0);
    }

    #[test]
    fn test_descriptor_lookup() {
        let cloud = cloud_with_normals();
        let normals = cloud.descriptor("normals").unwrap();
        assert_eq!(normals.nrows(), 2);
        assert_eq!(normals.ncols(), 3);
        assert_relative_eq!(normals[(1, 0)], 1.0);
        assert!(cloud.descriptor("densities").is_none());
    }

    #[test]
    fn test_append_descriptors_column_mismatch() {
        let mut cloud = PointCloud::<f64>::from_planar_points(&[Point2::new(0.0, 0.0)]);
        let bad = DMatrix::zeros(2, 3);
        assert!(matches!(
            cloud.append_descriptors(Label::new("normals", 2), bad),
            Err(CloudError::ColumnMismatch { .. })
        ));
    }

    #[test]
    fn test_with_descriptors_validates_columns() {
        let features = DMatrix::<f64>::zeros(3, 4);
        let labels = Labels::from(vec![Label::new("xy", 2), Label::new("pad", 1)]);
        let descriptors = DMatrix::<f64>::zeros(2, 3);
        let dlabels = Labels::from(vec![Label::new("normals", 2)]);
        assert!(matches!(
            PointCloud::with_descriptors(features, labels, descriptors, dlabels),
            Err(CloudError::ColumnMismatch { .. })
        ));
    }

    #[test]
    fn test_select_columns_keeps_descriptors_in_lockstep() {
        let cloud = cloud_with_normals();
        let picked = cloud.select_columns(&[2, 0]);
        assert_eq!(picked.point_count(), 2);
        assert_relative_eq!(picked.features()[(1, 0)], 1.0);
        let normals = picked.descriptor("normals").unwrap();
        assert_relative_eq!(normals[(0, 0)], 1.0);
        assert_relative_eq!(normals[(0, 1)], 0.0);
    }

    #[test]
    fn test_swap() {
        let mut a = cloud_with_normals();
        let mut b = PointCloud::from_spatial_points(&[Point3::new(1.0, 2.0, 3.0)]);
        a.swap(&mut b);
        assert_eq!(a.point_dim(), 3);
        assert_eq!(b.point_dim(), 2);
        assert!(b.has_descriptors());
        assert!(!a.has_descriptors());
    }

    #[test]
    fn test_label_span_mismatch_rejected() {
        let features = DMatrix::<f64>::zeros(3, 2);
        let labels = Labels::from(vec![Label::new("xy", 2)]);
        assert!(matches!(
            PointCloud::new(features, labels),
            Err(CloudError::LabelSpanMismatch { .. })
        ));
    }
}
