//! Nearest-neighbor index over the feature columns of a cloud.

use cloud_types::{PointCloud, Real};
use kiddo::float::kdtree::Axis;
use kiddo::{KdTree, SquaredEuclidean};

use crate::error::{RegistrationError, RegistrationResult};

/// A kd-tree over the non-homogeneous feature rows of a point cloud.
///
/// The geometric dimension is fixed at build time (2 or 3); queries
/// return squared Euclidean distances together with the column index of
/// the neighbor in the indexed cloud.
pub struct FeatureIndex<T: Real + Axis> {
    tree: IndexTree<T>,
    len: usize,
}

enum IndexTree<T: Axis> {
    Planar(KdTree<T, 2>),
    Spatial(KdTree<T, 3>),
}

impl<T: Real + Axis> std::fmt::Debug for FeatureIndex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureIndex")
            .field("dim", &self.dim())
            .field("len", &self.len)
            .finish()
    }
}

impl<T: Real + Axis> FeatureIndex<T> {
    /// Builds an index over the cloud's feature columns.
    ///
    /// # Errors
    ///
    /// Returns an error if the cloud's point dimension is not 2 or 3.
    pub fn build(cloud: &PointCloud<T>) -> RegistrationResult<Self> {
        let features = cloud.features();
        let n = cloud.point_count();
        let tree = match cloud.point_dim() {
            2 => {
                let mut tree: KdTree<T, 2> = KdTree::new();
                for i in 0..n {
                    #[allow(clippy::cast_possible_truncation)]
                    tree.add(&[features[(0, i)], features[(1, i)]], i as u64);
                }
                IndexTree::Planar(tree)
            }
            3 => {
                let mut tree: KdTree<T, 3> = KdTree::new();
                for i in 0..n {
                    #[allow(clippy::cast_possible_truncation)]
                    tree.add(
                        &[features[(0, i)], features[(1, i)], features[(2, i)]],
                        i as u64,
                    );
                }
                IndexTree::Spatial(tree)
            }
            dim => {
                return Err(RegistrationError::Cloud(
                    cloud_types::CloudError::UnsupportedDimension { dim },
                ))
            }
        };
        Ok(Self { tree, len: n })
    }

    /// Geometric dimension of the indexed points.
    #[must_use]
    pub fn dim(&self) -> usize {
        match self.tree {
            IndexTree::Planar(_) => 2,
            IndexTree::Spatial(_) => 3,
        }
    }

    /// Number of indexed points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when the index holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The `k` nearest neighbors of `query`, nearest first, as
    /// `(squared distance, column index)` pairs. At most `len()` results.
    ///
    /// `query` must hold `dim()` coordinates.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn nearest(&self, query: &[T], k: usize) -> Vec<(T, usize)> {
        match &self.tree {
            IndexTree::Planar(tree) => tree
                .nearest_n::<SquaredEuclidean>(&[query[0], query[1]], k)
                .into_iter()
                .map(|n| (n.distance, n.item as usize))
                .collect(),
            IndexTree::Spatial(tree) => tree
                .nearest_n::<SquaredEuclidean>(&[query[0], query[1], query[2]], k)
                .into_iter()
                .map(|n| (n.distance, n.item as usize))
                .collect(),
        }
    }

    /// An approximate nearest neighbor of `query`, or `None` on an empty
    /// index. Trades exactness for traversal speed.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn approx_nearest(&self, query: &[T]) -> Option<(T, usize)> {
        if self.is_empty() {
            return None;
        }
        let found = match &self.tree {
            IndexTree::Planar(tree) => {
                tree.nearest_one::<SquaredEuclidean>(&[query[0], query[1]])
            }
            IndexTree::Spatial(tree) => {
                tree.nearest_one::<SquaredEuclidean>(&[query[0], query[1], query[2]])
            }
        };
        Some((found.distance, found.item as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    fn square() -> PointCloud<f64> {
        PointCloud::from_planar_points(&[
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 1.0),
            Point2::new(1.0, 1.0),
        ])
    }

    #[test]
    fn test_nearest_single() {
        let index = FeatureIndex::build(&square()).unwrap();
        let found = index.nearest(&[0.9, 0.9], 1);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1, 3);
        assert_relative_eq!(found[0].0, 0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_nearest_orders_by_distance() {
        let index = FeatureIndex::build(&square()).unwrap();
        let found = index.nearest(&[0.1, 0.0], 3);
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].1, 0);
        assert!(found[0].0 <= found[1].0);
        assert!(found[1].0 <= found[2].0);
    }

    #[test]
    fn test_rejects_unsupported_dimension() {
        let features = nalgebra::DMatrix::<f64>::zeros(6, 2);
        let labels = cloud_types::Labels::from(vec![
            cloud_types::Label::new("abcde", 5),
            cloud_types::Label::new("pad", 1),
        ]);
        let cloud = PointCloud::new(features, labels).unwrap();
        assert!(FeatureIndex::build(&cloud).is_err());
    }
}
