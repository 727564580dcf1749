//! Association of reading points with reference points.

use cloud_types::{PointCloud, Real};
use kiddo::float::kdtree::Axis;
use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::error::{RegistrationError, RegistrationResult};
use crate::index::FeatureIndex;
use crate::matches::Matches;

/// Associates each reading point with reference points.
///
/// `init` is called once per registration run, before the loop, with the
/// filtered clouds; `find_closest` is called every iteration with the
/// current reading.
pub trait Matcher<T: Real> {
    /// Builds internal indices from the cloud that will be queried.
    fn init(
        &mut self,
        reading: &PointCloud<T>,
        reference: &PointCloud<T>,
    ) -> RegistrationResult<()>;

    /// Finds the nearest reference columns for every reading column.
    fn find_closest(
        &self,
        reading: &PointCloud<T>,
        reference: &PointCloud<T>,
    ) -> RegistrationResult<Matches<T>>;
}

/// A stub matcher producing empty match sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMatcher;

impl<T: Real> Matcher<T> for NullMatcher {
    fn init(
        &mut self,
        _reading: &PointCloud<T>,
        _reference: &PointCloud<T>,
    ) -> RegistrationResult<()> {
        Ok(())
    }

    fn find_closest(
        &self,
        _reading: &PointCloud<T>,
        _reference: &PointCloud<T>,
    ) -> RegistrationResult<Matches<T>> {
        Ok(Matches::empty())
    }
}

/// Kd-tree matcher over the reference features.
///
/// Distances are squared Euclidean over the non-homogeneous feature
/// rows. The index is rebuilt on every `init`. With `epsilon > 0` and
/// `knn == 1` the lookup uses the index's approximate traversal; other
/// configurations are exact (the kd-tree backend exposes no
/// epsilon-bounded k-NN query).
#[derive(Debug)]
pub struct KdTreeMatcher<T: Real + Axis> {
    knn: usize,
    epsilon: f64,
    index: Option<FeatureIndex<T>>,
}

impl<T: Real + Axis> KdTreeMatcher<T> {
    /// Creates a matcher returning `knn` neighbors per reading point.
    #[must_use]
    pub fn new(knn: usize, epsilon: f64) -> Self {
        Self {
            knn: knn.max(1),
            epsilon,
            index: None,
        }
    }

    /// Number of neighbors returned per reading point.
    #[must_use]
    pub fn knn(&self) -> usize {
        self.knn
    }
}

impl<T: Real + Axis> Default for KdTreeMatcher<T> {
    fn default() -> Self {
        Self::new(1, 0.0)
    }
}

impl<T: Real + Axis> Matcher<T> for KdTreeMatcher<T> {
    fn init(
        &mut self,
        _reading: &PointCloud<T>,
        reference: &PointCloud<T>,
    ) -> RegistrationResult<()> {
        self.index = Some(FeatureIndex::build(reference)?);
        Ok(())
    }

    fn find_closest(
        &self,
        reading: &PointCloud<T>,
        _reference: &PointCloud<T>,
    ) -> RegistrationResult<Matches<T>> {
        let index = self.index.as_ref().ok_or_else(|| {
            RegistrationError::InvalidParameter(
                "KdTreeMatcher::find_closest called before init".to_string(),
            )
        })?;
        let dim = reading.point_dim();
        if dim != index.dim() {
            return Err(RegistrationError::ShapeMismatch {
                context: "reading point dimension",
                expected: index.dim(),
                actual: dim,
            });
        }

        let n = reading.point_count();
        let features = reading.features();
        let approximate = self.epsilon > 0.0 && self.knn == 1;
        let per_point: Vec<Vec<(T, usize)>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let query: Vec<T> = (0..dim).map(|r| features[(r, i)]).collect();
                if approximate {
                    index.approx_nearest(&query).into_iter().collect()
                } else {
                    index.nearest(&query, self.knn)
                }
            })
            .collect();

        let invalid = Matches::<T>::invalid_distance();
        let mut dists = DMatrix::from_element(self.knn, n, invalid);
        let mut ids = DMatrix::zeros(self.knn, n);
        for (i, found) in per_point.iter().enumerate() {
            for (k, &(dist, id)) in found.iter().enumerate() {
                dists[(k, i)] = dist;
                ids[(k, i)] = id;
            }
        }
        Matches::new(dists, ids)
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
    fn test_null_matcher_is_empty() {
        let mut matcher = NullMatcher;
        let cloud = square();
        Matcher::<f64>::init(&mut matcher, &cloud, &cloud).unwrap();
        let matches = matcher.find_closest(&cloud, &cloud).unwrap();
        assert_eq!(matches.point_count(), 0);
    }

    #[test]
    fn test_find_closest_before_init_fails() {
        let matcher = KdTreeMatcher::<f64>::default();
        let cloud = square();
        assert!(matches!(
            matcher.find_closest(&cloud, &cloud),
            Err(RegistrationError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_self_matching_is_exact() {
        let cloud = square();
        let mut matcher = KdTreeMatcher::default();
        matcher.init(&cloud, &cloud).unwrap();
        let matches = matcher.find_closest(&cloud, &cloud).unwrap();
        assert_eq!(matches.knn(), 1);
        assert_eq!(matches.point_count(), 4);
        for i in 0..4 {
            assert_eq!(matches.ids[(0, i)], i);
            assert_relative_eq!(matches.dists[(0, i)], 0.0);
        }
    }

    #[test]
    fn test_knn_pads_missing_neighbors() {
        let cloud = PointCloud::from_planar_points(&[Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)]);
        let mut matcher = KdTreeMatcher::new(3, 0.0);
        matcher.init(&cloud, &cloud).unwrap();
        let matches = matcher.find_closest(&cloud, &cloud).unwrap();
        assert_eq!(matches.knn(), 3);
        assert!(matches.is_valid(0, 0));
        assert!(matches.is_valid(1, 0));
        assert!(!matches.is_valid(2, 0));
    }

    #[test]
    fn test_index_rebuilt_on_init() {
        let reference_a = square();
        let reference_b = PointCloud::from_planar_points(&[Point2::new(10.0, 10.0)]);
        let reading = PointCloud::from_planar_points(&[Point2::new(10.0, 10.0)]);

        let mut matcher = KdTreeMatcher::default();
        matcher.init(&reading, &reference_a).unwrap();
        let far = matcher.find_closest(&reading, &reference_a).unwrap();
        assert!(far.dists[(0, 0)] > 100.0);

        matcher.init(&reading, &reference_b).unwrap();
        let near = matcher.find_closest(&reading, &reference_b).unwrap();
        assert_relative_eq!(near.dists[(0, 0)], 0.0);
    }
}
