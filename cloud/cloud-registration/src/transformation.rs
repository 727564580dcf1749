//! Application of rigid transforms to clouds.

use cloud_types::{PointCloud, Real, RigidTransform};

use crate::error::{RegistrationError, RegistrationResult};

/// A stage that produces a transformed copy of a cloud.
///
/// The input is never mutated and the shape is preserved.
pub trait Transformation<T: Real> {
    /// Applies `transform` to `cloud`, returning the transformed cloud.
    fn compute(
        &self,
        cloud: &PointCloud<T>,
        transform: &RigidTransform<T>,
    ) -> RegistrationResult<PointCloud<T>>;
}

/// Moves the feature columns: rotation plus translation on the first D
/// rows, with the homogeneous row carrying the translation through a
/// single matrix product.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformFeatures;

impl<T: Real> Transformation<T> for TransformFeatures {
    fn compute(
        &self,
        cloud: &PointCloud<T>,
        transform: &RigidTransform<T>,
    ) -> RegistrationResult<PointCloud<T>> {
        if cloud.feature_dim() != transform.dim() + 1 {
            return Err(RegistrationError::ShapeMismatch {
                context: "feature rows vs transform size",
                expected: transform.dim() + 1,
                actual: cloud.feature_dim(),
            });
        }
        let features = transform.matrix() * cloud.features();
        Ok(cloud.with_features(features)?)
    }
}

/// Rotates direction-valued descriptors (`normals` and `eigVectors`).
///
/// Translation never applies to descriptors; other descriptor blocks
/// pass through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformDescriptors;

impl TransformDescriptors {
    const ROTATED: [&'static str; 2] = ["normals", "eigVectors"];
}

impl<T: Real> Transformation<T> for TransformDescriptors {
    fn compute(
        &self,
        cloud: &PointCloud<T>,
        transform: &RigidTransform<T>,
    ) -> RegistrationResult<PointCloud<T>> {
        let dim = transform.dim();
        if cloud.point_dim() != dim {
            return Err(RegistrationError::ShapeMismatch {
                context: "point dimension vs transform size",
                expected: dim,
                actual: cloud.point_dim(),
            });
        }
        let rotation = transform.rotation();
        let mut output = cloud.clone();
        for name in Self::ROTATED {
            let Some(range) = output.descriptor_labels().range_of(name) else {
                continue;
            };
            if range.len() % dim != 0 {
                return Err(RegistrationError::ShapeMismatch {
                    context: "rotatable descriptor rows",
                    expected: dim,
                    actual: range.len(),
                });
            }
            if let Some(mut block) = output.descriptor_mut(name) {
                // Row groups of D stack several vectors per point
                // (one for normals, D for eigenvectors).
                for group in 0..block.nrows() / dim {
                    for i in 0..block.ncols() {
                        let mut rotated = vec![T::zero(); dim];
                        for (r, slot) in rotated.iter_mut().enumerate() {
                            for c in 0..dim {
                                *slot += rotation[(r, c)] * block[(group * dim + c, i)];
                            }
                        }
                        for (r, value) in rotated.iter().enumerate() {
                            block[(group * dim + r, i)] = *value;
                        }
                    }
                }
            }
        }
        Ok(output)
    }
}

/// An ordered chain of transformations applied with the same transform.
#[derive(Default)]
pub struct Transformations<T: Real>(Vec<Box<dyn Transformation<T>>>);

impl<T: Real> Transformations<T> {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// The standard chain: features, then descriptors.
    #[must_use]
    pub fn standard() -> Self {
        Self(vec![
            Box::new(TransformFeatures),
            Box::new(TransformDescriptors),
        ])
    }

    /// Appends a transformation to the chain.
    pub fn push(&mut self, transformation: Box<dyn Transformation<T>>) {
        self.0.push(transformation);
    }

    /// Number of transformations in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when the chain holds no transformations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Applies every transformation in order, replacing the cloud via swap.
    ///
    /// # Errors
    ///
    /// Propagates the first stage error.
    pub fn apply(
        &self,
        cloud: &mut PointCloud<T>,
        transform: &RigidTransform<T>,
    ) -> RegistrationResult<()> {
        for transformation in &self.0 {
            let mut next = transformation.compute(cloud, transform)?;
            cloud.swap(&mut next);
        }
        Ok(())
    }
}

impl<T: Real> From<Vec<Box<dyn Transformation<T>>>> for Transformations<T> {
    fn from(transformations: Vec<Box<dyn Transformation<T>>>) -> Self {
        Self(transformations)
    }
}
