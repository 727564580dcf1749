//! Surface-normal estimation and orientation filters.
//!
//! Normals are estimated by PCA over local neighborhoods: the normal is
//! the eigenvector of the neighborhood scatter matrix with the smallest
//! eigenvalue. The sign is unspecified; run [`OrientNormalsFilter`]
//! afterwards when a consistent orientation matters.

use cloud_types::{real, Label, PointCloud, Real};
use kiddo::float::kdtree::Axis;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rayon::prelude::*;

use super::CloudFilter;
use crate::error::{RegistrationError, RegistrationResult};
use crate::index::FeatureIndex;

/// PCA statistics of one local surface patch.
struct LocalSurface<T: Real> {
    normal: DVector<T>,
    density: T,
    eigen_values: DVector<T>,
    eigen_vectors: DMatrix<T>,
    matched: Vec<usize>,
}

/// Computes centroid-free scatter PCA over the given feature columns.
///
/// Returns eigenvalues ascending and eigenvectors in matching column
/// order; the first column is the normal direction.
fn surface_stats<T: Real>(
    features: &DMatrix<T>,
    dim: usize,
    columns: &[usize],
) -> (DVector<T>, DVector<T>, DMatrix<T>) {
    let count = real::<T>(columns.len() as f64);
    let mut centroid = DVector::zeros(dim);
    for &c in columns {
        for r in 0..dim {
            centroid[r] += features[(r, c)];
        }
    }
    centroid /= count;

    let mut scatter = DMatrix::zeros(dim, dim);
    for &c in columns {
        let diff = DVector::from_fn(dim, |r, _| features[(r, c)] - centroid[r]);
        scatter += &diff * diff.transpose();
    }

    let eigen = SymmetricEigen::new(scatter);
    let mut order: Vec<usize> = (0..dim).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[a]
            .partial_cmp(&eigen.eigenvalues[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let eigen_values = DVector::from_fn(dim, |r, _| eigen.eigenvalues[order[r]]);
    let eigen_vectors =
        DMatrix::from_fn(dim, dim, |r, c| eigen.eigenvectors[(r, order[c])]);
    (centroid, eigen_values, eigen_vectors)
}

/// Unit normal from sorted eigenvectors, with a degenerate-patch guard.
fn unit_normal<T: Real>(eigen_vectors: &DMatrix<T>, dim: usize) -> DVector<T> {
    let normal = eigen_vectors.column(0).clone_owned();
    let norm = normal.norm();
    if norm > real(1.0e-10) {
        normal / norm
    } else {
        DVector::from_fn(dim, |r, _| if r == dim - 1 { T::one() } else { T::zero() })
    }
}

/// Points per volume of the local ball reaching the farthest neighbor.
fn local_density<T: Real>(count: usize, radius_sq: T, dim: usize) -> T {
    let radius = radius_sq.sqrt();
    let pi = real::<T>(std::f64::consts::PI);
    let volume = if dim == 2 {
        pi * radius * radius
    } else {
        real::<T>(4.0 / 3.0) * pi * radius * radius * radius
    };
    if volume > T::zero() {
        real::<T>(count as f64) / volume
    } else {
        T::zero()
    }
}

fn local_surface<T: Real>(
    features: &DMatrix<T>,
    dim: usize,
    neighbors: &[(T, usize)],
) -> LocalSurface<T> {
    let columns: Vec<usize> = neighbors.iter().map(|&(_, id)| id).collect();
    let (_, eigen_values, eigen_vectors) = surface_stats(features, dim, &columns);
    let normal = unit_normal(&eigen_vectors, dim);

    let mut radius_sq = T::zero();
    for &(dist, _) in neighbors {
        if dist > radius_sq {
            radius_sq = dist;
        }
    }
    let density = local_density(columns.len(), radius_sq, dim);

    LocalSurface {
        normal,
        density,
        eigen_values,
        eigen_vectors,
        matched: columns,
    }
}

/// Estimates per-point surface descriptors from k nearest neighbors.
///
/// Appends descriptor blocks according to the `keep_*` flags: `normals`
/// (D rows), `densities` (1 row), `eigValues` (D rows, ascending),
/// `eigVectors` (DxD rows, column-major), `matchedIds` (knn rows). The
/// input points themselves are unchanged.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceNormalFilter {
    knn: usize,
    epsilon: f64,
    keep_normals: bool,
    keep_densities: bool,
    keep_eigen_values: bool,
    keep_eigen_vectors: bool,
    keep_matched_ids: bool,
}

impl SurfaceNormalFilter {
    /// Creates a filter using `knn` neighbors with approximation
    /// tolerance `epsilon` (0 = exact). Only normals are kept by default.
    #[must_use]
    pub fn new(knn: usize, epsilon: f64) -> Self {
        Self {
            knn: knn.max(1),
            epsilon,
            keep_normals: true,
            keep_densities: false,
            keep_eigen_values: false,
            keep_eigen_vectors: false,
            keep_matched_ids: false,
        }
    }

    /// Sets whether unit normals are appended.
    #[must_use]
    pub const fn with_normals(mut self, keep: bool) -> Self {
        self.keep_normals = keep;
        self
    }

    /// Sets whether local densities are appended.
    #[must_use]
    pub const fn with_densities(mut self, keep: bool) -> Self {
        self.keep_densities = keep;
        self
    }

    /// Sets whether eigenvalues are appended.
    #[must_use]
    pub const fn with_eigen_values(mut self, keep: bool) -> Self {
        self.keep_eigen_values = keep;
        self
    }

    /// Sets whether eigenvectors are appended.
    #[must_use]
    pub const fn with_eigen_vectors(mut self, keep: bool) -> Self {
        self.keep_eigen_vectors = keep;
        self
    }

    /// Sets whether matched neighbor ids are appended.
    #[must_use]
    pub const fn with_matched_ids(mut self, keep: bool) -> Self {
        self.keep_matched_ids = keep;
        self
    }
}

impl Default for SurfaceNormalFilter {
    fn default() -> Self {
        Self::new(5, 0.0)
    }
}

impl<T: Real + Axis> CloudFilter<T> for SurfaceNormalFilter {
    fn pre_filter(&self, input: PointCloud<T>) -> RegistrationResult<(PointCloud<T>, bool)> {
        let n = input.point_count();
        if n == 0 {
            return Ok((input, true));
        }
        let dim = input.point_dim();
        let knn = self.knn.min(n);
        let index = FeatureIndex::build(&input)?;
        let features = input.features();
        let approximate = self.epsilon > 0.0 && knn == 1;

        let surfaces: Vec<LocalSurface<T>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let query: Vec<T> = (0..dim).map(|r| features[(r, i)]).collect();
                let neighbors = if approximate {
                    index.approx_nearest(&query).into_iter().collect()
                } else {
                    index.nearest(&query, knn)
                };
                local_surface(features, dim, &neighbors)
            })
            .collect();

        let mut output = input;
        if self.keep_normals {
            let block = DMatrix::from_fn(dim, n, |r, c| surfaces[c].normal[r]);
            output.append_descriptors(Label::new("normals", dim), block)?;
        }
        if self.keep_densities {
            let block = DMatrix::from_fn(1, n, |_, c| surfaces[c].density);
            output.append_descriptors(Label::new("densities", 1), block)?;
        }
        if self.keep_eigen_values {
            let block = DMatrix::from_fn(dim, n, |r, c| surfaces[c].eigen_values[r]);
            output.append_descriptors(Label::new("eigValues", dim), block)?;
        }
        if self.keep_eigen_vectors {
            let block = DMatrix::from_fn(dim * dim, n, |r, c| {
                surfaces[c].eigen_vectors[(r % dim, r / dim)]
            });
            output.append_descriptors(Label::new("eigVectors", dim * dim), block)?;
        }
        if self.keep_matched_ids {
            let block = DMatrix::from_fn(knn, n, |r, c| {
                surfaces[c]
                    .matched
                    .get(r)
                    .map_or_else(T::zero, |&id| real(id as f64))
            });
            output.append_descriptors(Label::new("matchedIds", knn), block)?;
        }
        Ok((output, true))
    }
}

/// Reduces the cloud to one point per spatial cell, with surface
/// descriptors estimated from each whole cell.
///
/// The point set is split recursively along the axis of maximum extent
/// at the median until every cell holds at most `k` points; each cell
/// fuses into its centroid. Existing descriptors are either averaged
/// over the cell or taken from its first point.
#[derive(Debug, Clone, Copy)]
pub struct SamplingSurfaceNormalFilter {
    k: usize,
    average_existing_descriptors: bool,
    keep_normals: bool,
    keep_densities: bool,
    keep_eigen_values: bool,
    keep_eigen_vectors: bool,
}

impl SamplingSurfaceNormalFilter {
    /// Creates a filter with cell capacity `k`. Only normals are kept by
    /// default; existing descriptors are averaged.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self {
            k,
            average_existing_descriptors: true,
            keep_normals: true,
            keep_densities: false,
            keep_eigen_values: false,
            keep_eigen_vectors: false,
        }
    }

    /// Sets whether existing descriptors are averaged over the cell
    /// (true) or copied from the cell's first point (false).
    #[must_use]
    pub const fn with_average_existing_descriptors(mut self, average: bool) -> Self {
        self.average_existing_descriptors = average;
        self
    }

    /// Sets whether unit normals are appended.
    #[must_use]
    pub const fn with_normals(mut self, keep: bool) -> Self {
        self.keep_normals = keep;
        self
    }

    /// Sets whether cell densities are appended.
    #[must_use]
    pub const fn with_densities(mut self, keep: bool) -> Self {
        self.keep_densities = keep;
        self
    }

    /// Sets whether eigenvalues are appended.
    #[must_use]
    pub const fn with_eigen_values(mut self, keep: bool) -> Self {
        self.keep_eigen_values = keep;
        self
    }

    /// Sets whether eigenvectors are appended.
    #[must_use]
    pub const fn with_eigen_vectors(mut self, keep: bool) -> Self {
        self.keep_eigen_vectors = keep;
        self
    }
}

/// Splits `indices` recursively at the median of the widest axis until
/// every cell holds at most `capacity` points.
fn split_cells<T: Real>(
    features: &DMatrix<T>,
    dim: usize,
    indices: &mut [usize],
    capacity: usize,
    cells: &mut Vec<Vec<usize>>,
) {
    if indices.len() <= capacity {
        if !indices.is_empty() {
            cells.push(indices.to_vec());
        }
        return;
    }

    let mut cut_dim = 0;
    let mut widest = real::<T>(-1.0);
    for r in 0..dim {
        let mut lo = features[(r, indices[0])];
        let mut hi = lo;
        for &i in indices.iter() {
            let v = features[(r, i)];
            if v < lo {
                lo = v;
            }
            if v > hi {
                hi = v;
            }
        }
        let extent = hi - lo;
        if extent > widest {
            widest = extent;
            cut_dim = r;
        }
    }

    let mid = indices.len() / 2;
    indices.select_nth_unstable_by(mid, |a, b| {
        features[(cut_dim, *a)]
            .partial_cmp(&features[(cut_dim, *b)])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let (left, right) = indices.split_at_mut(mid);
    split_cells(features, dim, left, capacity, cells);
    split_cells(features, dim, right, capacity, cells);
}

/// Points per volume of the cell's bounding box.
fn cell_density<T: Real>(features: &DMatrix<T>, dim: usize, cell: &[usize]) -> T {
    let mut volume = T::one();
    for r in 0..dim {
        let mut lo = features[(r, cell[0])];
        let mut hi = lo;
        for &i in cell {
            let v = features[(r, i)];
            if v < lo {
                lo = v;
            }
            if v > hi {
                hi = v;
            }
        }
        volume *= hi - lo;
    }
    if volume > T::zero() {
        real::<T>(cell.len() as f64) / volume
    } else {
        T::zero()
    }
}

impl<T: Real> CloudFilter<T> for SamplingSurfaceNormalFilter {
    fn pre_filter(&self, input: PointCloud<T>) -> RegistrationResult<(PointCloud<T>, bool)> {
        if self.k < 2 {
            return Err(RegistrationError::InvalidParameter(
                "sampling surface normal cell capacity must be at least 2".to_string(),
            ));
        }
        let dim = input.point_dim();
        if dim != 2 && dim != 3 {
            return Err(RegistrationError::Cloud(
                cloud_types::CloudError::UnsupportedDimension { dim },
            ));
        }
        let n = input.point_count();
        if n == 0 {
            return Ok((input, true));
        }

        let features = input.features();
        let mut indices: Vec<usize> = (0..n).collect();
        let mut cells: Vec<Vec<usize>> = Vec::new();
        split_cells(features, dim, &mut indices, self.k, &mut cells);

        let out_count = cells.len();
        let mut out_features = DMatrix::from_element(dim + 1, out_count, T::one());
        let existing_rows = input.descriptors().nrows();
        let mut existing = DMatrix::zeros(existing_rows, out_count);
        let mut surfaces: Vec<LocalSurface<T>> = Vec::with_capacity(out_count);

        for (cell_idx, cell) in cells.iter().enumerate() {
            let (centroid, eigen_values, eigen_vectors) = surface_stats(features, dim, cell);
            for r in 0..dim {
                out_features[(r, cell_idx)] = centroid[r];
            }

            if existing_rows > 0 {
                if self.average_existing_descriptors {
                    let count = real::<T>(cell.len() as f64);
                    for r in 0..existing_rows {
                        let mut acc = T::zero();
                        for &i in cell {
                            acc += input.descriptors()[(r, i)];
                        }
                        existing[(r, cell_idx)] = acc / count;
                    }
                } else {
                    for r in 0..existing_rows {
                        existing[(r, cell_idx)] = input.descriptors()[(r, cell[0])];
                    }
                }
            }

            let normal = unit_normal(&eigen_vectors, dim);
            let density = cell_density(features, dim, cell);
            surfaces.push(LocalSurface {
                normal,
                density,
                eigen_values,
                eigen_vectors,
                matched: Vec::new(),
            });
        }

        let mut output = if existing_rows > 0 {
            PointCloud::with_descriptors(
                out_features,
                input.feature_labels().clone(),
                existing,
                input.descriptor_labels().clone(),
            )?
        } else {
            PointCloud::new(out_features, input.feature_labels().clone())?
        };

        if self.keep_normals {
            let block = DMatrix::from_fn(dim, out_count, |r, c| surfaces[c].normal[r]);
            output.append_descriptors(Label::new("normals", dim), block)?;
        }
        if self.keep_densities {
            let block = DMatrix::from_fn(1, out_count, |_, c| surfaces[c].density);
            output.append_descriptors(Label::new("densities", 1), block)?;
        }
        if self.keep_eigen_values {
            let block = DMatrix::from_fn(dim, out_count, |r, c| surfaces[c].eigen_values[r]);
            output.append_descriptors(Label::new("eigValues", dim), block)?;
        }
        if self.keep_eigen_vectors {
            let block = DMatrix::from_fn(dim * dim, out_count, |r, c| {
                surfaces[c].eigen_vectors[(r % dim, r / dim)]
            });
            output.append_descriptors(Label::new("eigVectors", dim * dim), block)?;
        }
        Ok((output, true))
    }
}

/// Flips normals so they point toward the observer, assumed at the
/// origin.
///
/// Leaves the cloud unchanged when it carries no `normals` descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrientNormalsFilter;

impl<T: Real> CloudFilter<T> for OrientNormalsFilter {
    fn pre_filter(&self, mut input: PointCloud<T>) -> RegistrationResult<(PointCloud<T>, bool)> {
        let dim = input.point_dim();
        let range = input.descriptor_labels().range_of("normals");
        let Some(range) = range else {
            return Ok((input, true));
        };
        if range.len() != dim {
            return Err(RegistrationError::ShapeMismatch {
                context: "normals descriptor rows",
                expected: dim,
                actual: range.len(),
            });
        }

        let offset = range.start;
        let flip: Vec<bool> = (0..input.point_count())
            .map(|i| {
                let mut dot = T::zero();
                for r in 0..dim {
                    dot += input.descriptors()[(offset + r, i)] * input.features()[(r, i)];
                }
                dot > T::zero()
            })
            .collect();

        if let Some(mut normals) = input.descriptor_mut("normals") {
            for (i, &flipped) in flip.iter().enumerate() {
                if flipped {
                    for r in 0..dim {
                        normals[(r, i)] = -normals[(r, i)];
                    }
                }
            }
        }
        Ok((input, true))
    }
}
