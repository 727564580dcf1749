//! Observation hooks into the registration loop.
//!
//! Inspectors see each iteration's intermediate state but sit outside
//! the pipeline: their failures are logged and discarded, never
//! propagated.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use cloud_types::{PointCloud, Real, RigidTransform};
use tracing::warn;

use crate::checker::ConvergenceChecks;
use crate::matches::{Matches, OutlierWeights};

/// Everything an inspector may look at after one iteration.
pub struct IterationSnapshot<'a, T: Real> {
    /// Iteration number, starting at 1.
    pub iteration: usize,
    /// Accumulated transform after this iteration.
    pub transform: &'a RigidTransform<T>,
    /// The filtered reference cloud.
    pub reference: &'a PointCloud<T>,
    /// The current (transformed) reading cloud.
    pub reading: &'a PointCloud<T>,
    /// This iteration's matches.
    pub matches: &'a Matches<T>,
    /// Feature-side outlier weights.
    pub feature_weights: &'a OutlierWeights<T>,
    /// Descriptor-side outlier weights.
    pub descriptor_weights: &'a OutlierWeights<T>,
    /// The convergence checks with their current mirror state.
    pub checks: &'a ConvergenceChecks<T>,
}

/// An observation hook over the registration loop.
///
/// All methods default to no-ops.
pub trait Inspector<T: Real> {
    /// Called once before the loop starts.
    fn init(&mut self) {}

    /// Called once with the filtered reference cloud.
    fn dump_filtered_reference(&mut self, _reference: &PointCloud<T>) {}

    /// Called after every iteration.
    fn dump_iteration(&mut self, _snapshot: &IterationSnapshot<'_, T>) {}

    /// Called once after the loop ends.
    fn finish(&mut self, _iteration_count: usize) {}
}

/// The default inspector: observes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullInspector;

impl<T: Real> Inspector<T> for NullInspector {}

/// Writes legacy-ASCII VTK polydata files per iteration plus a CSV of
/// per-iteration check values.
///
/// Files are named `<base>-reference.vtk`, `<base>-reading-<i>.vtk` and
/// `<base>-iterationInfo.csv`. I/O errors are logged at `warn` level and
/// otherwise ignored; the inspector never affects the pipeline outcome.
#[derive(Debug)]
pub struct VtkFileInspector {
    base_name: PathBuf,
    value_names: Vec<String>,
    rows: Vec<(usize, Vec<f64>)>,
}

impl VtkFileInspector {
    /// Creates an inspector writing files with the given base path.
    #[must_use]
    pub fn new(base_name: impl Into<PathBuf>) -> Self {
        Self {
            base_name: base_name.into(),
            value_names: Vec::new(),
            rows: Vec::new(),
        }
    }

    fn path(&self, role: &str, iteration: Option<usize>) -> PathBuf {
        let base = self.base_name.display();
        match iteration {
            Some(i) => PathBuf::from(format!("{base}-{role}-{i}.vtk")),
            None => PathBuf::from(format!("{base}-{role}.vtk")),
        }
    }

    fn write_cloud<T: Real>(&self, cloud: &PointCloud<T>, path: &PathBuf) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let n = cloud.point_count();
        let dim = cloud.point_dim();

        writeln!(writer, "# vtk DataFile Version 3.0")?;
        writeln!(writer, "registration cloud dump")?;
        writeln!(writer, "ASCII")?;
        writeln!(writer, "DATASET POLYDATA")?;
        writeln!(writer, "POINTS {n} float")?;
        for i in 0..n {
            for r in 0..3 {
                if r > 0 {
                    write!(writer, " ")?;
                }
                if r < dim {
                    write!(writer, "{}", cloud.features()[(r, i)])?;
                } else {
                    write!(writer, "0")?;
                }
            }
            writeln!(writer)?;
        }
        writeln!(writer, "VERTICES {n} {}", n * 2)?;
        for i in 0..n {
            writeln!(writer, "1 {i}")?;
        }

        let has_normals = cloud.descriptor("normals").is_some();
        let has_densities = cloud.descriptor("densities").is_some();
        if has_normals || has_densities {
            writeln!(writer, "POINT_DATA {n}")?;
        }
        if let Some(normals) = cloud.descriptor("normals") {
            writeln!(writer, "NORMALS normals float")?;
            for i in 0..n {
                for r in 0..3 {
                    if r > 0 {
                        write!(writer, " ")?;
                    }
                    if r < normals.nrows() {
                        write!(writer, "{}", normals[(r, i)])?;
                    } else {
                        write!(writer, "0")?;
                    }
                }
                writeln!(writer)?;
            }
        }
        if let Some(densities) = cloud.descriptor("densities") {
            writeln!(writer, "SCALARS densities float 1")?;
            writeln!(writer, "LOOKUP_TABLE default")?;
            for i in 0..n {
                writeln!(writer, "{}", densities[(0, i)])?;
            }
        }
        writer.flush()
    }

    fn write_info_csv(&self) -> std::io::Result<()> {
        let base = self.base_name.display();
        let path = PathBuf::from(format!("{base}-iterationInfo.csv"));
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "iteration")?;
        for name in &self.value_names {
            write!(writer, ", {name}")?;
        }
        writeln!(writer)?;
        for (iteration, values) in &self.rows {
            write!(writer, "{iteration}")?;
            for value in values {
                write!(writer, ", {value}")?;
            }
            writeln!(writer)?;
        }
        writer.flush()
    }
}

impl<T: Real> Inspector<T> for VtkFileInspector {
    fn init(&mut self) {
        self.value_names.clear();
        self.rows.clear();
    }

    fn dump_filtered_reference(&mut self, reference: &PointCloud<T>) {
        let path = self.path("reference", None);
        if let Err(err) = self.write_cloud(reference, &path) {
            warn!(path = %path.display(), %err, "discarding reference dump failure");
        }
    }

    fn dump_iteration(&mut self, snapshot: &IterationSnapshot<'_, T>) {
        let path = self.path("reading", Some(snapshot.iteration));
        if let Err(err) = self.write_cloud(snapshot.reading, &path) {
            warn!(path = %path.display(), %err, "discarding iteration dump failure");
        }

        if self.value_names.is_empty() {
            for check in snapshot.checks.checks() {
                for name in check.value_names() {
                    self.value_names.push((*name).to_string());
                }
            }
        }
        let mut row = Vec::new();
        for check in snapshot.checks.checks() {
            for value in check.values() {
                row.push(nalgebra::try_convert(*value).unwrap_or(f64::NAN));
            }
        }
        self.rows.push((snapshot.iteration, row));
    }

    fn finish(&mut self, _iteration_count: usize) {
        if let Err(err) = self.write_info_csv() {
            warn!(%err, "discarding iteration info dump failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloud_types::Label;
    use nalgebra::{DMatrix, Point2};

    #[test]
    fn test_null_inspector_is_silent() {
        let cloud = PointCloud::<f64>::from_planar_points(&[Point2::new(0.0, 0.0)]);
        let mut inspector = NullInspector;
        Inspector::<f64>::init(&mut inspector);
        inspector.dump_filtered_reference(&cloud);
        Inspector::<f64>::finish(&mut inspector, 3);
    }

    #[test]
    fn test_vtk_inspector_writes_polydata() {
        let dir = std::env::temp_dir().join("cloud-registration-inspector-test");
        std::fs::create_dir_all(&dir).unwrap();
        let base = dir.join("run");

        let mut cloud = PointCloud::<f64>::from_planar_points(&[
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
        ]);
        let normals = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 1.0, 1.0]);
        cloud
            .append_descriptors(Label::new("normals", 2), normals)
            .unwrap();

        let mut inspector = VtkFileInspector::new(&base);
        Inspector::<f64>::init(&mut inspector);
        inspector.dump_filtered_reference(&cloud);
        Inspector::<f64>::finish(&mut inspector, 0);

        let reference = std::fs::read_to_string(format!("{}-reference.vtk", base.display()))
            .unwrap();
        assert!(reference.starts_with("# vtk DataFile Version 3.0"));
        assert!(reference.contains("POINTS 2 float"));
        assert!(reference.contains("NORMALS normals float"));

        let csv =
            std::fs::read_to_string(format!("{}-iterationInfo.csv", base.display())).unwrap();
        assert!(csv.starts_with("iteration"));
    }
}
