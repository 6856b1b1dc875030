use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use crate::error::{IoContext, PodError, Result};
use crate::field::mesh::Mesh;
use crate::field::model::{Field, FieldValue, RawField};

pub const MESH_FILE: &str = "mesh.json";
pub const FIELD_EXTENSION: &str = "json";

/// Selects `count` snapshots starting at `first`; `count == 0` reads every remaining one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotWindow {
    pub first: usize,
    pub count: usize,
}

impl SnapshotWindow {
    pub fn new(first: usize, count: usize) -> Self {
        Self { first, count }
    }

    pub fn all() -> Self {
        Self::default()
    }

    fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let take = if self.count == 0 {
            usize::MAX
        } else {
            self.count
        };
        items.into_iter().skip(self.first).take(take).collect()
    }
}

/// Reads meshes and fields from a case directory.
///
/// A case holds `mesh.json` at its root and one numerically named directory per stored
/// time, each containing `<field>.json` files.
#[derive(Debug, Default)]
pub struct FieldLoader;

impl FieldLoader {
    pub fn read_mesh(case: &Path) -> Result<Arc<Mesh>> {
        let path = case.join(MESH_FILE);
        let file = File::open(&path).at_path(&path)?;
        let mesh: Mesh = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| PodError::invalid_data(&path, err.to_string()))?;
        mesh.validate()?;
        Ok(Arc::new(mesh))
    }

    /// Parse a JSON string into a field over `mesh`.
    pub fn from_json_str<V: FieldValue>(json: &str, mesh: Arc<Mesh>) -> Result<Field<V>> {
        Self::parse_at(json, mesh, Path::new("<memory>"))
    }

    pub fn from_path<V: FieldValue>(path: &Path, mesh: Arc<Mesh>) -> Result<Field<V>> {
        let mut buf = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut buf))
            .at_path(path)?;
        Self::parse_at(&buf, mesh, path)
    }

    /// Parse errors are reported against `path` as invalid data.
    pub(crate) fn parse_at<V: FieldValue>(
        json: &str,
        mesh: Arc<Mesh>,
        path: &Path,
    ) -> Result<Field<V>> {
        let raw: RawField<V> = serde_json::from_str(json)
            .map_err(|err| PodError::invalid_data(path, err.to_string()))?;
        Self::from_raw(raw, mesh, path)
    }

    fn from_raw<V: FieldValue>(raw: RawField<V>, mesh: Arc<Mesh>, path: &Path) -> Result<Field<V>> {
        if raw.kind != V::KIND {
            return Err(PodError::invalid_data(
                path,
                format!("expected a {:?} field, found {:?}", V::KIND, raw.kind),
            ));
        }
        Field::from_raw(raw, mesh)
    }

    /// Time directories of `case` holding `<name>.json`, in ascending time order.
    pub fn time_directories(case: &Path, name: &str) -> Result<Vec<PathBuf>> {
        let file_name = format!("{name}.{FIELD_EXTENSION}");
        let entries = fs::read_dir(case).at_path(case)?;
        let mut times: Vec<(f64, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() && path.join(&file_name).is_file())
            .filter_map(|path| {
                let time = path
                    .file_name()
                    .and_then(OsStr::to_str)
                    .and_then(|stem| stem.parse::<f64>().ok())?;
                Some((time, path))
            })
            .collect();
        times.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(times.into_iter().map(|(_, path)| path).collect())
    }

    /// Reads a window of the `name` series, taking the mesh from `case/mesh.json`.
    pub fn read_fields<V: FieldValue>(
        name: &str,
        case: &Path,
        window: SnapshotWindow,
    ) -> Result<Vec<Field<V>>> {
        let mesh = Self::read_mesh(case)?;
        Self::read_series(name, mesh, case, window)
    }

    /// Reads a window of the series named like `template`, reusing its mesh.
    pub fn read_fields_like<V: FieldValue>(
        template: &Field<V>,
        case: &Path,
        window: SnapshotWindow,
    ) -> Result<Vec<Field<V>>> {
        Self::read_series(template.name(), Arc::clone(template.mesh()), case, window)
    }

    fn read_series<V: FieldValue>(
        name: &str,
        mesh: Arc<Mesh>,
        case: &Path,
        window: SnapshotWindow,
    ) -> Result<Vec<Field<V>>> {
        let times = window.apply(Self::time_directories(case, name)?);
        debug!(
            "Reading {} snapshots of '{}' from {:?} (first {})",
            times.len(),
            name,
            case,
            window.first
        );
        times
            .iter()
            .map(|dir| {
                let path = dir.join(format!("{name}.{FIELD_EXTENSION}"));
                Self::from_path(&path, Arc::clone(&mesh))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_zero_count_reads_remaining() {
        let items: Vec<usize> = (0..6).collect();
        assert_eq!(SnapshotWindow::new(2, 0).apply(items.clone()), vec![2, 3, 4, 5]);
        assert_eq!(SnapshotWindow::new(1, 2).apply(items.clone()), vec![1, 2]);
        assert_eq!(SnapshotWindow::new(4, 10).apply(items.clone()), vec![4, 5]);
        assert!(SnapshotWindow::new(9, 1).apply(items).is_empty());
    }

    #[test]
    fn json_kind_must_match_value_type() {
        let mesh = Arc::new(Mesh::from_volumes(vec![1.0, 1.0]));
        let json = r#"{"name": "p", "kind": "scalar", "internal": [1.0, 2.0]}"#;
        let field: Field<f64> =
            FieldLoader::from_json_str(json, Arc::clone(&mesh)).expect("scalar");
        assert_eq!(field.internal(), &[1.0, 2.0]);

        let err = FieldLoader::from_json_str::<nalgebra::Vector3<f64>>(json, Arc::clone(&mesh))
            .unwrap_err();
        assert!(matches!(
            err,
            PodError::Io { ref source, .. } if source.kind() == std::io::ErrorKind::InvalidData
        ));
    }

    #[test]
    fn malformed_input_is_invalid_data_not_corrupt_cache() {
        let mesh = Arc::new(Mesh::from_volumes(vec![1.0]));
        let err = FieldLoader::from_json_str::<f64>("{ \"name\": ", mesh).unwrap_err();
        assert!(matches!(
            err,
            PodError::Io { ref source, .. } if source.kind() == std::io::ErrorKind::InvalidData
        ));
    }
}
