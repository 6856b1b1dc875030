use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{IoContext, PodError, Result};
use crate::field::construction::{FIELD_EXTENSION, MESH_FILE};
use crate::field::mesh::Mesh;
use crate::field::model::{Field, FieldValue};

/// Helper for exporting fields back to files compatible with the loader format.
pub struct FieldWriter;

impl FieldWriter {
    pub fn to_json_string<V: FieldValue>(field: &Field<V>) -> Result<String> {
        serde_json::to_string(&field.to_raw())
            .map_err(|err| PodError::invalid_data(Path::new(field.name()), err.to_string()))
    }

    pub fn write_to_path<V: FieldValue>(field: &Field<V>, path: &Path) -> Result<()> {
        ensure_parent(path)?;
        let file = File::create(path).at_path(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &field.to_raw())
            .map_err(|err| PodError::invalid_data(path, err.to_string()))?;
        writer.flush().at_path(path)
    }

    pub fn write_mesh(mesh: &Mesh, case: &Path) -> Result<PathBuf> {
        let path = case.join(MESH_FILE);
        ensure_parent(&path)?;
        let file = File::create(&path).at_path(&path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, mesh)
            .map_err(|err| PodError::invalid_data(&path, err.to_string()))?;
        writer.flush().at_path(&path)?;
        Ok(path)
    }

    /// Writes `field` to `folder/subfolder/<field name>.json`.
    pub fn export_solution<V: FieldValue>(
        field: &Field<V>,
        subfolder: &str,
        folder: &Path,
    ) -> Result<PathBuf> {
        let path = folder
            .join(subfolder)
            .join(format!("{}.{FIELD_EXTENSION}", field.name()));
        Self::write_to_path(field, &path)?;
        Ok(path)
    }

    /// Writes a sequence as `folder/<i+1>/<field_name>.json`, the layout the loader reads back.
    pub fn export_fields<V: FieldValue>(
        fields: &[Field<V>],
        folder: &Path,
        field_name: &str,
    ) -> Result<Vec<PathBuf>> {
        fields
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                let path = folder
                    .join((idx + 1).to_string())
                    .join(format!("{field_name}.{FIELD_EXTENSION}"));
                Self::write_to_path(field, &path)?;
                Ok(path)
            })
            .collect()
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).at_path(parent)?;
    }
    Ok(())
}
