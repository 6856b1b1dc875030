//! Textual export and import of dense matrices and scalar sequences.
//!
//! Three output flavours are supported: a numpy assignment (`python`), a matlab assignment
//! (`matlab`) and whitespace-separated rows (`eigen`). Only the `eigen` flavour is read back.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::debug;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{IoContext, PodError, Result};

pub const DEFAULT_MATRIX_FOLDER: &str = "./Matrices";
const MATRIX_SUFFIX: &str = "_mat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatrixFormat {
    #[default]
    Python,
    Matlab,
    Eigen,
}

#[derive(Debug, Error)]
#[error("Unknown matrix format '{0}', expected python, matlab or eigen")]
pub struct UnknownMatrixFormat(pub String);

impl FromStr for MatrixFormat {
    type Err = UnknownMatrixFormat;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "python" => Ok(Self::Python),
            "matlab" => Ok(Self::Matlab),
            "eigen" => Ok(Self::Eigen),
            _ => Err(UnknownMatrixFormat(s.to_string())),
        }
    }
}

impl MatrixFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::Matlab => "m",
            Self::Eigen => "txt",
        }
    }

    fn render(self, matrix: &DMatrix<f64>, name: &str) -> String {
        let mut out = String::new();
        match self {
            Self::Python => {
                let rows: Vec<String> = matrix
                    .row_iter()
                    .map(|row| format!("[{}]", join_row(row.iter(), ", ")))
                    .collect();
                let _ = writeln!(out, "{name} = np.array([{}])", rows.join(",\n"));
            }
            Self::Matlab => {
                let rows: Vec<String> = matrix
                    .row_iter()
                    .map(|row| join_row(row.iter(), ", "))
                    .collect();
                let _ = writeln!(out, "{name} = [{}];", rows.join(";\n"));
            }
            Self::Eigen => {
                for row in matrix.row_iter() {
                    let _ = writeln!(out, "{}", join_row(row.iter(), " "));
                }
            }
        }
        out
    }
}

fn join_row<'a>(values: impl Iterator<Item = &'a f64>, separator: &str) -> String {
    values
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Writes matrices under one folder in one format.
#[derive(Debug, Clone)]
pub struct MatrixExporter {
    folder: PathBuf,
    format: MatrixFormat,
}

impl Default for MatrixExporter {
    fn default() -> Self {
        Self::new(DEFAULT_MATRIX_FOLDER, MatrixFormat::default())
    }
}

impl MatrixExporter {
    pub fn new(folder: impl Into<PathBuf>, format: MatrixFormat) -> Self {
        Self {
            folder: folder.into(),
            format,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn format(&self) -> MatrixFormat {
        self.format
    }

    /// `<folder>/<name>_mat.<ext>`.
    pub fn export(&self, matrix: &DMatrix<f64>, name: &str) -> Result<PathBuf> {
        let path = self.path_for(name);
        self.write(&path, &self.format.render(matrix, name))?;
        Ok(path)
    }

    /// One file per slice, `<folder>/<name><i>_mat.<ext>`.
    pub fn export_slices(&self, slices: &[DMatrix<f64>], name: &str) -> Result<Vec<PathBuf>> {
        slices
            .iter()
            .enumerate()
            .map(|(idx, slice)| {
                let slice_name = format!("{name}{idx}");
                let path = self.path_for(&slice_name);
                self.write(&path, &self.format.render(slice, &slice_name))?;
                Ok(path)
            })
            .collect()
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.folder
            .join(format!("{name}{MATRIX_SUFFIX}.{}", self.format.extension()))
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.folder).at_path(&self.folder)?;
        fs::write(path, contents).at_path(path)?;
        debug!("Exported matrix to {:?}", path);
        Ok(())
    }
}

/// Reads an `eigen`-format matrix. Rows must agree in width.
pub fn read_matrix(path: &Path) -> Result<DMatrix<f64>> {
    let text = fs::read_to_string(path).at_path(path)?;
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|err| {
                    PodError::cache_corrupt(path, format!("line {}: {err}", line_no + 1))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        if let Some(first) = rows.first() {
            if first.len() != row.len() {
                return Err(PodError::cache_corrupt(
                    path,
                    format!(
                        "line {} has {} columns, expected {}",
                        line_no + 1,
                        row.len(),
                        first.len()
                    ),
                ));
            }
        }
        rows.push(row);
    }
    let ncols = rows.first().map_or(0, Vec::len);
    Ok(DMatrix::from_row_iterator(
        rows.len(),
        ncols,
        rows.into_iter().flatten(),
    ))
}

/// Reads `<folder>/<name>0_mat.txt`, `<name>1_mat.txt`, ... up to the first missing index.
pub fn read_matrix_slices(folder: &Path, name: &str) -> Result<Vec<DMatrix<f64>>> {
    let ext = MatrixFormat::Eigen.extension();
    let mut slices = Vec::new();
    loop {
        let path = folder.join(format!("{name}{}{MATRIX_SUFFIX}.{ext}", slices.len()));
        if !path.is_file() {
            break;
        }
        slices.push(read_matrix(&path)?);
    }
    if slices.is_empty() {
        let missing = folder.join(format!("{name}0{MATRIX_SUFFIX}.{ext}"));
        return Err(PodError::io(
            &missing,
            std::io::Error::new(std::io::ErrorKind::NotFound, "no matrix slices found"),
        ));
    }
    Ok(slices)
}

/// One value per line.
pub fn write_scalars(path: &Path, values: impl IntoIterator<Item = f64>) -> Result<()> {
    let mut out = String::new();
    for value in values {
        let _ = writeln!(out, "{value}");
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).at_path(parent)?;
    }
    fs::write(path, out).at_path(path)
}

pub fn read_scalars(path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path).at_path(path)?;
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(idx, line)| {
            line.parse::<f64>()
                .map_err(|err| PodError::cache_corrupt(path, format!("value {}: {err}", idx + 1)))
        })
        .collect()
}
