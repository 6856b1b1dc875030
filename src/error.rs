//! Error taxonomy shared by the POD core and its persistence layer.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PodError>;

#[derive(Debug, Error)]
pub enum PodError {
    /// An operation needed at least one snapshot, or snapshots sharing one discretization.
    #[error("Invalid snapshot ensemble: {reason}")]
    InvalidEnsemble { reason: String },

    /// Two index-paired collections disagree in length or cell count.
    #[error("Shape mismatch in {context}: expected {expected}, actual {actual}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// The Gram matrix of a basis is not invertible to the required tolerance.
    #[error("Mass matrix of order {order} is singular (condition estimate {condition:e})")]
    SingularMassMatrix { order: usize, condition: f64 },

    /// A persisted artifact exists but cannot be trusted.
    #[error("Corrupt persisted data at {path:?}: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("I/O failure at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PodError {
    pub fn invalid_ensemble(reason: impl Into<String>) -> Self {
        Self::InvalidEnsemble {
            reason: reason.into(),
        }
    }

    pub fn shape_mismatch(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    pub fn cache_corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self::CacheCorrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Input that exists but does not decode, reported as `io::ErrorKind::InvalidData`.
    pub fn invalid_data(path: &Path, reason: impl Into<String>) -> Self {
        Self::io(path, io::Error::new(io::ErrorKind::InvalidData, reason.into()))
    }

    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Attaches a path to raw `std::io` failures.
pub(crate) trait IoContext<T> {
    fn at_path(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, io::Error> {
    fn at_path(self, path: &Path) -> Result<T> {
        self.map_err(|source| PodError::io(path, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = PodError::shape_mismatch("paired normalization", 4, 3);
        assert_eq!(
            err.to_string(),
            "Shape mismatch in paired normalization: expected 4, actual 3"
        );

        let err = PodError::cache_corrupt(Path::new("out/POD/U_meta.json"), "bad json");
        assert!(err.to_string().contains("U_meta.json"));
        assert!(err.to_string().contains("bad json"));
    }

    #[test]
    fn io_errors_keep_source() {
        let raw: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::NotFound, "missing"));
        let err = raw.at_path(Path::new("case/mesh.json")).unwrap_err();
        assert!(matches!(err, PodError::Io { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn invalid_data_is_an_io_failure() {
        let err = PodError::invalid_data(Path::new("case/0/T.json"), "expected value");
        match err {
            PodError::Io { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::InvalidData);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
