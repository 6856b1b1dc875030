use std::ops::Index;
use std::path::Path;

use crate::error::{PodError, Result};
use crate::field::{Field, FieldLoader, FieldValue, SnapshotWindow};

/// Ordered, non-empty set of snapshots over one discretization.
///
/// A snapshot's ordinal index is its position; the ensemble never mutates its members.
#[derive(Debug, Clone)]
pub struct SnapshotEnsemble<V> {
    snapshots: Vec<Field<V>>,
}

impl<V: FieldValue> SnapshotEnsemble<V> {
    pub fn new(snapshots: Vec<Field<V>>) -> Result<Self> {
        let Some(first) = snapshots.first() else {
            return Err(PodError::invalid_ensemble("no snapshots supplied"));
        };
        let cells = first.cell_count();
        if let Some(odd) = snapshots.iter().find(|s| s.cell_count() != cells) {
            return Err(PodError::shape_mismatch(
                format!("snapshot '{}' cell count", odd.name()),
                cells,
                odd.cell_count(),
            ));
        }
        Ok(Self { snapshots })
    }

    /// Reads a window of the `name` series stored under `case`.
    pub fn from_case(name: &str, case: &Path, window: SnapshotWindow) -> Result<Self> {
        let snapshots = FieldLoader::read_fields(name, case, window)?;
        if snapshots.is_empty() {
            return Err(PodError::invalid_ensemble(format!(
                "no '{name}' snapshots under {case:?} in window {window:?}"
            )));
        }
        Self::new(snapshots)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn cell_count(&self) -> usize {
        self.template().cell_count()
    }

    /// First snapshot; supplies name, mesh and patch layout for derived fields.
    pub fn template(&self) -> &Field<V> {
        &self.snapshots[0]
    }

    pub fn field_name(&self) -> &str {
        self.template().name()
    }

    pub fn get(&self, index: usize) -> Option<&Field<V>> {
        self.snapshots.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field<V>> {
        self.snapshots.iter()
    }

    pub fn as_slice(&self) -> &[Field<V>] {
        &self.snapshots
    }
}

impl<V> Index<usize> for SnapshotEnsemble<V> {
    type Output = Field<V>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.snapshots[index]
    }
}

impl<'a, V: FieldValue> IntoIterator for &'a SnapshotEnsemble<V> {
    type Item = &'a Field<V>;
    type IntoIter = std::slice::Iter<'a, Field<V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
