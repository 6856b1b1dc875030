use log::debug;
use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::ensemble::SnapshotEnsemble;
use crate::error::{PodError, Result};
use crate::field::{Field, FieldValue};
use crate::inner_product::{InnerProduct, Integrand};

/// Builds the snapshot correlation matrix `C[i][j] = <s_i, s_j>`.
pub struct CorrelationMatrixBuilder;

impl CorrelationMatrixBuilder {
    pub fn build<V: FieldValue>(
        ensemble: &SnapshotEnsemble<V>,
        inner: InnerProduct,
    ) -> Result<DMatrix<f64>> {
        Self::from_snapshots(ensemble.as_slice(), inner)
    }

    pub fn from_snapshots<V: FieldValue>(
        snapshots: &[Field<V>],
        inner: InnerProduct,
    ) -> Result<DMatrix<f64>> {
        if snapshots.is_empty() {
            return Err(PodError::invalid_ensemble(
                "correlation matrix of an empty ensemble",
            ));
        }
        let matrix = gram_matrix(snapshots, inner)?;
        debug!(
            "Correlation matrix {}x{} assembled ({:?}, trace {:.6e})",
            matrix.nrows(),
            matrix.ncols(),
            inner,
            matrix.trace()
        );
        Ok(matrix)
    }
}

/// Symmetric Gram matrix of `fields`. Only the lower triangle is evaluated; rows run in
/// parallel but every entry is a single fixed-order quadrature.
pub(crate) fn gram_matrix<V: FieldValue>(
    fields: &[Field<V>],
    inner: InnerProduct,
) -> Result<DMatrix<f64>> {
    let n = fields.len();
    if n == 0 {
        return Ok(DMatrix::zeros(0, 0));
    }
    let cells = fields[0].cell_count();
    if let Some(odd) = fields.iter().find(|f| f.cell_count() != cells) {
        return Err(PodError::shape_mismatch(
            format!("Gram matrix operand '{}'", odd.name()),
            cells,
            odd.cell_count(),
        ));
    }

    let volumes = &fields[0].mesh().volumes;
    let integrands: Vec<Integrand> = fields
        .par_iter()
        .map(|f| inner.integrand(f))
        .collect::<Result<_>>()?;

    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..=i)
                .map(|j| integrands[i].weighted_dot(&integrands[j], volumes))
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let mut matrix = DMatrix::zeros(n, n);
    for (i, row) in rows.iter().enumerate() {
        for (j, value) in row.iter().enumerate() {
            matrix[(i, j)] = *value;
            matrix[(j, i)] = *value;
        }
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::field::Mesh;

    fn three_snapshot_ensemble() -> SnapshotEnsemble<f64> {
        let mesh = Arc::new(Mesh::from_volumes(vec![1.0, 1.0]));
        let snapshots = [[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]
            .into_iter()
            .map(|values| Field::new("T", Arc::clone(&mesh), values.to_vec()).unwrap())
            .collect();
        SnapshotEnsemble::new(snapshots).unwrap()
    }

    #[test]
    fn correlation_matches_hand_computed_entries() {
        let matrix = CorrelationMatrixBuilder::build(&three_snapshot_ensemble(), InnerProduct::L2)
            .expect("correlation");
        let expected =
            DMatrix::from_row_slice(3, 3, &[1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 2.0]);
        assert_eq!(matrix, expected);
    }

    #[test]
    fn correlation_is_exactly_symmetric() {
        let mesh = Arc::new(Mesh::from_volumes(vec![0.3, 1.7, 0.9, 2.2]));
        let snapshots: Vec<Field<f64>> = (0..6)
            .map(|k| {
                let values = (0..4).map(|c| ((k * 7 + c * 3) as f64).sin()).collect();
                Field::new("T", Arc::clone(&mesh), values).unwrap()
            })
            .collect();
        let matrix =
            CorrelationMatrixBuilder::from_snapshots(&snapshots, InnerProduct::L2).unwrap();
        assert_eq!(matrix, matrix.transpose());
        for i in 0..6 {
            assert!(matrix[(i, i)] >= 0.0);
        }
    }

    #[test]
    fn empty_snapshot_list_is_invalid() {
        let err =
            CorrelationMatrixBuilder::from_snapshots::<f64>(&[], InnerProduct::L2).unwrap_err();
        assert!(matches!(err, PodError::InvalidEnsemble { .. }));
    }
}
