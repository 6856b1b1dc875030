use nalgebra::{DMatrix, Vector3};

use crate::ensemble::SnapshotEnsemble;
use crate::error::{PodError, Result};
use crate::field::{Field, FieldValue};
use crate::inner_product::InnerProduct;

/// Reference norms at or below this are treated as zero by [`relative_error`].
const REFERENCE_NORM_FLOOR: f64 = 1e-300;

pub fn l2_norm<V: FieldValue>(field: &Field<V>) -> Result<f64> {
    InnerProduct::L2.norm(field)
}

pub fn h1_seminorm<V: FieldValue>(field: &Field<V>) -> Result<f64> {
    InnerProduct::H1Seminorm.norm(field)
}

/// `||reference - approx|| / ||reference||` in the L2 norm; the absolute error when the
/// reference vanishes.
pub fn relative_error<V: FieldValue>(reference: &Field<V>, approx: &Field<V>) -> Result<f64> {
    let error = l2_norm(&reference.difference(approx)?)?;
    let scale = l2_norm(reference)?;
    if scale <= REFERENCE_NORM_FLOOR {
        Ok(error)
    } else {
        Ok(error / scale)
    }
}

pub fn relative_errors<V: FieldValue>(
    references: &[Field<V>],
    approximations: &[Field<V>],
) -> Result<Vec<f64>> {
    if references.len() != approximations.len() {
        return Err(PodError::shape_mismatch(
            "relative error lists",
            references.len(),
            approximations.len(),
        ));
    }
    references
        .iter()
        .zip(approximations)
        .map(|(reference, approx)| relative_error(reference, approx))
        .collect()
}

/// Internal values as columns of a `(cells * components) x N` matrix, cell-major.
pub fn snapshot_matrix<V: FieldValue>(ensemble: &SnapshotEnsemble<V>) -> DMatrix<f64> {
    let rows = ensemble.cell_count() * V::COMPONENTS;
    let mut matrix = DMatrix::zeros(rows, ensemble.len());
    for (col, snapshot) in ensemble.iter().enumerate() {
        for (cell, value) in snapshot.internal().iter().enumerate() {
            for comp in 0..V::COMPONENTS {
                matrix[(cell * V::COMPONENTS + comp, col)] = value.component(comp);
            }
        }
    }
    matrix
}

/// Sets every cell whose centre lies in the closed box `[lower, upper]`; returns how many.
pub fn set_box_to_value<V: FieldValue>(
    field: &mut Field<V>,
    lower: Vector3<f64>,
    upper: Vector3<f64>,
    value: V,
) -> usize {
    let mesh = std::sync::Arc::clone(field.mesh());
    let mut touched = 0;
    for (slot, centre) in field.internal_mut().iter_mut().zip(&mesh.centres) {
        let inside = (0..3).all(|axis| centre[axis] >= lower[axis] && centre[axis] <= upper[axis]);
        if inside {
            *slot = value;
            touched += 1;
        }
    }
    touched
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::field::Mesh;

    #[test]
    fn relative_error_of_scaled_field() {
        let mesh = Arc::new(Mesh::from_volumes(vec![1.0, 3.0]));
        let reference = Field::new("T", Arc::clone(&mesh), vec![2.0, -1.0]).unwrap();
        let approx = reference.scaled(0.9);
        let err = relative_error(&reference, &approx).unwrap();
        assert!((err - 0.1).abs() < 1e-12);
    }

    #[test]
    fn vanishing_reference_gives_absolute_error() {
        let mesh = Arc::new(Mesh::from_volumes(vec![4.0]));
        let zero = Field::uniform("T", Arc::clone(&mesh), 0.0);
        let approx = Field::uniform("T", mesh, 0.5);
        assert!((relative_error(&zero, &approx).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn relative_errors_need_paired_lists() {
        let mesh = Arc::new(Mesh::from_volumes(vec![1.0]));
        let one = vec![Field::uniform("T", mesh, 1.0)];
        assert!(matches!(
            relative_errors(&one, &[]),
            Err(PodError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn snapshot_matrix_is_cell_major() {
        let mesh = Arc::new(Mesh::from_volumes(vec![1.0, 1.0]));
        let ensemble = SnapshotEnsemble::new(vec![
            Field::new(
                "U",
                Arc::clone(&mesh),
                vec![Vector3::new(1.0, 2.0, 3.0), Vector3::new(4.0, 5.0, 6.0)],
            )
            .unwrap(),
            Field::uniform("U", mesh, Vector3::new(-1.0, 0.0, 1.0)),
        ])
        .unwrap();
        let matrix = snapshot_matrix(&ensemble);
        assert_eq!(matrix.shape(), (6, 2));
        assert_eq!(matrix[(4, 0)], 5.0);
        assert_eq!(matrix[(5, 1)], 1.0);
    }

    #[test]
    fn box_assignment_uses_cell_centres() {
        let mesh = Arc::new(Mesh::cartesian([4, 1, 1], [1.0, 1.0, 1.0]));
        let mut field = Field::uniform("T", mesh, 0.0);
        let touched = set_box_to_value(
            &mut field,
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(3.0, 1.0, 1.0),
            7.0,
        );
        assert_eq!(touched, 2);
        assert_eq!(field.internal(), &[0.0, 7.0, 7.0, 0.0]);
    }
}
