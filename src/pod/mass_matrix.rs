use nalgebra::DMatrix;

use crate::error::Result;
use crate::field::{Field, FieldValue};
use crate::inner_product::InnerProduct;
use crate::pod::correlation::gram_matrix;

/// Gram matrix of a basis, so that coefficient-space dot products reproduce the
/// weighted inner product in field space.
pub struct MassMatrixBuilder;

impl MassMatrixBuilder {
    /// An empty basis yields a 0x0 matrix.
    pub fn build<V: FieldValue>(basis: &[Field<V>], inner: InnerProduct) -> Result<DMatrix<f64>> {
        gram_matrix(basis, inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::field::Mesh;

    #[test]
    fn empty_basis_gives_empty_matrix() {
        let matrix = MassMatrixBuilder::build::<f64>(&[], InnerProduct::L2).unwrap();
        assert_eq!(matrix.shape(), (0, 0));
    }

    #[test]
    fn non_orthogonal_basis_has_off_diagonal_terms() {
        let mesh = Arc::new(Mesh::from_volumes(vec![2.0, 1.0]));
        let basis = vec![
            Field::new("T", Arc::clone(&mesh), vec![1.0, 0.0]).unwrap(),
            Field::new("T", mesh, vec![1.0, 1.0]).unwrap(),
        ];
        let mass = MassMatrixBuilder::build(&basis, InnerProduct::L2).unwrap();
        assert_eq!(mass, DMatrix::from_row_slice(2, 2, &[2.0, 2.0, 2.0, 3.0]));
    }
}
