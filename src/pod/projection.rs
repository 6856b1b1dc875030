use nalgebra::linalg::{Cholesky, LU};
use nalgebra::{DMatrix, DVector, Dyn, SymmetricEigen};

use crate::ensemble::SnapshotEnsemble;
use crate::error::{PodError, Result};
use crate::field::{Field, FieldValue};
use crate::pod::basis::ModeBasis;

/// Smallest admissible ratio between the extreme eigenvalues of a mass matrix.
const SINGULAR_TOLERANCE: f64 = 1e-12;

pub struct ProjectionEngine;

impl ProjectionEngine {
    /// `raw_k = <snapshot, mode_k>`.
    pub fn raw_projections<V: FieldValue>(
        snapshot: &Field<V>,
        basis: &ModeBasis<V>,
    ) -> Result<DVector<f64>> {
        let inner = basis.inner_product();
        let values = basis
            .modes()
            .iter()
            .map(|mode| inner.inner(snapshot, mode))
            .collect::<Result<Vec<f64>>>()?;
        Ok(DVector::from_vec(values))
    }

    /// Coefficients `c` with `M c = raw`, exact for bases that are not orthonormal.
    pub fn project_coefficients<V: FieldValue>(
        snapshot: &Field<V>,
        basis: &ModeBasis<V>,
    ) -> Result<DVector<f64>> {
        let raw = Self::raw_projections(snapshot, basis)?;
        basis.mass_solver()?.solve(&raw)
    }

    /// Coefficients of every snapshot, one column per snapshot. The mass matrix is
    /// factorized once for the whole ensemble.
    pub fn project_ensemble<V: FieldValue>(
        ensemble: &SnapshotEnsemble<V>,
        basis: &ModeBasis<V>,
    ) -> Result<DMatrix<f64>> {
        let mut coefficients = DMatrix::zeros(basis.len(), ensemble.len());
        for (col, snapshot) in ensemble.iter().enumerate() {
            let c = Self::project_coefficients(snapshot, basis)?;
            coefficients.set_column(col, &c);
        }
        Ok(coefficients)
    }
}

/// Factorized mass matrix of a basis, checked for singularity once.
#[derive(Debug, Clone)]
pub(crate) enum MassSolver {
    Empty,
    Cholesky(Cholesky<f64, Dyn>),
    Lu(LU<f64, Dyn, Dyn>),
}

impl MassSolver {
    pub(crate) fn factorize(mass: &DMatrix<f64>) -> Result<Self> {
        let order = mass.nrows();
        if order == 0 {
            return Ok(Self::Empty);
        }

        let eigenvalues = SymmetricEigen::new(mass.clone()).eigenvalues;
        let largest = eigenvalues.max();
        let smallest = eigenvalues.min();
        if largest.is_nan() || largest <= 0.0 || smallest <= SINGULAR_TOLERANCE * largest {
            let condition = if smallest > 0.0 {
                largest / smallest
            } else {
                f64::INFINITY
            };
            return Err(PodError::SingularMassMatrix { order, condition });
        }

        Ok(match mass.clone().cholesky() {
            Some(cholesky) => Self::Cholesky(cholesky),
            None => Self::Lu(mass.clone().lu()),
        })
    }

    pub(crate) fn solve(&self, raw: &DVector<f64>) -> Result<DVector<f64>> {
        match self {
            Self::Empty => Ok(DVector::zeros(0)),
            Self::Cholesky(cholesky) => Ok(cholesky.solve(raw)),
            Self::Lu(lu) => lu.solve(raw).ok_or(PodError::SingularMassMatrix {
                order: raw.len(),
                condition: f64::INFINITY,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::field::Mesh;
    use crate::inner_product::InnerProduct;

    fn mesh() -> Arc<Mesh> {
        Arc::new(Mesh::from_volumes(vec![1.0, 2.0, 1.0]))
    }

    #[test]
    fn non_orthogonal_basis_recovers_exact_coefficients() {
        let basis = ModeBasis::new(
            vec![
                Field::new("T", mesh(), vec![1.0, 0.0, 0.0]).unwrap(),
                Field::new("T", mesh(), vec![1.0, 1.0, 0.0]).unwrap(),
            ],
            InnerProduct::L2,
        );
        // 2 * b0 - 3 * b1
        let snapshot = Field::new("T", mesh(), vec![-1.0, -3.0, 0.0]).unwrap();
        let c = ProjectionEngine::project_coefficients(&snapshot, &basis).unwrap();
        assert!((c[0] - 2.0).abs() < 1e-12);
        assert!((c[1] + 3.0).abs() < 1e-12);

        let rebuilt = basis.reconstruct(&c).unwrap();
        for (a, b) in rebuilt.internal().iter().zip(snapshot.internal()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn dependent_basis_is_singular() {
        let basis = ModeBasis::new(
            vec![
                Field::new("T", mesh(), vec![1.0, 1.0, 0.0]).unwrap(),
                Field::new("T", mesh(), vec![2.0, 2.0, 0.0]).unwrap(),
            ],
            InnerProduct::L2,
        );
        let snapshot = Field::uniform("T", mesh(), 1.0);
        let err = ProjectionEngine::project_coefficients(&snapshot, &basis).unwrap_err();
        assert!(matches!(err, PodError::SingularMassMatrix { order: 2, .. }));
    }

    #[test]
    fn empty_basis_projects_to_empty_vector() {
        let basis: ModeBasis<f64> = ModeBasis::new(Vec::new(), InnerProduct::L2);
        let snapshot = Field::uniform("T", mesh(), 1.0);
        let c = ProjectionEngine::project_coefficients(&snapshot, &basis).unwrap();
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn orthonormal_basis_reduces_to_raw_projection() {
        let unit = Arc::new(Mesh::from_volumes(vec![1.0, 1.0]));
        let basis = ModeBasis::new(
            vec![
                Field::new("T", Arc::clone(&unit), vec![1.0, 0.0]).unwrap(),
                Field::new("T", Arc::clone(&unit), vec![0.0, 1.0]).unwrap(),
            ],
            InnerProduct::L2,
        );
        let snapshot = Field::new("T", unit, vec![0.25, -4.0]).unwrap();
        let raw = ProjectionEngine::raw_projections(&snapshot, &basis).unwrap();
        let c = ProjectionEngine::project_coefficients(&snapshot, &basis).unwrap();
        assert_eq!(raw, c);
    }

    #[test]
    fn ensemble_projection_reuses_one_factorization() {
        let basis = ModeBasis::new(
            vec![
                Field::new("T", mesh(), vec![1.0, 0.0, 1.0]).unwrap(),
                Field::new("T", mesh(), vec![0.0, 1.0, 1.0]).unwrap(),
            ],
            InnerProduct::L2,
        );
        let ensemble = SnapshotEnsemble::new(vec![
            Field::new("T", mesh(), vec![1.0, 2.0, 3.0]).unwrap(),
            Field::new("T", mesh(), vec![-1.0, 0.5, -0.5]).unwrap(),
        ])
        .unwrap();

        let all = ProjectionEngine::project_ensemble(&ensemble, &basis).unwrap();
        let solver = basis.mass_solver().unwrap();
        assert!(std::ptr::eq(solver, basis.mass_solver().unwrap()));
        assert!(matches!(solver, MassSolver::Cholesky(_)));
        for (col, snapshot) in ensemble.iter().enumerate() {
            let c = ProjectionEngine::project_coefficients(snapshot, &basis).unwrap();
            assert_eq!(all.column(col).into_owned(), c);
        }
    }
}
