use nalgebra::{DMatrix, DVector};
use once_cell::sync::OnceCell;

use crate::error::{PodError, Result};
use crate::field::{Field, FieldValue};
use crate::inner_product::InnerProduct;
use crate::pod::mass_matrix::MassMatrixBuilder;
use crate::pod::projection::MassSolver;

/// Ordered modes, index 0 carrying the most energy. Immutable once built; the mass matrix
/// and its factorization are built on first use and shared by every later projection.
#[derive(Debug, Clone)]
pub struct ModeBasis<V> {
    modes: Vec<Field<V>>,
    inner: InnerProduct,
    mass: OnceCell<DMatrix<f64>>,
    solver: OnceCell<MassSolver>,
}

impl<V: FieldValue> ModeBasis<V> {
    pub fn new(modes: Vec<Field<V>>, inner: InnerProduct) -> Self {
        Self {
            modes,
            inner,
            mass: OnceCell::new(),
            solver: OnceCell::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    pub fn inner_product(&self) -> InnerProduct {
        self.inner
    }

    pub fn modes(&self) -> &[Field<V>] {
        &self.modes
    }

    pub fn get(&self, index: usize) -> Option<&Field<V>> {
        self.modes.get(index)
    }

    pub fn into_modes(self) -> Vec<Field<V>> {
        self.modes
    }

    /// Leading `count` modes as a new basis.
    pub fn truncated(&self, count: usize) -> Self {
        Self::new(
            self.modes.iter().take(count).cloned().collect(),
            self.inner,
        )
    }

    pub fn mass_matrix(&self) -> Result<&DMatrix<f64>> {
        self.mass
            .get_or_try_init(|| MassMatrixBuilder::build(&self.modes, self.inner))
    }

    pub(crate) fn mass_solver(&self) -> Result<&MassSolver> {
        self.solver
            .get_or_try_init(|| MassSolver::factorize(self.mass_matrix()?))
    }

    /// `sum_k c_k * mode_k`.
    pub fn reconstruct(&self, coefficients: &DVector<f64>) -> Result<Field<V>> {
        if coefficients.len() != self.modes.len() {
            return Err(PodError::shape_mismatch(
                "reconstruction coefficients",
                self.modes.len(),
                coefficients.len(),
            ));
        }
        let Some(first) = self.modes.first() else {
            return Err(PodError::invalid_ensemble("reconstruction from an empty basis"));
        };
        Field::linear_combination(
            first.name(),
            coefficients.iter().copied().zip(self.modes.iter()),
        )
    }
}
