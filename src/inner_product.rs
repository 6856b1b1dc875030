use serde::{Deserialize, Serialize};

use crate::error::{PodError, Result};
use crate::field::{Field, FieldValue};

/// Volume-weighted inner product used for correlation, normalization and projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InnerProduct {
    /// `sum_cells V * (a . b)`
    #[default]
    #[serde(rename = "l2")]
    L2,
    /// `sum_cells V * (grad a : grad b)`
    #[serde(rename = "h1")]
    H1Seminorm,
}

/// Per-cell quadrature values of one field: `stride` numbers per cell, cell-major.
///
/// Building it once per snapshot lets the correlation loop reuse gradients instead of
/// recomputing them for every pair.
#[derive(Debug, Clone)]
pub struct Integrand {
    values: Vec<f64>,
    stride: usize,
}

impl Integrand {
    pub fn cell_count(&self) -> usize {
        if self.stride == 0 {
            0
        } else {
            self.values.len() / self.stride
        }
    }

    /// Quadrature against `volumes`. Summation runs over cells in order, components in
    /// order within a cell, so the result does not depend on who calls it.
    pub fn weighted_dot(&self, other: &Integrand, volumes: &[f64]) -> Result<f64> {
        if self.stride != other.stride || self.values.len() != other.values.len() {
            return Err(PodError::shape_mismatch(
                "inner product operands",
                self.values.len(),
                other.values.len(),
            ));
        }
        if self.cell_count() != volumes.len() {
            return Err(PodError::shape_mismatch(
                "inner product volumes",
                volumes.len(),
                self.cell_count(),
            ));
        }
        let sum = self
            .values
            .chunks_exact(self.stride)
            .zip(other.values.chunks_exact(other.stride))
            .zip(volumes)
            .map(|((a, b), volume)| {
                let local: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                local * volume
            })
            .sum();
        Ok(sum)
    }
}

impl InnerProduct {
    pub fn integrand<V: FieldValue>(&self, field: &Field<V>) -> Result<Integrand> {
        let integrand = match self {
            InnerProduct::L2 => {
                let values = field
                    .internal()
                    .iter()
                    .flat_map(|v| (0..V::COMPONENTS).map(move |c| v.component(c)))
                    .collect();
                Integrand {
                    values,
                    stride: V::COMPONENTS,
                }
            }
            InnerProduct::H1Seminorm => {
                let gradients = field.component_gradients()?;
                let stride = 3 * V::COMPONENTS;
                let mut values = Vec::with_capacity(field.cell_count() * stride);
                for cell in 0..field.cell_count() {
                    for component in &gradients {
                        values.extend(component[cell].iter().copied());
                    }
                }
                Integrand { values, stride }
            }
        };
        Ok(integrand)
    }

    /// Weighted inner product. Boundary values only enter through gradients, so operands
    /// may carry different patch layouts.
    pub fn inner<V: FieldValue>(&self, a: &Field<V>, b: &Field<V>) -> Result<f64> {
        if a.cell_count() != b.cell_count() {
            return Err(PodError::shape_mismatch(
                "inner product operands",
                a.cell_count(),
                b.cell_count(),
            ));
        }
        self.integrand(a)?
            .weighted_dot(&self.integrand(b)?, &a.mesh().volumes)
    }

    pub fn norm<V: FieldValue>(&self, field: &Field<V>) -> Result<f64> {
        let integrand = self.integrand(field)?;
        let squared = integrand.weighted_dot(&integrand, &field.mesh().volumes)?;
        Ok(squared.max(0.0).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nalgebra::Vector3;

    use super::*;
    use crate::field::Mesh;

    #[test]
    fn scalar_inner_product_weights_by_volume() {
        let mesh = Arc::new(Mesh::from_volumes(vec![1.0, 2.0, 0.5]));
        let a = Field::new("a", Arc::clone(&mesh), vec![1.0, 2.0, 4.0]).unwrap();
        let b = Field::new("b", mesh, vec![3.0, -1.0, 2.0]).unwrap();
        let value = InnerProduct::L2.inner(&a, &b).unwrap();
        assert!((value - (3.0 - 4.0 + 4.0)).abs() < 1e-12);
        let norm = InnerProduct::L2.norm(&a).unwrap();
        assert!((norm - (1.0f64 + 8.0 + 8.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn vector_inner_product_dots_before_weighting() {
        let mesh = Arc::new(Mesh::from_volumes(vec![2.0, 3.0]));
        let a = Field::new(
            "U",
            Arc::clone(&mesh),
            vec![Vector3::new(1.0, 2.0, 0.0), Vector3::new(0.0, 0.0, 1.0)],
        )
        .unwrap();
        let b = Field::new(
            "U",
            mesh,
            vec![Vector3::new(1.0, 1.0, 5.0), Vector3::new(2.0, 0.0, 4.0)],
        )
        .unwrap();
        let value = InnerProduct::L2.inner(&a, &b).unwrap();
        assert!((value - (2.0 * 3.0 + 3.0 * 4.0)).abs() < 1e-12);
    }

    #[test]
    fn boundary_layouts_do_not_affect_l2() {
        let mesh = Arc::new(Mesh::from_volumes(vec![1.0, 1.0]));
        let a = Field::new("a", Arc::clone(&mesh), vec![1.0, 2.0])
            .unwrap()
            .with_boundary("inlet", vec![10.0])
            .unwrap();
        let b = Field::new("b", mesh, vec![1.0, 2.0]).unwrap();
        assert_eq!(
            InnerProduct::L2.inner(&a, &b).unwrap(),
            InnerProduct::L2.inner(&b, &b).unwrap()
        );
    }

    #[test]
    fn mismatched_cell_counts_fail() {
        let a = Field::uniform("a", Arc::new(Mesh::from_volumes(vec![1.0; 2])), 1.0);
        let b = Field::uniform("b", Arc::new(Mesh::from_volumes(vec![1.0; 3])), 1.0);
        assert!(matches!(
            InnerProduct::L2.inner(&a, &b),
            Err(PodError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn h1_seminorm_of_linear_profile() {
        let n = 8;
        let dx = 0.125;
        let mesh = Arc::new(Mesh::cartesian([n, 1, 1], [dx, 1.0, 1.0]));
        let values: Vec<f64> = mesh.centres.iter().map(|c| 3.0 * c.x).collect();
        let field = Field::new("T", Arc::clone(&mesh), values)
            .unwrap()
            .with_boundary("left", vec![0.0])
            .unwrap()
            .with_boundary("right", vec![3.0])
            .unwrap();
        let seminorm = InnerProduct::H1Seminorm.norm(&field).unwrap();
        // |grad T|^2 = 9 over a unit volume
        assert!((seminorm - 3.0).abs() < 1e-10, "seminorm {seminorm}");

        let constant = Field::uniform("T", mesh, 7.0);
        assert!(InnerProduct::H1Seminorm.norm(&constant).unwrap() < 1e-12);
    }

    #[test]
    fn integrand_layout_matches_components() {
        let mesh = Arc::new(Mesh::cartesian([2, 2, 1], [1.0, 1.0, 1.0]));
        let field = Field::uniform("U", mesh, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(InnerProduct::L2.integrand(&field).unwrap().cell_count(), 4);
        assert_eq!(InnerProduct::H1Seminorm.integrand(&field).unwrap().cell_count(), 4);
    }
}
