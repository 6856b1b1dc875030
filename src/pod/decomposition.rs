use std::cmp::Ordering;

use log::debug;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rayon::prelude::*;

use crate::ensemble::SnapshotEnsemble;
use crate::error::{PodError, Result};
use crate::field::{Field, FieldValue};
use crate::pod::spectrum::EnergySpectrum;

#[derive(Debug, Clone, PartialEq)]
pub struct EigenPair {
    /// Clamped to be non-negative.
    pub value: f64,
    pub vector: DVector<f64>,
    /// Column of the eigenvector in the raw decomposition.
    pub index: usize,
}

/// Unnormalized modes together with the spectrum they were drawn from.
#[derive(Debug, Clone)]
pub struct Decomposition<V> {
    pub modes: Vec<Field<V>>,
    /// Retained pairs, `modes[k]` is lifted from `pairs[k]`.
    pub pairs: Vec<EigenPair>,
    pub spectrum: EnergySpectrum,
}

pub struct SpectralDecomposer;

impl SpectralDecomposer {
    /// Eigenpairs of a symmetric correlation matrix, descending, ties by ascending index.
    pub fn eigenpairs(correlation: &DMatrix<f64>) -> Result<Vec<EigenPair>> {
        if correlation.nrows() != correlation.ncols() {
            return Err(PodError::shape_mismatch(
                "correlation matrix columns",
                correlation.nrows(),
                correlation.ncols(),
            ));
        }
        if correlation.is_empty() {
            return Ok(Vec::new());
        }

        let symmetric = 0.5 * (correlation + correlation.transpose());
        let eigen = SymmetricEigen::new(symmetric);

        let mut clamped = 0usize;
        let mut most_negative = 0.0f64;
        let mut pairs: Vec<EigenPair> = eigen
            .eigenvalues
            .iter()
            .enumerate()
            .map(|(index, &raw)| {
                if raw < 0.0 {
                    clamped += 1;
                    most_negative = most_negative.min(raw);
                }
                EigenPair {
                    value: raw.max(0.0),
                    vector: eigen.eigenvectors.column(index).into_owned(),
                    index,
                }
            })
            .collect();
        if clamped > 0 {
            debug!(
                "Clamped {} negative eigenvalues to zero (most negative {:e})",
                clamped, most_negative
            );
        }

        pairs.sort_by(|a, b| match b.value.partial_cmp(&a.value) {
            Some(Ordering::Equal) | None => a.index.cmp(&b.index),
            Some(order) => order,
        });
        Ok(pairs)
    }

    /// Number of modes materialized for a request; `0` asks for all of them.
    pub fn retained_count(requested: usize, available: usize) -> usize {
        if requested == 0 {
            available
        } else {
            requested.min(available)
        }
    }

    pub fn decompose<V: FieldValue>(
        ensemble: &SnapshotEnsemble<V>,
        correlation: &DMatrix<f64>,
        requested: usize,
    ) -> Result<Decomposition<V>> {
        if correlation.nrows() != ensemble.len() {
            return Err(PodError::shape_mismatch(
                "correlation matrix order",
                ensemble.len(),
                correlation.nrows(),
            ));
        }
        let mut pairs = Self::eigenpairs(correlation)?;
        let spectrum = EnergySpectrum::from_eigenvalues(pairs.iter().map(|p| p.value).collect());

        let retained = Self::retained_count(requested, ensemble.len());
        pairs.truncate(retained);
        let modes = Self::lift(ensemble, &pairs)?;
        debug!(
            "Retained {} of {} modes of '{}' ({:.4} of the energy)",
            retained,
            ensemble.len(),
            ensemble.field_name(),
            spectrum.captured(retained)
        );

        Ok(Decomposition {
            modes,
            pairs,
            spectrum,
        })
    }

    /// `mode_k = sum_i v_k[i] * s_i` over the whole ensemble, for each pair.
    pub fn lift<V: FieldValue>(
        ensemble: &SnapshotEnsemble<V>,
        pairs: &[EigenPair],
    ) -> Result<Vec<Field<V>>> {
        if let Some(pair) = pairs.iter().find(|p| p.vector.len() != ensemble.len()) {
            return Err(PodError::shape_mismatch(
                "eigenvector length",
                ensemble.len(),
                pair.vector.len(),
            ));
        }
        let name = ensemble.field_name();
        pairs
            .par_iter()
            .map(|pair| {
                Field::linear_combination(
                    name,
                    pair.vector.iter().copied().zip(ensemble.iter()),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eigenpairs_sorted_descending_and_clamped() {
        // eigenvalues 3, 1, 0 up to round-off
        let c = DMatrix::from_row_slice(3, 3, &[1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 2.0]);
        let pairs = SpectralDecomposer::eigenpairs(&c).unwrap();
        assert_eq!(pairs.len(), 3);
        assert!((pairs[0].value - 3.0).abs() < 1e-10);
        assert!((pairs[1].value - 1.0).abs() < 1e-10);
        assert!(pairs[2].value >= 0.0 && pairs[2].value < 1e-10);
    }

    #[test]
    fn negative_eigenvalues_become_zero() {
        let c = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -1e-14]);
        let pairs = SpectralDecomposer::eigenpairs(&c).unwrap();
        assert_eq!(pairs[1].value, 0.0);
    }

    #[test]
    fn ties_keep_original_order() {
        let c = DMatrix::<f64>::identity(4, 4);
        let pairs = SpectralDecomposer::eigenpairs(&c).unwrap();
        let order: Vec<usize> = pairs.iter().map(|p| p.index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn retained_count_clamps() {
        assert_eq!(SpectralDecomposer::retained_count(0, 5), 5);
        assert_eq!(SpectralDecomposer::retained_count(3, 5), 3);
        assert_eq!(SpectralDecomposer::retained_count(100, 5), 5);
    }

    #[test]
    fn rectangular_input_is_rejected() {
        let c = DMatrix::<f64>::zeros(2, 3);
        assert!(matches!(
            SpectralDecomposer::eigenpairs(&c),
            Err(PodError::ShapeMismatch { .. })
        ));
    }
}
