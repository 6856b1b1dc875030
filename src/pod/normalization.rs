use log::debug;

use crate::error::{PodError, Result};
use crate::field::{Field, FieldValue};
use crate::inner_product::InnerProduct;

/// Rescales modes to unit norm under an inner product.
///
/// A mode whose norm is not above `sqrt(EPSILON)` times the largest norm of its basis has
/// collapsed (zero eigenvalue); it is left unscaled instead of being divided by round-off.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeNormalizer {
    inner: InnerProduct,
}

impl ModeNormalizer {
    pub fn new(inner: InnerProduct) -> Self {
        Self { inner }
    }

    /// Returns the norms the modes had before scaling.
    pub fn normalize<V: FieldValue>(&self, modes: &mut [Field<V>]) -> Result<Vec<f64>> {
        let norms = self.norms(modes)?;
        let floor = norm_floor(&norms);
        for (idx, (mode, norm)) in modes.iter_mut().zip(&norms).enumerate() {
            if is_collapsed(*norm, floor) {
                debug!(
                    "Mode {} of '{}' collapsed (norm {:e}), left unscaled",
                    idx,
                    mode.name(),
                    norm
                );
                continue;
            }
            mode.scale_in_place(1.0 / norm);
        }
        Ok(norms)
    }

    /// Divides `primary[k]` and `secondary[k]` by the norm of `primary[k]`.
    pub fn normalize_paired<V: FieldValue, W: FieldValue>(
        &self,
        primary: &mut [Field<V>],
        secondary: &mut [Field<W>],
    ) -> Result<Vec<f64>> {
        if primary.len() != secondary.len() {
            return Err(PodError::shape_mismatch(
                "paired mode normalization",
                primary.len(),
                secondary.len(),
            ));
        }
        let norms = self.norms(primary)?;
        let floor = norm_floor(&norms);
        for (idx, ((p, s), norm)) in primary
            .iter_mut()
            .zip(secondary.iter_mut())
            .zip(&norms)
            .enumerate()
        {
            if is_collapsed(*norm, floor) {
                debug!(
                    "Paired mode {} of '{}' collapsed (norm {:e}), left unscaled",
                    idx,
                    p.name(),
                    norm
                );
                continue;
            }
            p.scale_in_place(1.0 / norm);
            s.scale_in_place(1.0 / norm);
        }
        Ok(norms)
    }

    fn norms<V: FieldValue>(&self, modes: &[Field<V>]) -> Result<Vec<f64>> {
        modes.iter().map(|mode| self.inner.norm(mode)).collect()
    }
}

fn norm_floor(norms: &[f64]) -> f64 {
    let largest = norms
        .iter()
        .copied()
        .filter(|n| n.is_finite())
        .fold(0.0f64, f64::max);
    largest * f64::EPSILON.sqrt()
}

fn is_collapsed(norm: f64, floor: f64) -> bool {
    !norm.is_finite() || norm <= 0.0 || norm <= floor
}
