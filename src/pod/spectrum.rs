use ndarray::Array1;

/// Eigenvalue spectrum of a snapshot ensemble and the energy captured by each prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergySpectrum {
    /// Clamped eigenvalues, descending, over the full ensemble.
    pub eigenvalues: Array1<f64>,
    /// `cumulative[k]` is the fraction of total energy held by modes `0..=k`.
    pub cumulative: Array1<f64>,
    pub total: f64,
}

impl EnergySpectrum {
    /// `eigenvalues` must already be sorted descending and non-negative.
    pub fn from_eigenvalues(eigenvalues: Vec<f64>) -> Self {
        let total: f64 = eigenvalues.iter().sum();
        let cumulative = if total > 0.0 {
            let mut running = 0.0;
            eigenvalues
                .iter()
                .map(|value| {
                    running += value;
                    running / total
                })
                .collect()
        } else {
            // nothing to capture: every prefix already holds all of it
            vec![1.0; eigenvalues.len()]
        };
        Self {
            eigenvalues: Array1::from(eigenvalues),
            cumulative: Array1::from(cumulative),
            total,
        }
    }

    pub(crate) fn from_parts(eigenvalues: Vec<f64>, cumulative: Vec<f64>) -> Self {
        let total = eigenvalues.iter().sum();
        Self {
            eigenvalues: Array1::from(eigenvalues),
            cumulative: Array1::from(cumulative),
            total,
        }
    }

    pub fn len(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty()
    }

    /// Energy fraction held by the leading `modes` modes.
    pub fn captured(&self, modes: usize) -> f64 {
        match modes {
            0 => 0.0,
            k => self.cumulative[k.min(self.len()) - 1],
        }
    }

    /// Smallest mode count whose cumulative energy reaches `fraction`.
    pub fn modes_for_energy(&self, fraction: f64) -> usize {
        if fraction <= 0.0 {
            return 0;
        }
        self.cumulative
            .iter()
            .position(|captured| *captured >= fraction)
            .map(|idx| idx + 1)
            .unwrap_or(self.len())
    }
}
