//! Method-of-snapshots POD: correlation, eigendecomposition, normalization and projection,
//! plus the cache-aware workflow that strings them together.

pub mod basis;
pub mod correlation;
pub mod decomposition;
pub mod mass_matrix;
pub mod normalization;
pub mod projection;
pub mod spectrum;
pub mod workflow;

pub use basis::ModeBasis;
pub use correlation::CorrelationMatrixBuilder;
pub use decomposition::{Decomposition, EigenPair, SpectralDecomposer};
pub use mass_matrix::MassMatrixBuilder;
pub use normalization::ModeNormalizer;
pub use projection::ProjectionEngine;
pub use spectrum::EnergySpectrum;
pub use workflow::{
    FamilyEvent, FamilyState, ModeOrigin, ModeRequest, PairedPodResult, PodConfig, PodResult,
    PodWorkflow,
};
