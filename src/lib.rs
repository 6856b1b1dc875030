pub mod cache;
pub mod ensemble;
pub mod error;
pub mod field;
pub mod inner_product;
pub mod matrix_io;
pub mod pod;
pub mod utilities;

pub use cache::{CachedMeta, CachedModes, ModeCache, ModeFamily};
pub use ensemble::SnapshotEnsemble;
pub use error::{PodError, Result};
pub use field::{
    Field, FieldKind, FieldLoader, FieldValue, FieldWriter, Mesh, ScalarField, SnapshotWindow,
    VectorField,
};
pub use inner_product::InnerProduct;
pub use matrix_io::{MatrixExporter, MatrixFormat};
pub use pod::{
    CorrelationMatrixBuilder, EnergySpectrum, MassMatrixBuilder, ModeBasis, ModeNormalizer,
    ModeRequest, PairedPodResult, PodConfig, PodResult, PodWorkflow, ProjectionEngine,
    SpectralDecomposer,
};
