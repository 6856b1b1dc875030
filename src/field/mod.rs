pub mod construction;
pub mod mesh;
pub mod model;
pub mod serialization;

pub use construction::{FieldLoader, SnapshotWindow};
pub use mesh::{BoundaryFace, InternalFace, Mesh};
pub use model::{Field, FieldKind, FieldValue, RawField, ScalarField, VectorField};
pub use serialization::FieldWriter;
