use std::fmt::Debug;
use std::ops::{Add, Mul, Sub};
use std::sync::Arc;

use indexmap::IndexMap;
use nalgebra::Vector3;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{PodError, Result};
use crate::field::mesh::Mesh;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Scalar,
    Vector,
}

/// Per-cell value of a field. Everything the POD needs from a value shape lives here.
pub trait FieldValue:
    Copy
    + Debug
    + PartialEq
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<f64, Output = Self>
    + 'static
{
    const KIND: FieldKind;
    const COMPONENTS: usize;

    fn zero() -> Self;

    fn component(&self, index: usize) -> f64;
}

impl FieldValue for f64 {
    const KIND: FieldKind = FieldKind::Scalar;
    const COMPONENTS: usize = 1;

    fn zero() -> Self {
        0.0
    }

    fn component(&self, _index: usize) -> f64 {
        *self
    }
}

impl FieldValue for Vector3<f64> {
    const KIND: FieldKind = FieldKind::Vector;
    const COMPONENTS: usize = 3;

    fn zero() -> Self {
        Vector3::zeros()
    }

    fn component(&self, index: usize) -> f64 {
        self[index]
    }
}

/// On-disk shape of a field; the mesh is stored once per case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "V: FieldValue")]
pub struct RawField<V> {
    pub name: String,
    pub kind: FieldKind,
    pub internal: Vec<V>,
    #[serde(default)]
    pub boundary: IndexMap<String, Vec<V>>,
}

/// Cell-centred field over a shared mesh.
#[derive(Debug, Clone)]
pub struct Field<V> {
    name: String,
    mesh: Arc<Mesh>,
    internal: Vec<V>,
    boundary: IndexMap<String, Vec<V>>,
}

pub type ScalarField = Field<f64>;
pub type VectorField = Field<Vector3<f64>>;

impl<V: FieldValue> Field<V> {
    pub fn new(name: impl Into<String>, mesh: Arc<Mesh>, internal: Vec<V>) -> Result<Self> {
        if internal.len() != mesh.cell_count() {
            return Err(PodError::shape_mismatch(
                "field internal values",
                mesh.cell_count(),
                internal.len(),
            ));
        }
        Ok(Self {
            name: name.into(),
            mesh,
            internal,
            boundary: IndexMap::new(),
        })
    }

    pub fn uniform(name: impl Into<String>, mesh: Arc<Mesh>, value: V) -> Self {
        let internal = vec![value; mesh.cell_count()];
        Self {
            name: name.into(),
            mesh,
            internal,
            boundary: IndexMap::new(),
        }
    }

    pub(crate) fn from_raw(raw: RawField<V>, mesh: Arc<Mesh>) -> Result<Self> {
        let mut field = Self::new(raw.name, mesh, raw.internal)?;
        for (patch, values) in raw.boundary {
            field = field.with_boundary(patch, values)?;
        }
        Ok(field)
    }

    pub(crate) fn to_raw(&self) -> RawField<V> {
        RawField {
            name: self.name.clone(),
            kind: V::KIND,
            internal: self.internal.clone(),
            boundary: self.boundary.clone(),
        }
    }

    /// Attaches face values to a patch. Patches unknown to the mesh are kept as-is.
    pub fn with_boundary(mut self, patch: impl Into<String>, values: Vec<V>) -> Result<Self> {
        let patch = patch.into();
        if let Some(expected) = self.mesh.patch_size(&patch) {
            if expected != values.len() {
                return Err(PodError::shape_mismatch(
                    format!("boundary patch '{patch}'"),
                    expected,
                    values.len(),
                ));
            }
        }
        self.boundary.insert(patch, values);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn kind(&self) -> FieldKind {
        V::KIND
    }

    pub fn cell_count(&self) -> usize {
        self.internal.len()
    }

    pub fn internal(&self) -> &[V] {
        &self.internal
    }

    pub fn internal_mut(&mut self) -> &mut [V] {
        &mut self.internal
    }

    pub fn boundary(&self) -> &IndexMap<String, Vec<V>> {
        &self.boundary
    }

    pub fn scale_in_place(&mut self, factor: f64) {
        self.internal.iter_mut().for_each(|v| *v = *v * factor);
        for values in self.boundary.values_mut() {
            values.iter_mut().for_each(|v| *v = *v * factor);
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        let mut scaled = self.clone();
        scaled.scale_in_place(factor);
        scaled
    }

    /// `self - other`, keeping `self`'s name.
    pub fn difference(&self, other: &Self) -> Result<Self> {
        Self::linear_combination(self.name.clone(), [(1.0, self), (-1.0, other)])
    }

    /// `sum_i c_i f_i` over the first term's mesh.
    ///
    /// Every mesh patch carried by any term is carried by the result. A term without that
    /// patch contributes its owner-cell values, which is the face value the gradient would
    /// use for it, so gradients stay linear in the terms. Patches unknown to the mesh only
    /// accumulate terms that carry them with the same length.
    pub fn linear_combination<'a, I>(name: impl Into<String>, terms: I) -> Result<Self>
    where
        I: IntoIterator<Item = (f64, &'a Field<V>)>,
    {
        let terms: Vec<(f64, &Field<V>)> = terms.into_iter().collect();
        let Some(&(_, template)) = terms.first() else {
            return Err(PodError::invalid_ensemble(
                "linear combination of zero fields",
            ));
        };
        let cells = template.cell_count();
        if let Some((_, odd)) = terms.iter().find(|(_, f)| f.cell_count() != cells) {
            return Err(PodError::shape_mismatch(
                "linear combination",
                cells,
                odd.cell_count(),
            ));
        }
        let mesh = Arc::clone(&template.mesh);
        mesh.validate()?;

        let mut internal = vec![V::zero(); cells];
        for (coeff, field) in &terms {
            internal
                .iter_mut()
                .zip(&field.internal)
                .for_each(|(acc, v)| *acc = *acc + *v * *coeff);
        }

        let mut boundary: IndexMap<String, Vec<V>> = IndexMap::new();
        for (_, field) in &terms {
            for (patch, values) in &field.boundary {
                if !boundary.contains_key(patch) {
                    let width = mesh.patch_size(patch).unwrap_or(values.len());
                    boundary.insert(patch.clone(), vec![V::zero(); width]);
                }
            }
        }
        for (patch, acc_values) in boundary.iter_mut() {
            match mesh.patches.get(patch) {
                Some(faces) => {
                    for (coeff, field) in &terms {
                        let carried = field
                            .boundary
                            .get(patch)
                            .filter(|values| values.len() == faces.len());
                        for (idx, (acc, face)) in acc_values.iter_mut().zip(faces).enumerate() {
                            let value = match carried {
                                Some(values) => values[idx],
                                None => field.internal[face.owner],
                            };
                            *acc = *acc + value * *coeff;
                        }
                    }
                }
                None => {
                    for (coeff, field) in &terms {
                        let Some(values) = field.boundary.get(patch) else {
                            continue;
                        };
                        if values.len() != acc_values.len() {
                            continue;
                        }
                        acc_values
                            .iter_mut()
                            .zip(values)
                            .for_each(|(acc, v)| *acc = *acc + *v * *coeff);
                    }
                }
            }
        }

        Ok(Self {
            name: name.into(),
            mesh,
            internal,
            boundary,
        })
    }

    /// Values of one component, internal and per patch.
    pub fn component(&self, index: usize) -> (Vec<f64>, IndexMap<String, Vec<f64>>) {
        let internal = self.internal.iter().map(|v| v.component(index)).collect();
        let boundary = self
            .boundary
            .iter()
            .map(|(patch, values)| {
                (
                    patch.clone(),
                    values.iter().map(|v| v.component(index)).collect(),
                )
            })
            .collect();
        (internal, boundary)
    }

    /// Green-Gauss gradient of every component, `result[component][cell]`.
    pub fn component_gradients(&self) -> Result<Vec<Vec<Vector3<f64>>>> {
        (0..V::COMPONENTS)
            .map(|index| {
                let (internal, boundary) = self.component(index);
                self.mesh.gauss_gradient(&internal, &boundary)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_mesh() -> Arc<Mesh> {
        Arc::new(Mesh::from_volumes(vec![1.0, 2.0, 3.0]))
    }

    #[test]
    fn new_rejects_wrong_cell_count() {
        let err = Field::new("p", line_mesh(), vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            PodError::ShapeMismatch {
                expected: 3,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn linear_combination_accumulates_internal_and_shared_patches() {
        let mesh = line_mesh();
        let a = Field::new("a", Arc::clone(&mesh), vec![1.0, 0.0, 2.0])
            .unwrap()
            .with_boundary("inlet", vec![1.0])
            .unwrap();
        let b = Field::new("b", Arc::clone(&mesh), vec![0.0, 1.0, 1.0])
            .unwrap()
            .with_boundary("inlet", vec![4.0])
            .unwrap();
        let c = Field::new("c", mesh, vec![1.0, 1.0, 1.0]).unwrap();

        let combined = Field::linear_combination("mode", [(2.0, &a), (0.5, &b), (-1.0, &c)])
            .expect("combination");
        assert_eq!(combined.name(), "mode");
        assert_eq!(combined.internal(), &[1.0, -0.5, 3.5]);
        assert_eq!(combined.boundary()["inlet"], vec![4.0]);
    }

    #[test]
    fn missing_patches_contribute_owner_values() {
        let mesh = Arc::new(Mesh::cartesian([2, 1, 1], [1.0, 1.0, 1.0]));
        let a = Field::new("a", Arc::clone(&mesh), vec![1.0, 2.0]).unwrap();
        let b = Field::new("b", Arc::clone(&mesh), vec![3.0, 5.0])
            .unwrap()
            .with_boundary("left", vec![10.0])
            .unwrap();

        let combined = Field::linear_combination("mode", [(2.0, &a), (-1.0, &b)]).unwrap();
        // 2 * owner(a) - left(b)
        assert_eq!(combined.boundary()["left"], vec![2.0 * 1.0 - 10.0]);
        assert!(!combined.boundary().contains_key("right"));

        let expected: Vec<Vec<Vector3<f64>>> = {
            let ga = a.component_gradients().unwrap();
            let gb = b.component_gradients().unwrap();
            vec![
                ga[0]
                    .iter()
                    .zip(&gb[0])
                    .map(|(x, y)| x * 2.0 - y)
                    .collect(),
            ]
        };
        let actual = combined.component_gradients().unwrap();
        for (x, y) in actual[0].iter().zip(&expected[0]) {
            assert!((x - y).norm() < 1e-12, "{x:?} vs {y:?}");
        }
    }

    #[test]
    fn vector_values_scale_componentwise() {
        let mesh = Arc::new(Mesh::from_volumes(vec![1.0]));
        let field = Field::new("U", mesh, vec![Vector3::new(1.0, -2.0, 0.5)]).unwrap();
        let scaled = field.scaled(2.0);
        assert_eq!(scaled.internal()[0], Vector3::new(2.0, -4.0, 1.0));
        assert_eq!(scaled.kind(), FieldKind::Vector);
    }
}
