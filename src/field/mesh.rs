use indexmap::IndexMap;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{PodError, Result};

/// Face shared by two cells. `area` points from `owner` to `neighbour`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalFace {
    pub owner: usize,
    pub neighbour: usize,
    pub area: Vector3<f64>,
    /// Weight of the owner value when interpolating to the face.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// Face on the domain boundary, `area` points out of the domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryFace {
    pub owner: usize,
    pub area: Vector3<f64>,
}

fn default_weight() -> f64 {
    0.5
}

/// Finite-volume discretization shared by every field of a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub volumes: Vec<f64>,
    #[serde(default)]
    pub centres: Vec<Vector3<f64>>,
    #[serde(default)]
    pub faces: Vec<InternalFace>,
    #[serde(default)]
    pub patches: IndexMap<String, Vec<BoundaryFace>>,
}

impl Mesh {
    /// Mesh without connectivity: enough for L2 quadrature, gradients vanish.
    pub fn from_volumes(volumes: Vec<f64>) -> Self {
        let centres = (0..volumes.len())
            .map(|i| Vector3::new(i as f64, 0.0, 0.0))
            .collect();
        Self {
            volumes,
            centres,
            faces: Vec::new(),
            patches: IndexMap::new(),
        }
    }

    /// Structured box of `dims` cells with uniform `spacing`.
    ///
    /// Cells are numbered x-fastest. Boundary patches are named `left`/`right` (x),
    /// `bottom`/`top` (y) and `back`/`front` (z).
    pub fn cartesian(dims: [usize; 3], spacing: [f64; 3]) -> Self {
        let [nx, ny, nz] = dims;
        let [dx, dy, dz] = spacing;
        let index = |i: usize, j: usize, k: usize| i + nx * (j + ny * k);
        let cells = nx * ny * nz;

        let mut centres = Vec::with_capacity(cells);
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    centres.push(Vector3::new(
                        (i as f64 + 0.5) * dx,
                        (j as f64 + 0.5) * dy,
                        (k as f64 + 0.5) * dz,
                    ));
                }
            }
        }

        let ax = Vector3::new(dy * dz, 0.0, 0.0);
        let ay = Vector3::new(0.0, dx * dz, 0.0);
        let az = Vector3::new(0.0, 0.0, dx * dy);

        let mut faces = Vec::new();
        let mut patches: IndexMap<String, Vec<BoundaryFace>> = IndexMap::new();
        for name in ["left", "right", "bottom", "top", "back", "front"] {
            patches.insert(name.to_string(), Vec::new());
        }

        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let cell = index(i, j, k);
                    let neighbours = [
                        (i + 1 < nx, ax, "left", "right", i == 0),
                        (j + 1 < ny, ay, "bottom", "top", j == 0),
                        (k + 1 < nz, az, "back", "front", k == 0),
                    ];
                    for (axis, (has_next, area, low, high, at_low)) in
                        neighbours.into_iter().enumerate()
                    {
                        if at_low {
                            patches[low].push(BoundaryFace {
                                owner: cell,
                                area: -area,
                            });
                        }
                        if has_next {
                            let neighbour = match axis {
                                0 => index(i + 1, j, k),
                                1 => index(i, j + 1, k),
                                _ => index(i, j, k + 1),
                            };
                            faces.push(InternalFace {
                                owner: cell,
                                neighbour,
                                area,
                                weight: 0.5,
                            });
                        } else {
                            patches[high].push(BoundaryFace { owner: cell, area });
                        }
                    }
                }
            }
        }

        Self {
            volumes: vec![dx * dy * dz; cells],
            centres,
            faces,
            patches,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.volumes.len()
    }

    pub fn total_volume(&self) -> f64 {
        self.volumes.iter().sum()
    }

    pub fn patch_size(&self, patch: &str) -> Option<usize> {
        self.patches.get(patch).map(Vec::len)
    }

    /// Checks that every face references an existing cell.
    pub fn validate(&self) -> Result<()> {
        let cells = self.cell_count();
        if !self.centres.is_empty() && self.centres.len() != cells {
            return Err(PodError::shape_mismatch(
                "mesh cell centres",
                cells,
                self.centres.len(),
            ));
        }
        let max_face_cell = self
            .faces
            .iter()
            .flat_map(|face| [face.owner, face.neighbour])
            .chain(
                self.patches
                    .values()
                    .flat_map(|faces| faces.iter().map(|face| face.owner)),
            )
            .max();
        if let Some(max) = max_face_cell {
            if max >= cells {
                return Err(PodError::shape_mismatch(
                    "mesh face addressing",
                    cells,
                    max + 1,
                ));
            }
        }
        Ok(())
    }

    /// Green-Gauss cell gradient of one scalar component.
    ///
    /// A boundary face takes its value from `boundary` when the patch is present with the
    /// right length, otherwise from the owner cell (zero normal gradient). Meshes with
    /// faces addressing missing cells are rejected rather than indexed.
    pub fn gauss_gradient(
        &self,
        values: &[f64],
        boundary: &IndexMap<String, Vec<f64>>,
    ) -> Result<Vec<Vector3<f64>>> {
        if values.len() != self.cell_count() {
            return Err(PodError::shape_mismatch(
                "gradient cell values",
                self.cell_count(),
                values.len(),
            ));
        }
        self.validate()?;
        let mut gradient = vec![Vector3::zeros(); self.cell_count()];

        for face in &self.faces {
            let face_value =
                face.weight * values[face.owner] + (1.0 - face.weight) * values[face.neighbour];
            let flux = face.area * face_value;
            gradient[face.owner] += flux;
            gradient[face.neighbour] -= flux;
        }

        for (name, faces) in &self.patches {
            let patch_values = boundary
                .get(name)
                .filter(|patch| patch.len() == faces.len());
            for (idx, face) in faces.iter().enumerate() {
                let face_value = match patch_values {
                    Some(patch) => patch[idx],
                    None => values[face.owner],
                };
                gradient[face.owner] += face.area * face_value;
            }
        }

        for (grad, volume) in gradient.iter_mut().zip(&self.volumes) {
            if *volume > 0.0 {
                *grad /= *volume;
            }
        }
        Ok(gradient)
    }
}
