use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{IoContext, PodError, Result};
use crate::field::{Field, FieldKind, FieldLoader, FieldValue, FieldWriter, Mesh};
use crate::inner_product::InnerProduct;
use crate::matrix_io::{read_scalars, write_scalars};
use crate::pod::EnergySpectrum;

pub const DEFAULT_OUTPUT_ROOT: &str = "ITHACAoutput";
pub const CACHE_VERSION: u32 = 2;
const EIGENVALUES_PREFIX: &str = "Eigenvalues_";
const CUMULATIVE_PREFIX: &str = "CumEigenvalues_";
const META_SUFFIX: &str = "_meta.json";

/// Families of persisted modes, each in its own folder under the output root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeFamily {
    Pod,
    Supremizer,
}

impl ModeFamily {
    pub fn subdir(self) -> &'static str {
        match self {
            Self::Pod => "POD",
            Self::Supremizer => "supremizer",
        }
    }
}

/// Written after every other artifact of a field, so its presence marks a complete store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedMeta {
    pub version: u32,
    pub field: String,
    pub kind: FieldKind,
    /// Inner product the modes were normalized in.
    pub inner_product: InnerProduct,
    pub mode_count: usize,
    pub cell_count: usize,
    pub spectrum_len: usize,
    /// blake3 digest of each mode file, in mode order.
    pub digests: Vec<String>,
}

/// A located, version-compatible cache entry for one field of one family.
#[derive(Debug, Clone)]
pub struct CachedModes {
    dir: PathBuf,
    meta_path: PathBuf,
    meta: CachedMeta,
}

impl CachedModes {
    pub fn meta(&self) -> &CachedMeta {
        &self.meta
    }

    pub fn mode_count(&self) -> usize {
        self.meta.mode_count
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Persisted modes and spectra under an explicit output root.
#[derive(Debug, Clone)]
pub struct ModeCache {
    root: PathBuf,
}

impl Default for ModeCache {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_ROOT)
    }
}

impl ModeCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn family_dir(&self, family: ModeFamily) -> PathBuf {
        self.root.join(family.subdir())
    }

    pub fn has_family(&self, family: ModeFamily) -> bool {
        self.family_dir(family).is_dir()
    }

    pub fn mode_path(&self, family: ModeFamily, field: &str, index: usize) -> PathBuf {
        mode_path(&self.family_dir(family), field, index)
    }

    pub fn eigenvalues_path(&self, family: ModeFamily, field: &str) -> PathBuf {
        self.family_dir(family)
            .join(format!("{EIGENVALUES_PREFIX}{field}"))
    }

    pub fn cumulative_path(&self, family: ModeFamily, field: &str) -> PathBuf {
        self.family_dir(family)
            .join(format!("{CUMULATIVE_PREFIX}{field}"))
    }

    fn meta_path(&self, family: ModeFamily, field: &str) -> PathBuf {
        self.family_dir(family).join(format!("{field}{META_SUFFIX}"))
    }

    /// `Ok(None)` when nothing usable was stored for `field`. A stale version, or modes
    /// normalized in another inner product than `inner`, are ignored.
    pub fn probe(
        &self,
        family: ModeFamily,
        field: &str,
        inner: InnerProduct,
    ) -> Result<Option<CachedModes>> {
        let meta_path = self.meta_path(family, field);
        if !meta_path.is_file() {
            return Ok(None);
        }
        let file = File::open(&meta_path).at_path(&meta_path)?;
        let meta: CachedMeta = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| PodError::cache_corrupt(&meta_path, err.to_string()))?;
        if meta.version != CACHE_VERSION {
            warn!(
                "Ignoring cached {} modes of '{}' written by version {} (current {})",
                family.subdir(),
                field,
                meta.version,
                CACHE_VERSION
            );
            return Ok(None);
        }
        if meta.inner_product != inner {
            warn!(
                "Ignoring cached {} modes of '{}' normalized in {:?} ({:?} requested)",
                family.subdir(),
                field,
                meta.inner_product,
                inner
            );
            return Ok(None);
        }
        if meta.field != field {
            return Err(PodError::cache_corrupt(
                &meta_path,
                format!("meta describes '{}'", meta.field),
            ));
        }
        if meta.digests.len() != meta.mode_count || meta.mode_count > meta.spectrum_len {
            return Err(PodError::cache_corrupt(
                &meta_path,
                format!(
                    "{} modes, {} digests, spectrum of {}",
                    meta.mode_count,
                    meta.digests.len(),
                    meta.spectrum_len
                ),
            ));
        }
        Ok(Some(CachedModes {
            dir: self.family_dir(family),
            meta_path,
            meta,
        }))
    }

    /// Writes modes, spectrum and finally the meta record of `field`. `inner` is the inner
    /// product `modes` were normalized in.
    pub fn store<V: FieldValue>(
        &self,
        family: ModeFamily,
        field: &str,
        modes: &[Field<V>],
        spectrum: &EnergySpectrum,
        inner: InnerProduct,
    ) -> Result<CachedModes> {
        let dir = self.family_dir(family);
        let meta_path = self.meta_path(family, field);
        // an interrupted store must read as absent, not as the previous record
        if meta_path.exists() {
            fs::remove_file(&meta_path).at_path(&meta_path)?;
        }
        fs::create_dir_all(&dir).at_path(&dir)?;

        let cell_count = modes.first().map_or(0, Field::cell_count);
        let mut digests = Vec::with_capacity(modes.len());
        for (idx, mode) in modes.iter().enumerate() {
            if mode.cell_count() != cell_count {
                return Err(PodError::shape_mismatch(
                    format!("mode {} of '{field}' cell count", idx + 1),
                    cell_count,
                    mode.cell_count(),
                ));
            }
            let mut named = mode.clone();
            named.rename(field);
            let json = FieldWriter::to_json_string(&named)?;
            let path = mode_path(&dir, field, idx);
            write_bytes(&path, json.as_bytes())?;
            digests.push(blake3::hash(json.as_bytes()).to_hex().to_string());
        }

        write_scalars(
            &self.eigenvalues_path(family, field),
            spectrum.eigenvalues.iter().copied(),
        )?;
        write_scalars(
            &self.cumulative_path(family, field),
            spectrum.cumulative.iter().copied(),
        )?;

        let meta = CachedMeta {
            version: CACHE_VERSION,
            field: field.to_string(),
            kind: V::KIND,
            inner_product: inner,
            mode_count: modes.len(),
            cell_count,
            spectrum_len: spectrum.len(),
            digests,
        };
        let file = File::create(&meta_path).at_path(&meta_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &meta)
            .map_err(|err| PodError::cache_corrupt(&meta_path, err.to_string()))?;
        writer.flush().at_path(&meta_path)?;

        debug!(
            "Stored {} {} modes of '{}' under {:?}",
            modes.len(),
            family.subdir(),
            field,
            dir
        );
        Ok(CachedModes {
            dir,
            meta_path,
            meta,
        })
    }

    /// Reads every mode of `entry` over `mesh`, verifying digests, together with its spectrum.
    pub fn load<V: FieldValue>(
        &self,
        entry: &CachedModes,
        mesh: &Arc<Mesh>,
    ) -> Result<(Vec<Field<V>>, EnergySpectrum)> {
        let meta = &entry.meta;
        if meta.kind != V::KIND {
            return Err(PodError::cache_corrupt(
                &entry.meta_path,
                format!("cached {:?} modes requested as {:?}", meta.kind, V::KIND),
            ));
        }
        if meta.mode_count > 0 && meta.cell_count != mesh.cell_count() {
            return Err(PodError::cache_corrupt(
                &entry.meta_path,
                format!(
                    "modes span {} cells, mesh has {}",
                    meta.cell_count,
                    mesh.cell_count()
                ),
            ));
        }

        let mut modes = Vec::with_capacity(meta.mode_count);
        for (idx, digest) in meta.digests.iter().enumerate() {
            let path = mode_path(&entry.dir, &meta.field, idx);
            if !path.is_file() {
                return Err(PodError::cache_corrupt(&path, "mode file missing"));
            }
            let bytes = fs::read(&path).at_path(&path)?;
            if blake3::hash(&bytes).to_hex().as_str() != digest.as_str() {
                return Err(PodError::cache_corrupt(&path, "digest mismatch"));
            }
            let json = std::str::from_utf8(&bytes)
                .map_err(|err| PodError::cache_corrupt(&path, err.to_string()))?;
            let mode = FieldLoader::parse_at(json, Arc::clone(mesh), &path)
                .map_err(|err| undecodable_mode(&path, err))?;
            modes.push(mode);
        }

        let eigen_path = entry.dir.join(format!("{EIGENVALUES_PREFIX}{}", meta.field));
        let cum_path = entry.dir.join(format!("{CUMULATIVE_PREFIX}{}", meta.field));
        let eigenvalues = read_spectrum_file(&eigen_path)?;
        let cumulative = read_spectrum_file(&cum_path)?;
        for (path, values) in [(&eigen_path, &eigenvalues), (&cum_path, &cumulative)] {
            if values.len() != meta.spectrum_len {
                return Err(PodError::cache_corrupt(
                    path,
                    format!("{} values, expected {}", values.len(), meta.spectrum_len),
                ));
            }
        }

        Ok((modes, EnergySpectrum::from_parts(eigenvalues, cumulative)))
    }
}

fn mode_path(dir: &Path, field: &str, index: usize) -> PathBuf {
    dir.join((index + 1).to_string()).join(format!("{field}.json"))
}

/// A mode file that passed its digest but does not decode is a corrupt entry.
fn undecodable_mode(path: &Path, err: PodError) -> PodError {
    match err {
        PodError::Io { source, .. } if source.kind() == io::ErrorKind::InvalidData => {
            PodError::cache_corrupt(path, source.to_string())
        }
        other => other,
    }
}

fn read_spectrum_file(path: &Path) -> Result<Vec<f64>> {
    if !path.is_file() {
        return Err(PodError::cache_corrupt(path, "spectrum file missing"));
    }
    read_scalars(path)
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).at_path(parent)?;
    }
    fs::write(path, bytes).at_path(path)
}
