use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use log::info;
use serde::{Deserialize, Serialize};

use crate::cache::{CachedModes, ModeCache, ModeFamily, DEFAULT_OUTPUT_ROOT};
use crate::ensemble::SnapshotEnsemble;
use crate::error::{PodError, Result};
use crate::field::{Field, FieldValue, Mesh};
use crate::inner_product::InnerProduct;
use crate::matrix_io::{MatrixExporter, MatrixFormat, DEFAULT_MATRIX_FOLDER};
use crate::pod::basis::ModeBasis;
use crate::pod::correlation::CorrelationMatrixBuilder;
use crate::pod::decomposition::SpectralDecomposer;
use crate::pod::normalization::ModeNormalizer;
use crate::pod::spectrum::EnergySpectrum;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodConfig {
    pub output_root: PathBuf,
    pub inner_product: InnerProduct,
    pub matrix_format: MatrixFormat,
    pub matrix_folder: PathBuf,
}

impl Default for PodConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            inner_product: InnerProduct::default(),
            matrix_format: MatrixFormat::default(),
            matrix_folder: PathBuf::from(DEFAULT_MATRIX_FOLDER),
        }
    }
}

impl PodConfig {
    pub fn exporter(&self) -> MatrixExporter {
        MatrixExporter::new(self.matrix_folder.clone(), self.matrix_format)
    }
}

/// Per-call flags of a mode request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeRequest {
    /// `0` asks for every mode the ensemble supports.
    pub n_modes: usize,
    /// Trust cached POD modes.
    pub podex: bool,
    /// Trust cached supremizer modes.
    pub supex: bool,
    /// Route the request to the supremizer family.
    pub supremizer: bool,
}

impl ModeRequest {
    pub fn new(n_modes: usize) -> Self {
        Self {
            n_modes,
            ..Self::default()
        }
    }

    pub fn with_podex(mut self, podex: bool) -> Self {
        self.podex = podex;
        self
    }

    pub fn with_supex(mut self, supex: bool) -> Self {
        self.supex = supex;
        self
    }

    pub fn supremizer(mut self) -> Self {
        self.supremizer = true;
        self
    }

    pub fn family(&self) -> ModeFamily {
        if self.supremizer {
            ModeFamily::Supremizer
        } else {
            ModeFamily::Pod
        }
    }

    /// Whether persisted artifacts of the targeted family may stand in for a computation.
    pub fn trust_cache(&self) -> bool {
        match self.family() {
            ModeFamily::Pod => self.podex,
            ModeFamily::Supremizer => self.supex,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FamilyState {
    #[default]
    NotComputed,
    Computing,
    Cached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyEvent {
    Begin,
    Finish,
    Load,
    Fail,
}

impl FamilyState {
    /// Transitions outside `NotComputed -> Computing -> Cached` (plus direct loads, failures
    /// and recomputation of a cached family) leave the state unchanged.
    pub fn next(self, event: FamilyEvent) -> Self {
        match (self, event) {
            (Self::NotComputed | Self::Cached, FamilyEvent::Begin) => Self::Computing,
            (Self::Computing, FamilyEvent::Finish) => Self::Cached,
            (Self::NotComputed | Self::Cached, FamilyEvent::Load) => Self::Cached,
            (Self::Computing, FamilyEvent::Fail) => Self::NotComputed,
            (state, _) => state,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeOrigin {
    Computed,
    Loaded,
}

#[derive(Debug, Clone)]
pub struct PodResult<V> {
    pub basis: ModeBasis<V>,
    pub spectrum: EnergySpectrum,
    pub origin: ModeOrigin,
    pub family: ModeFamily,
}

/// Primary modes with companion modes lifted from the same eigenvectors.
#[derive(Debug, Clone)]
pub struct PairedPodResult<V, W> {
    pub primary: ModeBasis<V>,
    pub companion: ModeBasis<W>,
    pub spectrum: EnergySpectrum,
    pub origin: ModeOrigin,
    pub family: ModeFamily,
}

/// Drives the cache-or-compute flow for each (family, field) pair.
#[derive(Debug)]
pub struct PodWorkflow {
    config: PodConfig,
    cache: ModeCache,
    states: IndexMap<(ModeFamily, String), FamilyState>,
}

impl Default for PodWorkflow {
    fn default() -> Self {
        Self::new(PodConfig::default())
    }
}

impl PodWorkflow {
    pub fn new(config: PodConfig) -> Self {
        let cache = ModeCache::new(config.output_root.clone());
        Self {
            config,
            cache,
            states: IndexMap::new(),
        }
    }

    pub fn config(&self) -> &PodConfig {
        &self.config
    }

    pub fn cache(&self) -> &ModeCache {
        &self.cache
    }

    pub fn state(&self, family: ModeFamily, field: &str) -> FamilyState {
        self.states
            .get(&(family, field.to_string()))
            .copied()
            .unwrap_or_default()
    }

    fn advance(&mut self, family: ModeFamily, field: &str, event: FamilyEvent) {
        let state = self.states.entry((family, field.to_string())).or_default();
        *state = state.next(event);
    }

    pub fn get_modes<V: FieldValue>(
        &mut self,
        ensemble: &SnapshotEnsemble<V>,
        request: &ModeRequest,
    ) -> Result<PodResult<V>> {
        let family = request.family();
        let field = ensemble.field_name().to_string();
        let wanted = SpectralDecomposer::retained_count(request.n_modes, ensemble.len());
        let mesh = ensemble.template().mesh();

        if request.trust_cache() {
            if let Some(entry) = self.usable_entry(family, &field, wanted)? {
                let (modes, spectrum) = self.load_truncated::<V>(&entry, mesh, wanted)?;
                self.advance(family, &field, FamilyEvent::Load);
                info!(
                    "Loaded {} {} modes of '{}' from {:?}",
                    modes.len(),
                    family.subdir(),
                    field,
                    entry.dir()
                );
                return Ok(PodResult {
                    basis: ModeBasis::new(modes, self.config.inner_product),
                    spectrum,
                    origin: ModeOrigin::Loaded,
                    family,
                });
            }
        }

        self.advance(family, &field, FamilyEvent::Begin);
        match self.compute_modes(ensemble, request.n_modes, family) {
            Ok((modes, spectrum)) => {
                self.advance(family, &field, FamilyEvent::Finish);
                Ok(PodResult {
                    basis: ModeBasis::new(modes, self.config.inner_product),
                    spectrum,
                    origin: ModeOrigin::Computed,
                    family,
                })
            }
            Err(err) => {
                self.advance(family, &field, FamilyEvent::Fail);
                Err(err)
            }
        }
    }

    /// POD of `primary`; `companion` modes are lifted with the primary eigenvectors and
    /// both families are divided by the primary norms.
    pub fn get_paired_modes<V: FieldValue, W: FieldValue>(
        &mut self,
        primary: &SnapshotEnsemble<V>,
        companion: &SnapshotEnsemble<W>,
        request: &ModeRequest,
    ) -> Result<PairedPodResult<V, W>> {
        if primary.len() != companion.len() {
            return Err(PodError::shape_mismatch(
                "companion ensemble length",
                primary.len(),
                companion.len(),
            ));
        }
        let family = request.family();
        let primary_name = primary.field_name().to_string();
        let companion_name = companion.field_name().to_string();
        let wanted = SpectralDecomposer::retained_count(request.n_modes, primary.len());

        if request.trust_cache() {
            let primary_entry = self.usable_entry(family, &primary_name, wanted)?;
            let companion_entry = self.usable_entry(family, &companion_name, wanted)?;
            if let (Some(p_entry), Some(c_entry)) = (primary_entry, companion_entry) {
                let (p_modes, spectrum) =
                    self.load_truncated::<V>(&p_entry, primary.template().mesh(), wanted)?;
                let (c_modes, _) =
                    self.load_truncated::<W>(&c_entry, companion.template().mesh(), wanted)?;
                self.advance(family, &primary_name, FamilyEvent::Load);
                self.advance(family, &companion_name, FamilyEvent::Load);
                info!(
                    "Loaded {} paired {} modes of '{}' and '{}'",
                    p_modes.len(),
                    family.subdir(),
                    primary_name,
                    companion_name
                );
                return Ok(self.paired_result(
                    p_modes,
                    c_modes,
                    spectrum,
                    ModeOrigin::Loaded,
                    family,
                ));
            }
        }

        self.advance(family, &primary_name, FamilyEvent::Begin);
        self.advance(family, &companion_name, FamilyEvent::Begin);
        match self.compute_paired(primary, companion, request.n_modes, family) {
            Ok((p_modes, c_modes, spectrum)) => {
                self.advance(family, &primary_name, FamilyEvent::Finish);
                self.advance(family, &companion_name, FamilyEvent::Finish);
                Ok(self.paired_result(
                    p_modes,
                    c_modes,
                    spectrum,
                    ModeOrigin::Computed,
                    family,
                ))
            }
            Err(err) => {
                self.advance(family, &primary_name, FamilyEvent::Fail);
                self.advance(family, &companion_name, FamilyEvent::Fail);
                Err(err)
            }
        }
    }

    fn usable_entry(
        &self,
        family: ModeFamily,
        field: &str,
        wanted: usize,
    ) -> Result<Option<CachedModes>> {
        match self.cache.probe(family, field, self.config.inner_product)? {
            Some(entry) if entry.mode_count() >= wanted => Ok(Some(entry)),
            Some(entry) => {
                info!(
                    "Cached {} modes of '{}' hold {} modes, {} requested; recomputing",
                    family.subdir(),
                    field,
                    entry.mode_count(),
                    wanted
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn load_truncated<V: FieldValue>(
        &self,
        entry: &CachedModes,
        mesh: &Arc<Mesh>,
        wanted: usize,
    ) -> Result<(Vec<Field<V>>, EnergySpectrum)> {
        let (mut modes, spectrum) = self.cache.load::<V>(entry, mesh)?;
        modes.truncate(wanted);
        Ok((modes, spectrum))
    }

    fn compute_modes<V: FieldValue>(
        &self,
        ensemble: &SnapshotEnsemble<V>,
        n_modes: usize,
        family: ModeFamily,
    ) -> Result<(Vec<Field<V>>, EnergySpectrum)> {
        let inner = self.config.inner_product;
        info!(
            "Computing {} modes of '{}' from {} snapshots ({:?} inner product)",
            family.subdir(),
            ensemble.field_name(),
            ensemble.len(),
            inner
        );
        let correlation = CorrelationMatrixBuilder::build(ensemble, inner)?;
        let decomposition = SpectralDecomposer::decompose(ensemble, &correlation, n_modes)?;
        let mut modes = decomposition.modes;
        ModeNormalizer::new(inner).normalize(&mut modes)?;
        self.cache.store(
            family,
            ensemble.field_name(),
            &modes,
            &decomposition.spectrum,
            inner,
        )?;
        info!(
            "Stored {} modes of '{}' capturing {:.6} of the energy",
            modes.len(),
            ensemble.field_name(),
            decomposition.spectrum.captured(modes.len())
        );
        Ok((modes, decomposition.spectrum))
    }

    #[allow(clippy::type_complexity)]
    fn compute_paired<V: FieldValue, W: FieldValue>(
        &self,
        primary: &SnapshotEnsemble<V>,
        companion: &SnapshotEnsemble<W>,
        n_modes: usize,
        family: ModeFamily,
    ) -> Result<(Vec<Field<V>>, Vec<Field<W>>, EnergySpectrum)> {
        let inner = self.config.inner_product;
        info!(
            "Computing paired {} modes of '{}' with companion '{}' from {} snapshots",
            family.subdir(),
            primary.field_name(),
            companion.field_name(),
            primary.len()
        );
        let correlation = CorrelationMatrixBuilder::build(primary, inner)?;
        let decomposition = SpectralDecomposer::decompose(primary, &correlation, n_modes)?;
        let mut primary_modes = decomposition.modes;
        let mut companion_modes = SpectralDecomposer::lift(companion, &decomposition.pairs)?;
        ModeNormalizer::new(inner).normalize_paired(&mut primary_modes, &mut companion_modes)?;

        let spectrum = decomposition.spectrum;
        self.cache
            .store(family, primary.field_name(), &primary_modes, &spectrum, inner)?;
        self.cache
            .store(family, companion.field_name(), &companion_modes, &spectrum, inner)?;
        info!(
            "Stored {} paired modes of '{}' and '{}'",
            primary_modes.len(),
            primary.field_name(),
            companion.field_name()
        );
        Ok((primary_modes, companion_modes, spectrum))
    }

    fn paired_result<V: FieldValue, W: FieldValue>(
        &self,
        primary: Vec<Field<V>>,
        companion: Vec<Field<W>>,
        spectrum: EnergySpectrum,
        origin: ModeOrigin,
        family: ModeFamily,
    ) -> PairedPodResult<V, W> {
        let inner = self.config.inner_product;
        PairedPodResult {
            primary: ModeBasis::new(primary, inner),
            companion: ModeBasis::new(companion, inner),
            spectrum,
            origin,
            family,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_follows_compute_and_load_paths() {
        let state = FamilyState::default();
        assert_eq!(state, FamilyState::NotComputed);
        let computing = state.next(FamilyEvent::Begin);
        assert_eq!(computing, FamilyState::Computing);
        assert_eq!(computing.next(FamilyEvent::Finish), FamilyState::Cached);
        assert_eq!(computing.next(FamilyEvent::Fail), FamilyState::NotComputed);
        assert_eq!(state.next(FamilyEvent::Load), FamilyState::Cached);
        assert_eq!(state.next(FamilyEvent::Finish), FamilyState::NotComputed);
    }

    #[test]
    fn trust_flag_follows_family() {
        let pod = ModeRequest::new(3).with_podex(true);
        assert_eq!(pod.family(), ModeFamily::Pod);
        assert!(pod.trust_cache());
        let sup = pod.supremizer();
        assert_eq!(sup.family(), ModeFamily::Supremizer);
        assert!(!sup.trust_cache());
        assert!(sup.with_supex(true).trust_cache());
    }

    #[test]
    fn config_defaults_fill_missing_keys() {
        let config: PodConfig = serde_json::from_str(r#"{ "inner_product": "h1" }"#).unwrap();
        assert_eq!(config.inner_product, InnerProduct::H1Seminorm);
        assert_eq!(config.output_root, PathBuf::from("ITHACAoutput"));
        assert_eq!(config.matrix_format, MatrixFormat::Python);
        assert_eq!(config.matrix_folder, PathBuf::from("./Matrices"));
    }
}
