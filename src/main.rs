use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use log::info;
use nalgebra::Vector3;

use fvpod::{
    CorrelationMatrixBuilder, FieldValue, ModeRequest, PodConfig, PodWorkflow, SnapshotEnsemble,
    SnapshotWindow,
};

const CONFIG_FILE: &str = "pod.json";

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

struct Args {
    case: PathBuf,
    field: String,
    vector: bool,
    n_modes: usize,
    podex: bool,
}

fn usage() -> &'static str {
    "usage: fvpod <case> <field> <scalar|vector> [n_modes] [--podex]"
}

fn parse_args() -> Result<Args> {
    let mut podex = false;
    let mut positional = Vec::new();
    for arg in env::args().skip(1) {
        if arg == "--podex" {
            podex = true;
        } else {
            positional.push(arg);
        }
    }
    if positional.len() < 3 || positional.len() > 4 {
        anyhow::bail!("{}", usage());
    }
    let vector = match positional[2].as_str() {
        "scalar" => false,
        "vector" => true,
        other => anyhow::bail!("Unknown field kind '{other}'; {}", usage()),
    };
    let n_modes = match positional.get(3) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("parse mode count {raw:?}"))?,
        None => 0,
    };
    Ok(Args {
        case: PathBuf::from(&positional[0]),
        field: positional[1].clone(),
        vector,
        n_modes,
        podex,
    })
}

/// `<case>/pod.json` if present; relative output paths are taken against the case.
fn load_config(case: &Path) -> Result<PodConfig> {
    let path = case.join(CONFIG_FILE);
    let mut config = if path.is_file() {
        let text = fs::read_to_string(&path).with_context(|| format!("read {:?}", path))?;
        serde_json::from_str(&text).with_context(|| format!("parse configuration {:?}", path))?
    } else {
        PodConfig::default()
    };
    if config.output_root.is_relative() {
        config.output_root = case.join(&config.output_root);
    }
    if config.matrix_folder.is_relative() {
        config.matrix_folder = case.join(&config.matrix_folder);
    }
    Ok(config)
}

fn main() -> Result<()> {
    init_logging();
    let args = parse_args()?;
    let config = load_config(&args.case)?;
    info!(
        "Case {:?}: field '{}', output {:?}, {:?} inner product",
        args.case, args.field, config.output_root, config.inner_product
    );

    let request = ModeRequest::new(args.n_modes).with_podex(args.podex);
    let mut workflow = PodWorkflow::new(config);
    if args.vector {
        run::<Vector3<f64>>(&mut workflow, &args, &request)
    } else {
        run::<f64>(&mut workflow, &args, &request)
    }
}

fn run<V: FieldValue>(
    workflow: &mut PodWorkflow,
    args: &Args,
    request: &ModeRequest,
) -> Result<()> {
    let start = Instant::now();
    let ensemble =
        SnapshotEnsemble::<V>::from_case(&args.field, &args.case, SnapshotWindow::all())
            .with_context(|| format!("read '{}' snapshots under {:?}", args.field, args.case))?;
    info!(
        "Read {} snapshots of '{}' over {} cells",
        ensemble.len(),
        args.field,
        ensemble.cell_count()
    );

    let result = workflow
        .get_modes(&ensemble, request)
        .with_context(|| format!("compute modes of '{}'", args.field))?;
    info!(
        "{} {} modes ({:?}) in {:?}",
        result.basis.len(),
        result.family.subdir(),
        result.origin,
        start.elapsed()
    );
    for k in 1..=result.basis.len() {
        info!(
            "Mode {}: eigenvalue {:e}, cumulative energy {:.6}",
            k,
            result.spectrum.eigenvalues[k - 1],
            result.spectrum.captured(k)
        );
    }

    let exporter = workflow.config().exporter();
    let correlation = CorrelationMatrixBuilder::build(&ensemble, workflow.config().inner_product)
        .context("assemble correlation matrix")?;
    let path = exporter
        .export(&correlation, &format!("C_{}", args.field))
        .context("export correlation matrix")?;
    info!("Correlation matrix written to {:?}", path);

    let mass = result.basis.mass_matrix().context("assemble mass matrix")?;
    let path = exporter
        .export(mass, &format!("M_{}", args.field))
        .context("export mass matrix")?;
    info!("Mass matrix written to {:?}", path);
    Ok(())
}
