use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

use exp6_rx::core::comm::SerialComm;
use exp6_rx::core::domain::{BoxSpec, Particle, ParticleSet, Species};
use exp6_rx::core::topology::SpecialTopology;
use exp6_rx::engine::evaluator::{EvaluationResult, Evaluator, Exp6RxEvaluator};
use exp6_rx::engine::pair::{PairCoeff, PairExp6Rx};
use exp6_rx::neighbor::NeighborSettings;

// --- CLI Definitions ---

#[derive(Parser, Debug)]
#[command(author, version, about = "Reactive exp-6 pair forces with respa neighbor lists", long_about = None)]
struct Args {
    /// JSON system description
    system: PathBuf,

    /// Potential file used by every coefficient line (overrides `param_file`)
    #[arg(short, long)]
    potential: Option<PathBuf>,

    /// Number of worker threads (defaults to all cores)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Write per-particle forces and energy ledgers as CSV
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Write the pair-style restart block to this file
    #[arg(long)]
    restart: Option<PathBuf>,
}

// --- Input / Output Schemas ---

/// Everything one process sees: species, cell, particles and pair setup.
#[derive(Debug, Deserialize)]
struct SystemFile {
    /// Species tracked by the composition store; absent when no tracker runs.
    #[serde(default)]
    species: Option<Vec<String>>,
    ntypes: usize,
    #[serde(rename = "box")]
    domain: BoxSpec,
    particles: Vec<Particle>,
    /// Leading particles that are owned; the rest are ghosts. Defaults to all.
    #[serde(default)]
    nlocal: Option<usize>,
    #[serde(default)]
    topology: Option<SpecialTopology>,
    cut_global: f64,
    coeffs: Vec<PairCoeff>,
    #[serde(default)]
    neighbor: NeighborSettings,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    engine: &'a str,
    particles: usize,
    owned: usize,
    elapsed_ms: f64,
    #[serde(flatten)]
    result: EvaluationResult,
}

#[derive(Debug, Serialize)]
struct ParticleRow {
    tag: u64,
    type_id: usize,
    fx: f64,
    fy: f64,
    fz: f64,
    u_cg: f64,
    u_cg_new: f64,
}

// --- Initialization Helpers ---

fn load_system(path: &Path) -> Result<SystemFile> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut system: SystemFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse system description {}", path.display()))?;

    // Potential files are resolved next to the description.
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for coeff in &mut system.coeffs {
        if coeff.param_file.is_relative() {
            coeff.param_file = base.join(&coeff.param_file);
        }
    }
    Ok(system)
}

fn build_particles(system: &SystemFile, species: &[Species]) -> ParticleSet {
    let mut set = ParticleSet::new(species.to_vec(), system.ntypes);
    set.nlocal = system.nlocal.unwrap_or(system.particles.len());
    set.particles = system.particles.clone();
    set.topology = system.topology.clone();
    set
}

fn write_csv(path: &Path, particles: &ParticleSet) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))?;
    for p in &particles.particles[..particles.nlocal] {
        writer.serialize(ParticleRow {
            tag: p.tag,
            type_id: p.type_id,
            fx: p.force.x,
            fy: p.force.y,
            fz: p.force.z,
            u_cg: p.u_cg,
            u_cg_new: p.u_cg_new,
        })?;
    }
    writer.flush()?;
    Ok(())
}

// --- Main ---

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure the worker pool")?;
    }

    let mut system = load_system(&args.system)?;
    if let Some(potential) = &args.potential {
        for coeff in &mut system.coeffs {
            coeff.param_file = potential.clone();
        }
    }

    let comm = SerialComm;
    let species: Option<Vec<Species>> = system
        .species
        .as_ref()
        .map(|names| names.iter().map(|n| Species::new(n)).collect());

    let mut pair = PairExp6Rx::new(system.ntypes, system.cut_global);
    pair.settings(system.cut_global)?;
    for (n, coeff) in system.coeffs.iter().enumerate() {
        pair.configure(coeff, species.as_deref(), &comm)
            .with_context(|| format!("Failed to apply pair coefficient line {}", n + 1))?;
    }

    let domain = system.domain.build().context("Invalid simulation box")?;
    let mut particles = build_particles(&system, species.as_deref().unwrap_or(&[]));

    let evaluator = Exp6RxEvaluator::new(pair, system.neighbor.clone())?;
    log::info!(
        "evaluating {} particles ({} owned) with {}",
        particles.nall(),
        particles.nlocal,
        evaluator.name()
    );

    let start = Instant::now();
    let result = evaluator
        .evaluate(&mut particles, &domain)
        .context("Force evaluation failed")?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1e3;
    log::info!(
        "energy {:.6}, {} full neighbor entries, {:.2} ms",
        result.energy,
        result.list_sizes[0],
        elapsed_ms
    );

    if let Some(path) = &args.csv {
        write_csv(path, &particles)?;
        log::info!("wrote per-particle results to {}", path.display());
    }

    if let Some(path) = &args.restart {
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        evaluator.pair().write_restart(&mut writer)?;
        writer.flush()?;
        log::info!("wrote restart block to {}", path.display());
    }

    let report = Report {
        engine: evaluator.name(),
        particles: particles.nall(),
        owned: particles.nlocal,
        elapsed_ms,
        result,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
