use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueHint};
use spacetime_fabric::{Fabric, FabricConfig, FabricResult};

#[derive(Parser)]
#[command(author, version, about = "Evolve fields and test particles on a toy spacetime lattice")]
struct Cli {
    /// JSON run configuration; built-in defaults when absent
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Number of steps, overriding the configuration
    #[arg(long)]
    steps: Option<usize>,

    /// Directory receiving text dumps of the final state
    #[arg(long, value_hint = ValueHint::DirPath)]
    dump_dir: Option<PathBuf>,

    /// Write the final snapshot as JSON to this path
    #[arg(long, value_hint = ValueHint::FilePath)]
    summary_json: Option<PathBuf>,

    /// Log a summary every N steps
    #[arg(long, default_value_t = 1)]
    log_every: usize,
}

fn run(cli: &Cli) -> FabricResult<()> {
    let mut config = match &cli.config {
        Some(path) => FabricConfig::from_file(path)?,
        None => FabricConfig::default(),
    };
    if let Some(steps) = cli.steps {
        config.steps = steps;
    }
    let steps = config.steps;
    log::info!("[config] {steps} steps of dt={} on {:?}", config.dt, config.lattice.shape);

    let mut fabric = Fabric::new(config)?;
    let every = cli.log_every.max(1);
    for _ in 0..steps {
        fabric.step()?;
        if fabric.step_count() % every == 0 {
            let snap = fabric.snapshot()?;
            log::info!(
                "[step {}] t={:.4} scalar E={:.6e} em E={:.6e} max|R|={:.3e} max|G|={:.3e} particles={}",
                snap.step,
                snap.time,
                snap.scalar_energy,
                snap.em_energy,
                snap.curvature.ricci_scalar.max,
                snap.curvature.einstein.max,
                snap.particles.len()
            );
            if let (Some(norm), Some(energy)) = (snap.dirac_norm, snap.dirac_energy) {
                log::info!("[dirac] norm={norm:.6} <H>={energy:.6e}");
            }
        }
    }

    let snap = fabric.snapshot()?;
    for p in &snap.particles {
        let (vx, vy, vz) = p.state.u.three_velocity(fabric.constants().c);
        log::info!(
            "[particle {}] x=({:.4}, {:.4}, {:.4}) v=({vx:.4}, {vy:.4}, {vz:.4})",
            p.entity,
            p.state.x.x,
            p.state.x.y,
            p.state.x.z
        );
    }
    if snap.clamped_values > 0 || snap.particles_removed > 0 {
        log::warn!("{} values clamped, {} particles removed", snap.clamped_values, snap.particles_removed);
    }

    if let Some(dir) = &cli.dump_dir {
        fabric.dump(dir)?;
    }
    if let Some(path) = &cli.summary_json {
        spacetime_fabric::dump::write_snapshot_json(path, &snap)?;
        log::info!("summary written to {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
