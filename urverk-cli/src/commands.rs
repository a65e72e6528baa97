use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use urverk_core::value::{Map, Value};
use urverk_kernel::{Coordinator, ModuleSymbol, RunStatus, RunSummary};
use urverk_loader::ModuleRegistry;
use urverk_output::{ConsoleOutput, FileOutput, OutputPlugin, StorageOutput, ViewKind};
use urverk_scenario::{HostConfig, Scenario, ViewDecl, ViewKindDecl};
use urverk_telemetry::MetricsRecorder;

use crate::builtins;

#[derive(Parser)]
#[command(name = "urverk", version, about = "DEVS simulation kernel")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a scenario to completion.
    Run(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Scenario file (YAML).
    pub scenario: PathBuf,

    /// Write aggregated view results to this path (CSV per view).
    #[arg(long)]
    pub write_output: Option<PathBuf>,

    /// Only log errors.
    #[arg(long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log at debug level.
    #[arg(long)]
    pub verbose: bool,

    /// Fail unless the observation-stream digest matches.
    #[arg(long)]
    pub validate_digest: Option<String>,
}

impl RunArgs {
    pub fn log_level(&self) -> Option<String> {
        if self.quiet {
            Some("error".into())
        } else if self.verbose {
            Some("debug".into())
        } else {
            None
        }
    }
}

fn make_plugin(name: &str, decl: &ViewDecl, view: &str) -> anyhow::Result<Box<dyn OutputPlugin>> {
    match name {
        "console" => Ok(Box::new(ConsoleOutput::new())),
        "storage" => Ok(Box::new(StorageOutput::new())),
        "file" => {
            let default = format!("{view}.csv");
            let path = match decl.config.get("path") {
                Some(Value::String(p)) => p.clone(),
                _ => default,
            };
            Ok(Box::new(FileOutput::new(path)))
        }
        other => bail!("unknown output plug-in '{other}' for view '{view}'"),
    }
}

fn view_kind(decl: &ViewDecl) -> anyhow::Result<ViewKind> {
    Ok(match decl.kind {
        ViewKindDecl::Timed => {
            let step = decl
                .timestep
                .context("timed view without a timestep")?;
            ViewKind::Timed {
                step: urverk_core::time::Time::new(step),
            }
        }
        ViewKindDecl::Event => ViewKind::Event,
        ViewKindDecl::Finish => ViewKind::Finish,
    })
}

/// Builds a coordinator for one replica and runs it. The recorder is
/// shared across replicas; the kernel feeds it per bag and transition.
pub fn run_replica(
    scenario: &Scenario,
    registry: &Arc<ModuleRegistry<ModuleSymbol>>,
    seed: u64,
    replica: u64,
    config: &HostConfig,
    metrics: &MetricsRecorder,
) -> anyhow::Result<RunSummary> {
    let graph = scenario.build_graph()?;
    let mut catalogues = scenario.catalogues();

    // replica identity reaches models through the `experiment` condition
    let mut experiment = Map::new();
    experiment.insert("seed", Value::Integer(seed as i64));
    experiment.insert("replica", Value::Integer(replica as i64));
    catalogues.conditions.insert("experiment".into(), experiment);

    let mut settings = scenario.settings();
    settings.trace_models = config.trace_models;

    let mut kernel = Coordinator::new(
        graph,
        catalogues,
        Arc::clone(registry),
        settings,
        metrics.clone(),
    );
    kernel.set_pool_retention(config.pool_retention);
    for (name, decl) in &scenario.views {
        let plugin = make_plugin(&decl.output, decl, name)?;
        kernel.add_view(name.clone(), view_kind(decl)?, plugin, &decl.config);
    }

    kernel.run().map_err(Into::into)
}

fn write_results(summary: &RunSummary, path: &Path, replica: u64) -> anyhow::Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("creating output directory {}", path.display()))?;
    for (view, matrix) in &summary.results {
        let Some(matrix) = matrix else { continue };
        let file = if replica == 0 {
            path.join(format!("{view}.csv"))
        } else {
            path.join(format!("{view}.r{replica}.csv"))
        };
        let mut text = String::new();
        for row in 0..matrix.rows() {
            let cells: Vec<String> = (0..matrix.columns())
                .map(|col| matrix.get(col, row).map(|v| v.to_string()).unwrap_or_default())
                .collect();
            text.push_str(&cells.join(","));
            text.push('\n');
        }
        std::fs::write(&file, text)
            .with_context(|| format!("writing {}", file.display()))?;
        info!(view, file = %file.display(), "aggregated output written");
    }
    Ok(())
}

pub fn run(args: RunArgs) -> anyhow::Result<i32> {
    let config = HostConfig::load()?;
    let scenario = Scenario::load(&args.scenario)
        .with_context(|| format!("loading scenario {}", args.scenario.display()))?;
    info!(
        experiment = %scenario.experiment.name,
        replicas = scenario.experiment.replicas,
        "scenario loaded"
    );

    let registry = Arc::new(ModuleRegistry::new());
    builtins::register(&registry);

    let metrics = MetricsRecorder::new();
    let mut exit = 0;
    for (replica, seed) in scenario.replica_seeds().into_iter().enumerate() {
        let summary = run_replica(
            &scenario,
            &registry,
            seed,
            replica as u64,
            &config,
            &metrics,
        )?;

        match &summary.status {
            RunStatus::Completed => info!(
                replica,
                seed,
                t_final = %summary.t_final,
                digest = %summary.digest,
                "replica completed"
            ),
            RunStatus::Stopped => warn!(replica, "replica stopped early"),
            RunStatus::Failed { error } => {
                warn!(replica, %error, "replica failed");
                exit = 1;
            }
        }

        if let Some(expected) = &args.validate_digest {
            if *expected != summary.digest {
                warn!(
                    expected,
                    actual = %summary.digest,
                    "observation digest mismatch"
                );
                exit = 1;
            }
        }
        if let Some(path) = &args.write_output {
            write_results(&summary, path, replica as u64)?;
        }
    }
    if let Ok(text) = metrics.gather() {
        tracing::debug!(metrics = %text, "kernel metrics");
    }
    Ok(exit)
}
