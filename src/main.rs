//! pipefan runner - Main Entry Point
//!
//! Compiles every pipeline named on the command line (plus those listed in
//! the engine configuration), starts them and runs until Ctrl-C.
//!
//! Only the built-in agents (`when`, `use`, `route`) are registered here.
//! Inputs, filters and outputs come from processors registered on an
//! embedded [`Engine`].

use anyhow::Context;
use clap::Parser;
use pipefan::{
    config::EngineConfig,
    engine::{Engine, PipelineInfo},
    logging,
};
use std::path::{Path, PathBuf};

const LONG_ABOUT: &str = "Run declarative event-processing pipelines.

This runner registers only the built-in agents (when, use, route). \
Pipelines naming any other input, filter or output type fail verification: \
embed pipefan::Engine and register those processors with \
Engine::register_processor to run them. Use --check to verify a \
configuration against the built-ins.";

#[derive(Parser)]
#[command(name = "pipefan")]
#[command(about = "Run declarative event-processing pipelines")]
#[command(long_about = LONG_ABOUT)]
struct Cli {
    /// Path to the engine config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log every packet received by every agent
    #[arg(short, long)]
    verbose: bool,

    /// Only compile and check the pipelines, then exit
    #[arg(long)]
    check: bool,

    /// Pipeline configuration files (JSON or TOML)
    locations: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(EngineConfig::default_path);
    let mut config = match &config_path {
        Some(path) if path.exists() => EngineConfig::load(path)?,
        _ => EngineConfig::default(),
    };
    config.log.verbose |= cli.verbose;

    let _log_guard = logging::init(&config.log)?;
    tracing::info!("Starting pipefan {}", env!("CARGO_PKG_VERSION"));

    // configured pipelines resolve relative to the config file
    let config_dir = config_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;

    let mut locations: Vec<(Option<String>, String, PathBuf)> = config
        .pipelines
        .iter()
        .map(|p| (p.name.clone(), p.location.clone(), config_dir.clone()))
        .collect();
    locations.extend(cli.locations.iter().map(|l| (None, l.clone(), cwd.clone())));

    if locations.is_empty() {
        anyhow::bail!("No pipelines to run: pass a location or list [[pipelines]] in the engine config");
    }

    let engine = Engine::new(config);
    tracing::debug!("Registered processors: {:?}", engine.processors().kinds());

    let mut compiled = Vec::with_capacity(locations.len());
    for (name, location, wd) in locations {
        let graph = engine
            .compile_location(&location, &wd)
            .with_context(|| format!("Failed to compile {location}"))?;
        engine
            .verify(&graph)
            .with_context(|| format!("Invalid pipeline {location}"))?;
        tracing::info!(
            "Compiled {}: {} agents, {} edges in {}us",
            location,
            graph.stats.total_agents,
            graph.stats.edges,
            graph.stats.compile_time_us
        );

        let mut info = PipelineInfo::from_location(location);
        if let Some(name) = name {
            info.name = name;
        }
        compiled.push((info, graph));
    }

    if cli.check {
        tracing::info!("{} pipeline(s) OK", compiled.len());
        return Ok(());
    }

    engine.prepare_data_location()?;
    for (info, graph) in compiled {
        let name = info.name.clone();
        if let Err(e) = engine.start_pipeline(info, graph) {
            engine.stop_all();
            return Err(e).with_context(|| format!("Failed to start pipeline '{name}'"));
        }
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down {} pipeline(s)", engine.pipelines().len());
    engine.stop_all();
    Ok(())
}
