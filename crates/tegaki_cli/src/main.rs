//! Tegaki CLI
//!
//! Headless driver for the stroke pipeline:
//!
//! - `tegaki replay <script.json>` replays recorded pointer samples and prints
//!   a JSON summary per stroke
//! - `tegaki config` prints the effective configuration as TOML
//! - `tegaki probe` reports GPU compute capabilities

mod replay;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tegaki_core::PipelineConfig;
use tracing_subscriber::EnvFilter;

use crate::replay::{Backend, Script};

/// Stroke-to-pixel pipeline tools
#[derive(Parser, Debug)]
#[command(name = "tegaki")]
#[command(about = "Replay and inspect the tegaki stroke pipeline")]
#[command(version)]
struct Cli {
    /// Pipeline configuration (tegaki.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a pointer script through the pipeline
    Replay {
        /// Script file (JSON)
        script: PathBuf,

        /// Distance-field backend
        #[arg(short, long, value_enum, default_value = "gpu")]
        backend: Backend,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },

    /// Print the effective configuration
    Config,

    /// Report GPU compute capabilities
    Probe,
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    Ok(config.with_env_overrides())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay {
            script,
            backend,
            pretty,
        } => {
            let content = std::fs::read_to_string(&script)
                .with_context(|| format!("reading {}", script.display()))?;
            let script = Script::from_json(&content)?;
            tracing::info!(
                "replaying {} strokes on {} layers",
                script.strokes.len(),
                script.layers.len()
            );
            let report = replay::replay(&script, config, backend)?;
            let json = if pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{json}");
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
        Commands::Probe => {
            let caps = tegaki_app::GpuProbe::new();
            println!("{}", serde_json::to_string_pretty(&ProbeReport::from(caps.capabilities()))?);
        }
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct ProbeReport {
    available: bool,
    adapter: Option<String>,
    backend: Option<String>,
    compute: bool,
    shaders_valid: bool,
    max_texture_dim: u32,
    error: Option<String>,
}

impl From<&tegaki_app::GpuCapabilities> for ProbeReport {
    fn from(caps: &tegaki_app::GpuCapabilities) -> Self {
        Self {
            available: caps.available(),
            adapter: caps.adapter.clone(),
            backend: caps.backend.clone(),
            compute: caps.compute,
            shaders_valid: caps.shaders_valid,
            max_texture_dim: caps.max_texture_dim,
            error: caps.error.clone(),
        }
    }
}
