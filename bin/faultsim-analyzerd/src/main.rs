//! ---
//! fsim_section: "01-core-functionality"
//! fsim_subsection: "binary"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Binary entrypoint for the analyzer service."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use faultsim_analyzer::{spawn_analyzer_server, AnalyzerState, GeminiClient};
use faultsim_common::{init_tracing, shutdown_signal, AppConfig};
use faultsim_metrics::new_registry;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "faultsim analyzer daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        env = "FAULTSIM_ANALYZER_LISTEN",
        value_name = "ADDR",
        help = "Override the listen address"
    )]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/faultsim.toml"));
    candidates.push(PathBuf::from("/etc/faultsim/faultsim.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded.config;
    if let Some(listen) = cli.listen {
        config.analyzer.listen = listen;
    }
    init_tracing("analyzerd", &config.logging)?;
    info!(
        prometheus_url = %config.analyzer.prometheus_url,
        lookback_minutes = config.analyzer.lookback_minutes,
        generative = ?config.generative,
        "configuration loaded"
    );

    let api_key = config.generative.api_key();
    if api_key.is_none() {
        warn!(
            env = %config.generative.api_key_env,
            "no generative API key configured; /analyze and /ai-analyze will fail"
        );
    }
    let model = Arc::new(GeminiClient::new(&config.generative, api_key)?);
    let state = Arc::new(AnalyzerState::new(&config.analyzer, model, new_registry())?);
    let server = spawn_analyzer_server(state, config.analyzer.listen)?;
    info!(address = %server.addr(), "analyzer started");

    shutdown_signal().await;
    server.shutdown().await?;
    info!("analyzer stopped");
    Ok(())
}
