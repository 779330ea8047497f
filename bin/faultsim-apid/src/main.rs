//! ---
//! fsim_section: "01-core-functionality"
//! fsim_subsection: "binary"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Binary entrypoint for the simulated API."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use faultsim_api::{spawn_api_server, ApiState};
use faultsim_common::{init_tracing, shutdown_signal, AppConfig};
use faultsim_metrics::new_registry;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about = "faultsim simulated API daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        env = "FAULTSIM_API_LISTEN",
        value_name = "ADDR",
        help = "Override the listen address"
    )]
    listen: Option<SocketAddr>,

    #[arg(long, help = "Seed the failure injector for reproducible runs")]
    seed: Option<u64>,
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
        config.api.listen = listen;
    }
    if cli.seed.is_some() {
        config.api.injector_seed = cli.seed;
    }
    init_tracing("apid", &config.logging)?;
    info!(
        source = %loaded
            .source
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "defaults".to_owned()),
        error_rate = config.failures.error_rate.value(),
        slow_db_prob = config.failures.slow_db_prob.value(),
        ext_api_fail_prob = config.failures.ext_api_fail_prob.value(),
        timeout_prob = config.failures.timeout_prob.value(),
        "configuration loaded"
    );

    let state = Arc::new(ApiState::new(
        &config.api,
        config.failures,
        new_registry(),
    )?);
    let server = spawn_api_server(state.clone(), config.api.listen)?;
    info!(
        address = %server.addr(),
        self_url = state.self_url().unwrap_or_default(),
        "simulated api started"
    );

    shutdown_signal().await;
    server.shutdown().await?;
    info!("simulated api stopped");
    Ok(())
}
