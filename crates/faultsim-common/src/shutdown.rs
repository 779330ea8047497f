//! ---
//! fsim_section: "01-core-functionality"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Process shutdown signal handling."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use tokio::signal;
use tracing::{info, warn};

/// Resolve on CTRL+C, or on SIGTERM where the platform has it.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let mut sigterm = match unix_signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(error = %err, "unable to install SIGTERM handler; waiting for ctrl_c only");
            let _ = signal::ctrl_c().await;
            info!("received ctrl_c; shutting down");
            return;
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("received ctrl_c; shutting down");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM; shutting down");
        }
    }
}

#[cfg(not(unix))]
pub async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "unable to listen for ctrl_c");
    }
    info!("received ctrl_c; shutting down");
}
