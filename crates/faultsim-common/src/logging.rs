//! ---
//! fsim_section: "03-observability"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Tracing subscriber setup for the faultsim daemons."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "FAULTSIM_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

// Dropping a guard stops its writer thread, so both live for the process.
static GUARDS: OnceCell<[WorkerGuard; 2]> = OnceCell::new();

/// Stdout log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// One JSON object per event with the event fields flattened to the top level.
    #[default]
    StructuredJson,
    Pretty,
}

/// Pick the filter directive: `FAULTSIM_LOG`, then `RUST_LOG`, then `info`.
///
/// An unparsable directive falls back to the default and the problem is returned
/// so it can be reported once logging is up.
fn resolve_filter(
    faultsim_log: Option<String>,
    rust_log: Option<String>,
) -> (EnvFilter, Option<String>) {
    let Some(directive) = faultsim_log
        .or(rust_log)
        .filter(|d| !d.trim().is_empty())
    else {
        return (EnvFilter::new(DEFAULT_DIRECTIVE), None);
    };
    match EnvFilter::try_new(&directive) {
        Ok(filter) => (filter, None),
        Err(err) => (
            EnvFilter::new(DEFAULT_DIRECTIVE),
            Some(format!("ignoring log directive '{directive}': {err}")),
        ),
    }
}

fn log_file_name(config: &LoggingConfig, service_name: &str) -> String {
    let prefix = config.file_prefix.as_deref().unwrap_or("faultsim");
    format!("{prefix}-{service_name}.log")
}

/// Install the global subscriber for `service_name`.
///
/// Stdout follows [`LoggingConfig::format`]; a daily rolling JSON file is always
/// written under [`LoggingConfig::directory`]. Calling this twice keeps the first
/// subscriber.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!(
            "unable to create log directory {}",
            config.directory.display()
        )
    })?;

    let (file_writer, file_guard) = tracing_appender::non_blocking(daily(
        &config.directory,
        log_file_name(config, service_name),
    ));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = GUARDS.set([file_guard, stdout_guard]);

    let (filter, rejected) = resolve_filter(
        std::env::var(LOG_ENV).ok(),
        std::env::var("RUST_LOG").ok(),
    );

    let stdout_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };
    let file_layer = fmt::layer()
        .json()
        .flatten_event(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(file_writer)
        .boxed();

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if let Some(problem) = rejected {
        tracing::warn!("{problem}");
    }
    if installed {
        info!(
            service = service_name,
            log_dir = %config.directory.display(),
            format = ?config.format,
            "tracing initialised"
        );
    }
    Ok(())
}
