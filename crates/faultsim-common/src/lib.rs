//! ---
//! fsim_section: "01-core-functionality"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Shared primitives and utilities for the services."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
//! Shared primitives for the faultsim workspace: the TOML configuration model
//! the tracing bootstrap and the shutdown signal used by every binary.

pub mod config;
pub mod logging;
pub mod shutdown;

pub use config::{
    AnalyzerConfig, ApiConfig, AppConfig, GenerativeConfig, LoadedAppConfig, LoggingConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use shutdown::shutdown_signal;
