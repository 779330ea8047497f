//! ---
//! fsim_section: "01-core-functionality"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Shared primitives and utilities for the services."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use faultsim_inject::FailureConfig;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;
use url::Url;

use crate::logging::LogFormat;

fn default_api_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

fn default_analyzer_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5001))
}

fn default_simulation_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_simulation_count() -> u32 {
    10
}

fn default_max_simulation_count() -> u32 {
    1000
}

fn default_prometheus_url() -> String {
    "http://prometheus:9090".to_owned()
}

fn default_lookback_minutes() -> u32 {
    20
}

fn default_top_errors() -> u32 {
    4
}

fn default_query_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_generative_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_owned()
}

fn default_generative_model() -> String {
    "gemini-2.0-flash".to_owned()
}

fn default_generative_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object shared by both services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    /// Failure probabilities the simulated API starts with.
    #[serde(default)]
    pub failures: FailureConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub generative: GenerativeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "FAULTSIM_CONFIG";
    pub const ENV_PROMETHEUS_URL: &'static str = "PROMETHEUS_URL";

    /// Load configuration from disk together with the effective source path.
    ///
    /// `FAULTSIM_CONFIG` wins over the candidates. When neither names an
    /// existing file the defaults are used. Environment overrides are applied
    /// last and the result is validated.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        let mut loaded = Self::locate(candidates)?;
        loaded.config.apply_env_overrides();
        loaded.config.validate()?;
        Ok(loaded)
    }

    fn locate<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        Self::locate_from(std::env::var(Self::ENV_CONFIG_PATH).ok(), candidates)
    }

    /// Resolution order given the `FAULTSIM_CONFIG` value, if any.
    fn locate_from<P: AsRef<Path>>(
        env_path: Option<String>,
        candidates: &[P],
    ) -> Result<LoadedAppConfig> {
        if let Some(env_path) = env_path.filter(|p| !p.trim().is_empty()) {
            let path = PathBuf::from(env_path);
            let config = Self::from_path(&path)?;
            return Ok(LoadedAppConfig {
                config,
                source: Some(path),
            });
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!(
            inspected = %candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "no configuration file found; using defaults"
        );
        Ok(LoadedAppConfig {
            config: AppConfig::default(),
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Apply the documented environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(Self::ENV_PROMETHEUS_URL) {
            if !url.trim().is_empty() {
                self.analyzer.prometheus_url = url.trim().to_owned();
            }
        }
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.api.validate()?;
        self.analyzer.validate()?;
        self.generative.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
    /// Base URL the simulation driver calls; defaults to the bound listener.
    #[serde(default)]
    pub self_url: Option<String>,
    #[serde(default = "default_simulation_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub simulation_timeout: Duration,
    #[serde(default = "default_simulation_count")]
    pub default_simulation_count: u32,
    #[serde(default = "default_max_simulation_count")]
    pub max_simulation_count: u32,
    /// Fixes the injector's random sequence when set.
    #[serde(default)]
    pub injector_seed: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_api_listen(),
            self_url: None,
            simulation_timeout: default_simulation_timeout(),
            default_simulation_count: default_simulation_count(),
            max_simulation_count: default_max_simulation_count(),
            injector_seed: None,
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.self_url {
            Url::parse(url).with_context(|| format!("api.self_url '{url}' is not a valid URL"))?;
        }
        if self.simulation_timeout.is_zero() {
            return Err(anyhow!("api.simulation_timeout must be greater than zero"));
        }
        if self.default_simulation_count > self.max_simulation_count {
            return Err(anyhow!(
                "api.default_simulation_count ({}) exceeds api.max_simulation_count ({})",
                self.default_simulation_count,
                self.max_simulation_count
            ));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_analyzer_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,
    #[serde(default = "default_lookback_minutes")]
    pub lookback_minutes: u32,
    #[serde(default = "default_top_errors")]
    pub top_errors: u32,
    #[serde(default = "default_query_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub query_timeout: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            listen: default_analyzer_listen(),
            prometheus_url: default_prometheus_url(),
            lookback_minutes: default_lookback_minutes(),
            top_errors: default_top_errors(),
            query_timeout: default_query_timeout(),
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.prometheus_url).with_context(|| {
            format!(
                "analyzer.prometheus_url '{}' is not a valid URL",
                self.prometheus_url
            )
        })?;
        if self.lookback_minutes == 0 {
            return Err(anyhow!("analyzer.lookback_minutes must be at least 1"));
        }
        if self.top_errors == 0 {
            return Err(anyhow!("analyzer.top_errors must be at least 1"));
        }
        Ok(())
    }
}

/// Settings for the generative-language API. The key itself is only ever read from the environment.
#[serde_as]
#[derive(Clone, Serialize, Deserialize)]
pub struct GenerativeConfig {
    #[serde(default = "default_generative_base_url")]
    pub base_url: String,
    #[serde(default = "default_generative_model")]
    pub model: String,
    #[serde(default = "default_generative_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            base_url: default_generative_base_url(),
            model: default_generative_model(),
            timeout: default_generative_timeout(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl GenerativeConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|key| key.trim().to_owned())
            .filter(|key| !key.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.base_url).with_context(|| {
            format!("generative.base_url '{}' is not a valid URL", self.base_url)
        })?;
        if self.model.trim().is_empty() {
            return Err(anyhow!("generative.model cannot be empty"));
        }
        Ok(())
    }
}

impl fmt::Debug for GenerativeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerativeConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("api_key_env", &self.api_key_env)
            .field("api_key_present", &self.api_key().is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config: AppConfig = "".parse().unwrap();
        assert_eq!(config.api.listen.port(), 5000);
        assert_eq!(config.api.simulation_timeout, Duration::from_secs(3));
        assert_eq!(config.analyzer.lookback_minutes, 20);
        assert_eq!(config.analyzer.top_errors, 4);
        assert_eq!(config.generative.model, "gemini-2.0-flash");
        assert_eq!(config.failures, FailureConfig::default());
    }

    #[test]
    fn parses_sections() {
        let config: AppConfig = r#"
            [api]
            listen = "127.0.0.1:6000"
            simulation_timeout = 5
            injector_seed = 12

            [failures]
            error_rate = 0.2
            timeout_prob = 0.1

            [analyzer]
            prometheus_url = "http://localhost:9090"
            lookback_minutes = 30

            [logging]
            format = "pretty"
        "#
        .parse()
        .unwrap();
        assert_eq!(config.api.listen.port(), 6000);
        assert_eq!(config.api.injector_seed, Some(12));
        assert_eq!(config.failures.error_rate.value(), 0.2);
        assert_eq!(config.failures.slow_db_prob.value(), 0.0);
        assert_eq!(config.analyzer.lookback_minutes, 30);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!("[failures]\nerror_rate = 1.5".parse::<AppConfig>().is_err());
        assert!("[analyzer]\nlookback_minutes = 0"
            .parse::<AppConfig>()
            .is_err());
        assert!("[analyzer]\nprometheus_url = \"not a url\""
            .parse::<AppConfig>()
            .is_err());
        assert!("[api]\ndefault_simulation_count = 10\nmax_simulation_count = 5"
            .parse::<AppConfig>()
            .is_err());
    }

    #[test]
    fn loads_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faultsim.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[api]\nmax_simulation_count = 50").unwrap();

        let missing = dir.path().join("missing.toml");
        let loaded = AppConfig::locate_from(None, &[missing, path.clone()]).unwrap();
        assert_eq!(loaded.source.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.config.api.max_simulation_count, 50);
    }

    #[test]
    fn missing_candidates_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AppConfig::locate_from(None, &[dir.path().join("nope.toml")]).unwrap();
        assert!(loaded.source.is_none());
        assert_eq!(loaded.config.api.default_simulation_count, 10);

        let blank = AppConfig::locate_from(Some("  ".into()), &[dir.path().join("nope.toml")])
            .unwrap();
        assert!(blank.source.is_none());
    }

    #[test]
    fn config_path_variable_wins_over_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let named = dir.path().join("named.toml");
        fs::write(&named, "[api]\ndefault_simulation_count = 3\n").unwrap();
        let candidate = dir.path().join("candidate.toml");
        fs::write(&candidate, "[api]\ndefault_simulation_count = 7\n").unwrap();

        let loaded = AppConfig::locate_from(
            Some(named.display().to_string()),
            &[candidate],
        )
        .unwrap();
        assert_eq!(loaded.source.as_deref(), Some(named.as_path()));
        assert_eq!(loaded.config.api.default_simulation_count, 3);
    }

    #[test]
    fn debug_output_never_contains_key_material() {
        let config = GenerativeConfig {
            api_key_env: "FAULTSIM_TEST_UNSET_KEY_VAR".into(),
            ..Default::default()
        };
        let rendered = format!("{config:?}");
        assert!(rendered.contains("api_key_present: false"));
    }
}
