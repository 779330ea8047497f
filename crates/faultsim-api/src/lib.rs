//! ---
//! fsim_section: "05-networking-external-interfaces"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Simulated API surface with failure injection."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
//! The simulated API: `/api/health`, `/api/data`, `/configure-failures`,
//! `/simulate-requests` and `/metrics`.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::{middleware, Router};
use faultsim_common::ApiConfig;
use faultsim_inject::{FailureConfig, FailureInjector, FailureSettings};
use faultsim_metrics::{ApiMetrics, SharedRegistry};
use once_cell::sync::OnceCell;
use reqwest::Client;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

mod error;
mod handlers;
mod simulate;
mod tracking;

pub use error::ApiError;
pub use handlers::{DataFragment, DataResponse, HealthResponse};
pub use simulate::{
    run_simulation, SimulationReport, SimulationRequest, SimulationResult, SimulationSummary,
};
pub use tracking::REQUEST_ID_HEADER;

/// Shared state exposed to handlers.
pub struct ApiState {
    settings: FailureSettings,
    injector: FailureInjector,
    metrics: ApiMetrics,
    client: Client,
    self_url: OnceCell<String>,
    default_count: u32,
    max_count: u32,
}

impl ApiState {
    /// Build the state from the `[api]` section and the initial failure configuration.
    pub fn new(
        config: &ApiConfig,
        failures: FailureConfig,
        registry: SharedRegistry,
    ) -> Result<Self> {
        let metrics = ApiMetrics::new(registry).context("failed to register api metrics")?;
        let client = Client::builder()
            .timeout(config.simulation_timeout)
            .build()
            .context("failed to build simulation http client")?;
        let self_url = OnceCell::new();
        if let Some(url) = &config.self_url {
            let _ = self_url.set(url.trim_end_matches('/').to_owned());
        }
        Ok(Self {
            settings: FailureSettings::new(failures),
            injector: FailureInjector::new(config.injector_seed),
            metrics,
            client,
            self_url,
            default_count: config.default_simulation_count,
            max_count: config.max_simulation_count,
        })
    }

    /// Live failure configuration shared by every request.
    pub fn settings(&self) -> &FailureSettings {
        &self.settings
    }

    /// Metric families recorded by the tracking layer.
    pub fn metrics(&self) -> &ApiMetrics {
        &self.metrics
    }

    pub(crate) fn injector(&self) -> &FailureInjector {
        &self.injector
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn default_count(&self) -> u32 {
        self.default_count
    }

    pub(crate) fn max_count(&self) -> u32 {
        self.max_count
    }

    /// Base URL the simulation driver calls.
    pub fn self_url(&self) -> Option<&str> {
        self.self_url.get().map(String::as_str)
    }

    pub(crate) fn simulation_target(&self) -> Result<&str, ApiError> {
        self.self_url()
            .ok_or_else(|| ApiError::internal("simulation target is not known yet"))
    }

    /// Default the self URL to the bound listener unless one was configured.
    fn bind_self_url(&self, bound: SocketAddr) {
        let mut target = bound;
        if target.ip().is_unspecified() {
            match target {
                SocketAddr::V4(_) => target.set_ip(Ipv4Addr::LOCALHOST.into()),
                SocketAddr::V6(_) => target.set_ip(Ipv6Addr::LOCALHOST.into()),
            }
        }
        let _ = self.self_url.set(format!("http://{target}"));
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("failures", &self.settings.snapshot())
            .field("self_url", &self.self_url.get())
            .finish_non_exhaustive()
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    /// Address actually bound, with the ephemeral port resolved.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal graceful shutdown and wait for in-flight requests to drain.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }

    /// Wait for the server task without requesting shutdown.
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Routes of the simulated API. `/metrics` is left out of request tracking;
/// unknown routes and handler panics are tracked as internal errors.
pub fn router(state: Arc<ApiState>) -> Router {
    let tracked = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/data", get(handlers::get_data))
        .route("/configure-failures", post(handlers::configure_failures))
        .route("/simulate-requests", post(simulate::simulate_requests))
        .fallback(handlers::not_found)
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            tracking::track_request,
        ));

    tracked
        .route("/metrics", get(handlers::metrics))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve the simulated API until shut down.
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let bound = listener
        .local_addr()
        .context("failed to read API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    state.bind_self_url(bound);
    let app = router(state);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %bound, "simulated api listening");
        if let Err(err) = axum::serve(tcp_listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %bound, error = %err, "simulated api exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_listener_resolves_to_loopback() {
        let state = ApiState::new(
            &ApiConfig::default(),
            FailureConfig::default(),
            faultsim_metrics::new_registry(),
        )
        .unwrap();
        state.bind_self_url("0.0.0.0:5000".parse().unwrap());
        assert_eq!(state.self_url(), Some("http://127.0.0.1:5000"));
    }

    #[test]
    fn configured_self_url_wins() {
        let config = ApiConfig {
            self_url: Some("http://api.internal:5000/".into()),
            ..ApiConfig::default()
        };
        let state =
            ApiState::new(&config, FailureConfig::default(), faultsim_metrics::new_registry())
                .unwrap();
        state.bind_self_url("127.0.0.1:4000".parse().unwrap());
        assert_eq!(state.self_url(), Some("http://api.internal:5000"));
    }
}
