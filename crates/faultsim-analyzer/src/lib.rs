//! ---
//! fsim_section: "06-analysis"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Analyzer service surface."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
//! Analyzer service: pulls a metrics snapshot from a Prometheus-compatible
//! backend, turns it into a prompt and returns the model's analysis.

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use faultsim_common::AnalyzerConfig;
use faultsim_logging::{log_request_completion, RequestLogContext};
use faultsim_metrics::{AnalyzerMetrics, SharedRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

pub mod backend;
pub mod model;
pub mod prompt;
pub mod snapshot;

pub use backend::{BackendError, MetricQuery, PrometheusClient, Sample};
pub use model::{GeminiClient, GenerationError, GenerativeModel};
pub use snapshot::{MetricsSnapshot, ReportMetrics, SeverityRates, TopError};

/// Shared analyzer state.
pub struct AnalyzerState {
    backend: PrometheusClient,
    model: Arc<dyn GenerativeModel>,
    metrics: AnalyzerMetrics,
}

impl AnalyzerState {
    /// Build the state from the `[analyzer]` section and a generative model.
    pub fn new(
        config: &AnalyzerConfig,
        model: Arc<dyn GenerativeModel>,
        registry: SharedRegistry,
    ) -> Result<Self> {
        let backend = PrometheusClient::new(
            &config.prometheus_url,
            config.query_timeout,
            config.lookback_minutes,
            config.top_errors,
        )?;
        let metrics =
            AnalyzerMetrics::new(registry).context("failed to register analyzer metrics")?;
        Ok(Self {
            backend,
            model,
            metrics,
        })
    }

    /// Analyzer metric families, exposed on `/metrics`.
    pub fn metrics(&self) -> &AnalyzerMetrics {
        &self.metrics
    }

    /// Collect a snapshot and ask the model about it.
    pub async fn analyze(&self) -> Result<AnalysisReport, GenerationError> {
        let snapshot = MetricsSnapshot::collect(&self.backend, Some(&self.metrics)).await;
        let prompt = prompt::analysis_prompt(&snapshot, self.backend.lookback_minutes());
        let text = self.generate(&prompt).await?;
        Ok(AnalysisReport {
            metrics: snapshot.rounded(),
            analysis: text.split('\n').map(str::to_owned).collect(),
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let started = Instant::now();
        let result = self.model.generate(prompt).await;
        self.metrics
            .observe_generation(started.elapsed().as_secs_f64());
        result
    }
}

impl fmt::Debug for AnalyzerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerState")
            .field("backend", &self.backend.base_url())
            .finish_non_exhaustive()
    }
}

/// `report` of a successful `GET /analyze`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisReport {
    pub metrics: ReportMetrics,
    pub analysis: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse<T> {
    pub status: String,
    pub report: T,
}

#[derive(Debug, Default, Deserialize)]
struct MockAnalyzeRequest {
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MockAnalyzeResponse {
    pub status: String,
    pub timestamp: String,
    pub report: String,
}

#[derive(Debug, Default, Deserialize)]
struct DirectAnalyzeRequest {
    #[serde(default)]
    logs: Option<Value>,
    #[serde(default)]
    metrics: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DirectAnalyzeResponse {
    pub analysis: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Classification of a failed response, read back by [`log_requests`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FailureLabels {
    error_type: &'static str,
    severity: &'static str,
}

impl FailureLabels {
    const INVALID_REQUEST: FailureLabels = FailureLabels {
        error_type: "ValidationError",
        severity: "mild",
    };

    fn of(err: &GenerationError) -> Self {
        Self {
            error_type: err.error_type(),
            severity: err.severity(),
        }
    }

    fn attach(self, mut response: Response) -> Response {
        response.extensions_mut().insert(self);
        response
    }
}

#[derive(Debug)]
struct AnalyzerError {
    status: StatusCode,
    message: String,
    labels: FailureLabels,
}

impl AnalyzerError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            labels: FailureLabels::INVALID_REQUEST,
        }
    }

    fn generation(err: &GenerationError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
            labels: FailureLabels::of(err),
        }
    }
}

impl IntoResponse for AnalyzerError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        self.labels.attach((self.status, body).into_response())
    }
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({"status": "healthy"}))
}

async fn analyze(State(state): State<Arc<AnalyzerState>>) -> Response {
    match state.analyze().await {
        Ok(report) => {
            state.metrics.record_request("analyze", true);
            Json(AnalyzeResponse {
                status: "success".to_owned(),
                report,
            })
            .into_response()
        }
        Err(err) => {
            state.metrics.record_request("analyze", false);
            error!(error = %err, "analysis generation failed");
            FailureLabels::of(&err).attach(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(AnalyzeResponse {
                        status: "error".to_owned(),
                        report: err.to_string(),
                    }),
                )
                    .into_response(),
            )
        }
    }
}

async fn mock_analyze(
    State(state): State<Arc<AnalyzerState>>,
    body: Bytes,
) -> Result<Json<MockAnalyzeResponse>, AnalyzerError> {
    let request: MockAnalyzeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        MockAnalyzeRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| AnalyzerError::invalid(format!("invalid request body: {err}")))?
    };
    let timestamp = request
        .timestamp
        .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
    state.metrics.record_request("mock_analyze", true);
    Ok(Json(MockAnalyzeResponse {
        status: "success".to_owned(),
        report: prompt::mock_report(&timestamp),
        timestamp,
    }))
}

async fn ai_analyze(
    State(state): State<Arc<AnalyzerState>>,
    body: Bytes,
) -> Result<Json<DirectAnalyzeResponse>, AnalyzerError> {
    let request: DirectAnalyzeRequest = serde_json::from_slice(&body)
        .map_err(|err| AnalyzerError::invalid(format!("invalid request body: {err}")))?;
    let (Some(logs), Some(metrics)) = (request.logs, request.metrics) else {
        state.metrics.record_request("ai_analyze", false);
        return Err(AnalyzerError::invalid("both logs and metrics are required"));
    };

    let prompt = prompt::direct_prompt(&logs, &metrics);
    match state.generate(&prompt).await {
        Ok(analysis) => {
            state.metrics.record_request("ai_analyze", true);
            Ok(Json(DirectAnalyzeResponse { analysis }))
        }
        Err(err) => {
            state.metrics.record_request("ai_analyze", false);
            warn!(error = %err, "direct analysis generation failed");
            Err(AnalyzerError::generation(&err))
        }
    }
}

async fn metrics(State(state): State<Arc<AnalyzerState>>) -> Response {
    faultsim_metrics::scrape_response(&state.metrics.registry())
}

async fn log_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().as_str().to_owned();
    let endpoint = request.uri().path().to_owned();
    let response = next.run(request).await;
    let mut context = RequestLogContext::new()
        .with_request_id(&request_id)
        .with_endpoint(&endpoint)
        .with_status(response.status().as_u16())
        .with_duration_ms(started.elapsed().as_secs_f64() * 1000.0);
    if let Some(labels) = response.extensions().get::<FailureLabels>() {
        context = context.with_error(labels.error_type, labels.severity);
    }
    log_request_completion(&context, &method);
    response
}

/// Routes of the analyzer service.
pub fn router(state: Arc<AnalyzerState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/analyze", get(analyze))
        .route("/mock-analyze", post(mock_analyze))
        .route("/ai-analyze", post(ai_analyze))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn(log_requests))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle to the running analyzer server.
#[derive(Debug)]
pub struct AnalyzerServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl AnalyzerServer {
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

/// Bind `addr` and serve the analyzer until shut down.
pub fn spawn_analyzer_server(
    state: Arc<AnalyzerState>,
    addr: SocketAddr,
) -> Result<AnalyzerServer> {
    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind analyzer listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure analyzer listener as non-blocking")?;
    let bound = listener
        .local_addr()
        .context("failed to read analyzer listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;
    let app = router(state);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %bound, "analyzer listening");
        if let Err(err) = axum::serve(tcp_listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %bound, error = %err, "analyzer exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(AnalyzerServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}
