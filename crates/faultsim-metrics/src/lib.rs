//! ---
//! fsim_section: "03-observability"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Metrics collection and export utilities."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::Result;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use tracing::error;

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Render the registry in the Prometheus text format.
pub fn scrape_response(registry: &Registry) -> Response {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
                .into_response()
        }
    }
}

/// `2xx`, `4xx`, ... label derived from a status code.
pub fn status_class(status: u16) -> String {
    format!("{}xx", status / 100)
}

/// Request, error and latency instrumentation of the simulated API.
///
/// Metric names are the ones the analyzer's queries are written against.
#[derive(Clone)]
pub struct ApiMetrics {
    registry: SharedRegistry,
    requests_total: IntCounterVec,
    request_duration_seconds: HistogramVec,
    errors_total: IntCounterVec,
    db_query_latency_seconds: Histogram,
    external_api_latency_seconds: Histogram,
}

impl ApiMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("api_request_total", "Total API requests count"),
            &["method", "endpoint", "http_status", "status_class"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "api_request_duration_seconds",
                "API request duration in seconds",
            ),
            &["method", "endpoint", "http_status"],
        )?;
        registry.register(Box::new(request_duration_seconds.clone()))?;

        let errors_total = IntCounterVec::new(
            Opts::new("api_error_count_total", "Total API errors count"),
            &["method", "endpoint", "error_type", "http_status", "severity"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let db_query_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "db_query_latency_seconds",
            "Database query latency in seconds",
        ))?;
        registry.register(Box::new(db_query_latency_seconds.clone()))?;

        let external_api_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "external_api_latency_seconds",
            "External API call latency in seconds",
        ))?;
        registry.register(Box::new(external_api_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration_seconds,
            errors_total,
            db_query_latency_seconds,
            external_api_latency_seconds,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// Count a finished request and observe its duration.
    pub fn record_request(&self, method: &str, endpoint: &str, status: u16, seconds: f64) {
        let status_label = status.to_string();
        self.requests_total
            .with_label_values(&[method, endpoint, &status_label, &status_class(status)])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[method, endpoint, &status_label])
            .observe(seconds);
    }

    /// Count a classified error response.
    pub fn record_error(
        &self,
        method: &str,
        endpoint: &str,
        error_type: &str,
        status: u16,
        severity: &str,
    ) {
        self.errors_total
            .with_label_values(&[method, endpoint, error_type, &status.to_string(), severity])
            .inc();
    }

    pub fn observe_db_query(&self, seconds: f64) {
        self.db_query_latency_seconds.observe(seconds);
    }

    pub fn observe_external_call(&self, seconds: f64) {
        self.external_api_latency_seconds.observe(seconds);
    }
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics").finish_non_exhaustive()
    }
}

/// Instrumentation of the analyzer service.
#[derive(Clone)]
pub struct AnalyzerMetrics {
    registry: SharedRegistry,
    requests_total: IntCounterVec,
    backend_query_failures_total: IntCounterVec,
    generation_seconds: Histogram,
}

impl AnalyzerMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new(
                "analyzer_requests_total",
                "Analysis requests by operation and outcome",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let backend_query_failures_total = IntCounterVec::new(
            Opts::new(
                "analyzer_backend_query_failures_total",
                "Metrics backend queries that failed and were defaulted",
            ),
            &["query"],
        )?;
        registry.register(Box::new(backend_query_failures_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.05, 2.0, 10)?;
        let generation_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "analyzer_generation_seconds",
                "Latency of generative-language API calls",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(generation_seconds.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            backend_query_failures_total,
            generation_seconds,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_request(&self, operation: &str, success: bool) {
        let outcome = if success { "success" } else { "error" };
        self.requests_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn record_query_failure(&self, query: &str) {
        self.backend_query_failures_total
            .with_label_values(&[query])
            .inc();
    }

    pub fn observe_generation(&self, seconds: f64) {
        self.generation_seconds.observe(seconds);
    }
}

impl std::fmt::Debug for AnalyzerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerMetrics").finish_non_exhaustive()
    }
}

pub use prometheus;
