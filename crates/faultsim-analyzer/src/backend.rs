//! ---
//! fsim_section: "06-analysis"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Instant-query client for a Prometheus-compatible backend."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Failure of a single backend query.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend answered with status {0}")]
    Status(u16),
    #[error("backend reported query error: {0}")]
    Query(String),
}

/// The fixed set of queries behind a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricQuery {
    ErrorRate,
    AvgResponseTime,
    MildErrorRate,
    CriticalErrorRate,
    ExternalErrorRate,
    TopErrors,
    CpuUsage,
    MemoryUsage,
}

impl MetricQuery {
    pub const ALL: [MetricQuery; 8] = [
        MetricQuery::ErrorRate,
        MetricQuery::AvgResponseTime,
        MetricQuery::MildErrorRate,
        MetricQuery::CriticalErrorRate,
        MetricQuery::ExternalErrorRate,
        MetricQuery::TopErrors,
        MetricQuery::CpuUsage,
        MetricQuery::MemoryUsage,
    ];

    /// Label used in logs and the failure counter.
    pub fn name(&self) -> &'static str {
        match self {
            MetricQuery::ErrorRate => "error_rate",
            MetricQuery::AvgResponseTime => "avg_response_time",
            MetricQuery::MildErrorRate => "mild_error_rate",
            MetricQuery::CriticalErrorRate => "critical_error_rate",
            MetricQuery::ExternalErrorRate => "external_error_rate",
            MetricQuery::TopErrors => "top_errors",
            MetricQuery::CpuUsage => "cpu_usage",
            MetricQuery::MemoryUsage => "memory_usage",
        }
    }

    /// PromQL expression over a `lookback_minutes` window.
    pub fn expr(&self, lookback_minutes: u32, top_k: u32) -> String {
        let w = lookback_minutes;
        let severity_rate = |severity: &str| {
            format!(
                r#"sum(rate(api_error_count_total{{endpoint="/api/data", severity="{severity}"}}[{w}m])) / sum(rate(api_request_total{{endpoint="/api/data"}}[{w}m])) * 100"#
            )
        };
        match self {
            MetricQuery::ErrorRate => format!(
                r#"sum(rate(api_request_total{{endpoint="/api/data", http_status=~"[45].."}}[{w}m])) / sum(rate(api_request_total[{w}m])) * 100"#
            ),
            MetricQuery::AvgResponseTime => format!(
                r#"histogram_quantile(0.95, sum(rate(api_request_duration_seconds_bucket{{endpoint="/api/data"}}[{w}m])) by (le))"#
            ),
            MetricQuery::MildErrorRate => severity_rate("mild"),
            MetricQuery::CriticalErrorRate => severity_rate("critical"),
            MetricQuery::ExternalErrorRate => severity_rate("external"),
            MetricQuery::TopErrors => {
                format!("topk({top_k}, sum(api_error_count_total) by (error_type, severity))")
            }
            MetricQuery::CpuUsage => format!(
                r#"100 - (avg by (instance) (rate(node_cpu_seconds_total{{mode="idle"}}[{w}m])) * 100)"#
            ),
            MetricQuery::MemoryUsage => {
                "(1 - (node_memory_MemAvailable_bytes / node_memory_MemTotal_bytes)) * 100"
                    .to_owned()
            }
        }
    }
}

/// One series of an instant-vector result.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Sample {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    /// `[unix_timestamp, "value"]`; values travel as strings.
    pub value: (f64, String),
}

impl Sample {
    /// Numeric value, if it parses and is finite.
    pub fn number(&self) -> Option<f64> {
        self.value
            .1
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.metric.get(name).map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<Sample>,
}

/// Client for `GET <base>/api/v1/query`.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    client: Client,
    base_url: String,
    lookback_minutes: u32,
    top_k: u32,
}

impl PrometheusClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        lookback_minutes: u32,
        top_k: u32,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build metrics backend http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            lookback_minutes,
            top_k,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn lookback_minutes(&self) -> u32 {
        self.lookback_minutes
    }

    /// Run one of the snapshot queries.
    pub async fn run(&self, query: MetricQuery) -> Result<Vec<Sample>, BackendError> {
        self.instant_query(&query.expr(self.lookback_minutes, self.top_k))
            .await
    }

    /// Evaluate an arbitrary instant query.
    pub async fn instant_query(&self, expr: &str) -> Result<Vec<Sample>, BackendError> {
        debug!(query = expr, "querying metrics backend");
        let response = self
            .client
            .get(format!("{}/api/v1/query", self.base_url))
            .query(&[("query", expr)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        let body: QueryResponse = response.json().await?;
        if body.status != "success" {
            return Err(BackendError::Query(
                body.error.unwrap_or_else(|| body.status.clone()),
            ));
        }
        Ok(body.data.map(|data| data.result).unwrap_or_default())
    }
}
