//! ---
//! fsim_section: "05-networking-external-interfaces"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Simulation driver issuing sequential self-calls."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use faultsim_inject::{FailureConfig, FailureConfigPatch, FailureKnob, Severity};
use faultsim_metrics::ApiMetrics;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::handlers::parse_object;
use crate::ApiState;

/// Body of `POST /simulate-requests`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationRequest {
    /// Missing knobs fall back to [`FailureConfig::simulation_default`].
    #[serde(default)]
    pub config: FailureConfigPatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

/// Outcome of one simulated call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SimulationResult {
    Success {
        code: u16,
        duration: f64,
        data: Value,
    },
    Error {
        code: u16,
        duration: f64,
        error: String,
        #[serde(rename = "type")]
        error_type: String,
        severity: Severity,
    },
}

impl SimulationResult {
    /// `true` for a 2xx call.
    pub fn is_success(&self) -> bool {
        matches!(self, SimulationResult::Success { .. })
    }

    /// Wall-clock seconds spent on the call.
    pub fn duration(&self) -> f64 {
        match self {
            SimulationResult::Success { duration, .. } | SimulationResult::Error { duration, .. } => {
                *duration
            }
        }
    }

    /// Classify a `>= 400` response from its JSON body.
    ///
    /// Missing fields get placeholders; an absent or unknown severity counts as critical.
    fn from_error_body(code: u16, duration: f64, body: &Value) -> Self {
        let field = |name: &str| body.get(name).and_then(Value::as_str);
        SimulationResult::Error {
            code,
            duration,
            error: field("error").unwrap_or("Unknown error").to_owned(),
            error_type: field("type").unwrap_or("unknown").to_owned(),
            severity: field("severity")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(Severity::Critical),
        }
    }

    fn from_transport_error(err: &reqwest::Error, duration: f64) -> Self {
        let error_type = if err.is_timeout() {
            "RequestTimeout"
        } else {
            "RequestException"
        };
        SimulationResult::Error {
            code: 500,
            duration,
            error: err.to_string(),
            error_type: error_type.to_owned(),
            severity: Severity::Critical,
        }
    }
}

/// Aggregate over a simulation batch.
///
/// `success_count + mild + critical + external == total_requests` always holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SimulationSummary {
    pub total_requests: u32,
    pub success_count: u32,
    pub mild: u32,
    pub critical: u32,
    pub external: u32,
    pub avg_duration: f64,
}

impl SimulationSummary {
    /// Tally results by outcome and average their durations.
    pub fn from_results(results: &[SimulationResult]) -> Self {
        let mut summary = SimulationSummary {
            total_requests: results.len() as u32,
            ..Default::default()
        };
        let mut total_duration = 0.0;
        for result in results {
            total_duration += result.duration();
            match result {
                SimulationResult::Success { .. } => summary.success_count += 1,
                SimulationResult::Error { severity, .. } => match severity {
                    Severity::Mild => summary.mild += 1,
                    Severity::Critical => summary.critical += 1,
                    Severity::External => summary.external += 1,
                },
            }
        }
        if !results.is_empty() {
            summary.avg_duration = total_duration / results.len() as f64;
        }
        summary
    }
}

/// Response of `POST /simulate-requests`; `config` is the profile actually used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub config: FailureConfig,
    pub results: Vec<SimulationResult>,
    pub summary: SimulationSummary,
}

/// Issue `count` sequential `GET {target}/api/data` calls carrying `config` as headers.
///
/// Never aborts early: every failure becomes a result entry.
pub async fn run_simulation(
    client: &Client,
    target: &str,
    config: &FailureConfig,
    count: u32,
    metrics: Option<&ApiMetrics>,
) -> SimulationReport {
    let url = format!("{}/api/data", target.trim_end_matches('/'));
    let mut results = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let result = call_once(client, &url, config).await;
        if let Some(metrics) = metrics {
            metrics.observe_external_call(result.duration());
        }
        results.push(result);
    }
    let summary = SimulationSummary::from_results(&results);
    SimulationReport {
        config: *config,
        results,
        summary,
    }
}

async fn call_once(client: &Client, url: &str, config: &FailureConfig) -> SimulationResult {
    let started = Instant::now();
    let mut request = client.get(url);
    for knob in FailureKnob::ALL {
        request = request.header(knob.header(), config.get(knob).to_string());
    }

    let outcome = match request.send().await {
        Ok(response) => {
            let code = response.status().as_u16();
            response.bytes().await.map(|body| (code, body))
        }
        Err(err) => Err(err),
    };
    let duration = started.elapsed().as_secs_f64();

    match outcome {
        Ok((code, body)) => {
            let body = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);
            if code >= 400 {
                SimulationResult::from_error_body(code, duration, &body)
            } else {
                SimulationResult::Success {
                    code,
                    duration,
                    data: body,
                }
            }
        }
        Err(err) => {
            debug!(error = %err, url, "simulated call failed in transport");
            SimulationResult::from_transport_error(&err, duration)
        }
    }
}

pub(crate) async fn simulate_requests(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<SimulationReport>, ApiError> {
    let request: SimulationRequest = parse_object(&body, true)?;
    let count = request.count.unwrap_or(state.default_count());
    if count > state.max_count() {
        return Err(ApiError::validation(format!(
            "count {count} exceeds the maximum of {}",
            state.max_count()
        )));
    }
    let config = FailureConfig::simulation_default().patched(&request.config);
    let target = state.simulation_target()?;

    info!(count, url = %target, "simulation started");
    let report = run_simulation(state.client(), target, &config, count, Some(state.metrics())).await;
    info!(
        success = report.summary.success_count,
        mild = report.summary.mild,
        critical = report.summary.critical,
        external = report.summary.external,
        "simulation finished"
    );
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_body_fields_are_copied() {
        let body = json!({"error": "Temporary database lock", "type": "DatabaseLock", "severity": "mild"});
        let result = SimulationResult::from_error_body(504, 0.2, &body);
        assert_eq!(
            result,
            SimulationResult::Error {
                code: 504,
                duration: 0.2,
                error: "Temporary database lock".into(),
                error_type: "DatabaseLock".into(),
                severity: Severity::Mild,
            }
        );
    }

    #[test]
    fn unknown_severity_counts_as_critical() {
        let result = SimulationResult::from_error_body(418, 0.0, &json!({"severity": "spicy"}));
        match result {
            SimulationResult::Error {
                severity,
                error,
                error_type,
                ..
            } => {
                assert_eq!(severity, Severity::Critical);
                assert_eq!(error, "Unknown error");
                assert_eq!(error_type, "unknown");
            }
            other => panic!("unexpected {other:?}"),
        }
        let result = SimulationResult::from_error_body(500, 0.0, &Value::Null);
        assert!(!result.is_success());
    }

    #[test]
    fn summary_partitions_results() {
        let results = vec![
            SimulationResult::Success {
                code: 200,
                duration: 0.1,
                data: json!({}),
            },
            SimulationResult::from_error_body(429, 0.3, &json!({"severity": "mild"})),
            SimulationResult::from_error_body(503, 0.2, &json!({"severity": "external"})),
            SimulationResult::from_error_body(500, 0.2, &json!({})),
        ];
        let summary = SimulationSummary::from_results(&results);
        assert_eq!(summary.total_requests, 4);
        assert_eq!(
            summary.success_count + summary.mild + summary.critical + summary.external,
            4
        );
        assert_eq!(summary.critical, 1);
        assert!((summary.avg_duration - 0.2).abs() < 1e-9);
    }

    #[test]
    fn empty_batch_has_zero_average() {
        let summary = SimulationSummary::from_results(&[]);
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.avg_duration, 0.0);
    }

    #[test]
    fn results_serialize_with_status_tag() {
        let value = serde_json::to_value(SimulationResult::from_error_body(
            429,
            0.5,
            &json!({"error": "API rate limit exceeded", "type": "RateLimitExceeded", "severity": "mild"}),
        ))
        .unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["type"], "RateLimitExceeded");
        assert_eq!(value["severity"], "mild");
    }
}
