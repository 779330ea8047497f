//! ---
//! fsim_section: "06-analysis"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Metrics snapshot assembled from backend queries."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use faultsim_metrics::AnalyzerMetrics;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{MetricQuery, PrometheusClient, Sample};

/// Error rate per severity, in percent of `/api/data` requests.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SeverityRates {
    pub mild: f64,
    pub critical: f64,
    pub external: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopError {
    pub error_type: String,
    pub severity: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub error_rate: f64,
    /// p95 latency of `/api/data`, in seconds.
    pub avg_response_time: f64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub severity_rates: SeverityRates,
    pub top_errors: Vec<TopError>,
}

/// The numeric part of an analysis report, rounded to two decimals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportMetrics {
    pub error_rate: f64,
    pub response_time: f64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub severity_rates: SeverityRates,
    pub top_errors: Vec<TopError>,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl MetricsSnapshot {
    /// Run every query; a failing query leaves its field at zero or empty.
    pub async fn collect(backend: &PrometheusClient, metrics: Option<&AnalyzerMetrics>) -> Self {
        let mut snapshot = MetricsSnapshot::default();
        for query in MetricQuery::ALL {
            let samples = match backend.run(query).await {
                Ok(samples) => samples,
                Err(err) => {
                    warn!(query = query.name(), error = %err, "metrics query failed; using default");
                    if let Some(metrics) = metrics {
                        metrics.record_query_failure(query.name());
                    }
                    continue;
                }
            };
            snapshot.absorb(query, &samples);
        }
        snapshot
    }

    /// Fold one query result into the snapshot.
    pub fn absorb(&mut self, query: MetricQuery, samples: &[Sample]) {
        if query == MetricQuery::TopErrors {
            self.top_errors = samples.iter().filter_map(top_error).collect();
            return;
        }
        let Some(value) = samples.first().and_then(Sample::number) else {
            debug!(query = query.name(), "empty or non-numeric result; using zero");
            return;
        };
        match query {
            MetricQuery::ErrorRate => self.error_rate = value,
            MetricQuery::AvgResponseTime => self.avg_response_time = value,
            MetricQuery::MildErrorRate => self.severity_rates.mild = value,
            MetricQuery::CriticalErrorRate => self.severity_rates.critical = value,
            MetricQuery::ExternalErrorRate => self.severity_rates.external = value,
            MetricQuery::CpuUsage => self.cpu_usage = value,
            MetricQuery::MemoryUsage => self.memory_usage = value,
            MetricQuery::TopErrors => {}
        }
    }

    pub fn rounded(&self) -> ReportMetrics {
        ReportMetrics {
            error_rate: round2(self.error_rate),
            response_time: round2(self.avg_response_time),
            cpu_usage: round2(self.cpu_usage),
            memory_usage: round2(self.memory_usage),
            severity_rates: SeverityRates {
                mild: round2(self.severity_rates.mild),
                critical: round2(self.severity_rates.critical),
                external: round2(self.severity_rates.external),
            },
            top_errors: self.top_errors.clone(),
        }
    }
}

fn top_error(sample: &Sample) -> Option<TopError> {
    let count = sample.number()?;
    Some(TopError {
        error_type: sample.label("error_type").unwrap_or("Unknown").to_owned(),
        severity: sample.label("severity").unwrap_or("Unknown").to_owned(),
        count: count.max(0.0).round() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(json: &str) -> Sample {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn scalar_queries_take_the_first_sample() {
        let mut snapshot = MetricsSnapshot::default();
        snapshot.absorb(
            MetricQuery::ErrorRate,
            &[
                sample(r#"{"value": [1, "31.4159"]}"#),
                sample(r#"{"value": [1, "99"]}"#),
            ],
        );
        snapshot.absorb(
            MetricQuery::ExternalErrorRate,
            &[sample(r#"{"value": [1, "7.5"]}"#)],
        );
        assert_eq!(snapshot.error_rate, 31.4159);
        assert_eq!(snapshot.severity_rates.external, 7.5);
        assert_eq!(snapshot.severity_rates.mild, 0.0);
    }

    #[test]
    fn empty_and_nan_results_default_to_zero() {
        let mut snapshot = MetricsSnapshot::default();
        snapshot.absorb(MetricQuery::CpuUsage, &[]);
        snapshot.absorb(
            MetricQuery::AvgResponseTime,
            &[sample(r#"{"value": [1, "NaN"]}"#)],
        );
        assert_eq!(snapshot, MetricsSnapshot::default());
    }

    #[test]
    fn top_errors_keep_labels_and_counts() {
        let mut snapshot = MetricsSnapshot::default();
        snapshot.absorb(
            MetricQuery::TopErrors,
            &[
                sample(
                    r#"{"metric": {"error_type": "RateLimitExceeded", "severity": "mild"}, "value": [1, "14"]}"#,
                ),
                sample(r#"{"metric": {}, "value": [1, "3"]}"#),
            ],
        );
        assert_eq!(
            snapshot.top_errors,
            vec![
                TopError {
                    error_type: "RateLimitExceeded".into(),
                    severity: "mild".into(),
                    count: 14,
                },
                TopError {
                    error_type: "Unknown".into(),
                    severity: "Unknown".into(),
                    count: 3,
                },
            ]
        );
    }

    #[test]
    fn report_metrics_round_to_two_decimals() {
        let snapshot = MetricsSnapshot {
            error_rate: 12.3456,
            avg_response_time: 0.98765,
            cpu_usage: 50.0,
            memory_usage: 33.333,
            severity_rates: SeverityRates {
                mild: 1.005,
                critical: 2.499,
                external: 0.0,
            },
            top_errors: Vec::new(),
        };
        let report = snapshot.rounded();
        assert_eq!(report.error_rate, 12.35);
        assert_eq!(report.response_time, 0.99);
        assert_eq!(report.memory_usage, 33.33);
        assert_eq!(report.severity_rates.critical, 2.5);
    }
}
