//! ---
//! fsim_section: "06-analysis"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Prompt templates and the canned mock report."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use serde_json::Value;

use crate::snapshot::MetricsSnapshot;

const ANALYSIS_GUIDELINES: &str = "\
Guidelines for analysis:
- Mild errors: Note but don't over-emphasize since these don't require immediate attention
- Critical errors: Require immediate attention
- External errors: Downstream issues, likely do not relate to API itself
- CPU and memory stats: If unusually high, factor those into the analysis as well in relation with error messages
- The input is from a simulated API made to have a high error rate, so DO NOT mention anything about error rate.
";

const ANALYSIS_CONSTRAINTS: &str = "\
Constraints:
- Use clear, professional language
- Focus on systemic patterns, not individual error instances
- Be technically precise
- Avoid hypothetical scenarios or speculative solutions
- Limit response to 3-4 sentences.
";

fn pretty(value: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "[]".to_owned())
}

/// Fixed-format text block describing a snapshot.
pub fn snapshot_block(snapshot: &MetricsSnapshot, lookback_minutes: u32) -> String {
    let rates = &snapshot.severity_rates;
    format!(
        "=== Metrics Snapshot ===\n\
         - API Error Rate: {error_rate:.2}%\n\
         - p95 Response Time: {response_time:.2}s\n\
         - CPU Usage: {cpu:.2}%\n\
         - Memory Usage: {memory:.2}%\n\
         \n\
         === Top Errors ===\n\
         {top_errors}\n\
         \n\
         === Error Rates by Severity over the past {lookback_minutes} minutes ===\n\
         - Mild Errors: {mild:.2}%\n\
         - Critical Errors: {critical:.2}%\n\
         - External Errors: {external:.2}%\n",
        error_rate = snapshot.error_rate,
        response_time = snapshot.avg_response_time,
        cpu = snapshot.cpu_usage,
        memory = snapshot.memory_usage,
        top_errors = pretty(&snapshot.top_errors),
        mild = rates.mild,
        critical = rates.critical,
        external = rates.external,
    )
}

/// Prompt for `GET /analyze`.
pub fn analysis_prompt(snapshot: &MetricsSnapshot, lookback_minutes: u32) -> String {
    format!(
        "You are provided metrics related to an API's performance along with its host's system \
         stats for the past {lookback_minutes} minutes. Analyze them and provide insights:\n\n\
         {block}\n\
         {ANALYSIS_GUIDELINES}\n\
         Given the top overall errors and the error rates over the past {lookback_minutes} minutes, \
         provide a professional, technically precise error analysis that covers 3 sections:\n\
         1. Key observations\n\
         2. Potential root causes in short without merely restating error messages\n\
         3. High level, specific, actionable recommendations\n\n\
         {ANALYSIS_CONSTRAINTS}",
        block = snapshot_block(snapshot, lookback_minutes),
    )
}

/// Prompt for `POST /ai-analyze`, built from caller-supplied logs and metrics.
pub fn direct_prompt(logs: &Value, metrics: &Value) -> String {
    format!(
        "You are provided application logs and metrics from an API. Analyze them and provide insights.\n\n\
         === Logs ===\n{logs}\n\n\
         === Metrics ===\n{metrics}\n\n\
         {ANALYSIS_GUIDELINES}\n\
         Cover key observations, potential root causes and actionable recommendations.\n\n\
         {ANALYSIS_CONSTRAINTS}",
        logs = render_value(logs),
        metrics = render_value(metrics),
    )
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => pretty(other),
    }
}

/// Canned report returned by `POST /mock-analyze`.
pub fn mock_report(timestamp: &str) -> String {
    format!(
        "SYSTEM ANALYSIS REPORT ({timestamp})

=== Metrics Snapshot ===
• API Error Rate: 12.5%
• Avg Response Time: 342ms
• CPU Usage: 68%
• Memory Usage: 45%

=== Top Errors ===
1. DatabaseTimeout (43%) - Check DB connection pool
2. ExternalAPIFailure (32%) - Service X is responding slowly
3. ValidationError (25%) - Invalid user input

=== Recommendations ===
1. Increase DB connection pool size
2. Add retries for Service X API calls
3. Validate inputs before processing"
    )
}
