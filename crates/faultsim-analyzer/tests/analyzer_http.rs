//! ---
//! fsim_section: "06-analysis"
//! fsim_subsection: "tests"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Analyzer endpoints against a scripted metrics backend."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use faultsim_analyzer::{
    spawn_analyzer_server, AnalysisReport, AnalyzerServer, AnalyzerState, AnalyzeResponse,
    GeminiClient, GenerationError, GenerativeModel, MockAnalyzeResponse,
};
use faultsim_common::{AnalyzerConfig, GenerativeConfig};
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::net::TcpListener;

#[derive(Default)]
struct ScriptedModel {
    prompts: Mutex<Vec<String>>,
    fail: bool,
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().push(prompt.to_owned());
        if self.fail {
            return Err(GenerationError::Status {
                status: 503,
                body: "model overloaded".into(),
            });
        }
        Ok("Key observations: mild errors dominate.\nRecommendation: add retries.".into())
    }
}

fn vector(samples: Value) -> Response {
    Json(json!({"status": "success", "data": {"resultType": "vector", "result": samples}}))
        .into_response()
}

fn scalar(value: &str) -> Response {
    vector(json!([{"metric": {}, "value": [1714000000.0, value]}]))
}

/// Answers each snapshot query with a fixed value, keyed on the expression text.
async fn fake_query(Query(params): Query<HashMap<String, String>>) -> Response {
    let query = params.get("query").cloned().unwrap_or_default();
    if query.starts_with("topk(") {
        vector(json!([
            {"metric": {"error_type": "RateLimitExceeded", "severity": "mild"}, "value": [1714000000.0, "42"]},
            {"metric": {"error_type": "ExternalTimeout", "severity": "external"}, "value": [1714000000.0, "17"]}
        ]))
    } else if query.starts_with("histogram_quantile") {
        scalar("0.4567")
    } else if query.contains("node_cpu_seconds_total") {
        scalar("37.891")
    } else if query.contains("node_memory") {
        scalar("55.5")
    } else if query.contains(r#"severity="mild""#) {
        scalar("8.004")
    } else if query.contains(r#"severity="critical""#) {
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    } else if query.contains(r#"severity="external""#) {
        scalar("NaN")
    } else if query.contains("http_status=~") {
        scalar("23.456")
    } else {
        vector(json!([]))
    }
}

async fn spawn_router(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn start(
    backend_url: String,
    model: Arc<dyn GenerativeModel>,
) -> (AnalyzerServer, String) {
    let config = AnalyzerConfig {
        prometheus_url: backend_url,
        ..AnalyzerConfig::default()
    };
    let state = Arc::new(
        AnalyzerState::new(&config, model, faultsim_metrics::new_registry()).unwrap(),
    );
    let server = spawn_analyzer_server(state, "127.0.0.1:0".parse().unwrap()).unwrap();
    let base = format!("http://{}", server.addr());
    (server, base)
}

#[tokio::test]
async fn analyze_reports_backend_values_rounded() {
    let backend = spawn_router(Router::new().route("/api/v1/query", get(fake_query))).await;
    let model = Arc::new(ScriptedModel::default());
    let (server, base) = start(format!("http://{backend}"), model.clone()).await;

    let response = Client::new()
        .get(format!("{base}/analyze"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: AnalyzeResponse<AnalysisReport> = response.json().await.unwrap();
    assert_eq!(body.status, "success");

    let metrics = &body.report.metrics;
    assert_eq!(metrics.error_rate, 23.46);
    assert_eq!(metrics.response_time, 0.46);
    assert_eq!(metrics.cpu_usage, 37.89);
    assert_eq!(metrics.memory_usage, 55.5);
    assert_eq!(metrics.severity_rates.mild, 8.0);
    assert_eq!(metrics.severity_rates.critical, 0.0);
    assert_eq!(metrics.severity_rates.external, 0.0);
    assert_eq!(metrics.top_errors.len(), 2);
    assert_eq!(metrics.top_errors[0].error_type, "RateLimitExceeded");
    assert_eq!(metrics.top_errors[0].count, 42);

    assert_eq!(
        body.report.analysis,
        vec![
            "Key observations: mild errors dominate.".to_owned(),
            "Recommendation: add retries.".to_owned()
        ]
    );

    let prompts = model.prompts.lock().clone();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("- API Error Rate: 23.46%"));
    assert!(prompts[0].contains("RateLimitExceeded"));

    let text = Client::new()
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains(r#"analyzer_backend_query_failures_total{query="critical_error_rate"} 1"#));
    assert!(text.contains(r#"analyzer_requests_total{operation="analyze",outcome="success"} 1"#));
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn unreachable_backend_still_produces_a_report() {
    let model = Arc::new(ScriptedModel::default());
    let (server, base) = start("http://127.0.0.1:9".to_owned(), model).await;

    let body: AnalyzeResponse<AnalysisReport> = Client::new()
        .get(format!("{base}/analyze"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body.status, "success");
    assert_eq!(body.report.metrics.error_rate, 0.0);
    assert!(body.report.metrics.top_errors.is_empty());
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn generation_failure_is_a_500_with_message() {
    let backend = spawn_router(Router::new().route("/api/v1/query", get(fake_query))).await;
    let model = Arc::new(ScriptedModel {
        fail: true,
        ..Default::default()
    });
    let (server, base) = start(format!("http://{backend}"), model).await;

    let response = Client::new()
        .get(format!("{base}/analyze"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: AnalyzeResponse<String> = response.json().await.unwrap();
    assert_eq!(body.status, "error");
    assert!(body.report.contains("model overloaded"));
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn mock_analyze_echoes_or_defaults_timestamp() {
    let (server, base) = start(
        "http://127.0.0.1:9".to_owned(),
        Arc::new(ScriptedModel::default()),
    )
    .await;
    let client = Client::new();

    let body: MockAnalyzeResponse = client
        .post(format!("{base}/mock-analyze"))
        .json(&json!({"timestamp": "2024-04-01T12:00:00Z"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body.status, "success");
    assert_eq!(body.timestamp, "2024-04-01T12:00:00Z");
    assert!(body
        .report
        .starts_with("SYSTEM ANALYSIS REPORT (2024-04-01T12:00:00Z)"));

    let body: MockAnalyzeResponse = client
        .post(format!("{base}/mock-analyze"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!body.timestamp.is_empty());
    assert!(body.report.contains(&body.timestamp));
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn ai_analyze_requires_logs_and_metrics() {
    let model = Arc::new(ScriptedModel::default());
    let (server, base) = start("http://127.0.0.1:9".to_owned(), model.clone()).await;
    let client = Client::new();

    let response = client
        .post(format!("{base}/ai-analyze"))
        .json(&json!({"logs": "only logs"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().is_some());

    let body: Value = client
        .post(format!("{base}/ai-analyze"))
        .json(&json!({"logs": ["ERROR timeout"], "metrics": {"p95": 1.2}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["analysis"]
        .as_str()
        .unwrap()
        .starts_with("Key observations"));
    assert!(model.prompts.lock()[0].contains("ERROR timeout"));
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn health_and_cors() {
    let (server, base) = start(
        "http://127.0.0.1:9".to_owned(),
        Arc::new(ScriptedModel::default()),
    )
    .await;
    let response = Client::new()
        .get(format!("{base}/api/health"))
        .header("Origin", "http://ui.example")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "healthy"}));
    server.shutdown().await.unwrap();
}

async fn fake_gemini(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) != Some("test-key") {
        return (StatusCode::FORBIDDEN, "bad key").into_response();
    }
    let prompt = body["contents"][0]["parts"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_owned();
    Json(json!({
        "candidates": [{"content": {"parts": [{"text": "echo: "}, {"text": prompt}]}}]
    }))
    .into_response()
}

#[tokio::test]
async fn gemini_client_speaks_generate_content() {
    let addr = spawn_router(
        Router::new().route("/v1beta/models/:model_action", post(fake_gemini)),
    )
    .await;
    let config = GenerativeConfig {
        base_url: format!("http://{addr}"),
        ..GenerativeConfig::default()
    };

    let client = GeminiClient::new(&config, Some("test-key".into())).unwrap();
    assert_eq!(client.generate("ping").await.unwrap(), "echo: ping");

    let wrong = GeminiClient::new(&config, Some("other".into())).unwrap();
    match wrong.generate("ping").await {
        Err(GenerationError::Status { status, .. }) => assert_eq!(status, 403),
        other => panic!("unexpected {other:?}"),
    }
}
