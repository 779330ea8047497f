//! ---
//! fsim_section: "05-networking-external-interfaces"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Health, data, configuration and metrics handlers."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::Response;
use axum::Json;
use faultsim_inject::{FailureConfig, FailureConfigPatch, FailureKnob, InjectionPlan, Probability};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::ApiState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// `{"data": "..."}` fragment of a successful data response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataFragment {
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataResponse {
    pub db_data: DataFragment,
    pub api_data: DataFragment,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_owned(),
    })
}

pub(crate) async fn get_data(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Json<DataResponse>, ApiError> {
    let config = effective_config(&headers, state.settings().snapshot())?;
    match state.injector().plan(&config) {
        InjectionPlan::Reject(err) => Err(err.into()),
        InjectionPlan::Proceed {
            latency,
            band,
            outcome,
        } => {
            tokio::time::sleep(latency).await;
            state.metrics().observe_db_query(latency.as_secs_f64());
            outcome?;
            Ok(Json(DataResponse {
                db_data: DataFragment {
                    data: band.payload().to_owned(),
                },
                api_data: DataFragment {
                    data: "api result".to_owned(),
                },
            }))
        }
    }
}

pub(crate) async fn configure_failures(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<FailureConfig>, ApiError> {
    let patch: FailureConfigPatch = parse_object(&body, false)?;
    Ok(Json(state.settings().apply(&patch)))
}

/// Unknown routes answer with the generic internal error, like any unclassified failure.
pub(crate) async fn not_found(uri: Uri) -> ApiError {
    ApiError::internal(format!(
        "{} {}: {}",
        StatusCode::NOT_FOUND.as_u16(),
        StatusCode::NOT_FOUND.canonical_reason().unwrap_or("Not Found"),
        uri.path()
    ))
}

pub(crate) async fn metrics(State(state): State<Arc<ApiState>>) -> Response {
    faultsim_metrics::scrape_response(&state.metrics().registry())
}

/// Overlay the per-request header overrides on the stored configuration.
///
/// Each header replaces only its own knob.
pub(crate) fn effective_config(
    headers: &HeaderMap,
    mut config: FailureConfig,
) -> Result<FailureConfig, ApiError> {
    for knob in FailureKnob::ALL {
        let Some(raw) = headers.get(knob.header()) else {
            continue;
        };
        let text = raw.to_str().map_err(|_| {
            ApiError::invalid_header(format!("{} header is not valid text", knob.header()))
        })?;
        let value = text.parse::<Probability>().map_err(|err| {
            ApiError::invalid_header(format!("{} header: {err}", knob.header()))
        })?;
        config.set(knob, value);
    }
    Ok(config)
}

/// Decode a request body that must be a JSON object.
///
/// With `allow_empty` an empty body decodes as `{}`.
pub(crate) fn parse_object<T: DeserializeOwned>(
    body: &[u8],
    allow_empty: bool,
) -> Result<T, ApiError> {
    let value = if allow_empty && body.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Default::default())
    } else {
        serde_json::from_slice::<Value>(body)
            .map_err(|err| ApiError::validation(format!("request body is not valid JSON: {err}")))?
    };
    if !value.is_object() {
        return Err(ApiError::validation("request body must be a JSON object"));
    }
    serde_json::from_value(value).map_err(|err| ApiError::validation(err.to_string()))
}
