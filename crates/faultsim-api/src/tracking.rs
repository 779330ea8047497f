//! ---
//! fsim_section: "05-networking-external-interfaces"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Per-request id, metrics and completion logging."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use faultsim_inject::ClassifiedError;
use faultsim_logging::{log_request_completion, RequestLogContext};
use uuid::Uuid;

use crate::error::ApiError;
use crate::ApiState;

/// Response header carrying the id assigned to each tracked request.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Assign a request id, then count, time and log the finished request.
///
/// Error responses are labelled from the [`ClassifiedError`] the handler left
/// in the response extensions. An error status without one (method
/// rejections, body limits) is replaced by the generic internal error.
pub(crate) async fn track_request(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().as_str().to_owned();
    let endpoint = request.uri().path().to_owned();

    let mut response = next.run(request).await;
    let unclassified = response.extensions().get::<ClassifiedError>().is_none();
    if unclassified && (response.status().is_client_error() || response.status().is_server_error())
    {
        response = ApiError::unclassified(response.status()).into_response();
    }

    let elapsed = started.elapsed();
    let status = response.status().as_u16();
    let metrics = state.metrics();
    metrics.record_request(&method, &endpoint, status, elapsed.as_secs_f64());

    let classified = response.extensions().get::<ClassifiedError>().cloned();
    let mut context = RequestLogContext::new()
        .with_request_id(&request_id)
        .with_endpoint(&endpoint)
        .with_status(status)
        .with_duration_ms(elapsed.as_secs_f64() * 1000.0);
    if let Some(err) = &classified {
        metrics.record_error(
            &method,
            &endpoint,
            err.kind().as_str(),
            status,
            err.severity().as_str(),
        );
        context = context.with_error(err.kind().as_str(), err.severity().as_str());
    }
    log_request_completion(&context, &method);

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
