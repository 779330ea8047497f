//! ---
//! fsim_section: "05-networking-external-interfaces"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Translation of classified errors into HTTP responses."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use faultsim_inject::{ClassifiedError, ErrorKind};

/// Handler error carrying a taxonomy classification.
///
/// The response keeps a copy of the [`ClassifiedError`] in its extensions so
/// the request-tracking layer can label metrics and logs with it.
#[derive(Debug)]
pub struct ApiError(ClassifiedError);

impl ApiError {
    /// 400 for a malformed or out-of-range request body.
    pub fn validation(message: impl Into<String>) -> Self {
        Self(ClassifiedError::with_message(
            ErrorKind::ValidationError,
            message,
        ))
    }

    /// 400 for an unparsable failure-override header.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self(ClassifiedError::with_message(ErrorKind::InvalidHeader, message))
    }

    /// Generic 500 `InternalError`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self(ClassifiedError::with_message(ErrorKind::InternalError, message))
    }

    /// Generic 500 standing in for a failure nothing classified, such as a
    /// routing rejection or an oversized body.
    pub(crate) fn unclassified(status: StatusCode) -> Self {
        let reason = status.canonical_reason().unwrap_or("Unexpected failure");
        Self::internal(format!("{} {}", status.as_u16(), reason))
    }

    /// The classification carried into the response.
    pub fn classified(&self) -> &ClassifiedError {
        &self.0
    }
}

/// Turn a handler panic into the generic internal error response.
pub(crate) fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_owned()
    };
    ApiError::internal(detail).into_response()
}

impl From<ClassifiedError> for ApiError {
    fn from(err: ClassifiedError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.0.body())).into_response();
        response.extensions_mut().insert(self.0);
        response
    }
}
