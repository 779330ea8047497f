//! ---
//! fsim_section: "03-observability"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Structured request logging."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
//! Every request log line carries the same field set: `request_id`,
//! `endpoint`, `duration_ms`, `http_status`, `error_type` and `severity`.
//! Events emitted outside a request use the `SYSTEM` / `INTERNAL`
//! placeholders so the JSON shape stays stable for log shippers.
#![warn(missing_docs)]

pub mod macros;

/// Placeholder request id for events outside a request.
pub const SYSTEM_REQUEST_ID: &str = "SYSTEM";
/// Placeholder endpoint for events outside a request.
pub const INTERNAL_ENDPOINT: &str = "INTERNAL";
/// Placeholder for absent error type / severity.
pub const NONE_LABEL: &str = "none";

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct RequestLogContext<'a> {
    /// Identifier assigned to the request on arrival.
    pub request_id: Option<&'a str>,
    /// Request path.
    pub endpoint: Option<&'a str>,
    /// Wall-clock handling time in milliseconds.
    pub duration_ms: Option<f64>,
    /// Response status code.
    pub http_status: Option<u16>,
    /// Taxonomy name of the error, if the request failed.
    pub error_type: Option<&'a str>,
    /// Severity label of the error, if the request failed.
    pub severity: Option<&'a str>,
}

impl<'a> RequestLogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a request identifier.
    pub fn with_request_id(mut self, request_id: &'a str) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Attach the request path.
    pub fn with_endpoint(mut self, endpoint: &'a str) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Attach the handling duration.
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach the response status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Attach error classification.
    pub fn with_error(mut self, error_type: &'a str, severity: &'a str) -> Self {
        self.error_type = Some(error_type);
        self.severity = Some(severity);
        self
    }

    #[doc(hidden)]
    pub fn request_id_or_default(&self) -> &str {
        self.request_id.unwrap_or(SYSTEM_REQUEST_ID)
    }

    #[doc(hidden)]
    pub fn endpoint_or_default(&self) -> &str {
        self.endpoint.unwrap_or(INTERNAL_ENDPOINT)
    }

    #[doc(hidden)]
    pub fn error_type_or_default(&self) -> &str {
        self.error_type.unwrap_or(NONE_LABEL)
    }

    #[doc(hidden)]
    pub fn severity_or_default(&self) -> &str {
        self.severity.unwrap_or(NONE_LABEL)
    }
}

/// Emit the completion line for a request, picking the level from its status.
///
/// 5xx responses log at ERROR, 4xx at WARN, everything else at INFO.
pub fn log_request_completion(context: &RequestLogContext<'_>, method: &str) {
    let status = context.http_status.unwrap_or_default();
    let endpoint = context.endpoint_or_default();
    if status >= 500 {
        fsim_error!(context = context, "{} {} - {}", method, endpoint, status);
    } else if status >= 400 {
        fsim_warn!(context = context, "{} {} - {}", method, endpoint, status);
    } else {
        fsim_info!(context = context, "{} {} - {}", method, endpoint, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    #[test]
    fn macros_emit_without_panic() {
        init();
        let ctx = RequestLogContext::new()
            .with_request_id("4711")
            .with_endpoint("/api/data");
        fsim_info!(context = ctx.clone(), "request accepted");
        fsim_warn!("system warning");
        fsim_error!(context = ctx, "error code: {}", 42);
    }

    #[test]
    fn placeholders_fill_missing_fields() {
        let ctx = RequestLogContext::new();
        assert_eq!(ctx.request_id_or_default(), "SYSTEM");
        assert_eq!(ctx.endpoint_or_default(), "INTERNAL");
        assert_eq!(ctx.error_type_or_default(), "none");
        assert_eq!(ctx.severity_or_default(), "none");
    }

    #[test]
    fn completion_helper_covers_every_status_class() {
        init();
        for status in [200u16, 429, 503] {
            let ctx = RequestLogContext::new()
                .with_request_id("1")
                .with_endpoint("/api/data")
                .with_status(status)
                .with_duration_ms(12.5);
            log_request_completion(&ctx, "GET");
        }
    }
}
