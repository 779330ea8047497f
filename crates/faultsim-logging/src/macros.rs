//! ---
//! fsim_section: "03-observability"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Structured request logging."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---

#[doc(hidden)]
#[macro_export]
macro_rules! __fsim_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx: &$crate::RequestLogContext<'_> = &$ctx;
        tracing::event!(
            $level,
            request_id = ctx.request_id_or_default(),
            endpoint = ctx.endpoint_or_default(),
            duration_ms = ctx.duration_ms.unwrap_or_default(),
            http_status = ctx.http_status.unwrap_or_default(),
            error_type = ctx.error_type_or_default(),
            severity = ctx.severity_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with request context.
#[macro_export]
macro_rules! fsim_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__fsim_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__fsim_event!(tracing::Level::INFO, $crate::RequestLogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with request context.
#[macro_export]
macro_rules! fsim_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__fsim_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__fsim_event!(tracing::Level::WARN, $crate::RequestLogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with request context.
#[macro_export]
macro_rules! fsim_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__fsim_event!(tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__fsim_event!(tracing::Level::ERROR, $crate::RequestLogContext::default(), $($arg)+)
    };
}
