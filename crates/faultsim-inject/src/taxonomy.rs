//! ---
//! fsim_section: "02-failure-injection"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Failure taxonomy and injection planning."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error classification carried end to end, independent of HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Client-correctable, does not need immediate attention.
    Mild,
    /// Server-side failure.
    Critical,
    /// Failure of a downstream dependency.
    External,
}

impl Severity {
    /// Every severity, in reporting order.
    pub const ALL: [Severity; 3] = [Severity::Mild, Severity::Critical, Severity::External];

    /// Lowercase label used in JSON bodies and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Mild => "mild",
            Severity::Critical => "critical",
            Severity::External => "external",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mild" => Ok(Severity::Mild),
            "critical" => Ok(Severity::Critical),
            "external" => Ok(Severity::External),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Fixed error taxonomy of the simulated API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Drawn by the error-rate check.
    RateLimitExceeded,
    /// Drawn by the error-rate check.
    ValidationError,
    /// Drawn by the error-rate check.
    DatabaseLock,
    /// Drawn by the error-rate check.
    DatabaseConnectionError,
    /// Drawn by the error-rate check.
    InternalServerError,
    /// Drawn by the error-rate check.
    ForbiddenAccess,
    /// Raised by the timeout check.
    ExternalTimeout,
    /// Raised by the downstream-failure check.
    ExternalServiceError,
    /// A failure-override header could not be used.
    InvalidHeader,
    /// Catch-all for unclassified server failures.
    InternalError,
}

impl ErrorKind {
    /// Pool the error-rate check picks from, uniformly.
    pub const RANDOM_POOL: [ErrorKind; 6] = [
        ErrorKind::RateLimitExceeded,
        ErrorKind::ValidationError,
        ErrorKind::DatabaseLock,
        ErrorKind::DatabaseConnectionError,
        ErrorKind::InternalServerError,
        ErrorKind::ForbiddenAccess,
    ];

    /// Name reported in the `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimitExceeded => "RateLimitExceeded",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::DatabaseLock => "DatabaseLock",
            ErrorKind::DatabaseConnectionError => "DatabaseConnectionError",
            ErrorKind::InternalServerError => "InternalServerError",
            ErrorKind::ForbiddenAccess => "ForbiddenAccess",
            ErrorKind::ExternalTimeout => "ExternalTimeout",
            ErrorKind::ExternalServiceError => "ExternalServiceError",
            ErrorKind::InvalidHeader => "InvalidHeader",
            ErrorKind::InternalError => "InternalError",
        }
    }

    /// Canned message for the kind.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::RateLimitExceeded => "API rate limit exceeded",
            ErrorKind::ValidationError => "Invalid input parameters",
            ErrorKind::DatabaseLock => "Temporary database lock",
            ErrorKind::DatabaseConnectionError => "Database unreachable",
            ErrorKind::InternalServerError => "Critical system failure",
            ErrorKind::ForbiddenAccess => "Third-party auth failure",
            ErrorKind::ExternalTimeout => "Downstream service timeout",
            ErrorKind::ExternalServiceError => "Payment service unavailable",
            ErrorKind::InvalidHeader => "Invalid failure override header",
            ErrorKind::InternalError => "Internal server error",
        }
    }

    /// Severity attached to the kind.
    pub fn severity(&self) -> Severity {
        match self {
            ErrorKind::RateLimitExceeded
            | ErrorKind::ValidationError
            | ErrorKind::DatabaseLock
            | ErrorKind::InvalidHeader => Severity::Mild,
            ErrorKind::DatabaseConnectionError
            | ErrorKind::InternalServerError
            | ErrorKind::InternalError => Severity::Critical,
            ErrorKind::ForbiddenAccess
            | ErrorKind::ExternalTimeout
            | ErrorKind::ExternalServiceError => Severity::External,
        }
    }

    /// HTTP status code returned for the kind.
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::RateLimitExceeded => 429,
            ErrorKind::ValidationError | ErrorKind::InvalidHeader => 400,
            ErrorKind::DatabaseLock | ErrorKind::ExternalTimeout => 504,
            ErrorKind::DatabaseConnectionError | ErrorKind::ExternalServiceError => 503,
            ErrorKind::InternalServerError | ErrorKind::InternalError => 500,
            ErrorKind::ForbiddenAccess => 403,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error with a taxonomy kind and a message, ready to cross the transport boundary.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ClassifiedError {
    kind: ErrorKind,
    message: String,
}

impl ClassifiedError {
    /// Build an error carrying the kind's canned message.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_owned(),
        }
    }

    /// Build an error with a custom message.
    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Kind of the error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Severity derived from the kind.
    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    /// HTTP status derived from the kind.
    pub fn status(&self) -> u16 {
        self.kind.status()
    }

    /// JSON body returned to clients.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.message.clone(),
            error_type: self.kind.as_str().to_owned(),
            severity: self.severity(),
        }
    }
}

impl From<ErrorKind> for ClassifiedError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Wire form of a classified error: `{error, type, severity}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Message text.
    pub error: String,
    /// Taxonomy name.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Severity label.
    pub severity: Severity,
}
