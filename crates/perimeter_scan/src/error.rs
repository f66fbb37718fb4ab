//! Error types for the perimeter scanner

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

/// Classification of a provider failure.
///
/// The orchestrator decides retry, scoping and abort behaviour from this
/// alone, so adapters must map their native errors onto it faithfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudErrorKind {
    /// Rate limited; safe to retry after backing off
    Throttled,
    /// The caller lacks permission for this one operation
    AccessDenied,
    /// Credentials are missing, expired or rejected outright
    InvalidCredentials,
    /// The addressed entity does not exist
    NotFound,
    /// The provider answered with data we cannot interpret
    Malformed,
    /// Any other provider-side failure
    Service,
}

impl CloudErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Throttled => "throttled",
            Self::AccessDenied => "access_denied",
            Self::InvalidCredentials => "invalid_credentials",
            Self::NotFound => "not_found",
            Self::Malformed => "malformed",
            Self::Service => "service",
        }
    }
}

impl fmt::Display for CloudErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed call against the cloud provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed ({kind}): {message}")]
pub struct CloudError {
    pub kind: CloudErrorKind,
    pub operation: String,
    pub message: String,
}

impl CloudError {
    pub fn new(
        kind: CloudErrorKind,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn throttled(operation: impl Into<String>) -> Self {
        Self::new(CloudErrorKind::Throttled, operation, "rate exceeded")
    }

    pub fn access_denied(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(CloudErrorKind::AccessDenied, operation, message)
    }

    /// Worth another attempt after a pause.
    pub fn is_retryable(&self) -> bool {
        self.kind == CloudErrorKind::Throttled
    }

    /// Ends the whole scan, no matter which unit of work hit it.
    pub fn is_fatal(&self) -> bool {
        self.kind == CloudErrorKind::InvalidCredentials
    }

    pub fn is_authorization(&self) -> bool {
        matches!(
            self.kind,
            CloudErrorKind::AccessDenied | CloudErrorKind::InvalidCredentials
        )
    }
}

/// An identifier that does not follow the `arn:partition:service:region:account:resource` shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed ARN '{arn}': {reason}")]
pub struct ArnError {
    pub arn: String,
    pub reason: String,
}

impl ArnError {
    pub fn new(arn: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            arn: arn.into(),
            reason: reason.into(),
        }
    }
}

/// Scanner error type
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    #[error("ARN error: {0}")]
    Arn(#[from] ArnError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ScanError>;
