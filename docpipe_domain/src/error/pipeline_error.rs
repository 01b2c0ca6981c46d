// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! Hierarchical error system for the document-processing pipeline domain.
//! Every failure that can occur inside the core is represented as a variant of
//! [`PipelineError`], and every variant maps onto exactly one stable error
//! code and one retry class.
//!
//! ## Error Taxonomy
//!
//! The taxonomy is stable across the core and drives the retry machinery:
//!
//! - `validation_error` (permanent): input violates a declared schema or
//!   contract
//! - `prerequisite_not_met` (permanent within the request): a DAG predecessor
//!   has not completed
//! - `concurrent_retry_in_progress` (benign skip): another worker is already
//!   retrying the same (document, stage)
//! - `transient_external` (transient): 5xx, 408, 429, timeouts, and
//!   connection failures from external adapters
//! - `permanent_external` (permanent): other 4xx responses
//! - `internal_error` (permanent by default; the classifier upgrades to
//!   transient when the failure kind matches a transient rule)
//! - `cancelled` (terminal, neither success nor failure)
//!
//! ## Classification
//!
//! [`PipelineError::classify`] implements the classification table: it never
//! fails and unknown signals default to [`ErrorClass::Permanent`] so an
//! unexpected condition can not produce an infinite retry loop.
//!
//! ## Conversions
//!
//! Standard library and serde errors convert into the infrastructure-flavored
//! variants so `?` works at every seam. Persistence-technology errors (sqlx)
//! are converted at the infrastructure layer; the domain crate stays free of
//! database dependencies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Retry class assigned to a failure by the error classifier.
///
/// `Transient` failures are eligible for the hybrid retry path; `Permanent`
/// failures are recorded and surfaced immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Permanent,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Permanent => write!(f, "permanent"),
        }
    }
}

impl std::str::FromStr for ErrorClass {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transient" => Ok(ErrorClass::Transient),
            "permanent" => Ok(ErrorClass::Permanent),
            other => Err(PipelineError::ValidationError(format!(
                "Unknown error class: {}",
                other
            ))),
        }
    }
}

/// Domain-specific errors for the document-processing pipeline.
///
/// Each variant carries a descriptive message; variants that originate at an
/// external HTTP boundary additionally carry the status code so the
/// classifier can apply the status-based rules.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Prerequisite not met: {0}")]
    PrerequisiteNotMet(String),

    #[error("Concurrent retry in progress: {0}")]
    ConcurrentRetryInProgress(String),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("External service error (status {status:?}): {message}")]
    ExternalService { status: Option<u16>, message: String },

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Lock unavailable: {0}")]
    LockUnavailable(String),

    #[error("Forbidden in production: {0}")]
    ForbiddenInProduction(String),

    #[error("Baseline already exists: {0}")]
    BaselineExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),
}

impl PipelineError {
    /// Creates a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Creates a new configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new external-service error carrying an HTTP status
    pub fn external(status: u16, msg: impl Into<String>) -> Self {
        Self::ExternalService {
            status: Some(status),
            message: msg.into(),
        }
    }

    /// Creates a new database error
    pub fn database_error(msg: impl Into<String>) -> Self {
        Self::DatabaseError(msg.into())
    }

    /// Creates a new internal error
    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Creates a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::TimeoutError(msg.into())
    }

    /// Creates a new metrics error
    pub fn metrics_error(msg: impl Into<String>) -> Self {
        Self::MetricsError(msg.into())
    }

    /// Classifies the failure as transient or permanent.
    ///
    /// Rules, in order:
    /// - HTTP status 5xx, 408 or 429 is transient; any other 4xx is permanent
    /// - connection, timeout, temporary I/O and resource-exhaustion failures
    ///   are transient
    /// - validation, authentication, permission, malformed-input and schema
    ///   failures are permanent
    /// - everything else is permanent
    ///
    /// Classification itself never fails.
    pub fn classify(&self) -> ErrorClass {
        match self {
            PipelineError::ExternalService { status, .. } => match status {
                Some(408) | Some(429) => ErrorClass::Transient,
                Some(s) if (500..=599).contains(s) => ErrorClass::Transient,
                Some(s) if (400..=499).contains(s) => ErrorClass::Permanent,
                _ => ErrorClass::Permanent,
            },
            PipelineError::ConnectionError(_)
            | PipelineError::TimeoutError(_)
            | PipelineError::IoError(_)
            | PipelineError::ResourceExhausted(_) => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        }
    }

    /// Checks if the error is eligible for the retry path
    pub fn is_transient(&self) -> bool {
        self.classify() == ErrorClass::Transient
    }

    /// Checks if the error represents a benign concurrent-retry skip
    pub fn is_benign_skip(&self) -> bool {
        matches!(self, PipelineError::ConcurrentRetryInProgress(_))
    }

    /// Gets the stable error code surfaced to callers in stage result maps.
    ///
    /// Codes are part of the public contract and never change between
    /// releases.
    pub fn error_code(&self) -> &'static str {
        match self {
            PipelineError::ValidationError(_)
            | PipelineError::MissingField(_)
            | PipelineError::SchemaMismatch(_) => "validation_error",
            PipelineError::InvalidConfiguration(_) => "invalid_configuration",
            PipelineError::PrerequisiteNotMet(_) => "prerequisite_not_met",
            PipelineError::ConcurrentRetryInProgress(_) => "concurrent_retry_in_progress",
            PipelineError::UnknownStage(_) => "unknown_stage",
            PipelineError::ExternalService { .. } => match self.classify() {
                ErrorClass::Transient => "transient_external",
                ErrorClass::Permanent => "permanent_external",
            },
            PipelineError::ConnectionError(_)
            | PipelineError::TimeoutError(_)
            | PipelineError::IoError(_)
            | PipelineError::ResourceExhausted(_) => "transient_external",
            PipelineError::AuthenticationError(_) => "authentication_error",
            PipelineError::PermissionDenied(_) => "permission_denied",
            PipelineError::DatabaseError(_) => "database_error",
            PipelineError::ObjectStoreError(_) => "object_store_error",
            PipelineError::SerializationError(_) => "serialization_error",
            PipelineError::LockUnavailable(_) => "lock_unavailable",
            PipelineError::ForbiddenInProduction(_) => "forbidden_in_production",
            PipelineError::BaselineExists(_) => "baseline_exists",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Cancelled(_) => "cancelled",
            PipelineError::InternalError(_) => "internal_error",
            PipelineError::MetricsError(_) => "metrics_error",
        }
    }

    /// Gets the error category for logging and metrics labels
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::ValidationError(_)
            | PipelineError::MissingField(_)
            | PipelineError::SchemaMismatch(_) => "validation",
            PipelineError::InvalidConfiguration(_) => "configuration",
            PipelineError::PrerequisiteNotMet(_) => "orchestration",
            PipelineError::ConcurrentRetryInProgress(_) => "concurrency",
            PipelineError::UnknownStage(_) => "registry",
            PipelineError::ExternalService { .. }
            | PipelineError::ConnectionError(_)
            | PipelineError::TimeoutError(_) => "external",
            PipelineError::IoError(_) => "io",
            PipelineError::DatabaseError(_) => "database",
            PipelineError::ObjectStoreError(_) => "object_store",
            PipelineError::SerializationError(_) => "serialization",
            PipelineError::AuthenticationError(_) | PipelineError::PermissionDenied(_) => "security",
            PipelineError::ResourceExhausted(_) => "resource",
            PipelineError::LockUnavailable(_) => "concurrency",
            PipelineError::ForbiddenInProduction(_) | PipelineError::BaselineExists(_) => "performance",
            PipelineError::NotFound(_) => "lookup",
            PipelineError::Cancelled(_) => "cancellation",
            PipelineError::InternalError(_) => "internal",
            PipelineError::MetricsError(_) => "metrics",
        }
    }
}

// Implement conversion from standard library errors
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                PipelineError::ConnectionError(err.to_string())
            }
            ErrorKind::TimedOut => PipelineError::TimeoutError(err.to_string()),
            _ => PipelineError::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_classification() {
        assert_eq!(PipelineError::external(503, "unavailable").classify(), ErrorClass::Transient);
        assert_eq!(PipelineError::external(500, "boom").classify(), ErrorClass::Transient);
        assert_eq!(PipelineError::external(408, "slow").classify(), ErrorClass::Transient);
        assert_eq!(PipelineError::external(429, "throttled").classify(), ErrorClass::Transient);
        assert_eq!(PipelineError::external(404, "missing").classify(), ErrorClass::Permanent);
        assert_eq!(PipelineError::external(400, "bad request").classify(), ErrorClass::Permanent);
        assert_eq!(PipelineError::external(401, "unauthorized").classify(), ErrorClass::Permanent);
    }

    #[test]
    fn kind_classification() {
        assert_eq!(
            PipelineError::ConnectionError("reset by peer".into()).classify(),
            ErrorClass::Transient
        );
        assert_eq!(PipelineError::timeout("deadline").classify(), ErrorClass::Transient);
        assert_eq!(PipelineError::IoError("temporary".into()).classify(), ErrorClass::Transient);
        assert_eq!(PipelineError::validation("bad field").classify(), ErrorClass::Permanent);
        assert_eq!(
            PipelineError::AuthenticationError("expired".into()).classify(),
            ErrorClass::Permanent
        );
        assert_eq!(
            PipelineError::SchemaMismatch("wrong shape".into()).classify(),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn unknown_signals_default_to_permanent() {
        assert_eq!(
            PipelineError::internal_error("surprise").classify(),
            ErrorClass::Permanent
        );
        assert_eq!(
            PipelineError::ExternalService { status: None, message: "no status".into() }.classify(),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let err = PipelineError::external(502, "bad gateway");
        assert_eq!(err.classify(), err.classify());
    }

    #[test]
    fn stable_error_codes() {
        assert_eq!(PipelineError::validation("x").error_code(), "validation_error");
        assert_eq!(PipelineError::external(503, "x").error_code(), "transient_external");
        assert_eq!(PipelineError::external(403, "x").error_code(), "permanent_external");
        assert_eq!(
            PipelineError::PrerequisiteNotMet("x".into()).error_code(),
            "prerequisite_not_met"
        );
        assert_eq!(
            PipelineError::ForbiddenInProduction("x".into()).error_code(),
            "forbidden_in_production"
        );
    }

    #[test]
    fn io_error_kind_mapping() {
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(PipelineError::from(reset), PipelineError::ConnectionError(_)));

        let pipe = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(matches!(PipelineError::from(pipe), PipelineError::ConnectionError(_)));

        let timeout = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert!(matches!(PipelineError::from(timeout), PipelineError::TimeoutError(_)));
    }
}
