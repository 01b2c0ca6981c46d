// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Error Records
//!
//! Durable failure bookkeeping. A record is created on first failure of a
//! (document, stage) attempt, updated on each retry, and ends in `resolved`
//! or `failed`. Records outlive the request that created them so the async
//! retry scheduler can pick them up later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorClass, PipelineError};
use crate::value_objects::{CorrelationId, DocumentId, StageName};

/// Lifecycle state of an error record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorRecordStatus {
    Pending,
    Retrying,
    Resolved,
    Failed,
}

impl ErrorRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorRecordStatus::Pending => "pending",
            ErrorRecordStatus::Retrying => "retrying",
            ErrorRecordStatus::Resolved => "resolved",
            ErrorRecordStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ErrorRecordStatus::Resolved | ErrorRecordStatus::Failed)
    }
}

impl std::str::FromStr for ErrorRecordStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ErrorRecordStatus::Pending),
            "retrying" => Ok(ErrorRecordStatus::Retrying),
            "resolved" => Ok(ErrorRecordStatus::Resolved),
            "failed" => Ok(ErrorRecordStatus::Failed),
            other => Err(PipelineError::ValidationError(format!(
                "Unknown error record status: {}",
                other
            ))),
        }
    }
}

/// One durable failure record for a (document, stage) attempt chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineErrorRecord {
    pub error_id: Uuid,
    pub document_id: DocumentId,
    pub stage_name: StageName,
    pub error_type: ErrorClass,
    pub error_message: String,
    pub retry_count: u32,
    pub status: ErrorRecordStatus,
    pub correlation_id: CorrelationId,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolution_notes: Option<String>,
}

impl PipelineErrorRecord {
    /// Creates a fresh record for a first failure
    pub fn new(
        document_id: DocumentId,
        stage_name: StageName,
        error_type: ErrorClass,
        error_message: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Self {
        let now = Utc::now();
        Self {
            error_id: Uuid::new_v4(),
            document_id,
            stage_name,
            error_type,
            error_message: error_message.into(),
            retry_count: 0,
            status: ErrorRecordStatus::Pending,
            correlation_id,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
            resolution_notes: None,
        }
    }

    /// Marks the record as scheduled for an async retry
    pub fn schedule_retry(
        &mut self,
        retry_count: u32,
        next_retry_at: DateTime<Utc>,
        correlation_id: CorrelationId,
    ) {
        self.retry_count = retry_count;
        self.status = ErrorRecordStatus::Retrying;
        self.next_retry_at = Some(next_retry_at);
        self.correlation_id = correlation_id;
        self.updated_at = Utc::now();
    }

    /// Resolves the record after a successful retry
    pub fn resolve(&mut self, retry_count: u32, notes: Option<String>) {
        self.retry_count = retry_count;
        self.status = ErrorRecordStatus::Resolved;
        self.next_retry_at = None;
        self.resolution_notes = notes;
        self.updated_at = Utc::now();
    }

    /// Terminally fails the record
    pub fn fail(&mut self, retry_count: u32, notes: Option<String>) {
        self.retry_count = retry_count;
        self.status = ErrorRecordStatus::Failed;
        self.next_retry_at = None;
        self.resolution_notes = notes;
        self.updated_at = Utc::now();
    }

    /// Cancels a pending async retry by administrative action
    pub fn cancel(&mut self) {
        self.status = ErrorRecordStatus::Failed;
        self.next_retry_at = None;
        self.resolution_notes = Some("cancelled".to_string());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PipelineErrorRecord {
        let cid = CorrelationId::new_request().extend(StageName::Embedding).unwrap();
        PipelineErrorRecord::new(
            DocumentId::new(),
            StageName::Embedding,
            ErrorClass::Transient,
            "503 from embedding service",
            cid,
        )
    }

    #[test]
    fn test_lifecycle_resolve() {
        let mut rec = record();
        assert_eq!(rec.status, ErrorRecordStatus::Pending);
        rec.resolve(1, None);
        assert_eq!(rec.status, ErrorRecordStatus::Resolved);
        assert_eq!(rec.retry_count, 1);
        assert!(rec.status.is_terminal());
    }

    #[test]
    fn test_lifecycle_schedule_then_fail() {
        let mut rec = record();
        let retry_cid = rec.correlation_id.extend_retry(1).unwrap();
        rec.schedule_retry(1, Utc::now(), retry_cid);
        assert_eq!(rec.status, ErrorRecordStatus::Retrying);
        assert!(rec.next_retry_at.is_some());

        rec.fail(3, Some("max retries exhausted".into()));
        assert_eq!(rec.status, ErrorRecordStatus::Failed);
        assert!(rec.next_retry_at.is_none());
    }

    #[test]
    fn test_cancellation_notes() {
        let mut rec = record();
        rec.schedule_retry(1, Utc::now(), rec.correlation_id.extend_retry(1).unwrap());
        rec.cancel();
        assert_eq!(rec.status, ErrorRecordStatus::Failed);
        assert_eq!(rec.resolution_notes.as_deref(), Some("cancelled"));
    }
}
