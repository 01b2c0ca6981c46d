// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Error Record Repository Port
//!
//! Failure records live past the request that created them: the background
//! retry scheduler polls `due_retries`, concurrent dispatches consult
//! `find_active_retry`, and administrative cancellation resolves through
//! `find_by_id`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::PipelineErrorRecord;
use crate::error::PipelineError;
use crate::value_objects::{DocumentId, StageName};

/// Repository interface for durable failure records.
#[async_trait]
pub trait ErrorRecordRepository: Send + Sync {
    /// Inserts a new record
    async fn insert(&self, record: &PipelineErrorRecord) -> Result<(), PipelineError>;

    /// Updates an existing record in place
    async fn update(&self, record: &PipelineErrorRecord) -> Result<(), PipelineError>;

    /// Finds a record by id
    async fn find_by_id(&self, error_id: Uuid) -> Result<Option<PipelineErrorRecord>, PipelineError>;

    /// The non-terminal (`pending` or `retrying`) record for a
    /// (document, stage), if one exists. At most one such record is active
    /// at a time.
    async fn find_active_retry(
        &self,
        document_id: DocumentId,
        stage: StageName,
    ) -> Result<Option<PipelineErrorRecord>, PipelineError>;

    /// Records in `retrying` whose `next_retry_at` has passed
    async fn due_retries(&self, now: DateTime<Utc>) -> Result<Vec<PipelineErrorRecord>, PipelineError>;

    /// Recent records for one document, newest first
    async fn find_by_document(
        &self,
        document_id: DocumentId,
        limit: u32,
    ) -> Result<Vec<PipelineErrorRecord>, PipelineError>;

    /// Deletes terminal records older than the horizon, returning the count
    async fn purge_terminal_older_than(&self, older_than: DateTime<Utc>) -> Result<u64, PipelineError>;
}
