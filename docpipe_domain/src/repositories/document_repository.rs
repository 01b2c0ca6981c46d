// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Document Repository Port
//!
//! Persistence abstraction for documents and their per-stage status map.
//! The status map lives as a JSON column on the document row; updates to a
//! single stage's state read-modify-write that column inside the store's
//! transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{Document, StageState, StageStatusMap};
use crate::error::PipelineError;
use crate::value_objects::{DocumentId, StageName};

/// Repository interface for document rows.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Persists a new document
    async fn save(&self, document: &Document) -> Result<(), PipelineError>;

    /// Finds a document by id
    async fn find_by_id(&self, id: DocumentId) -> Result<Option<Document>, PipelineError>;

    /// Reads just the stage status map
    async fn stage_status(&self, id: DocumentId) -> Result<StageStatusMap, PipelineError>;

    /// Sets one stage's state
    async fn set_stage_state(
        &self,
        id: DocumentId,
        stage: StageName,
        state: StageState,
    ) -> Result<(), PipelineError>;

    /// Reconciles `in_progress` entries older than the horizon back to
    /// `pending`, returning the reconciled pairs. Covers processes that died
    /// while holding a stage.
    async fn sweep_stale_in_progress(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<(DocumentId, StageName)>, PipelineError>;

    /// Removes a document; owned markers cascade in the store
    async fn delete(&self, id: DocumentId) -> Result<(), PipelineError>;
}
