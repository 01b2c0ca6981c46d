// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Completion Marker Repository Port
//!
//! Markers and stage status move together: `set_marker` upserts the marker
//! row and flips the document's stage state to `completed` in one store
//! transaction, which is what keeps the marker ⇔ completed invariant true at
//! every consistent snapshot.

use async_trait::async_trait;

use crate::entities::CompletionMarker;
use crate::error::PipelineError;
use crate::value_objects::{DocumentId, StageName};

/// Repository interface for completion markers.
#[async_trait]
pub trait CompletionMarkerRepository: Send + Sync {
    /// Reads the marker for one (document, stage), if present
    async fn find(
        &self,
        document_id: DocumentId,
        stage: StageName,
    ) -> Result<Option<CompletionMarker>, PipelineError>;

    /// Reads all markers for a document
    async fn find_all(&self, document_id: DocumentId) -> Result<Vec<CompletionMarker>, PipelineError>;

    /// Upserts the marker and sets the stage state to `completed`
    /// atomically
    async fn set_marker(&self, marker: &CompletionMarker) -> Result<(), PipelineError>;

    /// Deletes one marker; deleting a missing marker succeeds
    async fn delete(&self, document_id: DocumentId, stage: StageName) -> Result<(), PipelineError>;
}
