// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Idempotency Checker
//!
//! Check-before-write around stage execution. A stage re-runs only when no
//! completion marker exists or the stored data hash no longer matches the
//! hash of its current canonical input; a stale marker triggers cleanup of
//! the stage's prior outputs before re-execution.
//!
//! `set_marker` and the stage-status flip to `completed` happen in one store
//! transaction (inside the marker repository). Cleanup runs in its own
//! transaction immediately before execution: if the process dies between
//! cleanup and `set_marker`, the next run re-enters with no marker and
//! re-executes correctly, because cleanup itself is idempotent.

use std::sync::Arc;

use tracing::debug;

use docpipe_domain::entities::{CompletionMarker, ProcessingContext, StageState};
use docpipe_domain::repositories::{CompletionMarkerRepository, DocumentRepository};
use docpipe_domain::services::canonical_json;
use docpipe_domain::services::Stage;
use docpipe_domain::value_objects::{DocumentId, StageName};
use docpipe_domain::PipelineError;

/// Result of a completion check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCheck {
    pub is_complete: bool,
    pub stored_hash: Option<String>,
}

/// Idempotency checker over the marker and document repositories.
pub struct IdempotencyChecker {
    markers: Arc<dyn CompletionMarkerRepository>,
    documents: Arc<dyn DocumentRepository>,
}

impl IdempotencyChecker {
    pub fn new(
        markers: Arc<dyn CompletionMarkerRepository>,
        documents: Arc<dyn DocumentRepository>,
    ) -> Self {
        Self { markers, documents }
    }

    /// Reads the completion marker for a (document, stage)
    pub async fn check(
        &self,
        document_id: DocumentId,
        stage: StageName,
    ) -> Result<CompletionCheck, PipelineError> {
        let marker = self.markers.find(document_id, stage).await?;
        Ok(CompletionCheck {
            is_complete: marker.is_some(),
            stored_hash: marker.map(|m| m.data_hash().to_string()),
        })
    }

    /// SHA-256 hex digest over the stage's canonical input
    pub fn compute_hash(stage: &dyn Stage, ctx: &ProcessingContext) -> Result<String, PipelineError> {
        let canonical = stage.canonical_input(ctx)?;
        Ok(canonical_json::hash_bytes(&canonical))
    }

    /// Removes the stage's prior outputs: invokes the stage's own cleanup
    /// handle, drops the stale marker, and resets the stage status. Safe to
    /// repeat.
    pub async fn cleanup(&self, stage: &dyn Stage, document_id: DocumentId) -> Result<(), PipelineError> {
        debug!(document_id = %document_id, stage = %stage.name(), "Cleaning stale stage outputs");
        stage.cleanup(document_id).await?;
        self.markers.delete(document_id, stage.name()).await?;
        self.documents
            .set_stage_state(document_id, stage.name(), StageState::NotStarted)
            .await
    }

    /// Upserts the completion marker and flips stage status to `completed`
    /// in one transaction
    pub async fn set_marker(
        &self,
        document_id: DocumentId,
        stage: StageName,
        data_hash: &str,
        metadata: serde_json::Value,
    ) -> Result<(), PipelineError> {
        let marker = CompletionMarker::new(document_id, stage, data_hash, metadata)?;
        self.markers.set_marker(&marker).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::{
        schema, SqliteDocumentRepository, SqliteMarkerRepository,
    };
    use async_trait::async_trait;
    use docpipe_domain::entities::Document;
    use std::collections::HashMap;
    use uuid::Uuid;

    struct NoopStage;

    #[async_trait]
    impl Stage for NoopStage {
        fn name(&self) -> StageName {
            StageName::Upload
        }

        fn declared_input(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
            Ok(serde_json::json!({
                "document_id": ctx.document_id().to_string(),
                "stage": "upload",
            }))
        }

        async fn execute(&self, _ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
            Ok(serde_json::json!({}))
        }

        async fn cleanup(&self, _document_id: DocumentId) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    async fn checker() -> (IdempotencyChecker, Arc<SqliteDocumentRepository>, DocumentId) {
        let pool = schema::in_memory_database().await.unwrap();
        let documents = Arc::new(SqliteDocumentRepository::new(pool.clone()));
        let markers = Arc::new(SqliteMarkerRepository::new(pool));

        let doc = Document::new(DocumentId::new(), "documents/x/source.pdf", "ab".repeat(32)).unwrap();
        documents.save(&doc).await.unwrap();

        let checker = IdempotencyChecker::new(
            markers,
            Arc::clone(&documents) as Arc<dyn DocumentRepository>,
        );
        (checker, documents, doc.id())
    }

    fn ctx(doc: DocumentId) -> ProcessingContext {
        ProcessingContext::new(doc, Uuid::new_v4(), StageName::Upload, serde_json::json!({}), HashMap::new())
            .unwrap()
    }

    #[tokio::test]
    async fn test_check_after_set_marker() {
        let (checker, _docs, doc) = checker().await;
        let hash = IdempotencyChecker::compute_hash(&NoopStage, &ctx(doc)).unwrap();

        let before = checker.check(doc, StageName::Upload).await.unwrap();
        assert!(!before.is_complete);

        checker
            .set_marker(doc, StageName::Upload, &hash, serde_json::json!({}))
            .await
            .unwrap();

        let after = checker.check(doc, StageName::Upload).await.unwrap();
        assert!(after.is_complete);
        assert_eq!(after.stored_hash, Some(hash));
    }

    #[tokio::test]
    async fn test_hash_is_stable_per_document() {
        let (_checker, _docs, doc) = checker().await;
        let a = IdempotencyChecker::compute_hash(&NoopStage, &ctx(doc)).unwrap();
        let b = IdempotencyChecker::compute_hash(&NoopStage, &ctx(doc)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_cleanup_resets_marker_and_status() {
        let (checker, docs, doc) = checker().await;
        let hash = IdempotencyChecker::compute_hash(&NoopStage, &ctx(doc)).unwrap();
        checker
            .set_marker(doc, StageName::Upload, &hash, serde_json::json!({}))
            .await
            .unwrap();

        checker.cleanup(&NoopStage, doc).await.unwrap();
        let check = checker.check(doc, StageName::Upload).await.unwrap();
        assert!(!check.is_complete);
        assert_eq!(
            docs.stage_status(doc).await.unwrap().get(StageName::Upload),
            StageState::NotStarted
        );

        // Cleanup is idempotent
        checker.cleanup(&NoopStage, doc).await.unwrap();
    }
}
