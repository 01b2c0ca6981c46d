// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Completion Marker Repository
//!
//! `set_marker` upserts the marker row and flips the document's stage state
//! to `completed` inside one transaction. That single write point is what
//! keeps the marker ⇔ `completed` invariant true at every consistent
//! snapshot: no code path writes one without the other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use docpipe_domain::entities::{CompletionMarker, StageState, StageStatusMap};
use docpipe_domain::repositories::CompletionMarkerRepository;
use docpipe_domain::value_objects::{DocumentId, StageName};
use docpipe_domain::PipelineError;

use super::db_err;

/// Completion marker repository over a shared SQLite pool.
pub struct SqliteMarkerRepository {
    pool: SqlitePool,
}

impl SqliteMarkerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<CompletionMarker, PipelineError> {
        let document_id: String = row.try_get("document_id").map_err(db_err)?;
        let stage_name: String = row.try_get("stage_name").map_err(db_err)?;
        let completed_at: DateTime<Utc> = row.try_get("completed_at").map_err(db_err)?;
        let data_hash: String = row.try_get("data_hash").map_err(db_err)?;
        let metadata: String = row.try_get("metadata").map_err(db_err)?;

        Ok(CompletionMarker::from_parts(
            DocumentId::parse(&document_id)?,
            stage_name.parse()?,
            completed_at,
            data_hash,
            serde_json::from_str(&metadata)?,
        ))
    }
}

#[async_trait]
impl CompletionMarkerRepository for SqliteMarkerRepository {
    async fn find(
        &self,
        document_id: DocumentId,
        stage: StageName,
    ) -> Result<Option<CompletionMarker>, PipelineError> {
        let row = sqlx::query(
            "SELECT * FROM stage_completion_markers WHERE document_id = ? AND stage_name = ?",
        )
        .bind(document_id.to_string())
        .bind(stage.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn find_all(&self, document_id: DocumentId) -> Result<Vec<CompletionMarker>, PipelineError> {
        let rows = sqlx::query(
            "SELECT * FROM stage_completion_markers WHERE document_id = ? ORDER BY stage_name",
        )
        .bind(document_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(Self::map_row).collect()
    }

    async fn set_marker(&self, marker: &CompletionMarker) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO stage_completion_markers (document_id, stage_name, completed_at, data_hash, metadata)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(document_id, stage_name) DO UPDATE SET
                completed_at = excluded.completed_at,
                data_hash = excluded.data_hash,
                metadata = excluded.metadata
            "#,
        )
        .bind(marker.document_id().to_string())
        .bind(marker.stage_name().as_str())
        .bind(marker.completed_at())
        .bind(marker.data_hash())
        .bind(serde_json::to_string(marker.metadata())?)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        // Stage status moves to completed in the same transaction
        let status: Option<String> = sqlx::query_scalar("SELECT stage_status FROM documents WHERE id = ?")
            .bind(marker.document_id().to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

        let mut map: StageStatusMap = match status {
            Some(json) => serde_json::from_str(&json)?,
            None => {
                return Err(PipelineError::NotFound(format!(
                    "Document {}",
                    marker.document_id()
                )))
            }
        };
        map.set(marker.stage_name(), StageState::Completed);

        sqlx::query("UPDATE documents SET stage_status = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&map)?)
            .bind(Utc::now())
            .bind(marker.document_id().to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }

    async fn delete(&self, document_id: DocumentId, stage: StageName) -> Result<(), PipelineError> {
        sqlx::query("DELETE FROM stage_completion_markers WHERE document_id = ? AND stage_name = ?")
            .bind(document_id.to_string())
            .bind(stage.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::schema;
    use crate::infrastructure::repositories::sqlite_document_repository::SqliteDocumentRepository;
    use docpipe_domain::entities::Document;
    use docpipe_domain::repositories::DocumentRepository;

    async fn fixtures() -> (SqliteDocumentRepository, SqliteMarkerRepository, DocumentId) {
        let pool = schema::in_memory_database().await.unwrap();
        let docs = SqliteDocumentRepository::new(pool.clone());
        let markers = SqliteMarkerRepository::new(pool);

        let doc = Document::new(DocumentId::new(), "documents/x/source.pdf", "cd".repeat(32)).unwrap();
        docs.save(&doc).await.unwrap();
        (docs, markers, doc.id())
    }

    fn marker(doc: DocumentId, stage: StageName, hash: &str) -> CompletionMarker {
        CompletionMarker::new(doc, stage, hash, serde_json::json!({})).unwrap()
    }

    #[tokio::test]
    async fn test_set_marker_updates_status_atomically() {
        let (docs, markers, doc_id) = fixtures().await;
        let hash = "12".repeat(32);
        markers
            .set_marker(&marker(doc_id, StageName::Upload, &hash))
            .await
            .unwrap();

        let found = markers.find(doc_id, StageName::Upload).await.unwrap().unwrap();
        assert_eq!(found.data_hash(), hash);

        let status = docs.stage_status(doc_id).await.unwrap();
        assert_eq!(status.get(StageName::Upload), StageState::Completed);
    }

    #[tokio::test]
    async fn test_marker_overwrite_on_changed_hash() {
        let (_docs, markers, doc_id) = fixtures().await;
        markers
            .set_marker(&marker(doc_id, StageName::ChunkPrep, &"aa".repeat(32)))
            .await
            .unwrap();
        markers
            .set_marker(&marker(doc_id, StageName::ChunkPrep, &"bb".repeat(32)))
            .await
            .unwrap();

        let found = markers.find(doc_id, StageName::ChunkPrep).await.unwrap().unwrap();
        assert_eq!(found.data_hash(), "bb".repeat(32));
        assert_eq!(markers.find_all(doc_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_docs, markers, doc_id) = fixtures().await;
        markers.delete(doc_id, StageName::Upload).await.unwrap();
        markers.delete(doc_id, StageName::Upload).await.unwrap();
        assert!(markers.find(doc_id, StageName::Upload).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_marker_requires_document() {
        let (_docs, markers, _doc_id) = fixtures().await;
        let orphan = marker(DocumentId::new(), StageName::Upload, &"ee".repeat(32));
        assert!(markers.set_marker(&orphan).await.is_err());
    }
}
