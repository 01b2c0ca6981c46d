// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Document Repository
//!
//! Persists documents with the per-stage status map as a JSON column on the
//! document row. Single-stage status updates are read-modify-write inside a
//! store transaction so concurrent stage runners serialize on the row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use docpipe_domain::entities::{Document, StageState, StageStatusMap};
use docpipe_domain::repositories::DocumentRepository;
use docpipe_domain::value_objects::{DocumentId, StageName};
use docpipe_domain::PipelineError;

use super::db_err;

/// Document repository over a shared SQLite pool.
pub struct SqliteDocumentRepository {
    pool: SqlitePool,
}

impl SqliteDocumentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<Document, PipelineError> {
        let id: String = row.try_get("id").map_err(db_err)?;
        let source_key: String = row.try_get("source_key").map_err(db_err)?;
        let source_sha256: String = row.try_get("source_sha256").map_err(db_err)?;
        let metadata: String = row.try_get("metadata").map_err(db_err)?;
        let stage_status: String = row.try_get("stage_status").map_err(db_err)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(db_err)?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(db_err)?;

        Ok(Document::from_parts(
            DocumentId::parse(&id)?,
            source_key,
            source_sha256,
            serde_json::from_str(&metadata)?,
            serde_json::from_str::<StageStatusMap>(&stage_status)?,
            created_at,
            updated_at,
        ))
    }
}

#[async_trait]
impl DocumentRepository for SqliteDocumentRepository {
    async fn save(&self, document: &Document) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, source_key, source_sha256, metadata, stage_status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                metadata = excluded.metadata,
                stage_status = excluded.stage_status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(document.id().to_string())
        .bind(document.source_key())
        .bind(document.source_sha256())
        .bind(serde_json::to_string(document.metadata())?)
        .bind(serde_json::to_string(document.stage_status())?)
        .bind(document.created_at())
        .bind(document.updated_at())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: DocumentId) -> Result<Option<Document>, PipelineError> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn stage_status(&self, id: DocumentId) -> Result<StageStatusMap, PipelineError> {
        let status: Option<String> = sqlx::query_scalar("SELECT stage_status FROM documents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match status {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(PipelineError::NotFound(format!("Document {}", id))),
        }
    }

    async fn set_stage_state(
        &self,
        id: DocumentId,
        stage: StageName,
        state: StageState,
    ) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let status: Option<String> = sqlx::query_scalar("SELECT stage_status FROM documents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

        let mut map: StageStatusMap = match status {
            Some(json) => serde_json::from_str(&json)?,
            None => return Err(PipelineError::NotFound(format!("Document {}", id))),
        };
        map.set(stage, state);

        sqlx::query("UPDATE documents SET stage_status = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&map)?)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }

    async fn sweep_stale_in_progress(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<(DocumentId, StageName)>, PipelineError> {
        // Stage states carry no per-stage timestamp; the document row's
        // updated_at bounds the age of its newest transition.
        let rows = sqlx::query(
            "SELECT id, stage_status FROM documents
             WHERE stage_status LIKE '%in_progress%' AND updated_at < ?",
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut reconciled = Vec::new();
        for row in rows {
            let id: String = row.try_get("id").map_err(db_err)?;
            let id = DocumentId::parse(&id)?;
            let json: String = row.try_get("stage_status").map_err(db_err)?;
            let mut map: StageStatusMap = serde_json::from_str(&json)?;

            let stale = map.stages_in(StageState::InProgress);
            if stale.is_empty() {
                continue;
            }
            for stage in &stale {
                map.set(*stage, StageState::Pending);
                reconciled.push((id, *stage));
            }

            sqlx::query("UPDATE documents SET stage_status = ?, updated_at = ? WHERE id = ?")
                .bind(serde_json::to_string(&map)?)
                .bind(Utc::now())
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        Ok(reconciled)
    }

    async fn delete(&self, id: DocumentId) -> Result<(), PipelineError> {
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id.to_string())
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

    async fn repo() -> SqliteDocumentRepository {
        let pool = schema::in_memory_database().await.unwrap();
        SqliteDocumentRepository::new(pool)
    }

    fn document() -> Document {
        Document::new(DocumentId::new(), "documents/x/source.pdf", "ab".repeat(32)).unwrap()
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let repo = repo().await;
        let doc = document();
        repo.save(&doc).await.unwrap();

        let loaded = repo.find_by_id(doc.id()).await.unwrap().unwrap();
        assert_eq!(loaded.id(), doc.id());
        assert_eq!(loaded.source_sha256(), doc.source_sha256());
    }

    #[tokio::test]
    async fn test_stage_state_round_trip() {
        let repo = repo().await;
        let doc = document();
        repo.save(&doc).await.unwrap();

        repo.set_stage_state(doc.id(), StageName::Upload, StageState::Completed)
            .await
            .unwrap();
        let status = repo.stage_status(doc.id()).await.unwrap();
        assert_eq!(status.get(StageName::Upload), StageState::Completed);
        assert_eq!(status.get(StageName::Embedding), StageState::NotStarted);
    }

    #[tokio::test]
    async fn test_missing_document_errors() {
        let repo = repo().await;
        assert!(repo.stage_status(DocumentId::new()).await.is_err());
        assert!(repo
            .set_stage_state(DocumentId::new(), StageName::Upload, StageState::Pending)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_sweep_stale_in_progress() {
        let repo = repo().await;
        let doc = document();
        repo.save(&doc).await.unwrap();
        repo.set_stage_state(doc.id(), StageName::ChunkPrep, StageState::InProgress)
            .await
            .unwrap();

        // Horizon in the future captures the row we just wrote
        let reconciled = repo
            .sweep_stale_in_progress(Utc::now() + chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(reconciled, vec![(doc.id(), StageName::ChunkPrep)]);

        let status = repo.stage_status(doc.id()).await.unwrap();
        assert_eq!(status.get(StageName::ChunkPrep), StageState::Pending);
    }
}
