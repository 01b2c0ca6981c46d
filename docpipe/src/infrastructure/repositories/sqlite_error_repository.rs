// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Pipeline Error Repository
//!
//! Durable failure records backing the async retry machinery. Rows are
//! intentionally independent of the documents table: an error's lifetime
//! exceeds the request that created it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use docpipe_domain::entities::{ErrorRecordStatus, PipelineErrorRecord};
use docpipe_domain::repositories::ErrorRecordRepository;
use docpipe_domain::value_objects::{CorrelationId, DocumentId, StageName};
use docpipe_domain::{ErrorClass, PipelineError};

use super::db_err;

/// Pipeline error repository over a shared SQLite pool.
pub struct SqliteErrorRepository {
    pool: SqlitePool,
}

impl SqliteErrorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<PipelineErrorRecord, PipelineError> {
        let error_id: String = row.try_get("error_id").map_err(db_err)?;
        let document_id: String = row.try_get("document_id").map_err(db_err)?;
        let stage_name: String = row.try_get("stage_name").map_err(db_err)?;
        let error_type: String = row.try_get("error_type").map_err(db_err)?;
        let error_message: String = row.try_get("error_message").map_err(db_err)?;
        let retry_count: i64 = row.try_get("retry_count").map_err(db_err)?;
        let status: String = row.try_get("status").map_err(db_err)?;
        let correlation_id: String = row.try_get("correlation_id").map_err(db_err)?;
        let next_retry_at: Option<DateTime<Utc>> = row.try_get("next_retry_at").map_err(db_err)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(db_err)?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(db_err)?;
        let resolution_notes: Option<String> = row.try_get("resolution_notes").map_err(db_err)?;

        Ok(PipelineErrorRecord {
            error_id: Uuid::parse_str(&error_id)
                .map_err(|e| PipelineError::validation(format!("Invalid error id: {}", e)))?,
            document_id: DocumentId::parse(&document_id)?,
            stage_name: stage_name.parse::<StageName>()?,
            error_type: error_type.parse::<ErrorClass>()?,
            error_message,
            retry_count: retry_count as u32,
            status: status.parse::<ErrorRecordStatus>()?,
            correlation_id: CorrelationId::from_string(correlation_id)?,
            next_retry_at,
            created_at,
            updated_at,
            resolution_notes,
        })
    }
}

#[async_trait]
impl ErrorRecordRepository for SqliteErrorRepository {
    async fn insert(&self, record: &PipelineErrorRecord) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_errors (
                error_id, document_id, stage_name, error_type, error_message,
                retry_count, status, correlation_id, next_retry_at,
                created_at, updated_at, resolution_notes
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.error_id.to_string())
        .bind(record.document_id.to_string())
        .bind(record.stage_name.as_str())
        .bind(record.error_type.to_string())
        .bind(&record.error_message)
        .bind(record.retry_count as i64)
        .bind(record.status.as_str())
        .bind(record.correlation_id.as_str())
        .bind(record.next_retry_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(&record.resolution_notes)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update(&self, record: &PipelineErrorRecord) -> Result<(), PipelineError> {
        let result = sqlx::query(
            r#"
            UPDATE pipeline_errors SET
                error_type = ?, error_message = ?, retry_count = ?, status = ?,
                correlation_id = ?, next_retry_at = ?, updated_at = ?, resolution_notes = ?
            WHERE error_id = ?
            "#,
        )
        .bind(record.error_type.to_string())
        .bind(&record.error_message)
        .bind(record.retry_count as i64)
        .bind(record.status.as_str())
        .bind(record.correlation_id.as_str())
        .bind(record.next_retry_at)
        .bind(record.updated_at)
        .bind(&record.resolution_notes)
        .bind(record.error_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::NotFound(format!("Pipeline error {}", record.error_id)));
        }
        Ok(())
    }

    async fn find_by_id(&self, error_id: Uuid) -> Result<Option<PipelineErrorRecord>, PipelineError> {
        let row = sqlx::query("SELECT * FROM pipeline_errors WHERE error_id = ?")
            .bind(error_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn find_active_retry(
        &self,
        document_id: DocumentId,
        stage: StageName,
    ) -> Result<Option<PipelineErrorRecord>, PipelineError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM pipeline_errors
            WHERE document_id = ? AND stage_name = ? AND status IN ('pending', 'retrying')
            ORDER BY created_at DESC LIMIT 1
            "#,
        )
        .bind(document_id.to_string())
        .bind(stage.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn due_retries(&self, now: DateTime<Utc>) -> Result<Vec<PipelineErrorRecord>, PipelineError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM pipeline_errors
            WHERE status = 'retrying' AND next_retry_at IS NOT NULL AND next_retry_at <= ?
            ORDER BY next_retry_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn find_by_document(
        &self,
        document_id: DocumentId,
        limit: u32,
    ) -> Result<Vec<PipelineErrorRecord>, PipelineError> {
        let rows = sqlx::query(
            "SELECT * FROM pipeline_errors WHERE document_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(document_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(Self::map_row).collect()
    }

    async fn purge_terminal_older_than(&self, older_than: DateTime<Utc>) -> Result<u64, PipelineError> {
        let result = sqlx::query(
            "DELETE FROM pipeline_errors WHERE status IN ('resolved', 'failed') AND updated_at < ?",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}
