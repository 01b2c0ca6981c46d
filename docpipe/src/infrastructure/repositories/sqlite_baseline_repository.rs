// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Performance Baseline Repository

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use docpipe_domain::entities::{Environment, PerformanceBaseline};
use docpipe_domain::repositories::BaselineRepository;
use docpipe_domain::PipelineError;

use super::db_err;

/// Baseline repository over a shared SQLite pool.
pub struct SqliteBaselineRepository {
    pool: SqlitePool,
}

impl SqliteBaselineRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<PerformanceBaseline, PipelineError> {
        let environment: String = row.try_get("environment").map_err(db_err)?;
        let metrics: String = row.try_get("metrics").map_err(db_err)?;
        Ok(PerformanceBaseline {
            test_name: row.try_get("test_name").map_err(db_err)?,
            document_name: row.try_get("document_name").map_err(db_err)?,
            revision_id: row.try_get("revision_id").map_err(db_err)?,
            environment: environment.parse::<Environment>()?,
            metrics: serde_json::from_str(&metrics)?,
            created_at: row.try_get("created_at").map_err(db_err)?,
        })
    }
}

#[async_trait]
impl BaselineRepository for SqliteBaselineRepository {
    async fn store(&self, baseline: &PerformanceBaseline, force: bool) -> Result<(), PipelineError> {
        if !force {
            let existing = self
                .find(&baseline.test_name, &baseline.document_name, &baseline.revision_id)
                .await?;
            if existing.is_some() {
                return Err(PipelineError::BaselineExists(format!(
                    "({}, {}, {})",
                    baseline.test_name, baseline.document_name, baseline.revision_id
                )));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO performance_baselines (test_name, document_name, revision_id, environment, metrics, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(test_name, document_name, revision_id) DO UPDATE SET
                environment = excluded.environment,
                metrics = excluded.metrics,
                created_at = excluded.created_at
            "#,
        )
        .bind(&baseline.test_name)
        .bind(&baseline.document_name)
        .bind(&baseline.revision_id)
        .bind(baseline.environment.as_str())
        .bind(serde_json::to_string(&baseline.metrics)?)
        .bind(baseline.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find(
        &self,
        test_name: &str,
        document_name: &str,
        revision_id: &str,
    ) -> Result<Option<PerformanceBaseline>, PipelineError> {
        let row = sqlx::query(
            "SELECT * FROM performance_baselines WHERE test_name = ? AND document_name = ? AND revision_id = ?",
        )
        .bind(test_name)
        .bind(document_name)
        .bind(revision_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn list_for_test(&self, test_name: &str) -> Result<Vec<PerformanceBaseline>, PipelineError> {
        let rows = sqlx::query(
            "SELECT * FROM performance_baselines WHERE test_name = ? ORDER BY created_at DESC",
        )
        .bind(test_name)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(Self::map_row).collect()
    }
}
