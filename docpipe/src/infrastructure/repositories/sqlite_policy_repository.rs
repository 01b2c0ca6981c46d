// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Policy Repository
//!
//! Loads the store-resident configuration rows consumed through the TTL
//! config cache: retry policies and alert configurations.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use docpipe_domain::entities::AlertConfiguration;
use docpipe_domain::repositories::{AlertRepository, PolicyRepository};
use docpipe_domain::value_objects::{RetryPolicy, StageName};
use docpipe_domain::PipelineError;

use super::db_err;
use super::sqlite_alert_repository::SqliteAlertRepository;

/// Policy repository over a shared SQLite pool.
pub struct SqlitePolicyRepository {
    pool: SqlitePool,
    alerts: SqliteAlertRepository,
}

impl SqlitePolicyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        let alerts = SqliteAlertRepository::new(pool.clone());
        Self { pool, alerts }
    }
}

#[async_trait]
impl PolicyRepository for SqlitePolicyRepository {
    async fn load_retry_policies(&self) -> Result<Vec<RetryPolicy>, PipelineError> {
        let rows = sqlx::query("SELECT * FROM retry_policies ORDER BY service_name, stage_name")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let service_name: String = row.try_get("service_name").map_err(db_err)?;
                // Empty string is the service-wide row
                let stage_name: String = row.try_get("stage_name").map_err(db_err)?;
                let stage_name = if stage_name.is_empty() {
                    None
                } else {
                    Some(stage_name.parse::<StageName>()?)
                };
                let max_retries: i64 = row.try_get("max_retries").map_err(db_err)?;
                let initial_delay_ms: i64 = row.try_get("initial_delay_ms").map_err(db_err)?;
                let max_delay_ms: i64 = row.try_get("max_delay_ms").map_err(db_err)?;
                let backoff_multiplier: f64 = row.try_get("backoff_multiplier").map_err(db_err)?;
                let timeout_ms: i64 = row.try_get("timeout_ms").map_err(db_err)?;

                RetryPolicy::new(
                    service_name,
                    stage_name,
                    max_retries as u32,
                    initial_delay_ms as u64,
                    max_delay_ms as u64,
                    backoff_multiplier,
                    timeout_ms as u64,
                )
            })
            .collect()
    }

    async fn load_alert_configurations(&self) -> Result<Vec<AlertConfiguration>, PipelineError> {
        self.alerts.configurations().await
    }

    async fn upsert_retry_policy(&self, policy: &RetryPolicy) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO retry_policies (service_name, stage_name, max_retries, initial_delay_ms, max_delay_ms, backoff_multiplier, timeout_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(service_name, stage_name) DO UPDATE SET
                max_retries = excluded.max_retries,
                initial_delay_ms = excluded.initial_delay_ms,
                max_delay_ms = excluded.max_delay_ms,
                backoff_multiplier = excluded.backoff_multiplier,
                timeout_ms = excluded.timeout_ms
            "#,
        )
        .bind(&policy.service_name)
        .bind(policy.stage_name.map(|s| s.as_str()).unwrap_or(""))
        .bind(policy.max_retries as i64)
        .bind(policy.initial_delay_ms as i64)
        .bind(policy.max_delay_ms as i64)
        .bind(policy.backoff_multiplier)
        .bind(policy.timeout_ms as i64)
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

    #[tokio::test]
    async fn test_retry_policy_round_trip() {
        let repo = SqlitePolicyRepository::new(schema::in_memory_database().await.unwrap());

        let service_wide = RetryPolicy::new("ai", None, 3, 1_000, 60_000, 2.0, 30_000).unwrap();
        let stage_specific =
            RetryPolicy::new("ai", Some(StageName::Embedding), 5, 500, 10_000, 2.0, 15_000).unwrap();
        repo.upsert_retry_policy(&service_wide).await.unwrap();
        repo.upsert_retry_policy(&stage_specific).await.unwrap();

        let policies = repo.load_retry_policies().await.unwrap();
        assert_eq!(policies.len(), 2);
        assert!(policies.contains(&service_wide));
        assert!(policies.contains(&stage_specific));
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let repo = SqlitePolicyRepository::new(schema::in_memory_database().await.unwrap());
        let mut policy = RetryPolicy::new("ai", None, 3, 1_000, 60_000, 2.0, 30_000).unwrap();
        repo.upsert_retry_policy(&policy).await.unwrap();

        policy.max_retries = 7;
        repo.upsert_retry_policy(&policy).await.unwrap();

        let policies = repo.load_retry_policies().await.unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].max_retries, 7);
    }
}
