// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Alert Repository
//!
//! The alert queue table and its per-type configuration. Bulk status moves
//! bind the explicit id list so one aggregation pass touches each item
//! exactly once, which is what the no-double-counting invariant rests on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use docpipe_domain::entities::{AlertConfiguration, AlertQueueItem, AlertStatus, Severity};
use docpipe_domain::repositories::AlertRepository;
use docpipe_domain::PipelineError;

use super::db_err;

/// Alert repository over a shared SQLite pool.
pub struct SqliteAlertRepository {
    pool: SqlitePool,
}

impl SqliteAlertRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_item(row: &sqlx::sqlite::SqliteRow) -> Result<AlertQueueItem, PipelineError> {
        let alert_id: String = row.try_get("alert_id").map_err(db_err)?;
        let severity: String = row.try_get("severity").map_err(db_err)?;
        let status: String = row.try_get("status").map_err(db_err)?;
        let metadata: String = row.try_get("metadata").map_err(db_err)?;

        Ok(AlertQueueItem {
            alert_id: Uuid::parse_str(&alert_id)
                .map_err(|e| PipelineError::validation(format!("Invalid alert id: {}", e)))?,
            alert_type: row.try_get("alert_type").map_err(db_err)?,
            severity: severity.parse::<Severity>()?,
            title: row.try_get("title").map_err(db_err)?,
            message: row.try_get("message").map_err(db_err)?,
            metadata: serde_json::from_str(&metadata)?,
            status: status.parse::<AlertStatus>()?,
            created_at: row.try_get("created_at").map_err(db_err)?,
            processed_at: row.try_get("processed_at").map_err(db_err)?,
            sent_at: row.try_get("sent_at").map_err(db_err)?,
        })
    }

    async fn set_status(
        &self,
        ids: &[Uuid],
        status: AlertStatus,
        processed_at: Option<DateTime<Utc>>,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), PipelineError> {
        for id in ids {
            sqlx::query(
                r#"
                UPDATE alert_queue SET
                    status = ?,
                    processed_at = COALESCE(?, processed_at),
                    sent_at = COALESCE(?, sent_at)
                WHERE alert_id = ?
                "#,
            )
            .bind(status.as_str())
            .bind(processed_at)
            .bind(sent_at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        }
        Ok(())
    }
}

#[async_trait]
impl AlertRepository for SqliteAlertRepository {
    async fn enqueue(&self, item: &AlertQueueItem) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO alert_queue (
                alert_id, alert_type, severity, title, message, metadata,
                status, created_at, processed_at, sent_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.alert_id.to_string())
        .bind(&item.alert_type)
        .bind(item.severity.as_str())
        .bind(&item.title)
        .bind(&item.message)
        .bind(serde_json::to_string(&item.metadata)?)
        .bind(item.status.as_str())
        .bind(item.created_at)
        .bind(item.processed_at)
        .bind(item.sent_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn pending_in_window(
        &self,
        alert_type: &str,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<AlertQueueItem>, PipelineError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM alert_queue
            WHERE alert_type = ? AND status = 'pending' AND created_at >= ?
            ORDER BY created_at
            "#,
        )
        .bind(alert_type)
        .bind(window_start)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(Self::map_item).collect()
    }

    async fn mark_aggregated(&self, ids: &[Uuid], processed_at: DateTime<Utc>) -> Result<(), PipelineError> {
        self.set_status(ids, AlertStatus::Aggregated, Some(processed_at), None).await
    }

    async fn mark_sent(&self, ids: &[Uuid], sent_at: DateTime<Utc>) -> Result<(), PipelineError> {
        self.set_status(ids, AlertStatus::Sent, None, Some(sent_at)).await
    }

    async fn mark_failed(&self, ids: &[Uuid]) -> Result<(), PipelineError> {
        self.set_status(ids, AlertStatus::Failed, None, None).await
    }

    async fn archive_older_than(&self, older_than: DateTime<Utc>) -> Result<u64, PipelineError> {
        let result = sqlx::query(
            "UPDATE alert_queue SET status = 'archived' WHERE status = 'pending' AND created_at < ?",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn configurations(&self) -> Result<Vec<AlertConfiguration>, PipelineError> {
        let rows = sqlx::query("SELECT * FROM alert_configurations ORDER BY alert_type")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let channels: String = row.try_get("channels").map_err(db_err)?;
                let recipients: String = row.try_get("recipients").map_err(db_err)?;
                let threshold: i64 = row.try_get("threshold").map_err(db_err)?;
                let window: i64 = row.try_get("time_window_minutes").map_err(db_err)?;
                let enabled: i64 = row.try_get("enabled").map_err(db_err)?;
                Ok(AlertConfiguration {
                    alert_type: row.try_get("alert_type").map_err(db_err)?,
                    threshold: threshold as u32,
                    time_window_minutes: window as u32,
                    channels: serde_json::from_str(&channels)?,
                    recipients: serde_json::from_str(&recipients)?,
                    enabled: enabled != 0,
                })
            })
            .collect()
    }

    async fn upsert_configuration(&self, config: &AlertConfiguration) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            INSERT INTO alert_configurations (alert_type, threshold, time_window_minutes, channels, recipients, enabled)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(alert_type) DO UPDATE SET
                threshold = excluded.threshold,
                time_window_minutes = excluded.time_window_minutes,
                channels = excluded.channels,
                recipients = excluded.recipients,
                enabled = excluded.enabled
            "#,
        )
        .bind(&config.alert_type)
        .bind(config.threshold as i64)
        .bind(config.time_window_minutes as i64)
        .bind(serde_json::to_string(&config.channels)?)
        .bind(serde_json::to_string(&config.recipients)?)
        .bind(if config.enabled { 1_i64 } else { 0_i64 })
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

    async fn repo() -> SqliteAlertRepository {
        SqliteAlertRepository::new(schema::in_memory_database().await.unwrap())
    }

    fn item(alert_type: &str) -> AlertQueueItem {
        AlertQueueItem::new(
            alert_type,
            Severity::High,
            "stage failed",
            "HTTP 503 from embedding service",
            serde_json::json!({"stage": "embedding"}),
        )
    }

    #[tokio::test]
    async fn test_enqueue_and_fetch_window() {
        let repo = repo().await;
        repo.enqueue(&item("stage_failure")).await.unwrap();
        repo.enqueue(&item("stage_failure")).await.unwrap();
        repo.enqueue(&item("lock_contention")).await.unwrap();

        let window_start = Utc::now() - chrono::Duration::minutes(5);
        let pending = repo.pending_in_window("stage_failure", window_start).await.unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let repo = repo().await;
        let a = item("stage_failure");
        repo.enqueue(&a).await.unwrap();

        let now = Utc::now();
        repo.mark_aggregated(&[a.alert_id], now).await.unwrap();
        let pending = repo
            .pending_in_window("stage_failure", now - chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert!(pending.is_empty(), "aggregated items leave the pending window");

        repo.mark_sent(&[a.alert_id], now).await.unwrap();
    }

    #[tokio::test]
    async fn test_archive_old_pending() {
        let repo = repo().await;
        let a = item("stage_failure");
        repo.enqueue(&a).await.unwrap();

        let archived = repo
            .archive_older_than(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(archived, 1);
    }

    #[tokio::test]
    async fn test_configuration_round_trip() {
        let repo = repo().await;
        let config = AlertConfiguration {
            alert_type: "stage_failure".into(),
            threshold: 3,
            time_window_minutes: 15,
            channels: vec!["ops".into()],
            recipients: vec!["oncall@example.com".into()],
            enabled: true,
        };
        repo.upsert_configuration(&config).await.unwrap();

        let configs = repo.configurations().await.unwrap();
        assert_eq!(configs, vec![config.clone()]);

        // Upsert replaces
        let mut updated = config;
        updated.threshold = 1;
        repo.upsert_configuration(&updated).await.unwrap();
        assert_eq!(repo.configurations().await.unwrap()[0].threshold, 1);
    }
}
