// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Alert Repository Port
//!
//! The alert queue is a relational table, so producer appends and aggregator
//! state transitions are transactional. Status moves are bulk operations
//! keyed by item ids so one aggregation pass touches each item exactly once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::{AlertConfiguration, AlertQueueItem};
use crate::error::PipelineError;

/// Repository interface for the alert queue and its configuration.
#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// Appends a queue item; producers never block on the aggregator
    async fn enqueue(&self, item: &AlertQueueItem) -> Result<(), PipelineError>;

    /// Pending items of one type created within [window_start, now]
    async fn pending_in_window(
        &self,
        alert_type: &str,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<AlertQueueItem>, PipelineError>;

    /// Marks items `aggregated` with a processed timestamp
    async fn mark_aggregated(&self, ids: &[Uuid], processed_at: DateTime<Utc>) -> Result<(), PipelineError>;

    /// Marks items `sent` with a sent timestamp
    async fn mark_sent(&self, ids: &[Uuid], sent_at: DateTime<Utc>) -> Result<(), PipelineError>;

    /// Marks items `failed`
    async fn mark_failed(&self, ids: &[Uuid]) -> Result<(), PipelineError>;

    /// Archives items older than the retention horizon, returning the count
    async fn archive_older_than(&self, older_than: DateTime<Utc>) -> Result<u64, PipelineError>;

    /// All alert configurations, enabled or not
    async fn configurations(&self) -> Result<Vec<AlertConfiguration>, PipelineError>;

    /// Upserts a configuration keyed by alert type
    async fn upsert_configuration(&self, config: &AlertConfiguration) -> Result<(), PipelineError>;
}
