// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Alert Service
//!
//! Queued alerting with time-window aggregation. Producers append queue
//! items and never block; a single background aggregator per process groups
//! pending items by type over each configuration's window and dispatches one
//! composed alert when the threshold is met. Dispatch failures mark the
//! items `failed` and are never thrown back to producers.
//!
//! The aggregator tick also runs retention maintenance: pending items older
//! than the retention horizon are archived, and terminal pipeline-error
//! records past their horizon are purged.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use docpipe_bootstrap::CancellationToken;
use docpipe_domain::entities::{AlertDispatch, AlertQueueItem, Severity};
use docpipe_domain::repositories::{AlertRepository, ErrorRecordRepository};
use docpipe_domain::services::{AlertChannel, Clock};
use docpipe_domain::PipelineError;

use crate::application::config_cache::ConfigCache;
use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::runtime::spawn_supervised;

/// Representative examples included per composed dispatch.
const MAX_EXAMPLES_PER_DISPATCH: usize = 10;

/// Outcome of one aggregation pass. Test and logging surface.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AggregationSummary {
    pub dispatched: usize,
    pub items_sent: usize,
    pub items_failed: usize,
    pub archived: u64,
    pub errors_purged: u64,
}

/// Retention knobs for the maintenance half of the tick.
#[derive(Debug, Clone, Copy)]
pub struct RetentionSettings {
    pub alert_retention_hours: i64,
    pub error_retention_hours: i64,
}

/// Queued alert service with background aggregation.
pub struct AlertService {
    repository: Arc<dyn AlertRepository>,
    errors: Arc<dyn ErrorRecordRepository>,
    channels: Vec<Arc<dyn AlertChannel>>,
    config: Arc<ConfigCache>,
    clock: Arc<dyn Clock>,
    metrics: MetricsService,
    retention: RetentionSettings,
}

impl AlertService {
    pub fn new(
        repository: Arc<dyn AlertRepository>,
        errors: Arc<dyn ErrorRecordRepository>,
        channels: Vec<Arc<dyn AlertChannel>>,
        config: Arc<ConfigCache>,
        clock: Arc<dyn Clock>,
        metrics: MetricsService,
        retention: RetentionSettings,
    ) -> Self {
        Self {
            repository,
            errors,
            channels,
            config,
            clock,
            metrics,
            retention,
        }
    }

    /// Enqueues one alert with status `pending`. Producer-side failures are
    /// logged and swallowed so alerting can never take a stage down with it.
    pub async fn queue(
        &self,
        alert_type: &str,
        severity: Severity,
        title: &str,
        message: &str,
        metadata: serde_json::Value,
    ) {
        let item = AlertQueueItem::new(alert_type, severity, title, message, metadata);
        match self.repository.enqueue(&item).await {
            Ok(()) => self.metrics.increment_alerts_queued(),
            Err(e) => warn!(alert_type, error = %e, "Failed to enqueue alert"),
        }
    }

    /// One aggregation pass over every enabled alert configuration.
    pub async fn run_aggregation_pass(&self) -> Result<AggregationSummary, PipelineError> {
        let mut summary = AggregationSummary::default();
        let now = self.clock.now();

        for config in self.config.alert_configurations().await? {
            let window_start = now - config.window();
            let pending = self
                .repository
                .pending_in_window(&config.alert_type, window_start)
                .await?;

            if pending.is_empty() || (pending.len() as u32) < config.threshold {
                // Below threshold: items stay pending; the next tick
                // re-evaluates the window.
                continue;
            }

            let ids: Vec<Uuid> = pending.iter().map(|i| i.alert_id).collect();
            self.repository.mark_aggregated(&ids, now).await?;

            let dispatch = compose_dispatch(&config.alert_type, &config.channels, &config.recipients, &pending);
            summary.dispatched += 1;

            match self.dispatch_to_channels(&dispatch).await {
                Ok(()) => {
                    self.repository.mark_sent(&ids, self.clock.now()).await?;
                    self.metrics.increment_alert_dispatches();
                    summary.items_sent += ids.len();
                }
                Err(e) => {
                    warn!(alert_type = %config.alert_type, error = %e, "Alert dispatch failed");
                    self.repository.mark_failed(&ids).await?;
                    summary.items_failed += ids.len();
                }
            }
        }

        summary.archived = self
            .repository
            .archive_older_than(now - chrono::Duration::hours(self.retention.alert_retention_hours))
            .await?;
        summary.errors_purged = self
            .errors
            .purge_terminal_older_than(now - chrono::Duration::hours(self.retention.error_retention_hours))
            .await?;

        debug!(
            dispatched = summary.dispatched,
            sent = summary.items_sent,
            failed = summary.items_failed,
            archived = summary.archived,
            "Alert aggregation pass complete"
        );
        Ok(summary)
    }

    async fn dispatch_to_channels(&self, dispatch: &AlertDispatch) -> Result<(), PipelineError> {
        let targets: Vec<&Arc<dyn AlertChannel>> = self
            .channels
            .iter()
            .filter(|c| dispatch.channels.iter().any(|name| name.as_str() == c.name()))
            .collect();

        if targets.is_empty() {
            return Err(PipelineError::invalid_config(format!(
                "No registered channel matches {:?}",
                dispatch.channels
            )));
        }

        for channel in targets {
            channel.dispatch(dispatch).await?;
        }
        Ok(())
    }

    /// Spawns the background aggregator loop. Single consumer per process
    /// keeps per-type ordering deterministic.
    pub fn spawn_aggregator(self: Arc<Self>, period: Duration, token: CancellationToken) {
        spawn_supervised("alert-aggregator", async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Alert aggregator shutting down");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(period) => {}
                }
                if let Err(e) = self.run_aggregation_pass().await {
                    warn!(error = %e, "Alert aggregation pass failed");
                }
            }
        });
    }
}

fn compose_dispatch(
    alert_type: &str,
    channels: &[String],
    recipients: &[String],
    items: &[AlertQueueItem],
) -> AlertDispatch {
    let severity = items
        .iter()
        .map(|i| i.severity)
        .max()
        .unwrap_or(Severity::Low);
    let window_start = items.iter().map(|i| i.created_at).min().unwrap_or_default();
    let window_end = items.iter().map(|i| i.created_at).max().unwrap_or_default();

    AlertDispatch {
        alert_type: alert_type.to_string(),
        severity,
        count: items.len(),
        examples: items.iter().take(MAX_EXAMPLES_PER_DISPATCH).cloned().collect(),
        window_start,
        window_end,
        channels: channels.to_vec(),
        recipients: recipients.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_compose_dispatch_bounds_examples() {
        let items: Vec<AlertQueueItem> = (0..25)
            .map(|i| {
                AlertQueueItem::new(
                    "stage_failure",
                    if i == 7 { Severity::Critical } else { Severity::High },
                    format!("failure {}", i),
                    "boom",
                    serde_json::json!({}),
                )
            })
            .collect();

        let dispatch = compose_dispatch("stage_failure", &["log".into()], &[], &items);
        assert_eq!(dispatch.count, 25);
        assert_eq!(dispatch.examples.len(), MAX_EXAMPLES_PER_DISPATCH);
        assert_eq!(dispatch.severity, Severity::Critical);
        assert!(dispatch.window_start <= dispatch.window_end);
        assert!(dispatch.window_end <= Utc::now());
    }
}
