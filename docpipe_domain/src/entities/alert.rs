// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Alert Queue Items and Configuration
//!
//! The alert service is a producer/consumer pair over the relational store:
//! producers append queue items and never block; a background aggregator
//! groups pending items by type over a time window and dispatches composed
//! alerts to configured channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

/// Alert severity, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(PipelineError::ValidationError(format!("Unknown severity: {}", other))),
        }
    }
}

/// Queue-item lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    Aggregated,
    Sent,
    Failed,
    Archived,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Aggregated => "aggregated",
            AlertStatus::Sent => "sent",
            AlertStatus::Failed => "failed",
            AlertStatus::Archived => "archived",
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AlertStatus::Pending),
            "aggregated" => Ok(AlertStatus::Aggregated),
            "sent" => Ok(AlertStatus::Sent),
            "failed" => Ok(AlertStatus::Failed),
            "archived" => Ok(AlertStatus::Archived),
            other => Err(PipelineError::ValidationError(format!(
                "Unknown alert status: {}",
                other
            ))),
        }
    }
}

/// One queued alert awaiting aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertQueueItem {
    pub alert_id: Uuid,
    pub alert_type: String,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl AlertQueueItem {
    pub fn new(
        alert_type: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            alert_id: Uuid::new_v4(),
            alert_type: alert_type.into(),
            severity,
            title: title.into(),
            message: message.into(),
            metadata,
            status: AlertStatus::Pending,
            created_at: Utc::now(),
            processed_at: None,
            sent_at: None,
        }
    }
}

/// Per-alert-type aggregation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfiguration {
    pub alert_type: String,
    /// Minimum pending count within the window before a dispatch fires
    pub threshold: u32,
    pub time_window_minutes: u32,
    /// Opaque channel handles resolved by the dispatch layer
    pub channels: Vec<String>,
    pub recipients: Vec<String>,
    pub enabled: bool,
}

impl AlertConfiguration {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.time_window_minutes as i64)
    }
}

/// Composed dispatch produced by one aggregation pass over one alert type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDispatch {
    pub alert_type: String,
    pub severity: Severity,
    pub count: usize,
    /// Bounded set of representative items included in the dispatch body
    pub examples: Vec<AlertQueueItem>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub channels: Vec<String>,
    pub recipients: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_new_item_is_pending() {
        let item = AlertQueueItem::new(
            "stage_failure",
            Severity::High,
            "embedding failed",
            "HTTP 503",
            serde_json::json!({"stage": "embedding"}),
        );
        assert_eq!(item.status, AlertStatus::Pending);
        assert!(item.sent_at.is_none());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            AlertStatus::Pending,
            AlertStatus::Aggregated,
            AlertStatus::Sent,
            AlertStatus::Failed,
            AlertStatus::Archived,
        ] {
            assert_eq!(AlertStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn test_configuration_window() {
        let config = AlertConfiguration {
            alert_type: "stage_failure".into(),
            threshold: 3,
            time_window_minutes: 15,
            channels: vec!["ops".into()],
            recipients: vec![],
            enabled: true,
        };
        assert_eq!(config.window(), chrono::Duration::minutes(15));
    }
}
