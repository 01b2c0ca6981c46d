// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Outcomes
//!
//! The per-stage result values aggregated into the map a pipeline run returns
//! to its caller. Outcomes are data, not exceptions: the stage runner converts
//! every failure into one of these variants and upstream code dispatches on
//! them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::correlation_id::CorrelationId;
use crate::value_objects::execution_mode::ExecutionMode;
use crate::value_objects::stage_name::StageName;

/// Terminal or deferred result of one stage dispatch within a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    /// Stage executed and its completion marker was written.
    Completed,
    /// Completion marker present with a matching data hash; not invoked.
    SkippedUnchanged,
    /// Advisory lock held elsewhere on a first attempt. Alert-worthy.
    SkippedConcurrentFirstAttempt,
    /// Another worker is already retrying this (document, stage). Benign.
    SkippedConcurrentRetry,
    /// A prerequisite stage failed; this stage was not attempted.
    SkippedPrerequisiteFailed { prerequisite: StageName },
    /// A prerequisite has an async retry pending; re-evaluated next pass.
    Deferred { error_id: Uuid },
    /// This stage failed transiently and was scheduled for async retry.
    DeferredAsyncRetry {
        error_id: Uuid,
        next_retry_at: DateTime<Utc>,
    },
    /// Terminal failure surfaced to the caller.
    Failed {
        error_code: String,
        message: String,
        correlation_id: CorrelationId,
    },
}

impl StageOutcome {
    /// Outcomes counted as successful in the request success rate.
    pub fn is_successful(&self) -> bool {
        matches!(self, StageOutcome::Completed | StageOutcome::SkippedUnchanged)
    }

    /// Whether the stage reached a state that will not change within this
    /// request (deferred outcomes resolve later, out of band).
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            StageOutcome::Deferred { .. } | StageOutcome::DeferredAsyncRetry { .. }
        )
    }

    /// Whether further dispatch should halt under `stop_on_error`.
    pub fn halts_on_error(&self) -> bool {
        matches!(self, StageOutcome::Failed { .. })
    }

    /// Stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            StageOutcome::Completed => "completed",
            StageOutcome::SkippedUnchanged => "skipped_unchanged",
            StageOutcome::SkippedConcurrentFirstAttempt => "skipped_concurrent_first_attempt",
            StageOutcome::SkippedConcurrentRetry => "skipped_concurrent_retry",
            StageOutcome::SkippedPrerequisiteFailed { .. } => "skipped_prerequisite_failed",
            StageOutcome::Deferred { .. } => "deferred",
            StageOutcome::DeferredAsyncRetry { .. } => "deferred_async_retry",
            StageOutcome::Failed { .. } => "failed",
        }
    }
}

/// Aggregated result of one pipeline run for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub request_id: Uuid,
    pub document_id: crate::value_objects::document_id::DocumentId,
    pub mode: ExecutionMode,
    pub outcomes: BTreeMap<StageName, StageOutcome>,
}

impl RunReport {
    pub fn new(
        request_id: Uuid,
        document_id: crate::value_objects::document_id::DocumentId,
        mode: ExecutionMode,
    ) -> Self {
        Self {
            request_id,
            document_id,
            mode,
            outcomes: BTreeMap::new(),
        }
    }

    /// Records the outcome of one dispatched stage
    pub fn record(&mut self, stage: StageName, outcome: StageOutcome) {
        self.outcomes.insert(stage, outcome);
    }

    /// successful / attempted, where attempted is every stage in the map
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let successful = self.outcomes.values().filter(|o| o.is_successful()).count();
        successful as f64 / self.outcomes.len() as f64
    }

    /// Whether any stage reported a terminal failure
    pub fn has_failures(&self) -> bool {
        self.outcomes.values().any(|o| o.halts_on_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::document_id::DocumentId;

    #[test]
    fn test_success_rate() {
        let mut report = RunReport::new(Uuid::new_v4(), DocumentId::new(), ExecutionMode::Full);
        report.record(StageName::Upload, StageOutcome::Completed);
        report.record(StageName::TextExtraction, StageOutcome::SkippedUnchanged);
        report.record(
            StageName::TableExtraction,
            StageOutcome::Failed {
                error_code: "validation_error".into(),
                message: "bad input".into(),
                correlation_id: CorrelationId::new_request(),
            },
        );
        report.record(
            StageName::ChunkPrep,
            StageOutcome::SkippedPrerequisiteFailed {
                prerequisite: StageName::TableExtraction,
            },
        );
        assert!((report.success_rate() - 0.5).abs() < f64::EPSILON);
        assert!(report.has_failures());
    }

    #[test]
    fn test_empty_report_rate() {
        let report = RunReport::new(Uuid::new_v4(), DocumentId::new(), ExecutionMode::Smart);
        assert_eq!(report.success_rate(), 0.0);
        assert!(!report.has_failures());
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(StageOutcome::Completed.label(), "completed");
        assert_eq!(StageOutcome::SkippedUnchanged.label(), "skipped_unchanged");
        assert!(StageOutcome::Completed.is_successful());
        assert!(StageOutcome::SkippedUnchanged.is_successful());
        assert!(!StageOutcome::SkippedConcurrentRetry.is_successful());
    }

    #[test]
    fn test_deferred_is_not_terminal() {
        let deferred = StageOutcome::DeferredAsyncRetry {
            error_id: Uuid::new_v4(),
            next_retry_at: Utc::now(),
        };
        assert!(!deferred.is_terminal());
        assert!(!deferred.halts_on_error());
    }
}
