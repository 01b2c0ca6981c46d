// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Time Source and Retry Scheduler Ports
//!
//! Time is abstracted so retry deadlines, aggregation windows and retention
//! horizons are testable without sleeping. The scheduler port hands the
//! retry orchestrator an opaque way to enqueue a delayed task bound to a
//! `next_retry_at` deadline; the infrastructure layer owns the actual timers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::PipelineError;

/// Abstracted wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System clock, the production implementation.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Background task scheduler for async retries.
///
/// `schedule` binds the pipeline-error record id to a deadline; when the
/// timer fires the infrastructure re-runs the full stage-runner path for
/// that record. `cancel` is the administrative hook behind `cancel_retry`.
#[async_trait]
pub trait RetryScheduler: Send + Sync {
    async fn schedule(&self, error_id: Uuid, at: DateTime<Utc>) -> Result<(), PipelineError>;

    /// Cancels a scheduled retry; cancelling an unknown or already-fired
    /// task reports `false`
    async fn cancel(&self, error_id: Uuid) -> Result<bool, PipelineError>;
}

/// Callback the scheduler fires when a retry deadline passes.
///
/// Implemented by the pipeline orchestrator: it reloads the error record
/// and re-dispatches the stage through the full runner path.
#[async_trait]
pub trait RetryExecutor: Send + Sync {
    async fn execute_retry(&self, error_id: Uuid) -> Result<(), PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
