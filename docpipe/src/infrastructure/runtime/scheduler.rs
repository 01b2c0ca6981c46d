// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Tokio Retry Scheduler
//!
//! In-process implementation of the retry scheduler port. Each scheduled
//! retry is one timer task keyed by error id; when the deadline passes the
//! task invokes the registered executor, which re-runs the full stage-runner
//! path for that record. Tasks are cancellable administratively and wind
//! down on shutdown.
//!
//! Retries that were pending when a previous process died are not lost: the
//! error records persist with `next_retry_at`, and startup re-arms them via
//! `reschedule_due` against the error repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use docpipe_bootstrap::CancellationToken;
use docpipe_domain::repositories::ErrorRecordRepository;
use docpipe_domain::services::{Clock, RetryExecutor, RetryScheduler};
use docpipe_domain::PipelineError;

/// Timer-based retry scheduler bound to the current process.
pub struct TokioRetryScheduler {
    executor: RwLock<Option<Arc<dyn RetryExecutor>>>,
    tasks: Arc<Mutex<HashMap<Uuid, JoinHandle<()>>>>,
    clock: Arc<dyn Clock>,
    token: CancellationToken,
}

impl TokioRetryScheduler {
    pub fn new(clock: Arc<dyn Clock>, token: CancellationToken) -> Self {
        Self {
            executor: RwLock::new(None),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            clock,
            token,
        }
    }

    /// Registers the executor. Called once by the composition root after
    /// the orchestrator exists; scheduling before registration is an error.
    pub fn set_executor(&self, executor: Arc<dyn RetryExecutor>) {
        *self.executor.write() = Some(executor);
    }

    /// Re-arms timers for every persisted retry whose deadline is already
    /// set. Called at startup to recover retries scheduled by a previous
    /// process. Returns the number of re-armed retries.
    pub async fn reschedule_due(
        &self,
        errors: &dyn ErrorRecordRepository,
    ) -> Result<usize, PipelineError> {
        // A far-future horizon picks up everything still marked retrying
        let horizon = self.clock.now() + chrono::Duration::days(3650);
        let due = errors.due_retries(horizon).await?;
        let count = due.len();
        for record in due {
            let at = record.next_retry_at.unwrap_or_else(|| self.clock.now());
            self.schedule(record.error_id, at).await?;
        }
        Ok(count)
    }

    /// Scheduled-task count. Test helper.
    pub fn pending_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

#[async_trait]
impl RetryScheduler for TokioRetryScheduler {
    async fn schedule(&self, error_id: Uuid, at: DateTime<Utc>) -> Result<(), PipelineError> {
        let executor = self
            .executor
            .read()
            .clone()
            .ok_or_else(|| PipelineError::internal_error("Retry scheduler has no executor registered"))?;

        let delay = (at - self.clock.now()).to_std().unwrap_or_default();
        let token = self.token.clone();
        let tasks = Arc::clone(&self.tasks);

        debug!(error_id = %error_id, delay_ms = delay.as_millis() as u64, "Scheduling async retry");

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(error_id = %error_id, "Retry timer cancelled by shutdown");
                    tasks.lock().remove(&error_id);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            tasks.lock().remove(&error_id);
            if let Err(e) = executor.execute_retry(error_id).await {
                warn!(error_id = %error_id, error = %e, "Async retry execution failed");
            }
        });

        // Replacing an existing timer aborts the old one
        if let Some(old) = self.tasks.lock().insert(error_id, handle) {
            old.abort();
        }
        Ok(())
    }

    async fn cancel(&self, error_id: Uuid) -> Result<bool, PipelineError> {
        match self.tasks.lock().remove(&error_id) {
            Some(handle) => {
                handle.abort();
                debug!(error_id = %error_id, "Cancelled scheduled retry");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
