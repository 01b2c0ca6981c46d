// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Retry Orchestrator
//!
//! Hybrid sync-then-async retry around stage execution. One synchronous
//! retry absorbs transient blips at the cost of a bounded sleep on the
//! worker; every later retry is a background task with exponential backoff,
//! so a request-handling worker never blocks on a long delay.
//!
//! The flow per invocation:
//!
//! 1. invoke the stage under the policy timeout
//! 2. on failure, classify: permanent failures are recorded `failed`, queue
//!    a high-severity alert and surface immediately
//! 3. a transient first failure sleeps `initial_delay_ms`, extends the
//!    correlation id to `retry_1`, and re-invokes once synchronously
//! 4. a transient failure at attempt n schedules attempt n+1 at
//!    `min(initial × multiplier^n, max)` and reports `Scheduled`
//! 5. at `retry_attempt >= max_retries` the record goes terminal `failed`
//!    with exactly one alert
//!
//! Stage panics are converted to internal errors by running the stage body
//! on its own task; they never escape into the runner.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use docpipe_domain::entities::{PipelineErrorRecord, ProcessingContext, Severity};
use docpipe_domain::repositories::ErrorRecordRepository;
use docpipe_domain::services::{Clock, RetryScheduler, Stage};
use docpipe_domain::value_objects::{CorrelationId, RetryPolicy};
use docpipe_domain::{ErrorClass, PipelineError};

use crate::application::alerts::AlertService;
use crate::infrastructure::metrics::MetricsService;

/// Alert type queued for terminal stage failures.
pub const STAGE_FAILURE_ALERT: &str = "stage_failure";

/// Result of one pass through the retry orchestrator.
#[derive(Debug)]
pub enum RetryVerdict {
    /// The stage produced output at `final_attempt`
    Success {
        output: serde_json::Value,
        final_attempt: u32,
    },
    /// A background retry was scheduled; the caller reports
    /// `deferred_async_retry`
    Scheduled {
        error_id: Uuid,
        next_retry_at: DateTime<Utc>,
    },
    /// Terminal failure surfaced to the caller
    Failed {
        error: PipelineError,
        error_id: Option<Uuid>,
    },
}

/// Hybrid retry orchestrator.
pub struct RetryOrchestrator {
    errors: Arc<dyn ErrorRecordRepository>,
    alerts: Arc<AlertService>,
    scheduler: Arc<dyn RetryScheduler>,
    clock: Arc<dyn Clock>,
    metrics: MetricsService,
}

impl RetryOrchestrator {
    pub fn new(
        errors: Arc<dyn ErrorRecordRepository>,
        alerts: Arc<AlertService>,
        scheduler: Arc<dyn RetryScheduler>,
        clock: Arc<dyn Clock>,
        metrics: MetricsService,
    ) -> Self {
        Self {
            errors,
            alerts,
            scheduler,
            clock,
            metrics,
        }
    }

    /// Runs the stage with the hybrid retry policy. `existing` carries the
    /// active error record when this invocation is itself an async retry.
    pub async fn run_with_retry(
        &self,
        stage: Arc<dyn Stage>,
        ctx: &ProcessingContext,
        policy: &RetryPolicy,
        existing: Option<PipelineErrorRecord>,
    ) -> RetryVerdict {
        let attempt = ctx.retry_attempt();

        match invoke_stage(Arc::clone(&stage), ctx.clone(), policy).await {
            Ok(output) => {
                if let Some(mut record) = existing {
                    record.resolve(attempt, None);
                    if let Err(e) = self.errors.update(&record).await {
                        warn!(error_id = %record.error_id, error = %e, "Failed to resolve error record");
                    }
                    self.metrics.increment_retries_resolved();
                    info!(
                        correlation_id = %ctx.correlation_id(),
                        retry_count = attempt,
                        "Retry chain resolved"
                    );
                }
                RetryVerdict::Success {
                    output,
                    final_attempt: attempt,
                }
            }
            Err(error) => self.handle_failure(stage, ctx, policy, existing, error).await,
        }
    }

    async fn handle_failure(
        &self,
        stage: Arc<dyn Stage>,
        ctx: &ProcessingContext,
        policy: &RetryPolicy,
        existing: Option<PipelineErrorRecord>,
        error: PipelineError,
    ) -> RetryVerdict {
        let attempt = ctx.retry_attempt();
        let class = error.classify();
        warn!(
            correlation_id = %ctx.correlation_id(),
            retry_attempt = attempt,
            class = %class,
            error = %error,
            "Stage invocation failed"
        );

        let mut record = match existing {
            Some(record) => record,
            None => {
                let record = PipelineErrorRecord::new(
                    ctx.document_id(),
                    ctx.stage_name(),
                    class,
                    error.to_string(),
                    ctx.correlation_id().clone(),
                );
                if let Err(e) = self.errors.insert(&record).await {
                    warn!(error = %e, "Failed to insert error record");
                }
                record
            }
        };

        if class == ErrorClass::Permanent {
            return self.fail_terminally(record, attempt, error).await;
        }

        // Transient, first attempt: one synchronous retry after a bounded
        // sleep.
        if attempt == 0 {
            tokio::time::sleep(policy.delay_for_attempt(0)).await;

            let retry_ctx = match ctx.for_retry(1) {
                Ok(ctx) => ctx,
                Err(e) => return self.fail_terminally(record, attempt, e).await,
            };
            debug!(correlation_id = %retry_ctx.correlation_id(), "Synchronous retry");

            match invoke_stage(Arc::clone(&stage), retry_ctx.clone(), policy).await {
                Ok(output) => {
                    record.correlation_id = retry_ctx.correlation_id().clone();
                    record.resolve(1, None);
                    if let Err(e) = self.errors.update(&record).await {
                        warn!(error_id = %record.error_id, error = %e, "Failed to resolve error record");
                    }
                    self.metrics.increment_retries_resolved();
                    info!(
                        correlation_id = %retry_ctx.correlation_id(),
                        "Synchronous retry succeeded"
                    );
                    return RetryVerdict::Success {
                        output,
                        final_attempt: 1,
                    };
                }
                Err(error2) => {
                    if error2.classify() == ErrorClass::Permanent {
                        return self.fail_terminally(record, 1, error2).await;
                    }
                    if !policy.allows_retry(1) {
                        return self.fail_terminally(record, 1, error2).await;
                    }
                    return self.schedule_async(record, &retry_ctx, policy, 1).await;
                }
            }
        }

        // Transient at attempt n >= 1: either exhausted or scheduled async.
        if attempt >= policy.max_retries {
            return self.fail_terminally(record, attempt, error).await;
        }
        self.schedule_async(record, ctx, policy, attempt).await
    }

    /// Schedules attempt `failed_attempt + 1` with exponential backoff.
    async fn schedule_async(
        &self,
        mut record: PipelineErrorRecord,
        ctx: &ProcessingContext,
        policy: &RetryPolicy,
        failed_attempt: u32,
    ) -> RetryVerdict {
        let next_attempt = failed_attempt + 1;
        let delay = policy.delay_for_attempt(failed_attempt);
        let next_retry_at = self.clock.now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(1));

        let next_cid = CorrelationId::for_request(ctx.request_id())
            .extend(ctx.stage_name())
            .and_then(|cid| cid.extend_retry(next_attempt));
        let next_cid = match next_cid {
            Ok(cid) => cid,
            Err(e) => return self.fail_terminally(record, failed_attempt, e).await,
        };

        record.schedule_retry(next_attempt, next_retry_at, next_cid);
        if let Err(e) = self.errors.update(&record).await {
            warn!(error_id = %record.error_id, error = %e, "Failed to persist retry schedule");
            return RetryVerdict::Failed {
                error: e,
                error_id: Some(record.error_id),
            };
        }

        if let Err(e) = self.scheduler.schedule(record.error_id, next_retry_at).await {
            warn!(error_id = %record.error_id, error = %e, "Failed to arm retry timer");
            return RetryVerdict::Failed {
                error: e,
                error_id: Some(record.error_id),
            };
        }

        self.metrics.increment_retries_scheduled();
        info!(
            error_id = %record.error_id,
            next_retry_at = %next_retry_at,
            retry_count = next_attempt,
            "Scheduled async retry"
        );
        RetryVerdict::Scheduled {
            error_id: record.error_id,
            next_retry_at,
        }
    }

    async fn fail_terminally(
        &self,
        mut record: PipelineErrorRecord,
        attempt: u32,
        error: PipelineError,
    ) -> RetryVerdict {
        record.fail(attempt, Some(error.to_string()));
        if let Err(e) = self.errors.update(&record).await {
            warn!(error_id = %record.error_id, error = %e, "Failed to persist terminal failure");
        }

        self.alerts
            .queue(
                STAGE_FAILURE_ALERT,
                Severity::High,
                &format!("Stage {} failed for document {}", record.stage_name, record.document_id),
                &error.to_string(),
                serde_json::json!({
                    "document_id": record.document_id.to_string(),
                    "stage": record.stage_name.as_str(),
                    "error_code": error.error_code(),
                    "correlation_id": record.correlation_id.as_str(),
                    "retry_count": attempt,
                }),
            )
            .await;

        RetryVerdict::Failed {
            error,
            error_id: Some(record.error_id),
        }
    }
}

/// Invokes the stage body on its own task under the policy timeout. Panics
/// become internal errors; timeouts become transient timeout errors.
async fn invoke_stage(
    stage: Arc<dyn Stage>,
    ctx: ProcessingContext,
    policy: &RetryPolicy,
) -> Result<serde_json::Value, PipelineError> {
    let stage_name = ctx.stage_name();
    let handle = tokio::spawn(async move { stage.execute(&ctx).await });
    let abort = handle.abort_handle();

    match tokio::time::timeout(policy.timeout(), handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) if join_err.is_panic() => Err(PipelineError::internal_error(format!(
            "Stage {} panicked: {}",
            stage_name, join_err
        ))),
        Ok(Err(join_err)) => Err(PipelineError::Cancelled(format!(
            "Stage {} aborted: {}",
            stage_name, join_err
        ))),
        Err(_) => {
            abort.abort();
            Err(PipelineError::timeout(format!(
                "Stage {} exceeded {}ms",
                stage_name, policy.timeout_ms
            )))
        }
    }
}
