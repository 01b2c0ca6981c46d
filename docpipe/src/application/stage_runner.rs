// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Runner
//!
//! Wraps one stage invocation with the full resilience envelope:
//!
//! ```text
//! correlation id → advisory lock → idempotency check (+ cleanup on changed
//! hash) → status in_progress → retry orchestration → completion marker →
//! timing + alert bookkeeping
//! ```
//!
//! The advisory lock is released on every control-flow path: the body runs
//! behind a single release point, and stage panics have already been
//! converted to result values by the retry orchestrator before they reach
//! it. Failures never escape the runner; callers receive a `StageOutcome`.
//!
//! Persisted stage outputs carry an `input_hash` provenance field merged in
//! by the runner. Because a dependent's declared input embeds its
//! prerequisites' outputs, a changed input hash propagates downstream and
//! re-executes the transitive dependents on the next smart pass.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use docpipe_bootstrap::CancellationToken;
use docpipe_domain::entities::{Document, PipelineErrorRecord, ProcessingContext, Severity, StageState};
use docpipe_domain::repositories::{DocumentRepository, ErrorRecordRepository};
use docpipe_domain::repositories::AdvisoryLockManager;
use docpipe_domain::services::object_store::stage_prefix;
use docpipe_domain::services::{ObjectStore, Stage};
use docpipe_domain::services::dependency_graph::prerequisites;
use docpipe_domain::value_objects::{CorrelationId, DocumentId, StageGroup, StageName, StageOutcome};
use docpipe_domain::{ErrorRecordStatus, PipelineError};

use crate::application::alerts::AlertService;
use crate::application::idempotency::IdempotencyChecker;
use crate::application::config_cache::ConfigCache;
use crate::application::performance::PerformanceCollector;
use crate::application::registry::StageRegistry;
use crate::application::retry::{RetryOrchestrator, RetryVerdict};
use crate::infrastructure::metrics::MetricsService;

/// Alert type queued on first-attempt advisory lock contention.
pub const LOCK_CONTENTION_ALERT: &str = "lock_contention";

/// Object-store key of a stage's persisted output envelope.
pub fn output_key(document_id: DocumentId, stage: StageName) -> String {
    format!("{}/output.json", stage_prefix(document_id, stage))
}

/// Retry-policy service key for a stage: the enrichment stages retry
/// against the AI service policy, finalization against the storage policy,
/// everything else against the pipeline-wide policy.
pub fn service_for(stage: StageName) -> &'static str {
    match stage.group() {
        StageGroup::Enrichment => "ai",
        StageGroup::Finalization => "storage",
        _ => "pipeline",
    }
}

/// One stage dispatch request.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub document_id: DocumentId,
    pub request_id: Uuid,
    pub stage: StageName,
    pub retry_attempt: u32,
    /// Smart mode: short-circuit unchanged stages before lock acquisition
    pub precheck_unchanged: bool,
}

/// Stage runner wiring.
pub struct StageRunner {
    documents: Arc<dyn DocumentRepository>,
    errors: Arc<dyn ErrorRecordRepository>,
    locks: Arc<dyn AdvisoryLockManager>,
    store: Arc<dyn ObjectStore>,
    registry: Arc<StageRegistry>,
    config: Arc<ConfigCache>,
    checker: Arc<IdempotencyChecker>,
    retry: Arc<RetryOrchestrator>,
    alerts: Arc<AlertService>,
    performance: Arc<PerformanceCollector>,
    metrics: MetricsService,
}

impl StageRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        errors: Arc<dyn ErrorRecordRepository>,
        locks: Arc<dyn AdvisoryLockManager>,
        store: Arc<dyn ObjectStore>,
        registry: Arc<StageRegistry>,
        config: Arc<ConfigCache>,
        checker: Arc<IdempotencyChecker>,
        retry: Arc<RetryOrchestrator>,
        alerts: Arc<AlertService>,
        performance: Arc<PerformanceCollector>,
        metrics: MetricsService,
    ) -> Self {
        Self {
            documents,
            errors,
            locks,
            store,
            registry,
            config,
            checker,
            retry,
            alerts,
            performance,
            metrics,
        }
    }

    /// Dispatches one stage. Returns `None` only when shutdown cancelled the
    /// invocation before it reached a terminal state; the stage is left
    /// resumable (`pending`, lock released, no result-map entry).
    pub async fn dispatch(&self, request: DispatchRequest, token: &CancellationToken) -> Option<StageOutcome> {
        let outcome = self.dispatch_inner(&request, token).await;
        if let Some(outcome) = &outcome {
            self.metrics
                .record_stage_outcome(request.stage.as_str(), outcome.label());
        }
        outcome
    }

    async fn dispatch_inner(
        &self,
        request: &DispatchRequest,
        token: &CancellationToken,
    ) -> Option<StageOutcome> {
        let stage = match self.registry.get(request.stage) {
            Ok(stage) => stage,
            Err(e) => return Some(self.failed_outcome(request, e)),
        };

        let document = match self.documents.find_by_id(request.document_id).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                return Some(self.failed_outcome(
                    request,
                    PipelineError::NotFound(format!("Document {}", request.document_id)),
                ))
            }
            Err(e) => return Some(self.failed_outcome(request, e)),
        };

        // An active retry chain makes a plain dispatch benignly skip; the
        // retry task itself arrives with retry_attempt > 0.
        let active_record = match self
            .errors
            .find_active_retry(request.document_id, request.stage)
            .await
        {
            Ok(record) => record,
            Err(e) => return Some(self.failed_outcome(request, e)),
        };
        if request.retry_attempt == 0 {
            if let Some(record) = &active_record {
                if record.status == ErrorRecordStatus::Retrying {
                    debug!(
                        document_id = %request.document_id,
                        stage = %request.stage,
                        error_id = %record.error_id,
                        "Async retry already pending, skipping dispatch"
                    );
                    return Some(StageOutcome::SkippedConcurrentRetry);
                }
            }
        }

        let ctx = match self.build_context(request, &document).await {
            Ok(ctx) => ctx,
            Err(e) => return Some(self.failed_outcome(request, e)),
        };

        let current_hash = match IdempotencyChecker::compute_hash(stage.as_ref(), &ctx) {
            Ok(hash) => hash,
            Err(e) => return Some(self.failed_outcome(request, e)),
        };

        // Smart mode short-circuits unchanged stages without touching the
        // lock, so an unchanged replay is zero lock round-trips.
        if request.precheck_unchanged {
            match self.checker.check(request.document_id, request.stage).await {
                Ok(check) if check.is_complete && check.stored_hash.as_deref() == Some(current_hash.as_str()) => {
                    debug!(correlation_id = %ctx.correlation_id(), "Unchanged, skipping before lock");
                    return Some(StageOutcome::SkippedUnchanged);
                }
                Ok(_) => {}
                Err(e) => return Some(self.failed_outcome(request, e)),
            }
        }

        let handle = match self.locks.try_acquire(request.document_id, request.stage).await {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                self.metrics.increment_lock_contention();
                if request.retry_attempt == 0 {
                    // First-attempt contention is unexpected; alert once.
                    self.alerts
                        .queue(
                            LOCK_CONTENTION_ALERT,
                            Severity::Medium,
                            &format!(
                                "Concurrent first attempt on {} for document {}",
                                request.stage, request.document_id
                            ),
                            "Advisory lock held by another worker",
                            serde_json::json!({
                                "document_id": request.document_id.to_string(),
                                "stage": request.stage.as_str(),
                                "correlation_id": ctx.correlation_id().as_str(),
                            }),
                        )
                        .await;
                    return Some(StageOutcome::SkippedConcurrentFirstAttempt);
                }
                return Some(StageOutcome::SkippedConcurrentRetry);
            }
            Err(e) => return Some(self.failed_outcome(request, e)),
        };

        // Everything below runs with the lock held; this is the single
        // release point for all paths.
        let result = self
            .run_locked(request, stage, &ctx, &current_hash, active_record, token)
            .await;

        if let Err(e) = self.locks.release(handle).await {
            warn!(
                correlation_id = %ctx.correlation_id(),
                error = %e,
                "Failed to release advisory lock"
            );
        }

        result
    }

    async fn run_locked(
        &self,
        request: &DispatchRequest,
        stage: Arc<dyn Stage>,
        ctx: &ProcessingContext,
        current_hash: &str,
        active_record: Option<PipelineErrorRecord>,
        token: &CancellationToken,
    ) -> Option<StageOutcome> {
        // Check-before-write under the lock.
        let query_started = Instant::now();
        let check = match self.checker.check(request.document_id, request.stage).await {
            Ok(check) => check,
            Err(e) => return Some(self.failed_outcome(request, e)),
        };
        self.performance
            .record_query(request.request_id, query_started.elapsed().as_millis() as u64);

        if check.is_complete {
            if check.stored_hash.as_deref() == Some(current_hash) {
                debug!(correlation_id = %ctx.correlation_id(), "Completion marker matches, skipping");
                return Some(StageOutcome::SkippedUnchanged);
            }
            // Changed input: drop prior outputs, then re-execute.
            if let Err(e) = self.checker.cleanup(stage.as_ref(), request.document_id).await {
                return Some(self.failed_outcome(request, e));
            }
        }

        if let Err(e) = self
            .documents
            .set_stage_state(request.document_id, request.stage, StageState::InProgress)
            .await
        {
            return Some(self.failed_outcome(request, e));
        }

        let policy = match self.config.retry_policy(service_for(request.stage), request.stage).await {
            Ok(policy) => policy,
            Err(e) => return Some(self.failed_outcome(request, e)),
        };

        let started = Instant::now();
        let verdict = tokio::select! {
            verdict = self.retry.run_with_retry(stage, ctx, &policy, active_record) => verdict,
            _ = token.cancelled() => {
                // Shutdown mid-invocation: leave the stage resumable.
                info!(correlation_id = %ctx.correlation_id(), "Stage cancelled by shutdown");
                let _ = self
                    .documents
                    .set_stage_state(request.document_id, request.stage, StageState::Pending)
                    .await;
                return None;
            }
        };
        let elapsed = started.elapsed();

        match verdict {
            RetryVerdict::Success { output, final_attempt } => {
                let outcome = self
                    .complete_stage(request, ctx, current_hash, output, final_attempt)
                    .await;
                self.performance.record(
                    ctx.correlation_id().clone(),
                    request.stage.as_str(),
                    elapsed.as_millis() as u64,
                    serde_json::json!({"retry_attempt": final_attempt}),
                );
                self.metrics.record_stage_duration(elapsed);
                Some(outcome)
            }
            RetryVerdict::Scheduled { error_id, next_retry_at } => {
                // Awaiting the async retry; the lock must not ride across
                // the backoff sleep.
                if let Err(e) = self
                    .documents
                    .set_stage_state(request.document_id, request.stage, StageState::Pending)
                    .await
                {
                    warn!(correlation_id = %ctx.correlation_id(), error = %e, "Failed to park stage as pending");
                }
                Some(StageOutcome::DeferredAsyncRetry { error_id, next_retry_at })
            }
            RetryVerdict::Failed { error, .. } => {
                if let Err(e) = self
                    .documents
                    .set_stage_state(request.document_id, request.stage, StageState::Failed)
                    .await
                {
                    warn!(correlation_id = %ctx.correlation_id(), error = %e, "Failed to record failed status");
                }
                self.performance.record(
                    ctx.correlation_id().clone(),
                    request.stage.as_str(),
                    elapsed.as_millis() as u64,
                    serde_json::json!({"failed": true}),
                );
                Some(StageOutcome::Failed {
                    error_code: error.error_code().to_string(),
                    message: error.to_string(),
                    correlation_id: ctx.correlation_id().clone(),
                })
            }
        }
    }

    async fn complete_stage(
        &self,
        request: &DispatchRequest,
        ctx: &ProcessingContext,
        current_hash: &str,
        output: serde_json::Value,
        final_attempt: u32,
    ) -> StageOutcome {
        // Provenance field; see the module docs for why this cascades
        // re-execution to dependents.
        let mut envelope = match output {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        envelope.insert(
            "input_hash".to_string(),
            serde_json::Value::String(current_hash.to_string()),
        );
        let envelope = serde_json::Value::Object(envelope);

        let bytes = match serde_json::to_vec(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => return self.failed_outcome(request, e.into()),
        };
        if let Err(e) = self
            .store
            .put(&output_key(request.document_id, request.stage), bytes)
            .await
        {
            return self.failed_outcome(request, e);
        }

        let query_started = Instant::now();
        let marker_result = self
            .checker
            .set_marker(
                request.document_id,
                request.stage,
                current_hash,
                serde_json::json!({
                    "correlation_id": ctx.correlation_id().as_str(),
                    "retry_attempt": final_attempt,
                }),
            )
            .await;
        self.performance
            .record_query(request.request_id, query_started.elapsed().as_millis() as u64);

        match marker_result {
            Ok(()) => {
                info!(
                    correlation_id = %ctx.correlation_id(),
                    data_hash = current_hash,
                    "Stage completed"
                );
                StageOutcome::Completed
            }
            Err(e) => self.failed_outcome(request, e),
        }
    }

    /// Assembles the processing context: document input view plus the
    /// persisted output envelopes of the stage's direct prerequisites.
    async fn build_context(
        &self,
        request: &DispatchRequest,
        document: &Document,
    ) -> Result<ProcessingContext, PipelineError> {
        let mut stage_outputs = HashMap::new();
        for prereq in prerequisites(request.stage) {
            let key = output_key(request.document_id, *prereq);
            match self.store.get(&key).await? {
                Some(bytes) => {
                    stage_outputs.insert(*prereq, serde_json::from_slice(&bytes)?);
                }
                None => {
                    return Err(PipelineError::PrerequisiteNotMet(format!(
                        "Stage {} has no persisted output for document {}",
                        prereq, request.document_id
                    )));
                }
            }
        }

        let input_data = serde_json::json!({
            "source_key": document.source_key(),
            "source_sha256": document.source_sha256(),
        });

        let ctx = ProcessingContext::new(
            request.document_id,
            request.request_id,
            request.stage,
            input_data,
            stage_outputs,
        )?;
        if request.retry_attempt > 0 {
            ctx.for_retry(request.retry_attempt)
        } else {
            Ok(ctx)
        }
    }

    fn failed_outcome(&self, request: &DispatchRequest, error: PipelineError) -> StageOutcome {
        let correlation_id = CorrelationId::for_request(request.request_id)
            .extend(request.stage)
            .unwrap_or_else(|_| CorrelationId::for_request(request.request_id));
        warn!(
            correlation_id = %correlation_id,
            stage = %request.stage,
            error_code = error.error_code(),
            error = %error,
            "Stage dispatch failed"
        );
        StageOutcome::Failed {
            error_code: error.error_code().to_string(),
            message: error.to_string(),
            correlation_id,
        }
    }
}
