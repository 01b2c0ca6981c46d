// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Orchestrator
//!
//! Dispatches stages per execution mode, enforcing the dependency graph and
//! aggregating per-stage outcomes into the run report.
//!
//! Stages execute in topological waves: every stage in a wave has all its
//! prerequisites in earlier waves, so siblings run concurrently up to
//! `max_stages_parallel_per_request`. Before each wave the orchestrator
//! gates every stage against the outcomes of this run and the persisted
//! stage status: failed prerequisites skip dependents
//! (`skipped_prerequisite_failed`), pending async retries defer them
//! (`deferred`, re-evaluated on the next orchestrator pass).
//!
//! Batch mode runs the same execution over a document list bounded by
//! `max_documents_parallel`; under `stop_on_error` a failed document stops
//! new documents from starting while in-flight ones run to completion.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use async_trait::async_trait;
use docpipe_bootstrap::CancellationToken;
use docpipe_domain::entities::{RequestMetrics, StageState, StageStatusMap};
use docpipe_domain::repositories::{DocumentRepository, ErrorRecordRepository};
use docpipe_domain::services::dependency_graph::{parallel_waves, prerequisites, topological_order};
use docpipe_domain::services::{Clock, RetryExecutor, RetryScheduler};
use docpipe_domain::value_objects::{DocumentId, ExecutionMode, RunReport, StageName, StageOutcome};
use docpipe_domain::{ErrorRecordStatus, PipelineError};

use crate::application::performance::PerformanceCollector;
use crate::application::stage_runner::{DispatchRequest, StageRunner};
use crate::infrastructure::metrics::MetricsService;

/// Per-run options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Halt further dispatch after a terminal stage failure. Applies to
    /// multiple and batch modes; full and smart isolate failures through
    /// the dependency graph instead.
    pub stop_on_error: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { stop_on_error: true }
    }
}

/// Orchestrator-level tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_stages_parallel_per_request: usize,
    pub max_documents_parallel: usize,
    pub stale_in_progress_minutes: i64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_stages_parallel_per_request: 4,
            max_documents_parallel: 2,
            stale_in_progress_minutes: 30,
        }
    }
}

enum Gate {
    Run,
    Settle(StageOutcome),
}

/// The pipeline orchestrator.
pub struct PipelineOrchestrator {
    runner: Arc<StageRunner>,
    documents: Arc<dyn DocumentRepository>,
    errors: Arc<dyn ErrorRecordRepository>,
    scheduler: Arc<dyn RetryScheduler>,
    performance: Arc<PerformanceCollector>,
    clock: Arc<dyn Clock>,
    metrics: MetricsService,
    settings: OrchestratorSettings,
    token: CancellationToken,
}

impl PipelineOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        runner: Arc<StageRunner>,
        documents: Arc<dyn DocumentRepository>,
        errors: Arc<dyn ErrorRecordRepository>,
        scheduler: Arc<dyn RetryScheduler>,
        performance: Arc<PerformanceCollector>,
        clock: Arc<dyn Clock>,
        metrics: MetricsService,
        settings: OrchestratorSettings,
        token: CancellationToken,
    ) -> Self {
        Self {
            runner,
            documents,
            errors,
            scheduler,
            performance,
            clock,
            metrics,
            settings,
            token,
        }
    }

    /// Runs the pipeline for one document in the given mode.
    ///
    /// `stages` selects the stage set for single and multiple modes and is
    /// rejected otherwise. Batch requests go through [`Self::run_batch`].
    pub async fn run(
        &self,
        document_id: DocumentId,
        mode: ExecutionMode,
        stages: Option<Vec<StageName>>,
        options: RunOptions,
    ) -> Result<RunReport, PipelineError> {
        let (selection, precheck, stop_on_error) = match mode {
            ExecutionMode::Full => {
                reject_stage_list(&stages, mode)?;
                (StageName::ALL.to_vec(), false, false)
            }
            ExecutionMode::Smart => {
                reject_stage_list(&stages, mode)?;
                (StageName::ALL.to_vec(), true, false)
            }
            ExecutionMode::Single => {
                let stages = stages.unwrap_or_default();
                if stages.len() != 1 {
                    return Err(PipelineError::validation(
                        "single mode requires exactly one stage",
                    ));
                }
                (stages, false, true)
            }
            ExecutionMode::Multiple => {
                let stages = stages.unwrap_or_default();
                if stages.is_empty() {
                    return Err(PipelineError::validation(
                        "multiple mode requires a non-empty stage set",
                    ));
                }
                (stages, false, options.stop_on_error)
            }
            ExecutionMode::Batch => {
                return Err(PipelineError::validation(
                    "batch mode runs through run_batch",
                ));
            }
        };

        let request_id = Uuid::new_v4();
        info!(
            request_id = %request_id,
            document_id = %document_id,
            mode = %mode,
            stages = selection.len(),
            "Pipeline run starting"
        );

        self.metrics.increment_active_requests();
        let result = self
            .run_stage_set(document_id, request_id, mode, &selection, precheck, stop_on_error)
            .await;
        self.metrics.decrement_active_requests();

        let report = result?;
        self.metrics.set_request_success_rate(report.success_rate());
        info!(
            request_id = %request_id,
            document_id = %document_id,
            success_rate = report.success_rate(),
            "Pipeline run finished"
        );
        Ok(report)
    }

    /// Runs the same execution over a list of documents, bounded by
    /// `max_documents_parallel`.
    pub async fn run_batch(
        &self,
        document_ids: &[DocumentId],
        mode: ExecutionMode,
        stages: Option<Vec<StageName>>,
        options: RunOptions,
    ) -> Result<Vec<RunReport>, PipelineError> {
        if mode == ExecutionMode::Batch {
            return Err(PipelineError::validation(
                "batch takes an inner per-document mode",
            ));
        }

        let mut reports: Vec<Option<RunReport>> = vec![None; document_ids.len()];
        let mut join_set: JoinSet<(usize, Result<RunReport, PipelineError>)> = JoinSet::new();
        let mut halted = false;
        let mut next = 0;

        while next < document_ids.len() || !join_set.is_empty() {
            // Launch while capacity remains and no failure halted the batch
            while !halted && next < document_ids.len() && join_set.len() < self.settings.max_documents_parallel {
                let document_id = document_ids[next];
                let index = next;
                next += 1;

                // Self is borrowed into the future; JoinSet requires 'static,
                // so the per-document run goes through a cloned handle set.
                let this = self.clone_for_batch();
                let stages = stages.clone();
                let options = options.clone();
                join_set.spawn(async move {
                    let result = this.run(document_id, mode, stages, options).await;
                    (index, result)
                });
            }

            match join_set.join_next().await {
                Some(Ok((index, Ok(report)))) => {
                    if options.stop_on_error && report.has_failures() {
                        // In-flight documents run to completion; no new
                        // documents start.
                        halted = true;
                    }
                    reports[index] = Some(report);
                }
                Some(Ok((index, Err(e)))) => {
                    warn!(document_index = index, error = %e, "Batch document run failed");
                    if options.stop_on_error {
                        halted = true;
                    }
                }
                Some(Err(join_err)) => {
                    warn!(error = %join_err, "Batch document task failed");
                    if options.stop_on_error {
                        halted = true;
                    }
                }
                None => break,
            }
        }

        Ok(reports.into_iter().flatten().collect())
    }

    /// StageStatus mapping for a document, defaults included.
    pub async fn status(
        &self,
        document_id: DocumentId,
    ) -> Result<std::collections::BTreeMap<StageName, StageState>, PipelineError> {
        Ok(self.documents.stage_status(document_id).await?.all())
    }

    /// Equivalent to `run(document_id, smart)`.
    pub async fn resume(&self, document_id: DocumentId) -> Result<RunReport, PipelineError> {
        self.run(document_id, ExecutionMode::Smart, None, RunOptions::default())
            .await
    }

    /// Cancels a pending async retry by administrative action. The error
    /// record resolves as `failed` with `resolution_notes = "cancelled"`.
    pub async fn cancel_retry(&self, error_id: Uuid) -> Result<(), PipelineError> {
        let mut record = self
            .errors
            .find_by_id(error_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("Pipeline error {}", error_id)))?;

        if record.status.is_terminal() {
            return Err(PipelineError::validation(format!(
                "Pipeline error {} is already {}",
                error_id,
                record.status.as_str()
            )));
        }

        self.scheduler.cancel(error_id).await?;
        record.cancel();
        self.errors.update(&record).await?;
        info!(error_id = %error_id, "Async retry cancelled");
        Ok(())
    }

    /// Reconciles stale `in_progress` stage statuses back to `pending`.
    pub async fn sweep_stale(&self) -> Result<Vec<(DocumentId, StageName)>, PipelineError> {
        let horizon =
            self.clock.now() - chrono::Duration::minutes(self.settings.stale_in_progress_minutes);
        let reconciled = self.documents.sweep_stale_in_progress(horizon).await?;
        if !reconciled.is_empty() {
            info!(count = reconciled.len(), "Swept stale in_progress stages to pending");
        }
        Ok(reconciled)
    }

    /// Summarizes and drains the timing records of one request.
    pub fn finalize_request(&self, request_id: Uuid) -> RequestMetrics {
        self.performance.finalize_request(request_id)
    }

    async fn run_stage_set(
        &self,
        document_id: DocumentId,
        request_id: Uuid,
        mode: ExecutionMode,
        selection: &[StageName],
        precheck_unchanged: bool,
        stop_on_error: bool,
    ) -> Result<RunReport, PipelineError> {
        let ordered = topological_order(selection)?;
        let waves = parallel_waves(&ordered);
        let mut report = RunReport::new(request_id, document_id, mode);
        let semaphore = Arc::new(Semaphore::new(self.settings.max_stages_parallel_per_request));

        'waves: for wave in waves {
            if self.token.is_cancelled() {
                debug!(request_id = %request_id, "Run cancelled before wave dispatch");
                break;
            }

            let persisted = self.documents.stage_status(document_id).await?;
            let mut to_dispatch = Vec::new();
            for stage in wave {
                match self.gate(document_id, stage, &report, &persisted).await? {
                    Gate::Run => to_dispatch.push(stage),
                    Gate::Settle(outcome) => {
                        self.metrics.record_stage_outcome(stage.as_str(), outcome.label());
                        let halts = outcome.halts_on_error();
                        report.record(stage, outcome);
                        if stop_on_error && halts {
                            break 'waves;
                        }
                    }
                }
            }

            let mut join_set: JoinSet<(StageName, Option<StageOutcome>)> = JoinSet::new();
            for stage in to_dispatch {
                let permit = Arc::clone(&semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::internal_error(format!("Semaphore closed: {}", e)))?;
                let runner = Arc::clone(&self.runner);
                let token = self.token.clone();
                let request = DispatchRequest {
                    document_id,
                    request_id,
                    stage,
                    retry_attempt: 0,
                    precheck_unchanged,
                };
                join_set.spawn(async move {
                    let _permit = permit;
                    let outcome = runner.dispatch(request, &token).await;
                    (stage, outcome)
                });
            }

            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((stage, Some(outcome))) => {
                        report.record(stage, outcome);
                    }
                    Ok((_, None)) => {
                        // Cancelled by shutdown; stage left resumable
                    }
                    Err(join_err) => {
                        warn!(error = %join_err, "Stage dispatch task failed");
                    }
                }
            }

            if stop_on_error && report.has_failures() {
                break;
            }
        }

        Ok(report)
    }

    /// Gates one stage against the outcomes of this run and the persisted
    /// stage status.
    async fn gate(
        &self,
        document_id: DocumentId,
        stage: StageName,
        report: &RunReport,
        persisted: &StageStatusMap,
    ) -> Result<Gate, PipelineError> {
        for prerequisite in prerequisites(stage) {
            if let Some(outcome) = report.outcomes.get(prerequisite) {
                match outcome {
                    StageOutcome::Completed | StageOutcome::SkippedUnchanged => continue,
                    StageOutcome::Failed { .. } | StageOutcome::SkippedPrerequisiteFailed { .. } => {
                        return Ok(Gate::Settle(StageOutcome::SkippedPrerequisiteFailed {
                            prerequisite: *prerequisite,
                        }));
                    }
                    StageOutcome::DeferredAsyncRetry { error_id, .. }
                    | StageOutcome::Deferred { error_id } => {
                        return Ok(Gate::Settle(StageOutcome::Deferred { error_id: *error_id }));
                    }
                    StageOutcome::SkippedConcurrentFirstAttempt
                    | StageOutcome::SkippedConcurrentRetry => {
                        // Satisfied only if an earlier run already completed
                        // the prerequisite.
                        if persisted.get(*prerequisite) == StageState::Completed {
                            continue;
                        }
                        if let Some(record) = self
                            .errors
                            .find_active_retry(document_id, *prerequisite)
                            .await?
                        {
                            return Ok(Gate::Settle(StageOutcome::Deferred {
                                error_id: record.error_id,
                            }));
                        }
                        return Ok(Gate::Settle(prerequisite_not_met(stage, *prerequisite, report)));
                    }
                }
            }

            // Prerequisite outside this run's dispatch: consult the store.
            match persisted.get(*prerequisite) {
                StageState::Completed => continue,
                StageState::Failed => {
                    return Ok(Gate::Settle(StageOutcome::SkippedPrerequisiteFailed {
                        prerequisite: *prerequisite,
                    }));
                }
                _ => {
                    if let Some(record) = self
                        .errors
                        .find_active_retry(document_id, *prerequisite)
                        .await?
                    {
                        if record.status == ErrorRecordStatus::Retrying {
                            return Ok(Gate::Settle(StageOutcome::Deferred {
                                error_id: record.error_id,
                            }));
                        }
                    }
                    return Ok(Gate::Settle(prerequisite_not_met(stage, *prerequisite, report)));
                }
            }
        }
        Ok(Gate::Run)
    }

    /// Clone of the orchestrator handle set for batch document tasks.
    fn clone_for_batch(&self) -> Arc<Self> {
        Arc::new(Self {
            runner: Arc::clone(&self.runner),
            documents: Arc::clone(&self.documents),
            errors: Arc::clone(&self.errors),
            scheduler: Arc::clone(&self.scheduler),
            performance: Arc::clone(&self.performance),
            clock: Arc::clone(&self.clock),
            metrics: self.metrics.clone(),
            settings: self.settings.clone(),
            token: self.token.clone(),
        })
    }
}

fn reject_stage_list(stages: &Option<Vec<StageName>>, mode: ExecutionMode) -> Result<(), PipelineError> {
    if stages.as_ref().is_some_and(|s| !s.is_empty()) {
        return Err(PipelineError::validation(format!(
            "{} mode does not take a stage list",
            mode
        )));
    }
    Ok(())
}

fn prerequisite_not_met(stage: StageName, prerequisite: StageName, report: &RunReport) -> StageOutcome {
    let correlation_id =
        docpipe_domain::value_objects::CorrelationId::for_request(report.request_id)
            .extend(stage)
            .unwrap_or_else(|_| {
                docpipe_domain::value_objects::CorrelationId::for_request(report.request_id)
            });
    StageOutcome::Failed {
        error_code: "prerequisite_not_met".to_string(),
        message: format!("Prerequisite {} is not completed", prerequisite),
        correlation_id,
    }
}

#[async_trait]
impl RetryExecutor for PipelineOrchestrator {
    /// Re-runs the full stage-runner path for a due retry record. The
    /// original request id is recovered from the record's correlation id so
    /// the attempt chain stays under one request prefix.
    async fn execute_retry(&self, error_id: Uuid) -> Result<(), PipelineError> {
        let record = match self.errors.find_by_id(error_id).await? {
            Some(record) => record,
            None => {
                debug!(error_id = %error_id, "Retry record vanished before execution");
                return Ok(());
            }
        };
        if record.status != ErrorRecordStatus::Retrying {
            debug!(error_id = %error_id, status = record.status.as_str(), "Retry no longer pending");
            return Ok(());
        }

        let request_id = record.correlation_id.parse()?.request_id;
        let request = DispatchRequest {
            document_id: record.document_id,
            request_id,
            stage: record.stage_name,
            retry_attempt: record.retry_count,
            precheck_unchanged: false,
        };

        info!(
            error_id = %error_id,
            correlation_id = %record.correlation_id,
            retry_count = record.retry_count,
            "Executing scheduled retry"
        );
        let outcome = self.runner.dispatch(request, &self.token).await;
        debug!(
            error_id = %error_id,
            outcome = outcome.as_ref().map(|o| o.label()).unwrap_or("cancelled"),
            "Scheduled retry finished"
        );
        Ok(())
    }
}
