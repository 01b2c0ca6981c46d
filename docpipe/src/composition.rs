// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Composition Root
//!
//! Wires the domain ports to their infrastructure implementations and
//! assembles the application services. The binary builds a production core
//! (SQLite file, filesystem object store, log alert channel); integration
//! tests inject in-memory adapters and the deterministic AI stub through
//! [`PipelineCore::build_with`].

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use docpipe_bootstrap::CancellationToken;
use docpipe_domain::entities::Document;
use docpipe_domain::repositories::{
    AdvisoryLockManager, AlertRepository, BaselineRepository, CompletionMarkerRepository,
    DocumentRepository, ErrorRecordRepository, PolicyRepository,
};
use docpipe_domain::services::canonical_json::hash_bytes;
use docpipe_domain::services::object_store::document_prefix;
use docpipe_domain::services::{
    AiService, AlertChannel, Clock, ObjectStore, RetryExecutor, RetryScheduler, SystemClock,
};
use docpipe_domain::value_objects::DocumentId;
use docpipe_domain::PipelineError;

use crate::application::{
    AlertService, ConfigCache, IdempotencyChecker, OrchestratorSettings, PerformanceCollector,
    PipelineOrchestrator, RetentionSettings, RetryOrchestrator, StageRegistry, StageRunner,
};
use crate::infrastructure::adapters::{FilesystemObjectStore, LogAlertChannel, StubAiService};
use crate::infrastructure::config::AppSettings;
use crate::infrastructure::metrics::MetricsService;
use crate::infrastructure::repositories::{
    schema, SqliteAlertRepository, SqliteBaselineRepository, SqliteDocumentRepository,
    SqliteErrorRepository, SqliteLockManager, SqliteMarkerRepository, SqlitePolicyRepository,
};
use crate::infrastructure::runtime::TokioRetryScheduler;

/// Fully wired pipeline core.
pub struct PipelineCore {
    pub pool: SqlitePool,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub alerts: Arc<AlertService>,
    pub scheduler: Arc<TokioRetryScheduler>,
    pub performance: Arc<PerformanceCollector>,
    pub metrics: MetricsService,
    pub documents: Arc<dyn DocumentRepository>,
    pub errors: Arc<dyn ErrorRecordRepository>,
    pub store: Arc<dyn ObjectStore>,
    baselines: Arc<dyn BaselineRepository>,
    settings: AppSettings,
    token: CancellationToken,
}

impl PipelineCore {
    /// Builds the production core from settings: SQLite file database,
    /// filesystem object store under the staging root, log alert channel,
    /// deterministic AI stub standing in for the external model service.
    pub async fn build(settings: AppSettings, token: CancellationToken) -> Result<Self, PipelineError> {
        let pool = schema::initialize_database(&settings.database_url)
            .await
            .map_err(|e| PipelineError::database_error(e.to_string()))?;

        let store: Arc<dyn ObjectStore> =
            Arc::new(FilesystemObjectStore::new(settings.staging_root.clone()));
        let ai: Arc<dyn AiService> = Arc::new(StubAiService::new());
        let channels: Vec<Arc<dyn AlertChannel>> = vec![Arc::new(LogAlertChannel::new("log"))];

        Self::build_with(pool, store, ai, channels, settings, token).await
    }

    /// Builds a core over injected adapters. Shared by the binary and the
    /// integration tests.
    pub async fn build_with(
        pool: SqlitePool,
        store: Arc<dyn ObjectStore>,
        ai: Arc<dyn AiService>,
        channels: Vec<Arc<dyn AlertChannel>>,
        settings: AppSettings,
        token: CancellationToken,
    ) -> Result<Self, PipelineError> {
        let metrics = MetricsService::new()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let documents: Arc<dyn DocumentRepository> =
            Arc::new(SqliteDocumentRepository::new(pool.clone()));
        let markers: Arc<dyn CompletionMarkerRepository> =
            Arc::new(SqliteMarkerRepository::new(pool.clone()));
        let errors: Arc<dyn ErrorRecordRepository> = Arc::new(SqliteErrorRepository::new(pool.clone()));
        let alert_repo: Arc<dyn AlertRepository> = Arc::new(SqliteAlertRepository::new(pool.clone()));
        let baselines: Arc<dyn BaselineRepository> =
            Arc::new(SqliteBaselineRepository::new(pool.clone()));
        let policies: Arc<dyn PolicyRepository> = Arc::new(SqlitePolicyRepository::new(pool.clone()));
        let locks: Arc<dyn AdvisoryLockManager> =
            Arc::new(SqliteLockManager::new(pool.clone(), settings.lock_lease_secs));

        let config = Arc::new(ConfigCache::new(
            policies,
            Arc::clone(&clock),
            Duration::from_secs(settings.config_cache_ttl_secs),
        ));
        let performance = Arc::new(PerformanceCollector::new(
            settings.environment,
            Arc::clone(&baselines),
        ));
        let alerts = Arc::new(AlertService::new(
            alert_repo,
            Arc::clone(&errors),
            channels,
            Arc::clone(&config),
            Arc::clone(&clock),
            metrics.clone(),
            RetentionSettings {
                alert_retention_hours: settings.alert_retention_hours,
                error_retention_hours: settings.error_retention_hours,
            },
        ));

        let scheduler = Arc::new(TokioRetryScheduler::new(Arc::clone(&clock), token.clone()));
        let retry = Arc::new(RetryOrchestrator::new(
            Arc::clone(&errors),
            Arc::clone(&alerts),
            Arc::clone(&scheduler) as Arc<dyn RetryScheduler>,
            Arc::clone(&clock),
            metrics.clone(),
        ));

        let registry = Arc::new(StageRegistry::builtin(
            Arc::clone(&store),
            ai,
            Arc::clone(&performance),
        ));
        let checker = Arc::new(IdempotencyChecker::new(
            Arc::clone(&markers),
            Arc::clone(&documents),
        ));

        let runner = Arc::new(StageRunner::new(
            Arc::clone(&documents),
            Arc::clone(&errors),
            locks,
            Arc::clone(&store),
            registry,
            config,
            checker,
            retry,
            Arc::clone(&alerts),
            Arc::clone(&performance),
            metrics.clone(),
        ));

        let orchestrator = Arc::new(PipelineOrchestrator::new(
            runner,
            Arc::clone(&documents),
            Arc::clone(&errors),
            Arc::clone(&scheduler) as Arc<dyn RetryScheduler>,
            Arc::clone(&performance),
            clock,
            metrics.clone(),
            OrchestratorSettings {
                max_stages_parallel_per_request: settings.max_stages_parallel_per_request,
                max_documents_parallel: settings.max_documents_parallel,
                stale_in_progress_minutes: settings.stale_in_progress_minutes,
            },
            token.clone(),
        ));

        scheduler.set_executor(Arc::clone(&orchestrator) as Arc<dyn RetryExecutor>);

        Ok(Self {
            pool,
            orchestrator,
            alerts,
            scheduler,
            performance,
            metrics,
            documents,
            errors,
            store,
            baselines,
            settings,
            token,
        })
    }

    /// Starts the background loops: the alert aggregator and re-armed retry
    /// timers from a previous process.
    pub async fn start_background(&self) -> Result<(), PipelineError> {
        Arc::clone(&self.alerts).spawn_aggregator(
            Duration::from_secs(self.settings.aggregator_period_secs),
            self.token.clone(),
        );
        let rearmed = self.scheduler.reschedule_due(self.errors.as_ref()).await?;
        if rearmed > 0 {
            tracing::info!(count = rearmed, "Re-armed persisted retry timers");
        }
        Ok(())
    }

    /// Ingests source bytes: stores them under the document's object-store
    /// prefix and creates the document row.
    pub async fn ingest(&self, bytes: Vec<u8>) -> Result<DocumentId, PipelineError> {
        let id = DocumentId::new();
        let source_key = format!("{}/source.pdf", document_prefix(id));
        let source_sha256 = hash_bytes(&bytes);

        self.store.put(&source_key, bytes).await?;
        let document = Document::new(id, source_key, source_sha256)?;
        self.documents.save(&document).await?;
        Ok(id)
    }

    /// Stored baselines for one test, newest first.
    pub async fn baselines_for_test(
        &self,
        test_name: &str,
    ) -> Result<Vec<docpipe_domain::entities::PerformanceBaseline>, PipelineError> {
        self.baselines.list_for_test(test_name).await
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }
}
