// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shared harness for the integration tests: a full pipeline core over an
//! in-memory SQLite database, the in-memory object store, the deterministic
//! AI stub and a collecting alert channel.

use std::sync::Arc;

use docpipe::infrastructure::adapters::{CollectingAlertChannel, InMemoryObjectStore, StubAiService};
use docpipe::infrastructure::config::AppSettings;
use docpipe::infrastructure::repositories::{
    schema, SqliteAlertRepository, SqliteLockManager, SqliteMarkerRepository, SqlitePolicyRepository,
};
use docpipe::PipelineCore;
use docpipe_bootstrap::CancellationToken;
use docpipe_domain::entities::AlertConfiguration;
use docpipe_domain::repositories::{AlertRepository, PolicyRepository};
use docpipe_domain::services::{AiService, AlertChannel, ObjectStore};
use docpipe_domain::value_objects::{DocumentId, RetryPolicy};

pub struct Harness {
    pub core: PipelineCore,
    pub store: Arc<InMemoryObjectStore>,
    pub ai: Arc<StubAiService>,
    pub channel: Arc<CollectingAlertChannel>,
}

impl Harness {
    pub async fn new() -> Self {
        let pool = schema::in_memory_database().await.unwrap();
        let store = Arc::new(InMemoryObjectStore::new());
        let ai = Arc::new(StubAiService::new());
        let channel = Arc::new(CollectingAlertChannel::new("ops"));

        let core = PipelineCore::build_with(
            pool,
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            Arc::clone(&ai) as Arc<dyn AiService>,
            vec![Arc::clone(&channel) as Arc<dyn AlertChannel>],
            AppSettings::default(),
            CancellationToken::never(),
        )
        .await
        .unwrap();

        Self {
            core,
            store,
            ai,
            channel,
        }
    }

    pub async fn ingest(&self, bytes: &[u8]) -> DocumentId {
        self.core.ingest(bytes.to_vec()).await.unwrap()
    }

    /// Seeds a retry policy row. Policies set before the first run land in
    /// the config cache's first snapshot.
    pub async fn set_retry_policy(&self, policy: RetryPolicy) {
        SqlitePolicyRepository::new(self.core.pool.clone())
            .upsert_retry_policy(&policy)
            .await
            .unwrap();
    }

    pub async fn set_alert_config(&self, config: AlertConfiguration) {
        SqliteAlertRepository::new(self.core.pool.clone())
            .upsert_configuration(&config)
            .await
            .unwrap();
    }

    pub fn markers(&self) -> SqliteMarkerRepository {
        SqliteMarkerRepository::new(self.core.pool.clone())
    }

    pub fn alerts_repo(&self) -> SqliteAlertRepository {
        SqliteAlertRepository::new(self.core.pool.clone())
    }

    pub fn locks(&self) -> SqliteLockManager {
        SqliteLockManager::new(self.core.pool.clone(), 300)
    }

    /// A short-delay AI retry policy so tests exercising the sync retry
    /// sleep stay fast.
    pub async fn fast_ai_retries(&self, max_retries: u32) {
        self.set_retry_policy(RetryPolicy::new("ai", None, max_retries, 10, 100, 2.0, 5_000).unwrap())
            .await;
    }
}
