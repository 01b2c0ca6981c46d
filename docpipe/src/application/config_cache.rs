// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Store-Resident Config Cache
//!
//! Process-wide cache for retry policies and alert configurations loaded
//! from the relational store. Reads are lock-free in the common case (a
//! clone of the current `Arc` snapshot); refresh swaps in a new snapshot
//! atomically when the TTL (≤ 60 s) has lapsed. Components read policies
//! through this cache, never through the repository directly, so a policy
//! change reaches the whole process within one TTL.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use docpipe_domain::entities::AlertConfiguration;
use docpipe_domain::repositories::PolicyRepository;
use docpipe_domain::services::Clock;
use docpipe_domain::value_objects::{RetryPolicy, StageName};
use docpipe_domain::PipelineError;

#[derive(Default)]
struct Snapshot {
    loaded_at: Option<DateTime<Utc>>,
    retry_policies: Vec<RetryPolicy>,
    alert_configurations: Vec<AlertConfiguration>,
}

/// Bounded-TTL cache over the policy repository.
pub struct ConfigCache {
    repository: Arc<dyn PolicyRepository>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl ConfigCache {
    pub fn new(repository: Arc<dyn PolicyRepository>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            repository,
            clock,
            ttl,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    async fn current(&self) -> Result<Arc<Snapshot>, PipelineError> {
        let now = self.clock.now();
        {
            let snapshot = self.snapshot.read();
            if let Some(loaded_at) = snapshot.loaded_at {
                let age = (now - loaded_at).to_std().unwrap_or_default();
                if age < self.ttl {
                    return Ok(Arc::clone(&snapshot));
                }
            }
        }

        debug!("Config cache stale, reloading policies from store");
        let retry_policies = self.repository.load_retry_policies().await?;
        let alert_configurations = self.repository.load_alert_configurations().await?;
        let fresh = Arc::new(Snapshot {
            loaded_at: Some(now),
            retry_policies,
            alert_configurations,
        });

        *self.snapshot.write() = Arc::clone(&fresh);
        Ok(fresh)
    }

    /// Resolves the retry policy for a (service, stage): a stage-specific
    /// row wins over the service-wide row; absent both, the process default
    /// applies. Callers never pass hard-coded delays.
    pub async fn retry_policy(&self, service: &str, stage: StageName) -> Result<RetryPolicy, PipelineError> {
        let snapshot = self.current().await?;

        let stage_specific = snapshot
            .retry_policies
            .iter()
            .find(|p| p.service_name == service && p.stage_name == Some(stage));
        if let Some(policy) = stage_specific {
            return Ok(policy.clone());
        }

        let service_wide = snapshot
            .retry_policies
            .iter()
            .find(|p| p.service_name == service && p.stage_name.is_none());
        Ok(service_wide.cloned().unwrap_or_default())
    }

    /// Enabled alert configurations
    pub async fn alert_configurations(&self) -> Result<Vec<AlertConfiguration>, PipelineError> {
        let snapshot = self.current().await?;
        Ok(snapshot
            .alert_configurations
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .collect())
    }

    /// Drops the snapshot so the next read reloads. Test helper.
    pub fn invalidate(&self) {
        *self.snapshot.write() = Arc::new(Snapshot::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docpipe_domain::services::SystemClock;
    use parking_lot::Mutex;

    struct CountingPolicyRepo {
        loads: Mutex<u32>,
        policies: Vec<RetryPolicy>,
    }

    #[async_trait]
    impl PolicyRepository for CountingPolicyRepo {
        async fn load_retry_policies(&self) -> Result<Vec<RetryPolicy>, PipelineError> {
            *self.loads.lock() += 1;
            Ok(self.policies.clone())
        }

        async fn load_alert_configurations(&self) -> Result<Vec<AlertConfiguration>, PipelineError> {
            Ok(vec![AlertConfiguration {
                alert_type: "stage_failure".into(),
                threshold: 1,
                time_window_minutes: 15,
                channels: vec!["log".into()],
                recipients: vec![],
                enabled: false,
            }])
        }

        async fn upsert_retry_policy(&self, _policy: &RetryPolicy) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    fn cache(policies: Vec<RetryPolicy>) -> (ConfigCache, Arc<CountingPolicyRepo>) {
        let repo = Arc::new(CountingPolicyRepo {
            loads: Mutex::new(0),
            policies,
        });
        let cache = ConfigCache::new(
            Arc::clone(&repo) as Arc<dyn PolicyRepository>,
            Arc::new(SystemClock),
            Duration::from_secs(60),
        );
        (cache, repo)
    }

    #[tokio::test]
    async fn test_stage_specific_beats_service_wide() {
        let service_wide = RetryPolicy::new("ai", None, 3, 1_000, 60_000, 2.0, 30_000).unwrap();
        let stage_specific =
            RetryPolicy::new("ai", Some(StageName::Embedding), 5, 500, 10_000, 2.0, 15_000).unwrap();
        let (cache, _) = cache(vec![service_wide.clone(), stage_specific.clone()]);

        let resolved = cache.retry_policy("ai", StageName::Embedding).await.unwrap();
        assert_eq!(resolved, stage_specific);

        let resolved = cache.retry_policy("ai", StageName::Upload).await.unwrap();
        assert_eq!(resolved, service_wide);
    }

    #[tokio::test]
    async fn test_default_when_unconfigured() {
        let (cache, _) = cache(vec![]);
        let resolved = cache.retry_policy("object_store", StageName::Storage).await.unwrap();
        assert_eq!(resolved, RetryPolicy::default());
    }

    #[tokio::test]
    async fn test_ttl_bounds_reloads() {
        let (cache, repo) = cache(vec![]);
        cache.retry_policy("ai", StageName::Upload).await.unwrap();
        cache.retry_policy("ai", StageName::Upload).await.unwrap();
        cache.retry_policy("ai", StageName::Embedding).await.unwrap();
        assert_eq!(*repo.loads.lock(), 1, "reads within the TTL hit the snapshot");

        cache.invalidate();
        cache.retry_policy("ai", StageName::Upload).await.unwrap();
        assert_eq!(*repo.loads.lock(), 2);
    }

    #[tokio::test]
    async fn test_disabled_configurations_filtered() {
        let (cache, _) = cache(vec![]);
        assert!(cache.alert_configurations().await.unwrap().is_empty());
    }
}
