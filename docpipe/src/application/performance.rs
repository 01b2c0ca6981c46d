// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Performance Collector
//!
//! Collects per-stage and per-request timings in memory during a run,
//! summarizes them on request completion, and persists baselines keyed by
//! (test, document, revision) for regression comparison across revisions.
//!
//! Baseline storage never runs in production: the environment guard rejects
//! it with `forbidden_in_production` before the repository is touched.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use docpipe_domain::entities::{Environment, PerformanceBaseline, RequestMetrics};
use docpipe_domain::repositories::BaselineRepository;
use docpipe_domain::value_objects::CorrelationId;
use docpipe_domain::PipelineError;

/// One raw timing captured by a runner invocation.
#[derive(Debug, Clone)]
pub struct TimingRecord {
    pub correlation_id: CorrelationId,
    pub stage_name: String,
    pub duration_ms: u64,
    pub metadata: serde_json::Value,
}

/// Kind of auxiliary timing rolled into request aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxTiming {
    Query,
    ExternalCall,
}

/// In-memory timing collector plus the baseline persistence rules.
pub struct PerformanceCollector {
    environment: Environment,
    baselines: Arc<dyn BaselineRepository>,
    records: Mutex<Vec<TimingRecord>>,
    aux: Mutex<Vec<(Uuid, AuxTiming, u64)>>,
}

impl PerformanceCollector {
    pub fn new(environment: Environment, baselines: Arc<dyn BaselineRepository>) -> Self {
        Self {
            environment,
            baselines,
            records: Mutex::new(Vec::new()),
            aux: Mutex::new(Vec::new()),
        }
    }

    /// Appends one stage timing
    pub fn record(
        &self,
        correlation_id: CorrelationId,
        stage_name: &str,
        duration_ms: u64,
        metadata: serde_json::Value,
    ) {
        debug!(
            correlation_id = %correlation_id,
            stage = stage_name,
            duration_ms,
            "Stage timing recorded"
        );
        self.records.lock().push(TimingRecord {
            correlation_id,
            stage_name: stage_name.to_string(),
            duration_ms,
            metadata,
        });
    }

    /// Appends one relational-query timing for a request
    pub fn record_query(&self, request_id: Uuid, duration_ms: u64) {
        self.aux.lock().push((request_id, AuxTiming::Query, duration_ms));
    }

    /// Appends one external-service call timing for a request
    pub fn record_external_call(&self, request_id: Uuid, duration_ms: u64) {
        self.aux.lock().push((request_id, AuxTiming::ExternalCall, duration_ms));
    }

    /// Stage timings recorded under the given request prefix. Test helper.
    pub fn records_for_request(&self, request_id: Uuid) -> Vec<TimingRecord> {
        let prefix = CorrelationId::for_request(request_id);
        self.records
            .lock()
            .iter()
            .filter(|r| r.correlation_id.request_prefix() == prefix.as_str())
            .cloned()
            .collect()
    }

    /// Summarizes and drains all records sharing the request prefix.
    pub fn finalize_request(&self, request_id: Uuid) -> RequestMetrics {
        let prefix = CorrelationId::for_request(request_id);
        let mut metrics = RequestMetrics::default();

        let mut records = self.records.lock();
        let (mine, rest): (Vec<_>, Vec<_>) = records
            .drain(..)
            .partition(|r| r.correlation_id.request_prefix() == prefix.as_str());
        *records = rest;
        drop(records);

        for record in mine {
            metrics.add_stage_time(&record.stage_name, record.duration_ms);
        }

        let mut aux = self.aux.lock();
        let (mine, rest): (Vec<_>, Vec<_>) = aux.drain(..).partition(|(id, _, _)| *id == request_id);
        *aux = rest;
        drop(aux);

        for (_, kind, duration_ms) in mine {
            match kind {
                AuxTiming::Query => metrics.add_query(duration_ms),
                AuxTiming::ExternalCall => metrics.add_external_call(duration_ms),
            }
        }

        metrics
    }

    /// Persists a baseline row. Existing rows are kept unless `force` is
    /// set; production environments are rejected outright.
    pub async fn store_baseline(
        &self,
        test_name: &str,
        document_name: &str,
        revision_id: &str,
        metrics: RequestMetrics,
        force: bool,
    ) -> Result<(), PipelineError> {
        if self.environment == Environment::Production {
            return Err(PipelineError::ForbiddenInProduction(
                "Performance baselines are never written from production".to_string(),
            ));
        }

        let baseline =
            PerformanceBaseline::new(test_name, document_name, revision_id, self.environment, metrics)?;
        self.baselines.store(&baseline, force).await
    }
}
