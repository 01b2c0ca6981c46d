// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Performance Baselines
//!
//! A baseline is a stored performance snapshot tied to a code revision and a
//! fixed test document, used for regression comparison across revisions.
//! Baselines are unique on (test, document, revision) and are never written
//! from the production environment.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Deployment environment a baseline was captured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(PipelineError::ValidationError(format!(
                "Unknown environment: {}",
                other
            ))),
        }
    }
}

/// Aggregated timings for one pipeline request.
///
/// Produced by the performance collector's `finalize_request` from the raw
/// per-stage timing records sharing a request prefix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMetrics {
    pub pipeline_time_ms: u64,
    /// Total time per stage, keyed by canonical stage name
    pub stage_times_ms: BTreeMap<String, u64>,
    pub query_count: u64,
    pub query_time_ms: u64,
    pub external_call_count: u64,
    pub external_time_ms: u64,
}

impl RequestMetrics {
    /// Adds one stage timing into the rollup
    pub fn add_stage_time(&mut self, stage: &str, duration_ms: u64) {
        *self.stage_times_ms.entry(stage.to_string()).or_insert(0) += duration_ms;
        self.pipeline_time_ms += duration_ms;
    }

    /// Adds one external-service call into the rollup
    pub fn add_external_call(&mut self, duration_ms: u64) {
        self.external_call_count += 1;
        self.external_time_ms += duration_ms;
    }

    /// Adds one relational query into the rollup
    pub fn add_query(&mut self, duration_ms: u64) {
        self.query_count += 1;
        self.query_time_ms += duration_ms;
    }
}

/// One stored baseline row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceBaseline {
    pub test_name: String,
    pub document_name: String,
    pub revision_id: String,
    pub environment: Environment,
    pub metrics: RequestMetrics,
    pub created_at: DateTime<Utc>,
}

impl PerformanceBaseline {
    pub fn new(
        test_name: impl Into<String>,
        document_name: impl Into<String>,
        revision_id: impl Into<String>,
        environment: Environment,
        metrics: RequestMetrics,
    ) -> Result<Self, PipelineError> {
        let test_name = test_name.into();
        let document_name = document_name.into();
        let revision_id = revision_id.into();
        if test_name.is_empty() || document_name.is_empty() || revision_id.is_empty() {
            return Err(PipelineError::validation(
                "Baseline key parts (test, document, revision) cannot be empty",
            ));
        }
        Ok(Self {
            test_name,
            document_name,
            revision_id,
            environment,
            metrics,
            created_at: Utc::now(),
        })
    }
}
