// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Policy Repository Port
//!
//! Source of the process-wide configuration rows (retry policies and alert
//! configurations). The application layer wraps this port in a bounded-TTL
//! cache; components read policies through the cache, never through this
//! port directly.

use async_trait::async_trait;

use crate::entities::AlertConfiguration;
use crate::error::PipelineError;
use crate::value_objects::RetryPolicy;

/// Loader for store-resident configuration.
#[async_trait]
pub trait PolicyRepository: Send + Sync {
    /// All retry policy rows
    async fn load_retry_policies(&self) -> Result<Vec<RetryPolicy>, PipelineError>;

    /// All alert configuration rows
    async fn load_alert_configurations(&self) -> Result<Vec<AlertConfiguration>, PipelineError>;

    /// Upserts a retry policy row
    async fn upsert_retry_policy(&self, policy: &RetryPolicy) -> Result<(), PipelineError>;
}
