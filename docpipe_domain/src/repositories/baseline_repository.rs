// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Performance Baseline Repository Port

use async_trait::async_trait;

use crate::entities::PerformanceBaseline;
use crate::error::PipelineError;

/// Repository interface for performance baselines, unique on
/// (test_name, document_name, revision_id).
#[async_trait]
pub trait BaselineRepository: Send + Sync {
    /// Inserts a baseline. With `force` false an existing row for the same
    /// key is an error (`baseline_exists`); with `force` true it is
    /// overwritten.
    async fn store(&self, baseline: &PerformanceBaseline, force: bool) -> Result<(), PipelineError>;

    /// Finds a baseline by its unique key
    async fn find(
        &self,
        test_name: &str,
        document_name: &str,
        revision_id: &str,
    ) -> Result<Option<PerformanceBaseline>, PipelineError>;

    /// Lists baselines for one test, newest first
    async fn list_for_test(&self, test_name: &str) -> Result<Vec<PerformanceBaseline>, PipelineError>;
}
