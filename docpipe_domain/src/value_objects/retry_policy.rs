// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Retry Policy
//!
//! Per-(service, stage) retry configuration loaded from the relational store
//! and cached process-wide. The backoff computation lives here so the Retry
//! Orchestrator stays data-driven: callers never pass hard-coded delays.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::value_objects::stage_name::StageName;

/// Retry configuration for one service, optionally narrowed to one stage.
///
/// A stage-specific policy wins over the service-wide policy for the same
/// `service_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub service_name: String,
    pub stage_name: Option<StageName>,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub timeout_ms: u64,
}

impl RetryPolicy {
    /// Creates a validated retry policy
    pub fn new(
        service_name: impl Into<String>,
        stage_name: Option<StageName>,
        max_retries: u32,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        backoff_multiplier: f64,
        timeout_ms: u64,
    ) -> Result<Self, PipelineError> {
        if initial_delay_ms == 0 {
            return Err(PipelineError::invalid_config("initial_delay_ms must be positive"));
        }
        if max_delay_ms < initial_delay_ms {
            return Err(PipelineError::invalid_config(
                "max_delay_ms must be at least initial_delay_ms",
            ));
        }
        if backoff_multiplier < 1.0 {
            return Err(PipelineError::invalid_config("backoff_multiplier must be >= 1.0"));
        }
        if timeout_ms == 0 {
            return Err(PipelineError::invalid_config("timeout_ms must be positive"));
        }
        Ok(Self {
            service_name: service_name.into(),
            stage_name,
            max_retries,
            initial_delay_ms,
            max_delay_ms,
            backoff_multiplier,
            timeout_ms,
        })
    }

    /// Delay before the given retry attempt:
    /// `min(initial_delay_ms * multiplier^attempt, max_delay_ms)`.
    pub fn delay_for_attempt(&self, retry_attempt: u32) -> Duration {
        let exp = self.backoff_multiplier.powi(retry_attempt as i32);
        let raw = (self.initial_delay_ms as f64) * exp;
        let capped = raw.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Per-invocation stage timeout derived from this policy
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether another retry is allowed after `retry_attempt` attempts
    pub fn allows_retry(&self, retry_attempt: u32) -> bool {
        retry_attempt < self.max_retries
    }
}

impl Default for RetryPolicy {
    /// Conservative process-wide fallback used when the store has no row for
    /// the (service, stage) pair.
    fn default() -> Self {
        Self {
            service_name: "default".to_string(),
            stage_name: None,
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            timeout_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_progression() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(8_000));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new("ai", None, 10, 1_000, 5_000, 2.0, 30_000).unwrap();
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(5_000));
    }

    #[test]
    fn test_allows_retry_boundary() {
        let policy = RetryPolicy::new("ai", None, 3, 1_000, 60_000, 2.0, 30_000).unwrap();
        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
        assert!(!policy.allows_retry(4));
    }

    #[test]
    fn test_validation() {
        assert!(RetryPolicy::new("ai", None, 3, 0, 60_000, 2.0, 30_000).is_err());
        assert!(RetryPolicy::new("ai", None, 3, 1_000, 500, 2.0, 30_000).is_err());
        assert!(RetryPolicy::new("ai", None, 3, 1_000, 60_000, 0.5, 30_000).is_err());
        assert!(RetryPolicy::new("ai", None, 3, 1_000, 60_000, 2.0, 0).is_err());
    }
}
