// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Settings
//!
//! Process-level settings loaded from `docpipe.toml` with `DOCPIPE_*`
//! environment overrides. These are distinct from the store-resident
//! configuration rows (retry policies, alert configurations), which flow
//! through the TTL config cache instead.

use std::path::PathBuf;

use config::{Config, Environment as EnvSource, File};
use serde::Deserialize;

use docpipe_domain::entities::Environment;
use docpipe_domain::PipelineError;

/// Immutable settings for one process.
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    /// SQLite connection URL, e.g. `sqlite://./docpipe.db`
    pub database_url: String,
    /// Deployment environment; baseline storage is rejected in production
    pub environment: Environment,
    /// Sibling-stage parallelism bound within one request
    pub max_stages_parallel_per_request: usize,
    /// Outer document parallelism bound for batch mode
    pub max_documents_parallel: usize,
    /// Alert aggregator tick period, seconds (must be <= 60)
    pub aggregator_period_secs: u64,
    /// TTL for the store-resident config cache, seconds (must be <= 60)
    pub config_cache_ttl_secs: u64,
    /// Alert queue retention before archival, hours
    pub alert_retention_hours: i64,
    /// Terminal pipeline-error retention before purge, hours
    pub error_retention_hours: i64,
    /// Horizon after which stale `in_progress` statuses are swept to pending
    pub stale_in_progress_minutes: i64,
    /// Advisory lock lease duration, seconds
    pub lock_lease_secs: i64,
    /// Root directory for per-request filesystem staging
    pub staging_root: PathBuf,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./docpipe.db".to_string(),
            environment: Environment::Staging,
            max_stages_parallel_per_request: 4,
            max_documents_parallel: 2,
            aggregator_period_secs: 60,
            config_cache_ttl_secs: 60,
            alert_retention_hours: 24,
            error_retention_hours: 168,
            stale_in_progress_minutes: 30,
            lock_lease_secs: 300,
            staging_root: PathBuf::from("./staging"),
        }
    }
}

impl AppSettings {
    /// Loads settings from `docpipe.toml` (optional) and `DOCPIPE_*`
    /// environment variables, on top of the defaults.
    pub fn load() -> Result<Self, PipelineError> {
        Self::load_from(None)
    }

    /// Loads settings with an explicit config file path.
    pub fn load_from(path: Option<&str>) -> Result<Self, PipelineError> {
        let defaults = AppSettings::default();

        let mut builder = Config::builder()
            .set_default("database_url", defaults.database_url.clone())
            .and_then(|b| b.set_default("environment", "staging"))
            .and_then(|b| {
                b.set_default(
                    "max_stages_parallel_per_request",
                    defaults.max_stages_parallel_per_request as i64,
                )
            })
            .and_then(|b| b.set_default("max_documents_parallel", defaults.max_documents_parallel as i64))
            .and_then(|b| b.set_default("aggregator_period_secs", defaults.aggregator_period_secs as i64))
            .and_then(|b| b.set_default("config_cache_ttl_secs", defaults.config_cache_ttl_secs as i64))
            .and_then(|b| b.set_default("alert_retention_hours", defaults.alert_retention_hours))
            .and_then(|b| b.set_default("error_retention_hours", defaults.error_retention_hours))
            .and_then(|b| b.set_default("stale_in_progress_minutes", defaults.stale_in_progress_minutes))
            .and_then(|b| b.set_default("lock_lease_secs", defaults.lock_lease_secs))
            .and_then(|b| b.set_default("staging_root", "./staging"))
            .map_err(|e| PipelineError::invalid_config(format!("Failed to seed defaults: {}", e)))?;

        builder = match path {
            Some(p) => builder.add_source(File::with_name(p)),
            None => builder.add_source(File::with_name("docpipe").required(false)),
        };

        let settings: AppSettings = builder
            .add_source(EnvSource::with_prefix("DOCPIPE"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PipelineError::invalid_config(format!("Failed to load settings: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.aggregator_period_secs == 0 || self.aggregator_period_secs > 60 {
            return Err(PipelineError::invalid_config(
                "aggregator_period_secs must be in 1..=60",
            ));
        }
        if self.config_cache_ttl_secs > 60 {
            return Err(PipelineError::invalid_config("config_cache_ttl_secs must be <= 60"));
        }
        if self.max_stages_parallel_per_request == 0 || self.max_documents_parallel == 0 {
            return Err(PipelineError::invalid_config("parallelism bounds must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = AppSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.max_stages_parallel_per_request, 4);
        assert_eq!(settings.max_documents_parallel, 2);
        assert_eq!(settings.environment, Environment::Staging);
    }

    #[test]
    fn test_aggregator_period_bound() {
        let mut settings = AppSettings::default();
        settings.aggregator_period_secs = 120;
        assert!(settings.validate().is_err());
        settings.aggregator_period_secs = 0;
        assert!(settings.validate().is_err());
    }
}
