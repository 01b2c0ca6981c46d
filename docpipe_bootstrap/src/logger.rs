// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Logger
//!
//! Tracing setup for the bootstrap phase plus a minimal logging abstraction
//! usable before the subscriber is installed.
//!
//! The application logs through `tracing` with structured fields; every log
//! line emitted by the core carries the most specific correlation id in
//! scope. This module only wires the subscriber; it owns no log content.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise from the provided
/// default directive (e.g. `"docpipe=info"`). Safe to call once per process;
/// later calls are ignored.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Bootstrap logging abstraction.
///
/// Provides a simple logging interface for bootstrap operations, testable
/// with a no-op implementation.
pub trait BootstrapLogger: Send + Sync {
    /// Log a fatal error during bootstrap
    fn error(&self, message: &str);

    /// Log a non-fatal issue
    fn warn(&self, message: &str);

    /// Log normal bootstrap progress
    fn info(&self, message: &str);
}

/// Console logger implementation routing through tracing.
pub struct ConsoleLogger {
    prefix: String,
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self::with_prefix("bootstrap")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl BootstrapLogger for ConsoleLogger {
    fn error(&self, message: &str) {
        tracing::error!(target: "bootstrap", "[{}] {}", self.prefix, message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "bootstrap", "[{}] {}", self.prefix, message);
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "bootstrap", "[{}] {}", self.prefix, message);
    }
}

/// No-op logger for tests.
#[derive(Default)]
pub struct NoopLogger;

impl BootstrapLogger for NoopLogger {
    fn error(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing("docpipe=info");
        init_tracing("docpipe=debug");
    }

    #[test]
    fn test_console_logger_does_not_panic() {
        let logger = ConsoleLogger::with_prefix("test");
        logger.info("starting");
        logger.warn("slow");
        logger.error("failed");
    }
}
