// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Alert Channel Adapters
//!
//! The log channel emits composed alerts as structured tracing events; the
//! collecting channel captures dispatches in memory for assertions. Real
//! deployments register chat/email channels behind the same port.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;

use docpipe_domain::entities::AlertDispatch;
use docpipe_domain::services::AlertChannel;
use docpipe_domain::PipelineError;

/// Channel that writes alerts to the process log.
pub struct LogAlertChannel {
    name: String,
}

impl LogAlertChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl AlertChannel for LogAlertChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&self, alert: &AlertDispatch) -> Result<(), PipelineError> {
        warn!(
            channel = %self.name,
            alert_type = %alert.alert_type,
            severity = %alert.severity.as_str(),
            count = alert.count,
            window_start = %alert.window_start,
            window_end = %alert.window_end,
            "Alert dispatched"
        );
        Ok(())
    }
}

/// Channel that records dispatches in memory. Test double.
#[derive(Default)]
pub struct CollectingAlertChannel {
    name: String,
    dispatches: Mutex<Vec<AlertDispatch>>,
    fail: Mutex<bool>,
}

impl CollectingAlertChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dispatches: Mutex::new(Vec::new()),
            fail: Mutex::new(false),
        }
    }

    /// Makes subsequent dispatches fail
    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock() = failing;
    }

    pub fn dispatches(&self) -> Vec<AlertDispatch> {
        self.dispatches.lock().clone()
    }
}

#[async_trait]
impl AlertChannel for CollectingAlertChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&self, alert: &AlertDispatch) -> Result<(), PipelineError> {
        if *self.fail.lock() {
            return Err(PipelineError::external(502, "alert channel unavailable"));
        }
        self.dispatches.lock().push(alert.clone());
        Ok(())
    }
}
