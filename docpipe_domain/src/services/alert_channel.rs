// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Alert Channel Port
//!
//! Outbound dispatch for composed alerts. Channel names in an alert
//! configuration are opaque handles resolved against the registered channel
//! implementations; dispatch failures are recorded on the queue items and
//! never thrown back to alert producers.

use async_trait::async_trait;

use crate::entities::AlertDispatch;
use crate::error::PipelineError;

/// One outbound alert destination.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Handle this channel is addressed by in alert configurations
    fn name(&self) -> &str;

    /// Sends one composed dispatch
    async fn dispatch(&self, alert: &AlertDispatch) -> Result<(), PipelineError>;
}
