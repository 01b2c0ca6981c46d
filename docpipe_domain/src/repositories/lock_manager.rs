// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Advisory Lock Manager Port
//!
//! Non-blocking per-(document, stage) locks on the relational store, keyed
//! by the deterministic 32-bit derivation in
//! [`crate::services::lock_key`]. Acquisition either succeeds immediately or
//! reports contention; callers never wait. The store guarantees release on
//! session end, and implementations must additionally survive process
//! crashes (lease expiry or session-scoped locks).
//!
//! Callers must release in a guaranteed-release construct: the stage runner
//! funnels every control-flow path, including stage panics, through a single
//! release point. Holding a lock across external-service I/O is acceptable;
//! holding one across a long sleep is not, which is why async retries drop
//! the lock before their timer is armed.

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::value_objects::{DocumentId, StageName};

/// Proof of a held advisory lock. Opaque outside the lock manager that
/// issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub key: u32,
    pub owner_token: String,
}

/// Non-blocking advisory lock interface.
#[async_trait]
pub trait AdvisoryLockManager: Send + Sync {
    /// Attempts to acquire the lock for a (document, stage); `None` when the
    /// lock is held elsewhere
    async fn try_acquire(
        &self,
        document_id: DocumentId,
        stage: StageName,
    ) -> Result<Option<LockHandle>, PipelineError>;

    /// Releases a held lock. Releasing with a stale handle (lease expired
    /// and re-acquired elsewhere) is a no-op, not an error.
    async fn release(&self, handle: LockHandle) -> Result<(), PipelineError>;
}
