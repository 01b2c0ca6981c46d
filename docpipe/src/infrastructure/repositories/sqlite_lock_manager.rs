// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Advisory Lock Manager
//!
//! Lease-table advisory locks. SQLite has no server-side advisory lock
//! functions, so acquisition is an `INSERT OR IGNORE` on a table keyed by
//! the 31-bit derived lock id; release deletes the row when the owner token
//! matches. The lease expiry covers crashed holders: an expired row is
//! replaced during acquisition, which is the table's stand-in for the
//! store releasing locks on session end.
//!
//! The key derivation (`lock_key::advisory_lock_key`) is bit-exact per the
//! external contract, so a Postgres `pg_try_advisory_lock` implementation
//! can drop in behind the same port.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use docpipe_domain::repositories::{AdvisoryLockManager, LockHandle};
use docpipe_domain::services::lock_key::advisory_lock_key;
use docpipe_domain::value_objects::{DocumentId, StageName};
use docpipe_domain::PipelineError;

use super::db_err;

/// Lease-based advisory lock manager over a shared SQLite pool.
pub struct SqliteLockManager {
    pool: SqlitePool,
    lease_secs: i64,
}

impl SqliteLockManager {
    pub fn new(pool: SqlitePool, lease_secs: i64) -> Self {
        Self { pool, lease_secs }
    }
}

#[async_trait]
impl AdvisoryLockManager for SqliteLockManager {
    async fn try_acquire(
        &self,
        document_id: DocumentId,
        stage: StageName,
    ) -> Result<Option<LockHandle>, PipelineError> {
        let key = advisory_lock_key(document_id, stage);
        let owner_token = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(self.lease_secs);

        // Drop any expired lease first; the delete is conditional so a live
        // holder is never displaced.
        sqlx::query("DELETE FROM advisory_locks WHERE lock_key = ? AND expires_at < ?")
            .bind(key as i64)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO advisory_locks (lock_key, owner_token, acquired_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(key as i64)
        .bind(&owner_token)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            debug!(
                document_id = %document_id,
                stage = %stage,
                lock_key = key,
                "Advisory lock held elsewhere"
            );
            return Ok(None);
        }

        Ok(Some(LockHandle { key, owner_token }))
    }

    async fn release(&self, handle: LockHandle) -> Result<(), PipelineError> {
        // Owner token guards against releasing a lease that expired and was
        // re-acquired by another worker.
        sqlx::query("DELETE FROM advisory_locks WHERE lock_key = ? AND owner_token = ?")
            .bind(handle.key as i64)
            .bind(&handle.owner_token)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
