// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite repository implementations of the domain persistence ports.

pub mod schema;
pub mod sqlite_alert_repository;
pub mod sqlite_baseline_repository;
pub mod sqlite_document_repository;
pub mod sqlite_error_repository;
pub mod sqlite_lock_manager;
pub mod sqlite_marker_repository;
pub mod sqlite_policy_repository;

pub use sqlite_alert_repository::SqliteAlertRepository;
pub use sqlite_baseline_repository::SqliteBaselineRepository;
pub use sqlite_document_repository::SqliteDocumentRepository;
pub use sqlite_error_repository::SqliteErrorRepository;
pub use sqlite_lock_manager::SqliteLockManager;
pub use sqlite_marker_repository::SqliteMarkerRepository;
pub use sqlite_policy_repository::SqlitePolicyRepository;

use docpipe_domain::PipelineError;

/// Shared sqlx → domain error conversion for repository code.
pub(crate) fn db_err(e: sqlx::Error) -> PipelineError {
    PipelineError::database_error(e.to_string())
}
