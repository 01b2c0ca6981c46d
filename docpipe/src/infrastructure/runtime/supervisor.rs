// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Task Supervision Utilities
//!
//! Supervised concurrent task execution: task starts and outcomes are
//! logged, panics surface as typed errors, and callers must await the
//! returned handle. Prevents spawn-and-forget in the orchestrator and the
//! background loops.

use tokio::task::JoinHandle;
use tracing::{debug, error};

use docpipe_domain::PipelineError;

/// Result type alias for application operations
pub type AppResult<T> = Result<T, PipelineError>;

/// Spawns a supervised task with automatic error logging and lifecycle
/// tracking. The returned handle must be awaited.
pub fn spawn_supervised<F, T>(name: &'static str, fut: F) -> JoinHandle<AppResult<T>>
where
    F: std::future::Future<Output = AppResult<T>> + Send + 'static,
    T: Send + 'static,
{
    debug!(task = name, "task starting");

    tokio::spawn(async move {
        let result = fut.await;

        match &result {
            Ok(_) => debug!(task = name, "task completed successfully"),
            Err(e) => error!(task = name, error = ?e, "task failed"),
        }

        result
    })
}

/// Awaits a supervised task handle, converting panics into typed errors so
/// no failure is lost.
pub async fn join_supervised<T>(handle: JoinHandle<AppResult<T>>) -> AppResult<T> {
    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(PipelineError::internal_error(format!(
            "Supervised task panicked: {}",
            e
        ))),
        Err(e) => Err(PipelineError::Cancelled(format!("Supervised task aborted: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_propagates() {
        let handle = spawn_supervised("ok-task", async { Ok::<_, PipelineError>(7) });
        assert_eq!(join_supervised(handle).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_error_propagates() {
        let handle = spawn_supervised("err-task", async {
            Err::<(), _>(PipelineError::internal_error("boom"))
        });
        assert!(join_supervised(handle).await.is_err());
    }

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let handle = spawn_supervised("panic-task", async {
            panic!("unexpected");
            #[allow(unreachable_code)]
            Ok::<(), PipelineError>(())
        });
        let err = join_supervised(handle).await.unwrap_err();
        assert!(matches!(err, PipelineError::InternalError(_)));
    }
}
