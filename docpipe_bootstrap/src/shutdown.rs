// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shutdown Coordination
//!
//! Manages graceful shutdown across application components. The coordinator
//! hands out clone-able cancellation tokens; workers select on
//! `token.cancelled()` and wind down when shutdown is initiated. A cancelled
//! stage invocation releases its advisory lock and leaves its status
//! resumable, so shutdown mid-request is safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Default grace period for graceful shutdown (in seconds)
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;

/// Cancellation token for signaling shutdown.
///
/// Lightweight clone-able token that can be passed to async tasks.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Creates a detached token that is never cancelled. Useful for tests
    /// and one-shot CLI invocations.
    pub fn never() -> Self {
        Self::new()
    }

    /// Cancel this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Check if cancelled (non-blocking)
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for cancellation (async)
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        // Re-check after registering to avoid a lost wakeup
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Coordinates shutdown across application components.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    grace_period: Duration,
}

impl ShutdownCoordinator {
    /// Creates a coordinator with the given grace period
    pub fn new(grace_period: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            grace_period,
        }
    }

    /// Clones the cancellation token for worker tasks
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Initiates shutdown: cancels the token so workers begin winding down
    pub fn initiate_shutdown(&self) {
        tracing::info!("Shutdown initiated, waiting up to {:?} for workers", self.grace_period);
        self.token.cancel();
    }

    /// Waits for the grace period after shutdown was initiated
    pub async fn wait_for_shutdown(&self) {
        tokio::time::sleep(self.grace_period).await;
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS))
    }
}

/// Installs SIGINT/SIGTERM handlers that initiate shutdown on the
/// coordinator. Returns immediately; the handler task runs for the life of
/// the process.
pub fn install_signal_handlers(coordinator: Arc<ShutdownCoordinator>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => tracing::info!("Received SIGINT"),
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            tracing::info!("Received Ctrl-C");
        }

        coordinator.initiate_shutdown();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_cancellation() {
        let coordinator = ShutdownCoordinator::default();
        let token = coordinator.token();
        assert!(!token.is_cancelled());

        coordinator.initiate_shutdown();
        assert!(token.is_cancelled());

        // cancelled() returns immediately once cancelled
        token.cancelled().await;
    }

    #[tokio::test]
    async fn test_waiters_are_notified() {
        let coordinator = ShutdownCoordinator::default();
        let token = coordinator.token();

        let waiter = tokio::spawn(async move {
            token.cancelled().await;
            true
        });

        tokio::task::yield_now().await;
        coordinator.initiate_shutdown();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_never_token() {
        let token = CancellationToken::never();
        assert!(!token.is_cancelled());
    }
}
