//! Graceful shutdown coordination via `CancellationToken`.
//!
//! Every long-lived task (WebSocket sessions, ring timers, the accept loop)
//! holds a child of the coordinator's token and winds down when it fires.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Coordinates graceful shutdown across all server tasks.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a coordinator with the default 30-second drain timeout.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a coordinator with a custom drain timeout.
    pub fn with_timeout(drain_timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            drain_timeout,
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token and wait for the given tasks to drain.
    ///
    /// Tasks still running after the drain timeout are left behind with a
    /// warning; the process is about to exit anyway.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>) {
        self.shutdown();
        info!(
            task_count = handles.len(),
            timeout_secs = self.drain_timeout.as_secs(),
            "waiting for tasks to complete"
        );

        let drain = futures::future::join_all(handles);
        if tokio::time::timeout(self.drain_timeout, drain).await.is_err() {
            warn!(
                "shutdown timed out after {:?}, some tasks may still be running",
                self.drain_timeout
            );
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
