//! Graceful Shutdown
//!
//! Coordinates shutdown across terminal and live connections.
//!
//! ## Usage
//!
//! ```ignore
//! let shutdown = ShutdownController::new(Duration::from_secs(10));
//!
//! // Each connection holds a guard and watches the token
//! let guard = shutdown.track();
//! tokio::select! { _ = guard.cancelled() => {}, _ = serve_connection() => {} }
//!
//! // On SIGTERM
//! shutdown.shutdown().await;
//! ```

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default time connections get to finish their cleanup
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shutdown phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownPhase {
    /// Normal operation
    Running,
    /// Connections told to close, waiting for their cleanup
    Draining,
    /// Nothing left to wait for
    Terminated,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Draining => write!(f, "Draining"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

struct Inner {
    cancel_token: CancellationToken,
    phase: AtomicU8,
    connections: AtomicUsize,
    idle: Notify,
    timeout: Duration,
}

/// Shutdown controller shared by the server and its connections
#[derive(Clone)]
pub struct ShutdownController {
    inner: Arc<Inner>,
}

impl ShutdownController {
    /// Controller that waits up to `timeout` for connections to drain
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancel_token: CancellationToken::new(),
                phase: AtomicU8::new(ShutdownPhase::Running as u8),
                connections: AtomicUsize::new(0),
                idle: Notify::new(),
                timeout,
            }),
        }
    }

    /// Token cancelled when shutdown begins
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.inner.cancel_token.child_token()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        match self.inner.phase.load(Ordering::SeqCst) {
            0 => ShutdownPhase::Running,
            1 => ShutdownPhase::Draining,
            _ => ShutdownPhase::Terminated,
        }
    }

    /// Whether new connections should be refused
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.phase() != ShutdownPhase::Running
    }

    /// Track a connection until the guard drops
    #[must_use]
    pub fn track(&self) -> ConnectionGuard {
        self.inner.connections.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            inner: self.inner.clone(),
        }
    }

    /// Connections still open
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        self.inner.phase.store(phase as u8, Ordering::SeqCst);
        info!(phase = %phase, "Shutdown phase changed");
    }

    /// Cancel every connection and wait for them to finish
    ///
    /// Returns how many connections were still open at the deadline.
    pub async fn shutdown(&self) -> usize {
        if self
            .inner
            .phase
            .compare_exchange(
                ShutdownPhase::Running as u8,
                ShutdownPhase::Draining as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            debug!("Shutdown already initiated");
            return self.active_connections();
        }

        info!(
            connections = self.active_connections(),
            "Initiating graceful shutdown..."
        );
        self.inner.cancel_token.cancel();

        let deadline = Instant::now() + self.inner.timeout;
        loop {
            let idle = self.inner.idle.notified();
            let active = self.active_connections();
            if active == 0 {
                info!("All connections closed");
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    connections = active,
                    timeout_secs = self.inner.timeout.as_secs(),
                    "Shutdown timeout exceeded"
                );
                self.set_phase(ShutdownPhase::Terminated);
                return active;
            }
            debug!(connections = active, "Waiting for connections to close...");
            let _ = tokio::time::timeout(remaining, idle).await;
        }

        self.set_phase(ShutdownPhase::Terminated);
        0
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new(DEFAULT_DRAIN_TIMEOUT)
    }
}

/// Keeps a connection counted until dropped
pub struct ConnectionGuard {
    inner: Arc<Inner>,
}

impl ConnectionGuard {
    /// Resolves when shutdown begins
    pub async fn cancelled(&self) {
        self.inner.cancel_token.cancelled().await;
    }

    /// Whether shutdown has begun
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel_token.is_cancelled()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.inner.connections.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

/// Wait for a signal, then cancel connections without waiting for them
///
/// Used as the HTTP server's graceful shutdown future; draining happens
/// after the listener has stopped.
pub async fn shutdown_signal_with_controller(controller: ShutdownController) {
    wait_for_shutdown_signal().await;
    controller.inner.cancel_token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_phases() {
        let controller = ShutdownController::default();
        assert_eq!(controller.phase(), ShutdownPhase::Running);
        assert!(!controller.is_shutting_down());

        assert_eq!(controller.shutdown().await, 0);

        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
        assert!(controller.is_shutting_down());
        assert!(controller.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_connection_guard_counts() {
        let controller = ShutdownController::default();
        {
            let _first = controller.track();
            let _second = controller.track();
            assert_eq!(controller.active_connections(), 2);
        }
        assert_eq!(controller.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_connections() {
        let controller = ShutdownController::new(Duration::from_secs(5));
        let guard = controller.track();

        let task = tokio::spawn(async move {
            guard.cancelled().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });

        assert_eq!(controller.shutdown().await, 0);
        task.await.unwrap();
        assert_eq!(controller.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_timeout_reports_stragglers() {
        let controller = ShutdownController::new(Duration::from_millis(50));
        let _stuck = controller.track();

        assert_eq!(controller.shutdown().await, 1);
        assert_eq!(controller.phase(), ShutdownPhase::Terminated);
    }

    #[tokio::test]
    async fn test_double_shutdown() {
        let controller = ShutdownController::default();
        let other = controller.clone();

        let (first, second) = tokio::join!(controller.shutdown(), other.shutdown());
        assert_eq!(first + second, 0);
        assert!(controller.is_shutting_down());
    }
}
