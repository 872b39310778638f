//! Server lifecycle: state transitions, in-flight work tracking and shutdown.
//!
//! The server moves through `Starting → Serving → ShuttingDown → Stopped`.
//! Every tool invocation runs through [`Lifecycle::run`], so shutdown can
//! cancel what is in flight and wait a bounded grace period for it to settle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Observable server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Serving,
    ShuttingDown,
    Stopped,
}

/// How draining in-flight work ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Everything settled within the grace period.
    Clean,
    /// The grace period elapsed with work still outstanding.
    Forced,
}

/// Process-wide lifecycle handle. Cheap to clone.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<LifecycleInner>,
}

struct LifecycleInner {
    state: watch::Sender<ServerState>,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Lifecycle {
    /// Create a lifecycle in the `Starting` state.
    pub fn new() -> Self {
        let (state, _) = watch::channel(ServerState::Starting);
        Self {
            inner: Arc::new(LifecycleInner {
                state,
                token: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> ServerState {
        *self.inner.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.inner.state.subscribe()
    }

    /// `Starting → Serving`. Ignored in any other state.
    pub fn mark_serving(&self) {
        let changed = self.inner.state.send_if_modified(|state| {
            if *state == ServerState::Starting {
                *state = ServerState::Serving;
                true
            } else {
                false
            }
        });
        if changed {
            info!("Server state: serving");
        }
    }

    /// Enter `ShuttingDown` and cancel all in-flight operations. Idempotent.
    pub fn begin_shutdown(&self) {
        let changed = self.inner.state.send_if_modified(|state| match state {
            ServerState::Starting | ServerState::Serving => {
                *state = ServerState::ShuttingDown;
                true
            }
            _ => false,
        });
        if changed {
            info!(
                in_flight = self.in_flight(),
                "Server state: shutting down, cancelling in-flight operations"
            );
        }
        self.inner.token.cancel();
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Future that resolves once shutdown has been requested.
    pub fn shutdown_requested(&self) -> WaitForCancellationFutureOwned {
        self.inner.token.clone().cancelled_owned()
    }

    /// Number of tracked operations still running.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Tracker shared with the blocking worker pool.
    pub fn tracker(&self) -> &TaskTracker {
        &self.inner.tracker
    }

    /// Run `fut` as a tracked, cancellable operation.
    ///
    /// Returns `None` when shutdown cancels it (or had already begun).
    pub async fn run<F, T>(&self, fut: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        if self.is_shutting_down() {
            return None;
        }

        let token = self.inner.token.clone();
        self.inner
            .tracker
            .track_future(async move {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    out = fut => Some(out),
                }
            })
            .await
    }

    /// Cancel outstanding work and wait up to `grace` for it to finish.
    pub async fn drain(&self, grace: Duration) -> ShutdownOutcome {
        self.begin_shutdown();
        self.inner.tracker.close();

        let outcome = match tokio::time::timeout(grace, self.inner.tracker.wait()).await {
            Ok(()) => {
                info!("All in-flight operations settled");
                ShutdownOutcome::Clean
            }
            Err(_) => {
                warn!(
                    remaining = self.in_flight(),
                    "Timeout waiting for operations to cancel, forcing exit"
                );
                ShutdownOutcome::Forced
            }
        };

        self.inner.state.send_replace(ServerState::Stopped);
        info!("Server state: stopped");
        outcome
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for a termination signal (SIGTERM or SIGINT, Ctrl+C elsewhere).
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to register signal handlers ({}), using Ctrl+C only", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
                info!("Received Ctrl+C");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_transitions() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), ServerState::Starting);

        lifecycle.mark_serving();
        assert_eq!(lifecycle.state(), ServerState::Serving);

        lifecycle.begin_shutdown();
        assert_eq!(lifecycle.state(), ServerState::ShuttingDown);

        // No going back once shutdown started
        lifecycle.mark_serving();
        assert_eq!(lifecycle.state(), ServerState::ShuttingDown);

        let outcome = lifecycle.drain(Duration::from_millis(50)).await;
        assert_eq!(outcome, ShutdownOutcome::Clean);
        assert_eq!(lifecycle.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_run_completes_while_serving() {
        let lifecycle = Lifecycle::new();
        lifecycle.mark_serving();
        assert_eq!(lifecycle.run(async { 42 }).await, Some(42));
        assert_eq!(lifecycle.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight() {
        let lifecycle = Lifecycle::new();
        lifecycle.mark_serving();

        let worker = lifecycle.clone();
        let handle = tokio::spawn(async move {
            worker
                .run(async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    "finished"
                })
                .await
        });

        // Let the operation get tracked
        while lifecycle.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let outcome = lifecycle.drain(Duration::from_secs(1)).await;
        assert_eq!(outcome, ShutdownOutcome::Clean);
        assert_eq!(handle.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_run_refused_after_shutdown() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin_shutdown();
        assert_eq!(lifecycle.run(async { 1 }).await, None);
    }

    #[tokio::test]
    async fn test_drain_reports_forced_for_stuck_blocking_work() {
        let lifecycle = Lifecycle::new();
        lifecycle
            .tracker()
            .spawn_blocking(|| std::thread::sleep(Duration::from_millis(300)));

        let outcome = lifecycle.drain(Duration::from_millis(20)).await;
        assert_eq!(outcome, ShutdownOutcome::Forced);
    }

    #[tokio::test]
    async fn test_subscribers_observe_shutdown() {
        let lifecycle = Lifecycle::new();
        let mut rx = lifecycle.subscribe();
        lifecycle.begin_shutdown();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ServerState::ShuttingDown);
    }
}
