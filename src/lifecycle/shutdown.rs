//! Shutdown coordination.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio::sync::broadcast;

/// Why the backend is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT, SIGTERM or a caller-supplied stop signal.
    Signal,
    /// The restart schedule fired.
    Restart,
    /// A listener failed to bind after others were already serving.
    StartupAborted,
    /// Stopped through a [`Shutdown`] handle or [`Running::stop`](crate::lifecycle::Running::stop).
    Requested,
}

impl ShutdownReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ShutdownReason::Signal => "signal",
            ShutdownReason::Restart => "restart",
            ShutdownReason::StartupAborted => "startup_aborted",
            ShutdownReason::Requested => "requested",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinator for graceful shutdown.
///
/// Listeners, maintenance tasks and companions each hold a receiver. Only the
/// first `trigger` is broadcast; its reason sticks and later triggers are
/// ignored.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    reason: Arc<OnceLock<ShutdownReason>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            reason: Arc::new(OnceLock::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Start shutting down. Returns `false` when shutdown was already underway.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        if self.reason.set(reason).is_err() {
            tracing::debug!(target: "backend", reason = %reason, "Shutdown already triggered");
            return false;
        }
        tracing::info!(target: "backend", reason = %reason, "Shutdown triggered");
        let _ = self.tx.send(());
        true
    }

    /// The reason of the first trigger, if any.
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    pub fn is_triggered(&self) -> bool {
        self.reason.get().is_some()
    }

    /// Resolve once shutdown is triggered, including when that happened
    /// before the call.
    pub async fn triggered(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        if let Some(reason) = self.reason() {
            return reason;
        }
        // Subscribed before the check, so a concurrent trigger still arrives.
        let _ = rx.recv().await;
        self.reason().unwrap_or(ShutdownReason::Requested)
    }

    /// Number of tasks still holding a receiver.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
