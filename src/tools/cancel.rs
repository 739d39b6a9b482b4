//! Cancellation of a single in-flight execution.

use tokio::sync::watch;

/// Handle the caller keeps to stop one execution early.
///
/// Clones share the same signal. Cancelling before the child has spawned
/// means it is terminated as soon as it starts.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only ends by observing `true`.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
