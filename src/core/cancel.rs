//! Cancellation signal shared between a streaming response body and its relay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Handle for cancelling a relay when the client goes away.
///
/// The relay marks the handle completed once it has emitted its terminator;
/// after that, [`cancel`](Self::cancel) is a no-op so a normal end of stream is
/// never mistaken for a disconnect.
#[derive(Clone, Debug)]
pub struct StreamCancelHandle {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
    completed: Arc<AtomicBool>,
}

impl StreamCancelHandle {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the stream as completed normally.
    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Signal cancellation unless the stream already completed.
    pub fn cancel(&self) {
        if !self.is_completed() {
            self.sender.send_replace(true);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Get a receiver for use in `select!`.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.receiver.clone()
    }

    /// Resolve once the handle is cancelled.
    ///
    /// Never resolves if the stream completes without cancellation.
    pub async fn cancelled(&self) {
        let mut receiver = self.subscribe();
        // The sender lives inside `self`, so `wait_for` cannot observe a closed channel here.
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for StreamCancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_propagates_to_subscribers() {
        let handle = StreamCancelHandle::new();
        let mut rx = handle.subscribe();

        assert!(!handle.is_cancelled());
        handle.cancel();

        assert!(handle.is_cancelled());
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_cancel_after_completion_is_ignored() {
        let handle = StreamCancelHandle::new();
        handle.mark_completed();
        handle.cancel();

        assert!(handle.is_completed());
        assert!(!handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves() {
        let handle = StreamCancelHandle::new();
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("cancelled() should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_future_pending_without_cancel() {
        let handle = StreamCancelHandle::new();
        let result = tokio::time::timeout(Duration::from_millis(20), handle.cancelled()).await;
        assert!(result.is_err());
    }
}
