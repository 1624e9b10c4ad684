use crate::core::StreamCancelHandle;
use axum::body::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A stream wrapper that triggers a cancellation handle when dropped.
/// This allows detecting when the client disconnects (stops consuming the stream).
pub struct DisconnectStream<S> {
    stream: S,
    cancel_handle: StreamCancelHandle,
    request_id: String,
    endpoint: &'static str,
}

impl<S> DisconnectStream<S> {
    pub fn new(
        stream: S,
        cancel_handle: StreamCancelHandle,
        request_id: String,
        endpoint: &'static str,
    ) -> Self {
        Self {
            stream,
            cancel_handle,
            request_id,
            endpoint,
        }
    }
}

impl<S, E> Stream for DisconnectStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

impl<S> Drop for DisconnectStream<S> {
    fn drop(&mut self) {
        // A relay that emitted its terminator has marked the handle completed,
        // which turns `cancel` into a no-op.
        if !self.cancel_handle.is_completed() {
            tracing::info!(
                request_id = %self.request_id,
                endpoint = self.endpoint,
                "Client disconnected before the stream completed"
            );
        }
        self.cancel_handle.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::{self, StreamExt};
    use std::convert::Infallible;

    fn frames() -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin {
        stream::iter(vec![Ok(Bytes::from("a")), Ok(Bytes::from("b"))])
    }

    #[tokio::test]
    async fn test_drop_before_completion_cancels() {
        let handle = StreamCancelHandle::new();
        let mut wrapped = DisconnectStream::new(frames(), handle.clone(), "req".to_string(), "/t");
        assert_eq!(wrapped.next().await.unwrap().unwrap(), Bytes::from("a"));
        drop(wrapped);
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_drop_after_completion_does_not_cancel() {
        let handle = StreamCancelHandle::new();
        let mut wrapped = DisconnectStream::new(frames(), handle.clone(), "req".to_string(), "/t");
        while wrapped.next().await.is_some() {}
        handle.mark_completed();
        drop(wrapped);
        assert!(!handle.is_cancelled());
    }
}
