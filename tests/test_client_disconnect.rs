use axum::body::Body;
use eyecare_gateway::api::disconnect::DisconnectStream;
use eyecare_gateway::api::streaming::{chat_relay, domain_chat_relay, sse_response};
use eyecare_gateway::core::StreamCancelHandle;
use eyecare_gateway::services::completion_client::{Fragment, FragmentStream};
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upstream that yields one fragment every 10ms and counts how many were pulled.
fn slow_upstream(total: usize, pulled: Arc<AtomicUsize>) -> FragmentStream {
    futures::stream::unfold(0usize, move |i| {
        let pulled = pulled.clone();
        async move {
            if i >= total {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            pulled.fetch_add(1, Ordering::SeqCst);
            Some((Ok(Fragment::text(format!("chunk{}", i))), i + 1))
        }
    })
    .boxed()
}

#[tokio::test]
async fn test_disconnect_stream_triggers_cancel_on_drop() {
    let handle = StreamCancelHandle::new();
    let rx = handle.subscribe();

    let stream = futures::stream::iter(vec![Ok::<_, std::io::Error>(bytes::Bytes::from("test"))]);

    {
        let _disconnect_stream =
            DisconnectStream::new(stream, handle.clone(), "req-1".to_string(), "/chat/completions");

        assert!(!handle.is_cancelled());
        assert!(!*rx.borrow());
    }

    assert!(handle.is_cancelled());
    assert!(*rx.borrow());
}

#[tokio::test]
async fn test_dropping_response_body_stops_upstream_consumption() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let cancel = StreamCancelHandle::new();
    let frames = chat_relay(slow_upstream(100, pulled.clone()), cancel.clone());
    let response = sse_response(frames, cancel.clone(), "/chat/completions");

    let mut body = response.into_body().into_data_stream();
    // Read two frames, then the client goes away.
    for _ in 0..2 {
        let frame = body.next().await.unwrap().unwrap();
        assert!(frame.starts_with(b"data: chunk"));
    }
    drop(body);

    assert!(cancel.is_cancelled());
    assert!(!cancel.is_completed());

    let seen = pulled.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pulled.load(Ordering::SeqCst), seen);
    assert!(seen < 100);
}

#[tokio::test]
async fn test_cancel_while_relay_waits_on_upstream() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let cancel = StreamCancelHandle::new();
    let mut frames = domain_chat_relay(
        slow_upstream(1000, pulled.clone()),
        "resp".to_string(),
        cancel.clone(),
    );

    assert!(frames.next().await.is_some());

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(35)).await;
        canceller.cancel();
    });

    let mut received = 1;
    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        while frames.next().await.is_some() {
            received += 1;
        }
    })
    .await;

    assert!(drained.is_ok(), "relay kept running after cancellation");
    assert!(received < 1000);
    // No terminator after a disconnect.
    assert!(!cancel.is_completed());
}

#[tokio::test]
async fn test_completed_stream_is_not_reported_as_disconnect() {
    let cancel = StreamCancelHandle::new();
    let upstream = futures::stream::iter(vec![Ok(Fragment::finished("bye", "stop"))]).boxed();
    let response = sse_response(chat_relay(upstream, cancel.clone()), cancel.clone(), "/chat/completions");

    let body: Body = response.into_body();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"data: bye\n\ndata: [DONE]\n\n");

    assert!(cancel.is_completed());
    assert!(!cancel.is_cancelled());
}
