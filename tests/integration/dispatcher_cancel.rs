//! Integration tests for stream cancellation
//!
//! After cancel the consumer sees nothing more and the transport is released promptly.

use std::sync::Arc;
use std::time::Duration;

use gula::agent::mock::{MockConfig, MockSseBuilder, MockTransport};
use gula::agent::{ChatRequest, DomainEvent, StreamDispatcher, StreamMessage};

use super::common::TEST_TIMEOUT;

async fn wait_released(transport: &MockTransport) {
    tokio::time::timeout(TEST_TIMEOUT, async {
        while !transport.was_released() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("transport was not released after cancel");
}

#[tokio::test]
async fn test_cancel_open_stream_releases_transport() {
    let transport = Arc::new(MockTransport::new(
        MockConfig::default()
            .with_chunks(MockSseBuilder::new().started("c1", "gpt").text("a").build())
            .held_open(),
    ));
    let dispatcher = StreamDispatcher::new(transport.clone());
    let mut stream = dispatcher.start(ChatRequest::new("hello"));

    let first = stream.recv().await;
    assert!(matches!(
        first,
        Some(StreamMessage::Event(DomainEvent::Started(_)))
    ));

    stream.cancel();
    assert!(stream.recv().await.is_none());

    tokio::time::timeout(TEST_TIMEOUT, stream.join())
        .await
        .expect("producer did not stop");
    wait_released(&transport).await;
}

#[tokio::test]
async fn test_no_events_after_cancel_even_when_queued() {
    let mut builder = MockSseBuilder::new().started("c1", "gpt");
    for i in 0..50 {
        builder = builder.text(&format!("chunk {i} "));
    }
    let transport = Arc::new(MockTransport::new(
        MockConfig::default().with_chunks(builder.complete(1, 0.0).build()),
    ));
    let dispatcher = StreamDispatcher::new(transport.clone());
    let mut stream = dispatcher.start(ChatRequest::new("hello"));

    assert!(stream.recv().await.is_some());
    // Give the producer time to fill the channel
    tokio::time::sleep(Duration::from_millis(50)).await;

    stream.cancel();
    let mut after_cancel = 0;
    while stream.recv().await.is_some() {
        after_cancel += 1;
    }
    assert_eq!(after_cancel, 0);
    wait_released(&transport).await;
}

#[tokio::test]
async fn test_cancel_before_first_byte() {
    let transport = Arc::new(MockTransport::new(
        MockConfig::default()
            .with_chunks(MockSseBuilder::new().started("c1", "gpt").build())
            .with_delay(Duration::from_secs(30)),
    ));
    let dispatcher = StreamDispatcher::new(transport.clone());
    let mut stream = dispatcher.start(ChatRequest::new("hello"));

    tokio::time::sleep(Duration::from_millis(20)).await;
    stream.cancel();

    assert!(stream.recv().await.is_none());
    tokio::time::timeout(TEST_TIMEOUT, stream.join())
        .await
        .expect("producer did not stop");
    assert!(transport.was_released());
}

#[tokio::test]
async fn test_dropping_handle_releases_transport() {
    let transport = Arc::new(MockTransport::new(
        MockConfig::default()
            .with_chunks(MockSseBuilder::new().started("c1", "gpt").build())
            .held_open(),
    ));
    let dispatcher = StreamDispatcher::new(transport.clone());
    let mut stream = dispatcher.start(ChatRequest::new("hello"));
    assert!(stream.recv().await.is_some());

    drop(stream);
    wait_released(&transport).await;
}

#[tokio::test]
async fn test_mid_stream_failure_is_last_message() {
    let transport = Arc::new(MockTransport::new(
        MockConfig::default()
            .with_chunks(MockSseBuilder::new().started("c1", "gpt").build())
            .failing_mid_stream("connection reset"),
    ));
    let dispatcher = StreamDispatcher::new(transport);
    let mut stream = dispatcher.start(ChatRequest::new("hello"));

    assert!(matches!(stream.recv().await, Some(StreamMessage::Event(_))));
    match stream.recv().await {
        Some(StreamMessage::Failed(err)) => assert!(err.to_string().contains("connection reset")),
        other => panic!("Expected failure, got {:?}", other),
    }
    assert!(stream.recv().await.is_none());
}
