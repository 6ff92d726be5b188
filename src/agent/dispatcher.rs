//! Background producer for one chat stream.
//!
//! [`StreamDispatcher::start`] spawns a task that opens the transport, reads frames, decodes them
//! and pushes the results onto a bounded channel. The returned [`StreamHandle`] is the consumer
//! side: it yields messages in receipt order and owns cancellation of the producer.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent::error::AgentError;
use crate::agent::events::{decode, DomainEvent};
use crate::agent::sse::FrameStream;
use crate::agent::transport::{ChatRequest, ChatTransport};

/// Capacity of the producer to consumer channel. A full channel blocks the producer.
pub const CHANNEL_CAPACITY: usize = 100;

/// Item delivered to the consumer.
#[derive(Debug)]
pub enum StreamMessage {
    Event(DomainEvent),
    /// Transport or decode failure. Always the last message of a stream.
    Failed(AgentError),
}

/// Starts chat streams over a shared transport.
#[derive(Clone)]
pub struct StreamDispatcher {
    transport: Arc<dyn ChatTransport>,
}

impl StreamDispatcher {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn ChatTransport> {
        &self.transport
    }

    /// Open a stream for `request` on a background task.
    pub fn start(&self, request: ChatRequest) -> StreamHandle {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let token = CancellationToken::new();
        let task = tokio::spawn(produce(
            Arc::clone(&self.transport),
            request,
            tx,
            token.clone(),
        ));

        StreamHandle {
            events: rx,
            token,
            task: Some(task),
        }
    }
}

/// Consumer side of an active stream.
///
/// Dropping the handle cancels the producer.
pub struct StreamHandle {
    events: mpsc::Receiver<StreamMessage>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Next message, or `None` once the stream ended or was cancelled.
    ///
    /// After [`cancel`](Self::cancel) this never yields again, even if messages were queued.
    pub async fn recv(&mut self) -> Option<StreamMessage> {
        if self.token.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            message = self.events.recv() => message,
        }
    }

    /// Stop the producer and discard anything still queued.
    pub fn cancel(&mut self) {
        if !self.token.is_cancelled() {
            tracing::debug!("Cancelling chat stream");
        }
        self.token.cancel();
        self.events.close();
    }

    /// Stop listening after a terminal event. The transport is released the same way as on
    /// cancellation.
    pub fn finish(&mut self) {
        self.token.cancel();
        self.events.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the producer task to exit, which implies the transport was dropped.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "Stream producer task failed");
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn produce(
    transport: Arc<dyn ChatTransport>,
    request: ChatRequest,
    tx: mpsc::Sender<StreamMessage>,
    token: CancellationToken,
) {
    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => {
            tracing::debug!("Stream cancelled before the connection opened");
            return;
        }
        opened = transport.open_stream(&request) => opened,
    };

    let bytes = match opened {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to open chat stream");
            let _ = tx.send(StreamMessage::Failed(err)).await;
            return;
        }
    };

    let mut frames = FrameStream::new(bytes);
    let mut delivered = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = frames.next() => next,
        };

        let message = match next {
            None => break,
            Some(Err(err)) => {
                tracing::warn!(error = %err, "Chat stream read failed");
                StreamMessage::Failed(err)
            }
            Some(Ok(frame)) => match decode(&frame) {
                Ok(Some(event)) => StreamMessage::Event(event),
                Ok(None) => continue,
                Err(err) => {
                    tracing::error!(error = %err, "Aborting stream on malformed event");
                    StreamMessage::Failed(err)
                }
            },
        };

        let last = match &message {
            StreamMessage::Failed(_) => true,
            StreamMessage::Event(event) => event.is_terminal(),
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            sent = tx.send(message) => {
                if sent.is_err() {
                    break;
                }
            }
        }
        delivered += 1;

        if last {
            break;
        }
    }

    if token.is_cancelled() && frames.has_partial_frame() {
        tracing::debug!("Discarding partial frame at cancellation");
    }
    drop(frames);
    tracing::debug!(delivered, cancelled = token.is_cancelled(), "Chat stream released");
}
