//! Server-Sent Events framing.
//!
//! [`FrameReader`] turns arbitrary byte chunks into [`RawFrame`]s; [`FrameStream`] wraps a byte
//! stream so frames can be pulled lazily. Payloads are not interpreted here, see
//! [`crate::agent::events::decode`].

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

use crate::agent::error::AgentError;

/// One SSE frame as read off the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
    pub event_type: String,
    pub data_lines: Vec<String>,
    pub id: String,
}

impl RawFrame {
    /// Data lines joined with `\n`.
    pub fn data(&self) -> String {
        self.data_lines.join("\n")
    }

    fn has_content(&self) -> bool {
        !self.event_type.is_empty() || !self.data_lines.is_empty()
    }
}

/// Incremental SSE frame parser.
///
/// Bytes are buffered until a full line (`\n`, optionally preceded by `\r`) is available, so
/// chunk boundaries may fall anywhere, including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no newline
    scanned: usize,
    current: RawFrame,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and drain every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawFrame> {
        self.buffer.extend_from_slice(chunk);

        let buffer = std::mem::take(&mut self.buffer);
        let mut frames = Vec::new();
        let mut start = 0;
        let mut search_from = self.scanned;

        while let Some(offset) = buffer[search_from..].iter().position(|b| *b == b'\n') {
            let end = search_from + offset;
            let mut line = &buffer[start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            if let Some(frame) = self.push_line(&String::from_utf8_lossy(line)) {
                frames.push(frame);
            }
            start = end + 1;
            search_from = start;
        }

        self.buffer = buffer;
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        frames
    }

    /// Signal end of stream. Returns the frame still being accumulated, if any.
    pub fn finish(&mut self) -> Option<RawFrame> {
        self.scanned = 0;
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let mut line = String::from_utf8_lossy(&rest).into_owned();
            if line.ends_with('\r') {
                line.pop();
            }
            if let Some(frame) = self.push_line(&line) {
                return Some(frame);
            }
        }

        if self.current.has_content() {
            Some(std::mem::take(&mut self.current))
        } else {
            self.current = RawFrame::default();
            None
        }
    }

    /// Whether a partially received line or frame is buffered.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty() || self.current.has_content()
    }

    /// Parse a complete buffer in one shot.
    pub fn parse_all(input: &[u8]) -> Vec<RawFrame> {
        let mut reader = Self::new();
        let mut frames = reader.feed(input);
        frames.extend(reader.finish());
        frames
    }

    fn push_line(&mut self, line: &str) -> Option<RawFrame> {
        if line.is_empty() {
            if self.current.has_content() {
                return Some(std::mem::take(&mut self.current));
            }
            return None;
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.current.event_type = value.to_string(),
            "data" => self.current.data_lines.push(value.to_string()),
            "id" => self.current.id = value.to_string(),
            _ => {}
        }
        None
    }
}

/// Lazy frame sequence over a byte stream.
///
/// Ends when the inner stream ends (after emitting a trailing frame, if any). After yielding an
/// error it yields nothing further.
pub struct FrameStream<S> {
    inner: S,
    reader: FrameReader,
    ready: VecDeque<RawFrame>,
    done: bool,
}

impl<S> FrameStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            reader: FrameReader::new(),
            ready: VecDeque::new(),
            done: false,
        }
    }

    /// Whether bytes of an incomplete frame are still held.
    pub fn has_partial_frame(&self) -> bool {
        self.reader.has_pending()
    }
}

impl<S> Stream for FrameStream<S>
where
    S: Stream<Item = Result<Bytes, AgentError>> + Unpin,
{
    type Item = Result<RawFrame, AgentError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if self.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    let frames = self.reader.feed(&chunk);
                    self.ready.extend(frames);
                }
                Poll::Ready(Some(Err(err))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    if let Some(frame) = self.reader.finish() {
                        self.ready.push_back(frame);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
