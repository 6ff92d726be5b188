//! Property tests for SSE framing
//!
//! However a body is split into chunks, the same frames come out in the same order.

use bytes::Bytes;
use futures::StreamExt;
use gula::agent::{AgentError, FrameReader, FrameStream, RawFrame};
use proptest::prelude::*;

fn frame_strategy() -> impl Strategy<Value = RawFrame> {
    (
        "[a-z_]{1,12}",
        prop::collection::vec("[^\r\n]{0,24}", 1..4),
    )
        .prop_map(|(event_type, data_lines)| RawFrame {
            event_type,
            data_lines,
            id: String::new(),
        })
}

fn encode(frames: &[RawFrame], crlf: bool) -> Vec<u8> {
    let eol = if crlf { "\r\n" } else { "\n" };
    let mut body = String::new();
    for frame in frames {
        body.push_str(&format!("event: {}{eol}", frame.event_type));
        for line in &frame.data_lines {
            body.push_str(&format!("data: {line}{eol}"));
        }
        body.push_str(eol);
    }
    body.into_bytes()
}

/// Split `body` at the given positions (taken modulo its length).
fn split(body: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut points: Vec<usize> = cuts
        .iter()
        .map(|cut| if body.is_empty() { 0 } else { cut % body.len() })
        .collect();
    points.sort_unstable();
    points.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for point in points {
        chunks.push(body[start..point].to_vec());
        start = point;
    }
    chunks.push(body[start..].to_vec());
    chunks
}

proptest! {
    #[test]
    fn frames_survive_any_chunking(
        frames in prop::collection::vec(frame_strategy(), 0..12),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
        crlf in any::<bool>(),
    ) {
        let body = encode(&frames, crlf);

        let mut reader = FrameReader::new();
        let mut parsed = Vec::new();
        for chunk in split(&body, &cuts) {
            parsed.extend(reader.feed(&chunk));
        }
        parsed.extend(reader.finish());

        prop_assert_eq!(parsed, frames);
    }
}

/// The async wrapper yields the same frames as the one-shot parser
#[tokio::test]
async fn test_frame_stream_matches_parse_all() {
    let body = b"event: started\ndata: {\"conversation_id\":\"c1\"}\n\n: keep-alive\n\nevent: text\ndata: {\"content\":\"h\xc3\xa9\"}\n\nevent: complete\ndata: {}";
    let expected = FrameReader::parse_all(body);
    assert_eq!(expected.len(), 3);

    let chunks: Vec<Result<Bytes, AgentError>> = body
        .chunks(3)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    let frames: Vec<RawFrame> = FrameStream::new(futures::stream::iter(chunks))
        .map(|frame| frame.unwrap())
        .collect()
        .await;

    assert_eq!(frames, expected);
    assert_eq!(frames[1].data(), "{\"content\":\"hé\"}");
}
