use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use pretty_assertions::assert_eq;
use storyreel_engine::{pump_event_stream, ApiError, EventStreamDecoder, StreamEnd};
use tokio_util::sync::CancellationToken;

const SAMPLE: &str = "data: Hello\n\ndata: \\n\n\ndata: [DONE]\n\n";

fn decode_in_chunks(input: &[u8], chunk_len: usize) -> String {
    let mut decoder = EventStreamDecoder::new();
    let mut out = String::new();
    for chunk in input.chunks(chunk_len) {
        out.push_str(&decoder.feed(chunk));
    }
    out.push_str(&decoder.finish());
    out
}

#[test]
fn empty_then_sentinel_collapse_into_one_break() {
    assert_eq!(decode_in_chunks(SAMPLE.as_bytes(), SAMPLE.len()), "Hello\n");
}

#[test]
fn result_is_independent_of_chunk_boundaries() {
    let whole = decode_in_chunks(SAMPLE.as_bytes(), SAMPLE.len());
    for chunk_len in 1..SAMPLE.len() {
        assert_eq!(decode_in_chunks(SAMPLE.as_bytes(), chunk_len), whole, "chunk_len={chunk_len}");
    }
}

#[test]
fn split_multibyte_characters_are_reassembled() {
    let input = "data: 雨が降った\n\ndata: café ☕\n\n".as_bytes();
    let whole = decode_in_chunks(input, input.len());
    assert_eq!(whole, "雨が降ったcafé ☕");
    for chunk_len in 1..8 {
        assert_eq!(decode_in_chunks(input, chunk_len), whole, "chunk_len={chunk_len}");
    }

    // Every two-way split, including inside each character.
    for split in 1..input.len() {
        let mut decoder = EventStreamDecoder::new();
        let mut out = decoder.feed(&input[..split]);
        out.push_str(&decoder.feed(&input[split..]));
        out.push_str(&decoder.finish());
        assert_eq!(out, whole, "split={split}");
    }
}

#[test]
fn escapes_become_literal_characters() {
    let out = decode_in_chunks(br#"data: Line1\nLine2\'s \"quoted\""#, 4);
    assert_eq!(out, "Line1\nLine2's \"quoted\"");
}

#[test]
fn payload_is_trimmed() {
    let out = decode_in_chunks(b"data:    spaced out   \n\n", 64);
    assert_eq!(out, "spaced out");
}

#[test]
fn sentinel_between_runs_inserts_single_break() {
    let input = b"data: One\n\ndata: [DONE]\n\ndata: [DONE]\n\ndata: \n\ndata: Two\n\n";
    assert_eq!(decode_in_chunks(input, 3), "One\nTwo");
}

#[test]
fn trailing_frame_without_separator_is_processed_at_end() {
    let input = b"data: first\n\ndata: last";
    let mut decoder = EventStreamDecoder::new();
    assert_eq!(decoder.feed(input), "first");
    assert_eq!(decoder.finish(), "last");
}

fn chunks(parts: &[&'static str]) -> Vec<Result<Bytes, ApiError>> {
    parts
        .iter()
        .map(|part| Ok(Bytes::from_static(part.as_bytes())))
        .collect()
}

#[tokio::test]
async fn pump_reports_each_appended_piece() {
    let source = stream::iter(chunks(&["data: A", "b\n\ndata: ", "Cd\n", "\n"]));
    let mut seen = Vec::new();
    let result = pump_event_stream(source, &CancellationToken::new(), |piece| {
        seen.push(piece.to_string())
    })
    .await;

    assert_eq!(result.end, StreamEnd::Finished);
    assert_eq!(result.text, "AbCd");
    assert_eq!(seen, vec!["Ab".to_string(), "Cd".to_string()]);
}

#[tokio::test]
async fn cancel_mid_frame_keeps_only_complete_frames() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    // Two full frames, half a frame, then the connection stalls.
    let source = stream::iter(chunks(&["data: kept\n\ndata: also\n\n", "data: half"]))
        .chain(stream::pending());
    let mut received = 0;
    let result = pump_event_stream(source, &cancel, |_| {
        received += 1;
        trigger.cancel();
    })
    .await;

    assert_eq!(result.end, StreamEnd::Cancelled);
    assert_eq!(result.text, "keptalso");
    assert_eq!(received, 1);
}

#[tokio::test]
async fn already_cancelled_token_reads_nothing() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let source = stream::iter(chunks(&["data: never\n\n"]));
    let result = pump_event_stream(source, &cancel, |_| {}).await;

    assert_eq!(result.end, StreamEnd::Cancelled);
    assert_eq!(result.text, "");
}

#[tokio::test]
async fn transport_error_preserves_partial_text() {
    let failure = storyreel_engine::ApiError {
        kind: storyreel_engine::FailureKind::Network,
        message: "connection reset".to_string(),
    };
    let mut items = chunks(&["data: partial\n\n", "data: lost"]);
    items.push(Err(failure.clone()));
    let result = pump_event_stream(stream::iter(items), &CancellationToken::new(), |_| {}).await;

    assert_eq!(result.text, "partial");
    assert_eq!(result.end, StreamEnd::Interrupted(failure));
}
