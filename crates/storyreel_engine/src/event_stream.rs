use bytes::Bytes;
use encoding_rs::{CoderResult, Decoder, UTF_8};
use futures_util::{Stream, StreamExt};
use reel_logging::{reel_debug, reel_warn};
use tokio_util::sync::CancellationToken;

use crate::ApiError;

/// Prefix of payload lines inside an event frame.
pub const DATA_MARKER: &str = "data:";
/// Payload marking the end of one content run.
pub const DONE_SENTINEL: &str = "[DONE]";
const FRAME_SEPARATOR: &str = "\n\n";

/// Incremental decoder for `text/event-stream` chapter output.
///
/// Bytes may be split anywhere, including inside a multi-byte character.
/// Consecutive empty or sentinel events collapse into a single line break.
pub struct EventStreamDecoder {
    utf8: Decoder,
    pending: String,
    last_was_break: bool,
    finished: bool,
}

impl Default for EventStreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self {
            utf8: UTF_8.new_decoder(),
            pending: String::new(),
            last_was_break: false,
            finished: false,
        }
    }

    /// Feeds one chunk; returns the text appended by frames it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> String {
        if self.finished {
            return String::new();
        }
        self.decode_into_pending(chunk, false);
        let mut appended = String::new();
        while let Some(idx) = self.pending.find(FRAME_SEPARATOR) {
            let frame: String = self.pending.drain(..idx + FRAME_SEPARATOR.len()).collect();
            self.process_frame(&frame[..idx], &mut appended);
        }
        appended
    }

    /// Flushes the decoder and treats any unterminated remainder as a frame.
    pub fn finish(&mut self) -> String {
        if self.finished {
            return String::new();
        }
        self.decode_into_pending(&[], true);
        self.finished = true;
        let mut appended = String::new();
        if !self.pending.is_empty() {
            let frame = std::mem::take(&mut self.pending);
            self.process_frame(&frame, &mut appended);
        }
        appended
    }

    /// Bytes received but not yet part of a complete frame.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    fn decode_into_pending(&mut self, mut src: &[u8], last: bool) {
        loop {
            let needed = self
                .utf8
                .max_utf8_buffer_length(src.len())
                .unwrap_or(src.len());
            self.pending.reserve(needed);
            let (result, read, _replaced) = self.utf8.decode_to_string(src, &mut self.pending, last);
            src = &src[read..];
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }
    }

    fn process_frame(&mut self, frame: &str, out: &mut String) {
        let payload: String = frame
            .lines()
            .filter_map(|line| line.strip_prefix(DATA_MARKER))
            .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
            .collect();
        let text = unescape(&payload);
        let text = text.trim();

        if !text.is_empty() && text != DONE_SENTINEL {
            out.push_str(text);
            self.last_was_break = false;
        } else if !self.last_was_break {
            out.push('\n');
            self.last_was_break = true;
        }
    }
}

/// Turns the literal escapes `\n`, `\'` and `\"` into their characters.
pub fn unescape(payload: &str) -> String {
    payload
        .replace("\\n", "\n")
        .replace("\\'", "'")
        .replace("\\\"", "\"")
}

/// How a chapter stream stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    Finished,
    Cancelled,
    /// Transport failed after the stream was established.
    Interrupted(ApiError),
}

/// Text accumulated from a chapter stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterText {
    pub text: String,
    pub end: StreamEnd,
}

/// Drives an [`EventStreamDecoder`] over a byte stream until it ends or
/// `cancel` fires. `on_text` sees every appended piece as it arrives.
///
/// On cancellation a partially received frame is dropped; text appended so
/// far is kept.
pub async fn pump_event_stream<S, F>(
    stream: S,
    cancel: &CancellationToken,
    mut on_text: F,
) -> ChapterText
where
    S: Stream<Item = Result<Bytes, ApiError>>,
    F: FnMut(&str),
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = EventStreamDecoder::new();
    let mut text = String::new();
    let mut append = |piece: String, text: &mut String| {
        if !piece.is_empty() {
            on_text(&piece);
            text.push_str(&piece);
        }
    };

    let end = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break StreamEnd::Cancelled,
            next = stream.next() => next,
        };
        match next {
            Some(Ok(chunk)) => append(decoder.feed(&chunk), &mut text),
            Some(Err(err)) => {
                reel_warn!("Chapter stream interrupted after {} chars: {}", text.len(), err);
                break StreamEnd::Interrupted(err);
            }
            None => {
                append(decoder.finish(), &mut text);
                break StreamEnd::Finished;
            }
        }
    };

    reel_debug!("Chapter stream ended: {:?} ({} chars)", end, text.len());
    ChapterText { text, end }
}

#[cfg(test)]
mod tests {
    use super::{unescape, EventStreamDecoder};

    #[test]
    fn unescape_handles_all_three_sequences() {
        assert_eq!(
            unescape(r#"Line1\nLine2\'s \"quoted\""#),
            "Line1\nLine2's \"quoted\""
        );
    }

    #[test]
    fn multi_line_payloads_concatenate_without_separator() {
        let mut decoder = EventStreamDecoder::new();
        let out = decoder.feed(b"data: Hello\ndata: World\n\n");
        assert_eq!(out, "HelloWorld");
    }

    #[test]
    fn lines_without_marker_are_ignored() {
        let mut decoder = EventStreamDecoder::new();
        let out = decoder.feed(b": keep-alive\nevent: token\ndata: hi\n\n");
        assert_eq!(out, "hi");
    }

    #[test]
    fn incomplete_frame_stays_pending_until_finish() {
        let mut decoder = EventStreamDecoder::new();
        assert_eq!(decoder.feed(b"data: tail"), "");
        assert_eq!(decoder.pending(), "data: tail");
        assert_eq!(decoder.finish(), "tail");
        assert_eq!(decoder.finish(), "");
    }
}
