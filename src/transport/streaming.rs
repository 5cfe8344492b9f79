//! Streaming response handling for newline-delimited batch records.
//!
//! The image search endpoint answers with a chunked body of text lines, each
//! either a bare JSON object or an SSE-style `data: <json>` frame. Chunks can
//! split a line, a JSON object or a UTF-8 sequence at any byte; the decoder
//! and framer here reassemble them before anything is parsed.

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll};

use super::TransportError;
use crate::errors::ClientError;
use crate::types::image_search::StreamingImageBatch;

/// Frame prefix stripped from SSE-style lines.
pub const DATA_PREFIX: &str = "data: ";

/// Boxed byte stream of a response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Streaming HTTP response.
pub struct StreamingResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Byte stream.
    pub stream: ByteStream,
}

impl StreamingResponse {
    /// Returns true if the status indicates success (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Incremental UTF-8 decoder.
///
/// Bytes of a multi-byte character cut off at the end of a chunk are held
/// back and completed by the next chunk. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Creates a new decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a chunk, carrying any incomplete trailing sequence.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let bytes: Cow<'_, [u8]> = if self.pending.is_empty() {
            Cow::Borrowed(chunk)
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            Cow::Owned(joined)
        };

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        out.push_str(text);
                    }
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending.extend_from_slice(after);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flushes held-back bytes at end of input.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }
}

/// Splits decoded text into complete `\n`-terminated lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: String,
}

impl LineFramer {
    /// Creates a new framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends text and returns every line completed by it.
    ///
    /// The text after the last line feed stays buffered.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete[..last_newline]
            .split('\n')
            .map(str::to_string)
            .collect()
    }

    /// Returns the unterminated remainder if it holds non-whitespace text.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    /// Returns the currently buffered partial line.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }
}

/// Parses one framed line into a batch.
///
/// Returns `None` for blank lines. A single leading `data: ` is stripped.
pub fn parse_batch_line(line: &str) -> Option<Result<StreamingImageBatch, serde_json::Error>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let payload = trimmed.strip_prefix(DATA_PREFIX).unwrap_or(trimmed);
    Some(serde_json::from_str(payload))
}

/// Parses `lines` into `pending`, stopping after a final batch.
///
/// Returns true if a final batch was queued.
fn ingest_lines(
    lines: Vec<String>,
    pending: &mut VecDeque<StreamingImageBatch>,
    malformed_lines: &mut u64,
) -> bool {
    for line in lines {
        match parse_batch_line(&line) {
            None => {}
            Some(Ok(batch)) => {
                let is_final = batch.is_final;
                pending.push_back(batch);
                if is_final {
                    return true;
                }
            }
            Some(Err(e)) => {
                *malformed_lines += 1;
                tracing::warn!(
                    error = %e,
                    line = %line,
                    "Skipping malformed stream record"
                );
            }
        }
    }
    false
}

pin_project! {
    /// Image batch stream.
    ///
    /// Yields batches in arrival order and ends after the first final batch,
    /// at end of input, or after yielding one transport error.
    pub struct ImageBatchStream {
        #[pin]
        inner: ByteStream,
        decoder: Utf8Decoder,
        framer: LineFramer,
        pending: VecDeque<StreamingImageBatch>,
        input_closed: bool,
        batches_emitted: u64,
        malformed_lines: u64,
    }
}

impl ImageBatchStream {
    /// Creates a batch stream over a raw byte stream.
    pub fn new(stream: ByteStream) -> Self {
        Self {
            inner: stream,
            decoder: Utf8Decoder::new(),
            framer: LineFramer::new(),
            pending: VecDeque::new(),
            input_closed: false,
            batches_emitted: 0,
            malformed_lines: 0,
        }
    }

    /// Creates a batch stream from a streaming response, rejecting non-2xx.
    pub fn from_response(response: StreamingResponse) -> Result<Self, ClientError> {
        if !response.is_success() {
            return Err(ClientError::Http {
                status: response.status,
                message: format!("Unexpected status code: {}", response.status),
            });
        }
        Ok(Self::new(response.stream))
    }

    /// Number of batches yielded so far.
    pub fn batches_emitted(&self) -> u64 {
        self.batches_emitted
    }

    /// Number of lines skipped because they failed to parse.
    pub fn malformed_lines(&self) -> u64 {
        self.malformed_lines
    }
}

impl Stream for ImageBatchStream {
    type Item = Result<StreamingImageBatch, ClientError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(batch) = this.pending.pop_front() {
                *this.batches_emitted += 1;
                return Poll::Ready(Some(Ok(batch)));
            }

            if *this.input_closed {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let text = this.decoder.decode(&bytes);
                    let lines = this.framer.push(&text);
                    if ingest_lines(lines, this.pending, this.malformed_lines) {
                        *this.input_closed = true;
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    *this.input_closed = true;
                    return Poll::Ready(Some(Err(ClientError::Stream {
                        message: e.to_string(),
                    })));
                }
                Poll::Ready(None) => {
                    *this.input_closed = true;
                    let tail = this.decoder.finish();
                    let mut lines = this.framer.push(&tail);
                    lines.extend(this.framer.finish());
                    ingest_lines(lines, this.pending, this.malformed_lines);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl std::fmt::Debug for ImageBatchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBatchStream")
            .field("pending", &self.pending.len())
            .field("input_closed", &self.input_closed)
            .field("batches_emitted", &self.batches_emitted)
            .field("malformed_lines", &self.malformed_lines)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_ascii_passthrough() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"hello\n"), "hello\n");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_decoder_split_multibyte() {
        // "é" is 0xC3 0xA9; "🩺" is four bytes.
        let text = "é🩺";
        let bytes = text.as_bytes();
        let mut decoder = Utf8Decoder::new();

        let mut out = String::new();
        for b in bytes {
            out.push_str(&decoder.decode(std::slice::from_ref(b)));
        }
        out.push_str(&decoder.finish());

        assert_eq!(out, text);
    }

    #[test]
    fn test_decoder_holds_back_incomplete_tail() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&[b'a', 0xE2, 0x82]), "a");
        assert_eq!(decoder.decode(&[0xAC, b'b']), "€b");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
    }

    #[test]
    fn test_decoder_flushes_truncated_sequence() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&[0xF0, 0x9F]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn test_framer_complete_and_partial_lines() {
        let mut framer = LineFramer::new();

        assert_eq!(framer.push("one\ntw"), vec!["one".to_string()]);
        assert_eq!(framer.buffered(), "tw");
        assert_eq!(
            framer.push("o\n\nthree"),
            vec!["two".to_string(), String::new()]
        );
        assert_eq!(framer.finish(), Some("three".to_string()));
    }

    #[test]
    fn test_framer_no_newline_buffers_everything() {
        let mut framer = LineFramer::new();
        assert!(framer.push("partial").is_empty());
        assert!(framer.push(" still").is_empty());
        assert_eq!(framer.buffered(), "partial still");
    }

    #[test]
    fn test_framer_finish_ignores_whitespace() {
        let mut framer = LineFramer::new();
        framer.push("done\n  \t");
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn test_parse_blank_line() {
        assert!(parse_batch_line("   \r").is_none());
    }

    #[test]
    fn test_parse_with_and_without_prefix() {
        let bare = parse_batch_line(r#"{"batch_number":1,"is_final":false}"#)
            .unwrap()
            .unwrap();
        let framed = parse_batch_line(r#"data: {"batch_number":1,"is_final":false}"#)
            .unwrap()
            .unwrap();
        assert_eq!(bare, framed);
    }

    #[test]
    fn test_parse_tolerates_carriage_return() {
        let batch = parse_batch_line("data: {\"batch_number\":2}\r")
            .unwrap()
            .unwrap();
        assert_eq!(batch.batch_number, 2);
    }

    #[test]
    fn test_parse_other_sse_fields_are_malformed() {
        assert!(parse_batch_line("event: batch").unwrap().is_err());
        assert!(parse_batch_line(": keep-alive").unwrap().is_err());
    }

    #[test]
    fn test_ingest_stops_after_final() {
        let mut pending = VecDeque::new();
        let mut malformed = 0;
        let lines = vec![
            r#"{"batch_number":1}"#.to_string(),
            "garbage".to_string(),
            r#"{"batch_number":2,"is_final":true}"#.to_string(),
            r#"{"batch_number":3}"#.to_string(),
        ];

        assert!(ingest_lines(lines, &mut pending, &mut malformed));
        assert_eq!(pending.len(), 2);
        assert_eq!(malformed, 1);
    }
}
