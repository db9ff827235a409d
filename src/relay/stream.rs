//! Stream normalization.
//!
//! Turns an upstream provider's raw byte stream into a flat sequence of
//! plain-text chunks. Two decoders exist, one per API family:
//! - [`SseTextDecoder`] for OpenAI-compatible `data: {json}` line framing
//! - [`GeminiTextDecoder`] for Gemini's streamed JSON array of partial objects
//!
//! Both retain only the unfinished tail of the input between reads.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;

use super::types::StreamChunk;
use crate::config::ApiFormat;

/// Longest unfinished line or fragment kept between reads.
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// `"text": "<json string body>"` with escaped quotes allowed inside.
static TEXT_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""text"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap());

/// Boxed stream of text chunks handed to the HTTP layer.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, std::io::Error>> + Send>>;

/// Line-buffered decoder for OpenAI-compatible SSE bodies.
///
/// Buffers raw bytes, so neither a line nor a multi-byte character split
/// across reads is lost.
#[derive(Debug, Default)]
pub struct SseTextDecoder {
    buffer: Vec<u8>,
}

impl SseTextDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a chunk of bytes, returning the text of every completed line.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            out.extend(Self::process_line(&line));
        }

        if self.buffer.len() > MAX_PENDING_BYTES {
            tracing::warn!(
                buffered = self.buffer.len(),
                "SSE line exceeds buffer cap, discarding"
            );
            self.buffer.clear();
        }

        out
    }

    /// Flush any remaining content in the buffer as a final line.
    pub fn finish(&mut self) -> Vec<String> {
        let line = std::mem::take(&mut self.buffer);
        Self::process_line(&line).into_iter().collect()
    }

    fn process_line(raw: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let data = line.strip_prefix("data:")?.trim_start();
        if data == "[DONE]" {
            return None;
        }

        match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => chunk.content().map(str::to_string),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed stream line");
                None
            }
        }
    }
}

/// Pattern-scanning decoder for Gemini's streamed JSON array.
///
/// Each complete `"text": "..."` field is emitted as soon as its closing
/// quote arrives. The buffer is cut after the last complete match, so a field
/// split across reads is emitted once it is whole.
#[derive(Debug, Default)]
pub struct GeminiTextDecoder {
    undecoded: Vec<u8>,
    buffer: String,
}

impl GeminiTextDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.undecoded.extend_from_slice(bytes);
        let text = take_utf8(&mut self.undecoded);
        self.buffer.push_str(&text);

        let mut out = Vec::new();
        let mut consumed = 0;
        for caps in TEXT_FIELD.captures_iter(&self.buffer) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            consumed = whole.end();
            match serde_json::from_str::<String>(&format!("\"{}\"", inner.as_str())) {
                Ok(text) if !text.is_empty() => out.push(text),
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "Skipping malformed text fragment"),
            }
        }
        self.buffer.drain(..consumed);

        if self.buffer.len() > MAX_PENDING_BYTES {
            tracing::warn!(
                buffered = self.buffer.len(),
                "Gemini fragment exceeds buffer cap, discarding"
            );
            self.buffer.clear();
        }

        out
    }

    /// Whatever remains is an unterminated fragment and is dropped.
    pub fn finish(&mut self) -> Vec<String> {
        self.buffer.clear();
        self.undecoded.clear();
        Vec::new()
    }
}

/// Decode the valid UTF-8 prefix of `pending`, keeping an incomplete
/// trailing sequence for the next read. Each invalid sequence becomes U+FFFD.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    let mut out = String::new();
    let mut start = 0;

    while start < pending.len() {
        match std::str::from_utf8(&pending[start..]) {
            Ok(s) => {
                out.push_str(s);
                start = pending.len();
            }
            Err(e) => {
                let valid = start + e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[start..valid]));
                match e.error_len() {
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        start = valid + len;
                    }
                    None => {
                        start = valid;
                        break;
                    }
                }
            }
        }
    }

    pending.drain(..start);
    out
}

/// Decoder selected by the serving provider's API family.
#[derive(Debug)]
pub enum TextDecoder {
    Sse(SseTextDecoder),
    Gemini(GeminiTextDecoder),
}

impl TextDecoder {
    pub fn for_format(format: ApiFormat) -> Self {
        match format {
            ApiFormat::Openai => TextDecoder::Sse(SseTextDecoder::new()),
            ApiFormat::Gemini => TextDecoder::Gemini(GeminiTextDecoder::new()),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        match self {
            TextDecoder::Sse(d) => d.feed(bytes),
            TextDecoder::Gemini(d) => d.feed(bytes),
        }
    }

    pub fn finish(&mut self) -> Vec<String> {
        match self {
            TextDecoder::Sse(d) => d.finish(),
            TextDecoder::Gemini(d) => d.finish(),
        }
    }
}

struct NormalizeState<S> {
    upstream: Pin<Box<S>>,
    decoder: TextDecoder,
    ready: VecDeque<String>,
    finished: bool,
}

/// Wrap an upstream body as a lazy stream of text chunks.
///
/// Chunks are yielded as soon as each read is decoded. A clean upstream end
/// ends the stream; a transport error is passed on as the final item.
pub fn normalize<S, E>(upstream: S, decoder: TextDecoder) -> TextStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = NormalizeState {
        upstream: Box::pin(upstream),
        decoder,
        ready: VecDeque::new(),
        finished: false,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(text) = state.ready.pop_front() {
                return Some((Ok(text), state));
            }
            if state.finished {
                return None;
            }
            match state.upstream.next().await {
                Some(Ok(bytes)) => {
                    let decoded = state.decoder.feed(&bytes);
                    state.ready.extend(decoded);
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Error streaming from provider");
                    state.finished = true;
                    return Some((Err(std::io::Error::other(e.to_string())), state));
                }
                None => {
                    state.finished = true;
                    let rest = state.decoder.finish();
                    state.ready.extend(rest);
                }
            }
        }
    });

    Box::pin(stream)
}
