//! Incremental Server-Sent-Events decoding for the chat stream
//!
//! The chat functions answer with a `text/event-stream` body made of
//! newline-delimited `data: <json>` frames and a final `data: [DONE]`.
//! Network chunks can end anywhere: inside a multi-byte character, inside a
//! line, or inside the JSON of a frame. [`SseDecoder`] keeps the state needed
//! to turn such a chunk sequence into the same events regardless of where the
//! boundaries fall.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ChatError, Result};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";
const MAX_LOGGED_LINE: usize = 200;

/// Bounds on how long the decoder keeps waiting for a frame to become valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimits {
    /// How many times one re-buffered line may fail to parse before the
    /// stream is abandoned.
    pub max_frame_retries: u32,
    /// Upper bound on undecoded text held between chunks.
    pub max_pending_bytes: usize,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            max_frame_retries: 3,
            max_pending_bytes: 1024 * 1024,
        }
    }
}

/// Stateful UTF-8 decoder.
///
/// A character split across two chunks is held back until the rest of its
/// bytes arrive. Invalid sequences become U+FFFD instead of failing.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.carry);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(err) => {
                    let (valid, tail) = rest.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        None => {
                            // Incomplete sequence at the end: wait for the next chunk
                            self.carry = tail.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush at end of stream. Returns U+FFFD when a partial character was left over.
    pub fn finish(&mut self) -> Option<char> {
        if self.carry.is_empty() {
            None
        } else {
            self.carry.clear();
            Some(char::REPLACEMENT_CHARACTER)
        }
    }
}

/// One decoded event from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// An incremental fragment of assistant text
    Delta(String),
    /// The `[DONE]` sentinel; nothing after it is processed
    Done,
}

enum Line<'a> {
    Skip,
    Done,
    Payload(&'a str),
}

fn classify(line: &str) -> Line<'_> {
    if line.starts_with(':') || line.trim().is_empty() {
        return Line::Skip;
    }
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return Line::Skip;
    };
    let payload = rest.trim();
    if payload == DONE_SENTINEL {
        Line::Done
    } else {
        Line::Payload(payload)
    }
}

/// Pull `choices[0].delta.content` out of a chat-completion chunk.
pub fn delta_text(frame: &Value) -> Option<&str> {
    frame
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

#[derive(Debug)]
struct Stall {
    line: String,
    attempts: u32,
}

/// Line framer and frame parser for one response body.
#[derive(Debug)]
pub struct SseDecoder {
    utf8: Utf8Decoder,
    pending: String,
    finished: bool,
    limits: StreamLimits,
    stalled: Option<Stall>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new(StreamLimits::default())
    }
}

impl SseDecoder {
    pub fn new(limits: StreamLimits) -> Self {
        Self {
            utf8: Utf8Decoder::default(),
            pending: String::new(),
            finished: false,
            limits,
            stalled: None,
        }
    }

    /// True once the `[DONE]` sentinel has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Text received but not yet consumed as complete lines.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Feed one network chunk and return the events it completes.
    ///
    /// A `data:` line whose JSON does not parse stays at the front of the
    /// buffer together with its newline, and extraction stops for this chunk.
    /// The line is retried when the next chunk arrives. Repeated failures of
    /// the same line beyond [`StreamLimits::max_frame_retries`] abort the
    /// stream with [`ChatError::MalformedFrame`]. Once `[DONE]` is seen the
    /// rest of the buffer is discarded.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>> {
        let mut events = Vec::new();
        if self.finished {
            return Ok(events);
        }

        let text = self.utf8.decode(chunk);
        self.pending.push_str(&text);

        // Lines are consumed by advancing an offset; the buffer is drained once
        let mut consumed = 0;
        while let Some(offset) = self.pending[consumed..].find('\n') {
            let end = consumed + offset;
            let raw = &self.pending[consumed..end];
            let line = raw.strip_suffix('\r').unwrap_or(raw);

            let payload = match classify(line) {
                Line::Skip => {
                    consumed = end + 1;
                    continue;
                }
                Line::Done => {
                    debug!("received [DONE] sentinel");
                    self.finished = true;
                    events.push(SseEvent::Done);
                    break;
                }
                Line::Payload(payload) => payload,
            };

            match serde_json::from_str::<Value>(payload) {
                Ok(frame) => {
                    if let Some(text) = delta_text(&frame) {
                        events.push(SseEvent::Delta(text.to_string()));
                    }
                    self.stalled = None;
                    consumed = end + 1;
                }
                Err(err) => {
                    // The line and its newline stay at the front of the buffer
                    let line = line.to_string();
                    self.record_stall(&line, &err)?;
                    break;
                }
            }
        }

        if self.finished {
            self.pending.clear();
            return Ok(events);
        }
        self.pending.drain(..consumed);

        if self.pending.len() > self.limits.max_pending_bytes {
            return Err(ChatError::FrameTooLarge {
                limit: self.limits.max_pending_bytes,
            });
        }

        Ok(events)
    }

    /// Called when the body closes. Unterminated leftovers are dropped.
    pub fn finish(&mut self) {
        if self.utf8.finish().is_some() {
            debug!("stream ended inside a multi-byte character");
        }
        if !self.pending.trim().is_empty() {
            debug!(
                remainder = %excerpt(&self.pending),
                "discarding unterminated data at end of stream"
            );
        }
        self.pending.clear();
    }

    fn record_stall(&mut self, line: &str, err: &serde_json::Error) -> Result<()> {
        let attempts = match self.stalled.take() {
            Some(stall) if stall.line == line => stall.attempts + 1,
            _ => 1,
        };
        if attempts > self.limits.max_frame_retries {
            return Err(ChatError::MalformedFrame {
                attempts,
                line: excerpt(line),
            });
        }
        warn!(attempts, error = %err, "re-buffering malformed frame until more bytes arrive");
        self.stalled = Some(Stall {
            line: line.to_string(),
            attempts,
        });
        Ok(())
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= MAX_LOGGED_LINE {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(MAX_LOGGED_LINE).collect();
        cut.push('…');
        cut
    }
}
