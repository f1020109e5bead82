use serde::Deserialize;
use tracing::trace;

use crate::stream::TextEvent;

pub(crate) const DATA_PREFIX: &str = "data: ";
pub(crate) const DONE_SENTINEL: &str = "[DONE]";

/// What a single complete line of the chat completions stream turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LineOutcome {
    Delta(String),
    Done,
    /// Not a `data: ` line (keep-alives, comments, blank separators).
    Ignored,
    /// Well-formed frame without string content (role-only frames, finish frames).
    NoContent,
    /// Payload that is not valid UTF-8 or not a decodable chunk object.
    Malformed(String),
}

/// Only `choices[0]` is decoded strictly; later choices may hold anything.
#[derive(Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Output of one `push_chunk` call.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DecodedChunk {
    pub events: Vec<TextEvent>,
    /// The `[DONE]` sentinel was seen; nothing more will be decoded.
    pub done: bool,
}

/// Incremental decoder for streamed chat completion bodies.
///
/// Buffers raw bytes until a newline arrives so a read may end anywhere,
/// including inside a multi-byte UTF-8 character.
#[derive(Default)]
pub struct ChatDeltaDecoder {
    buf: Vec<u8>,
    finished: bool,
}

impl ChatDeltaDecoder {
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> DecodedChunk {
        let mut out = DecodedChunk::default();
        if self.finished {
            return out;
        }
        self.buf.extend_from_slice(chunk);
        let mut start = 0;
        while let Some(pos) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + pos;
            let outcome = decode_line(&self.buf[start..end]);
            start = end + 1;
            if self.apply(outcome, &mut out) {
                self.buf.clear();
                return out;
            }
        }
        self.buf.drain(..start);
        out
    }

    /// Treats end of stream as a line terminator for any unterminated tail.
    pub fn finish(&mut self) -> DecodedChunk {
        let mut out = DecodedChunk::default();
        if self.finished || self.buf.is_empty() {
            self.buf.clear();
            return out;
        }
        let tail = std::mem::take(&mut self.buf);
        self.apply(decode_line(&tail), &mut out);
        out
    }

    fn apply(&mut self, outcome: LineOutcome, out: &mut DecodedChunk) -> bool {
        match outcome {
            LineOutcome::Delta(text) => out.events.push(TextEvent::new(text)),
            LineOutcome::Done => {
                self.finished = true;
                out.done = true;
                return true;
            }
            LineOutcome::Ignored | LineOutcome::NoContent => {}
            LineOutcome::Malformed(reason) => trace!(%reason, "skipping malformed stream frame"),
        }
        false
    }
}

pub(crate) fn decode_line(raw: &[u8]) -> LineOutcome {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let Ok(line) = std::str::from_utf8(raw) else {
        return if raw.starts_with(DATA_PREFIX.as_bytes()) {
            LineOutcome::Malformed("frame is not valid UTF-8".into())
        } else {
            LineOutcome::Ignored
        };
    };
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return LineOutcome::Ignored;
    };
    if payload == DONE_SENTINEL {
        return LineOutcome::Done;
    }
    decode_payload(payload)
}

fn decode_payload(payload: &str) -> LineOutcome {
    let chunk: ChatCompletionChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => return LineOutcome::Malformed(e.to_string()),
    };
    let Some(first) = chunk.choices.into_iter().next() else {
        return LineOutcome::NoContent;
    };
    let choice: ChunkChoice = match serde_json::from_value(first) {
        Ok(choice) => choice,
        Err(e) => return LineOutcome::Malformed(e.to_string()),
    };
    match choice.delta.and_then(|delta| delta.content) {
        Some(content) => LineOutcome::Delta(content),
        None => LineOutcome::NoContent,
    }
}
