use std::pin::Pin;

use bytes::Bytes;

use crate::errors::TaleError;

/// One decoded increment of generated text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextEvent {
    pub text: String,
}

impl TextEvent {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A bounded-size buffer of synthesized audio bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioChunk(Bytes);

impl AudioChunk {
    pub fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

/// Lazy sequence of text increments for one generation request.
pub type TextStream = Pin<Box<dyn futures::Stream<Item = Result<TextEvent, TaleError>> + Send>>;

/// Lazy sequence of audio chunks for one speech request.
pub type AudioStream = Pin<Box<dyn futures::Stream<Item = Result<AudioChunk, TaleError>> + Send>>;

/// Events exposed by `StoryRun` while a story is being generated.
#[derive(Clone, Debug, PartialEq)]
pub enum StoryEvent {
    /// Incremental text output.
    Delta {
        run_id: uuid::Uuid,
        seq: u64,
        text: String,
    },
    /// Terminal success event with the full story text.
    Completed { run_id: uuid::Uuid, text: String },
    /// Terminal failure event. `partial` holds the text accumulated before
    /// the failure.
    Failed {
        run_id: uuid::Uuid,
        error: TaleError,
        partial: String,
    },
}

impl StoryEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}
