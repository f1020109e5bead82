//! Common imports for typical usage.
pub use crate::{
    AbortHandle, AudioChunk, AudioClip, AudioSink, AudioStream, ClipLoader, PlaybackState,
    StoryEvent, StoryRun, Tale, TaleError, TaleStore, TextEvent, TextStream, collect_story,
};
