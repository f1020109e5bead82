//! Streaming fairytale generation and read-aloud client.
//!
//! Two pipelines share one shape: an HTTP body arrives as a byte stream, a
//! decoder regroups it (text deltas or fixed-size audio chunks), and a sink
//! assembles the final artifact.
//!
//! # Usage (OpenAI)
//!
//! ```no_run
//! use talegenie_core::prelude::*;
//! use talegenie_core::vendors::openai::OpenAiTaleClient;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), TaleError> {
//! let client = OpenAiTaleClient::from_env()?;
//!
//! let story = collect_story(client.generate_tale("a brave turtle").await?).await?;
//! println!("{story}");
//!
//! let sink = AudioSink::new(ClipLoader);
//! let clip = sink.play(client.generate_audio(&story).await?).await?;
//! println!("{} bytes of {:?}", clip.len(), clip.format);
//! # Ok(())
//! # }
//! ```

/// Fixed-size regrouping of audio bodies.
pub mod chunker;
/// Public error types.
pub mod errors;
/// Transport capability and the `reqwest` implementation.
pub mod http;
/// Logging setup for binaries.
pub mod observability;
/// Audio player capability and the default clip loader.
pub mod playback;
/// Common imports for typical usage.
pub mod prelude;
/// Background story runs with progress and cancellation.
pub mod run;
/// Consumers that assemble stories and audio.
pub mod sink;
/// Stream item types.
pub mod stream;
/// Saved tales and their JSON store.
pub mod tale;
/// Vendor-specific integrations.
pub mod vendors;

pub use chunker::{AUDIO_CHUNK_THRESHOLD, AudioChunker};
pub use errors::{PlaybackError, TaleError, TransportError};
pub use http::{ByteStream, ReqwestTransport, StreamRequest, Transport, TransportResponse};
pub use playback::{AudioClip, AudioFormat, AudioPlayer, ClipLoader};
pub use run::{AbortHandle, StoryRun, StoryRunOptions};
pub use sink::{AudioSink, PlaybackState, StoryBuffer, collect_story, drain_story};
pub use stream::{AudioChunk, AudioStream, StoryEvent, TextEvent, TextStream};
pub use tale::{Tale, TaleStore};
