//! OpenAI integration: request building and the streaming body formats of
//! the chat completions and speech endpoints.
mod adapter;
mod config;
mod options;
pub(crate) mod transport;

pub use adapter::{OpenAiTaleClient, audio_chunk_stream, text_event_stream};
pub use config::OpenAiClientConfig;
pub use options::{SpeechRequestOptions, TaleRequestOptions};
pub use transport::{ChatDeltaDecoder, DecodedChunk};
