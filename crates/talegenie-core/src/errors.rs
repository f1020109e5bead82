/// Errors reported by a `Transport` while sending a request or reading its
/// body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent or no response head was received.
    #[error("request failed: {0}")]
    Request(String),
    /// The response body stream failed after the response head arrived.
    #[error("body read failed: {0}")]
    Read(String),
}

/// Errors returned by an `AudioPlayer` when it cannot open a staged file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    /// The staged file could not be read back.
    #[error("failed to read audio file: {0}")]
    Unreadable(String),
    /// The file was readable but is not audio the player understands.
    #[error("unsupported audio data: {0}")]
    Unsupported(String),
}

/// Top-level error type for the tale generation API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaleError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input (for example an empty prompt).
    #[error("validation error: {0}")]
    Validation(String),
    /// The endpoint answered with a non-success status before any decoding began.
    #[error("invalid response (status {status:?}): {message}")]
    InvalidResponse {
        status: Option<u16>,
        message: String,
    },
    /// Transport failure while requesting or streaming generated text.
    #[error("failed to generate text: {0}")]
    FailedToGenerateText(String),
    /// Transport failure while requesting or streaming synthesized audio.
    #[error("failed to generate audio: {0}")]
    FailedToGenerateAudio(String),
    /// The final audio artifact could not be opened by the player.
    #[error("invalid audio data: {0}")]
    InvalidAudioData(String),
    /// Local file staging or persistence failed.
    #[error("storage error: {0}")]
    Storage(String),
    /// The run was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,
    /// Internal protocol misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TaleError {
    pub(crate) fn invalid_status(status: u16, body: impl Into<String>) -> Self {
        Self::InvalidResponse {
            status: Some(status),
            message: body.into(),
        }
    }

    /// Builds a `Protocol` error, for consumers that observe a broken event
    /// sequence.
    pub fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{context}: {err}"))
    }

    /// Returns true when the error was raised before any content was produced
    /// because the endpoint rejected the request.
    pub fn is_invalid_response(&self) -> bool {
        matches!(self, Self::InvalidResponse { .. })
    }
}

/// Which pipeline a transport failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pipeline {
    Text,
    Audio,
}

pub(crate) fn failure_from_transport(pipeline: Pipeline, err: &TransportError) -> TaleError {
    match pipeline {
        Pipeline::Text => TaleError::FailedToGenerateText(err.to_string()),
        Pipeline::Audio => TaleError::FailedToGenerateAudio(err.to_string()),
    }
}
