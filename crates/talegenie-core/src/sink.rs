use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt as _;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::errors::TaleError;
use crate::playback::AudioPlayer;
use crate::stream::{AudioStream, TextEvent, TextStream};

/// Growing story text assembled from text increments in arrival order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoryBuffer {
    text: String,
}

impl StoryBuffer {
    pub fn push(&mut self, event: &TextEvent) {
        self.text.push_str(&event.text);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Drains a text stream into the full story.
///
/// On failure the text accumulated so far is left in `buffer`.
pub async fn drain_story(
    mut stream: TextStream,
    buffer: &mut StoryBuffer,
) -> Result<(), TaleError> {
    while let Some(event) = stream.next().await {
        buffer.push(&event?);
    }
    Ok(())
}

/// Drains a text stream and returns the full story.
pub async fn collect_story(stream: TextStream) -> Result<String, TaleError> {
    let mut buffer = StoryBuffer::default();
    drain_story(stream, &mut buffer).await?;
    Ok(buffer.into_string())
}

/// Progress of the read-aloud stage as seen by a UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Buffering {
        bytes_received: usize,
    },
    Ready,
}

/// Drains audio chunks into a temporary file and hands it to a player.
pub struct AudioSink<P> {
    player: Arc<P>,
    temp_dir: Option<PathBuf>,
    state: watch::Sender<PlaybackState>,
}

impl<P> AudioSink<P>
where
    P: AudioPlayer + 'static,
    P::Handle: Send + 'static,
{
    pub fn new(player: P) -> Self {
        let (state, _) = watch::channel(PlaybackState::Idle);
        Self {
            player: Arc::new(player),
            temp_dir: None,
            state,
        }
    }

    /// Stages temporary files under `dir` instead of the system temp dir.
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    /// Collects the whole stream, stages it, and opens it with the player.
    ///
    /// The staged file is removed once the player returns, whether it
    /// succeeded or not. Any failure, or dropping the future before it
    /// completes, leaves the state at `Idle`.
    pub async fn play(&self, stream: AudioStream) -> Result<P::Handle, TaleError> {
        let mut guard = IdleOnDrop {
            state: &self.state,
            armed: true,
        };
        self.state.send_replace(PlaybackState::Buffering { bytes_received: 0 });
        let result = match self.collect(stream).await {
            Ok(audio) => self.stage_and_open(audio.freeze()).await,
            Err(err) => Err(err),
        };
        if result.is_ok() {
            guard.armed = false;
            self.state.send_replace(PlaybackState::Ready);
        }
        result
    }

    /// Marks playback as finished.
    pub fn reset(&self) {
        self.state.send_replace(PlaybackState::Idle);
    }

    async fn collect(&self, mut stream: AudioStream) -> Result<BytesMut, TaleError> {
        let mut audio = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            audio.extend_from_slice(chunk?.as_bytes());
            self.state.send_replace(PlaybackState::Buffering {
                bytes_received: audio.len(),
            });
        }
        Ok(audio)
    }

    async fn stage_and_open(&self, audio: Bytes) -> Result<P::Handle, TaleError> {
        let player = Arc::clone(&self.player);
        let temp_dir = self.temp_dir.clone();
        tokio::task::spawn_blocking(move || stage_blocking(&*player, temp_dir.as_deref(), &audio))
            .await
            .map_err(|e| TaleError::storage("audio staging task", e))?
    }
}

/// Resets the playback state when `play` does not finish successfully.
struct IdleOnDrop<'a> {
    state: &'a watch::Sender<PlaybackState>,
    armed: bool,
}

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(PlaybackState::Idle);
        }
    }
}

fn stage_blocking<P: AudioPlayer>(
    player: &P,
    temp_dir: Option<&Path>,
    audio: &[u8],
) -> Result<P::Handle, TaleError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("talegenie-").suffix(".mp3");
    let mut file = match temp_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|e| TaleError::storage("create temporary audio file", e))?;

    let written = file.write_all(audio).and_then(|()| file.flush());
    let opened = match written {
        Ok(()) => {
            debug!(path = %file.path().display(), bytes = audio.len(), "staged audio for playback");
            Some(player.open(file.path()))
        }
        Err(e) => {
            warn!(error = %e, "failed to write temporary audio file");
            None
        }
    };

    let path = file.path().to_path_buf();
    if let Err(e) = file.close() {
        warn!(path = %path.display(), error = %e, "failed to remove temporary audio file");
    }

    match opened {
        Some(Ok(handle)) => Ok(handle),
        Some(Err(e)) => Err(TaleError::InvalidAudioData(e.to_string())),
        None => Err(TaleError::Storage(
            "failed to write temporary audio file".into(),
        )),
    }
}
