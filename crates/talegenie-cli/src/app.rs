use std::io::Write;
use std::path::{Path, PathBuf};

use talegenie_core::vendors::openai::OpenAiTaleClient;
use talegenie_core::{AudioClip, AudioSink, ClipLoader, StoryEvent, Tale, TaleError, TaleStore};
use tracing::{info, warn};

use crate::config::AppConfig;

/// Options for the `tell` command.
#[derive(Clone, Debug, Default)]
pub struct TellOptions {
    pub save: bool,
    pub speak: bool,
    pub audio_out: Option<PathBuf>,
}

/// Result of a successful `tell`.
#[derive(Debug)]
pub struct TellOutcome {
    pub tale: Tale,
    pub saved: bool,
    pub audio_path: Option<PathBuf>,
}

/// Explicitly constructed application context shared by all commands.
pub struct App {
    client: OpenAiTaleClient,
    store: TaleStore,
    temp_dir: Option<PathBuf>,
    interruptible: bool,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self, TaleError> {
        let client = OpenAiTaleClient::new(config.client)?;
        Ok(Self::with_parts(client, TaleStore::open(config.store_path), config.temp_dir).interruptible(true))
    }

    pub fn with_parts(client: OpenAiTaleClient, store: TaleStore, temp_dir: Option<PathBuf>) -> Self {
        Self {
            client,
            store,
            temp_dir,
            interruptible: false,
        }
    }

    /// Cancel running stories on Ctrl-C.
    pub fn interruptible(mut self, enabled: bool) -> Self {
        self.interruptible = enabled;
        self
    }

    pub fn store(&self) -> &TaleStore {
        &self.store
    }

    /// Streams a tale to `out` as it is written, then optionally saves it and
    /// reads it aloud.
    ///
    /// On failure whatever text arrived stays printed. Ctrl-C cancels either
    /// phase when the app is interruptible.
    pub async fn tell<W: Write>(
        &mut self,
        prompt: &str,
        options: &TellOptions,
        out: &mut W,
    ) -> Result<TellOutcome, TaleError> {
        let interrupt = ctrl_c_signal(self.interruptible);
        self.tell_until(prompt, options, out, interrupt).await
    }

    /// Synthesizes a saved tale and records where the audio went.
    pub async fn speak(&mut self, id: uuid::Uuid, audio_out: Option<&Path>) -> Result<PathBuf, TaleError> {
        let interrupt = ctrl_c_signal(self.interruptible);
        self.speak_until(id, audio_out, interrupt).await
    }

    async fn tell_until<W: Write>(
        &mut self,
        prompt: &str,
        options: &TellOptions,
        out: &mut W,
        interrupt: impl Future<Output = ()>,
    ) -> Result<TellOutcome, TaleError> {
        tokio::pin!(interrupt);

        let mut run = tokio::select! {
            run = self.client.start_story(prompt) => run?,
            () = &mut interrupt => return Err(TaleError::Cancelled),
        };
        let abort = run.abort_handle();
        let mut interrupted = false;

        let mut result = Err(TaleError::protocol_msg("story ended without a terminal event"));
        loop {
            let event = tokio::select! {
                event = run.next_event() => event,
                () = &mut interrupt, if !interrupted => {
                    interrupted = true;
                    abort.abort();
                    continue;
                }
            };
            let Some(event) = event else { break };
            match event {
                StoryEvent::Delta { text, .. } => {
                    write!(out, "{text}").and_then(|()| out.flush()).map_err(console_error)?;
                }
                StoryEvent::Completed { text, .. } => {
                    writeln!(out).map_err(console_error)?;
                    result = Ok(text);
                    break;
                }
                StoryEvent::Failed { error, partial, .. } => {
                    if !partial.is_empty() {
                        writeln!(out).map_err(console_error)?;
                    }
                    result = Err(error);
                    break;
                }
            }
        }
        let story = result?;
        if interrupted {
            return Err(TaleError::Cancelled);
        }

        let mut tale = Tale::new(prompt, story);
        let mut saved = false;
        if options.save {
            self.store.save_tale(tale.clone())?;
            saved = true;
            info!(tale_id = %tale.id(), "tale saved");
        }

        let mut audio_path = None;
        if options.speak {
            let path = tokio::select! {
                path = self.read_aloud(&tale, options.audio_out.as_deref()) => path?,
                () = &mut interrupt => return Err(TaleError::Cancelled),
            };
            if saved {
                tale = self.store.attach_audio(tale.id(), &path)?.clone();
            } else {
                tale = tale.with_audio(&path);
            }
            audio_path = Some(path);
        }

        Ok(TellOutcome {
            tale,
            saved,
            audio_path,
        })
    }

    async fn speak_until(
        &mut self,
        id: uuid::Uuid,
        audio_out: Option<&Path>,
        interrupt: impl Future<Output = ()>,
    ) -> Result<PathBuf, TaleError> {
        let tale = self
            .store
            .get(id)
            .cloned()
            .ok_or_else(|| TaleError::Validation(format!("no saved tale with id {id}")))?;
        let path = tokio::select! {
            path = self.read_aloud(&tale, audio_out) => path?,
            () = interrupt => return Err(TaleError::Cancelled),
        };
        self.store.attach_audio(id, &path)?;
        Ok(path)
    }

    pub fn list<W: Write>(&self, out: &mut W) -> Result<(), TaleError> {
        if self.store.tales().is_empty() {
            return writeln!(out, "No saved tales yet.").map_err(console_error);
        }
        for tale in self.store.tales() {
            let audio = if tale.audio_path().is_some() { " [audio]" } else { "" };
            writeln!(
                out,
                "{}  {}  {}{}",
                tale.id(),
                tale.created_at().format("%Y-%m-%d %H:%M"),
                tale.prompt(),
                audio
            )
            .map_err(console_error)?;
        }
        Ok(())
    }

    pub fn show<W: Write>(&self, id: uuid::Uuid, out: &mut W) -> Result<(), TaleError> {
        let tale = self
            .store
            .get(id)
            .ok_or_else(|| TaleError::Validation(format!("no saved tale with id {id}")))?;
        writeln!(out, "Prompt: {}", tale.prompt()).map_err(console_error)?;
        writeln!(out, "Created: {}", tale.created_at().to_rfc3339()).map_err(console_error)?;
        if let Some(path) = tale.audio_path() {
            writeln!(out, "Audio: {}", path.display()).map_err(console_error)?;
        }
        writeln!(out, "\n{}", tale.content()).map_err(console_error)
    }

    async fn read_aloud(&self, tale: &Tale, audio_out: Option<&Path>) -> Result<PathBuf, TaleError> {
        let mut sink = AudioSink::new(ClipLoader);
        if let Some(dir) = &self.temp_dir {
            sink = sink.temp_dir(dir);
        }
        let stream = self.client.generate_audio(tale.content()).await?;
        let clip = sink.play(stream).await?;
        let path = audio_out
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_audio_path(tale, &clip));
        std::fs::write(&path, &clip.bytes)
            .map_err(|e| TaleError::Storage(format!("{}: {e}", path.display())))?;
        sink.reset();
        info!(path = %path.display(), bytes = clip.len(), "audio saved");
        Ok(path)
    }
}

fn default_audio_path(tale: &Tale, clip: &AudioClip) -> PathBuf {
    PathBuf::from(format!("tale-{}.{}", tale.id(), clip.format.extension()))
}

fn console_error(err: std::io::Error) -> TaleError {
    TaleError::Storage(format!("write to console: {err}"))
}

/// Resolves on the first Ctrl-C; never resolves when `enabled` is false.
///
/// One listener covers a whole command so a later phase is still
/// interruptible after an earlier one finished.
async fn ctrl_c_signal(enabled: bool) {
    if enabled {
        match tokio::signal::ctrl_c().await {
            Ok(()) => return,
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
        }
    }
    std::future::pending::<()>().await
}
