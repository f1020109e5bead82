//! Terminal front-end: write a fairytale live, save it, and read it aloud.

mod app;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use talegenie_core::observability::init_observability;

use crate::app::{App, TellOptions};
use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "talegenie", version, about = "Stream fairytales and read them aloud")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a new tale about PROMPT, printing it as it arrives.
    Tell {
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
        /// Save the finished tale to the local store.
        #[arg(long)]
        save: bool,
        /// Synthesize speech for the finished tale.
        #[arg(long)]
        speak: bool,
        /// Where to write the audio (defaults to tale-<id>.mp3).
        #[arg(long, value_name = "PATH")]
        audio_out: Option<PathBuf>,
    },
    /// Synthesize speech for a saved tale.
    Speak {
        id: uuid::Uuid,
        #[arg(long, value_name = "PATH")]
        audio_out: Option<PathBuf>,
    },
    /// List saved tales.
    List,
    /// Print a saved tale.
    Show { id: uuid::Uuid },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    config::init();
    init_observability();
    let cli = Cli::parse();
    let mut app = App::new(AppConfig::from_env()?)?;
    let mut stdout = std::io::stdout();

    match cli.command {
        Command::Tell {
            prompt,
            save,
            speak,
            audio_out,
        } => {
            let options = TellOptions {
                save,
                speak,
                audio_out,
            };
            let outcome = app.tell(&prompt.join(" "), &options, &mut stdout).await?;
            if outcome.saved {
                eprintln!("Saved tale {}", outcome.tale.id());
            }
            if let Some(path) = outcome.audio_path {
                eprintln!("Audio written to {}", path.display());
            }
        }
        Command::Speak { id, audio_out } => {
            let path = app.speak(id, audio_out.as_deref()).await?;
            eprintln!("Audio written to {}", path.display());
        }
        Command::List => app.list(&mut stdout)?,
        Command::Show { id } => app.show(id, &mut stdout)?,
    }
    Ok(())
}
