use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "warn";
const DEFAULT_LOG_FILE: &str = "talegenie.logs.jsonl";

/// Where log records are written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogOutput {
    /// Compact lines on stderr, so stdout stays reserved for story text.
    Stderr,
    /// JSON lines appended to `dir/file_name`.
    JsonFile { dir: PathBuf, file_name: String },
}

/// Logging setup resolved from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub filter: String,
    pub output: LogOutput,
}

impl LogSettings {
    /// Reads the process environment.
    ///
    /// - `TALEGENIE_OBSERVABILITY`: `off`/`false`/`0`/... disables logging (default enabled).
    /// - `TALEGENIE_LOG_LEVEL`: filter directive, wins over `RUST_LOG`.
    /// - `RUST_LOG`: filter directive used when the above is unset or invalid.
    /// - `TALEGENIE_JSON_LOG_PATH`: write JSON lines to this file instead of stderr.
    ///
    /// Returns `None` when logging is disabled.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let enabled = lookup("TALEGENIE_OBSERVABILITY")
            .and_then(|v| parse_flag(&v))
            .unwrap_or(true);
        if !enabled {
            return None;
        }

        let filter = ["TALEGENIE_LOG_LEVEL", "RUST_LOG"]
            .into_iter()
            .filter_map(|key| lookup(key))
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty() && EnvFilter::try_new(v).is_ok())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());

        let output = match lookup("TALEGENIE_JSON_LOG_PATH").filter(|p| !p.trim().is_empty()) {
            Some(raw) => json_file(Path::new(raw.trim())),
            None => LogOutput::Stderr,
        };
        Some(Self { filter, output })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn json_file(path: &Path) -> LogOutput {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    LogOutput::JsonFile { dir, file_name }
}

/// Installs the global subscriber described by `settings`.
///
/// Does nothing if another subscriber is already installed.
pub fn install(settings: &LogSettings) {
    let filter =
        EnvFilter::try_new(&settings.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    match &settings.output {
        LogOutput::JsonFile { dir, file_name } => {
            let _ = std::fs::create_dir_all(dir);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(tracing_appender::rolling::never(dir, file_name));
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .try_init();
        }
        LogOutput::Stderr => {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr);
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(console_layer)
                .try_init();
        }
    }
}

/// Initialize logging from the environment once per process.
pub fn init_observability() {
    INIT.get_or_init(|| {
        if let Some(settings) = LogSettings::from_env() {
            install(&settings);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(pairs: &[(&str, &str)]) -> Option<LogSettings> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_to_warn_on_stderr() {
        assert_eq!(
            resolve(&[]),
            Some(LogSettings {
                filter: "warn".into(),
                output: LogOutput::Stderr,
            })
        );
    }

    #[test]
    fn flag_can_disable_logging() {
        assert_eq!(resolve(&[("TALEGENIE_OBSERVABILITY", " OFF ")]), None);
        assert!(resolve(&[("TALEGENIE_OBSERVABILITY", "maybe")]).is_some());
    }

    #[test]
    fn level_override_wins_and_invalid_directives_fall_through() {
        let settings = resolve(&[("TALEGENIE_LOG_LEVEL", "debug"), ("RUST_LOG", "trace")]).unwrap();
        assert_eq!(settings.filter, "debug");

        let settings = resolve(&[("TALEGENIE_LOG_LEVEL", "talegenie=loud"), ("RUST_LOG", "info")]).unwrap();
        assert_eq!(settings.filter, "info");
    }

    #[test]
    fn json_path_splits_into_dir_and_file() {
        let settings = resolve(&[("TALEGENIE_JSON_LOG_PATH", "logs/run.jsonl")]).unwrap();
        assert_eq!(
            settings.output,
            LogOutput::JsonFile {
                dir: PathBuf::from("logs"),
                file_name: "run.jsonl".into(),
            }
        );

        let settings = resolve(&[("TALEGENIE_JSON_LOG_PATH", "run.jsonl")]).unwrap();
        assert_eq!(
            settings.output,
            LogOutput::JsonFile {
                dir: PathBuf::from("."),
                file_name: "run.jsonl".into(),
            }
        );
    }

    #[test]
    fn init_is_idempotent() {
        init_observability();
        init_observability();
    }
}
