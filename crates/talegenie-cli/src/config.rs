use std::{env, path::Path, path::PathBuf};

use talegenie_core::TaleError;
use talegenie_core::vendors::openai::OpenAiClientConfig;

const DEFAULT_STORE_PATH: &str = "talegenie.tales.json";

/// Load `.env` from the crate directory, then from the working directory.
pub fn init() {
    let _ = dotenvy::from_path(Path::new(
        format!("{}/.env", env!("CARGO_MANIFEST_DIR")).as_str(),
    ));
    dotenvy::dotenv().ok();
}

/// Get an environment variable, falling back to the type's default.
pub fn get_env<T: std::str::FromStr + Default>(key: &str) -> T {
    match env::var(key) {
        Ok(s) => match s.parse() {
            Ok(val) => val,
            Err(_) => {
                tracing::error!("Error parsing {}", key);
                T::default()
            }
        },
        Err(_) => T::default(),
    }
}

/// Everything the front-end needs, resolved once at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub client: OpenAiClientConfig,
    pub store_path: PathBuf,
    pub temp_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, TaleError> {
        let store_path = get_env::<String>("TALEGENIE_STORE_PATH");
        let temp_dir = get_env::<String>("TALEGENIE_TEMP_DIR");
        Ok(Self {
            client: OpenAiClientConfig::from_env()?,
            store_path: non_empty(store_path)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            temp_dir: non_empty(temp_dir).map(PathBuf::from),
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_treated_as_unset() {
        assert_eq!(non_empty("  ".into()), None);
        assert_eq!(non_empty(" out/tales.json ".into()).as_deref(), Some("out/tales.json"));
    }

    #[test]
    fn unset_values_fall_back_to_default() {
        assert_eq!(get_env::<u32>("TALEGENIE_TEST_SURELY_UNSET_KEY"), 0);
    }
}
