use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::errors::TaleError;

const SAVE_KEY: &str = "savedTales";

/// A generated story. Content never changes after creation.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tale {
    id: uuid::Uuid,
    prompt: String,
    content: String,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    audio_path: Option<PathBuf>,
}

impl Tale {
    pub fn new(prompt: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            prompt: prompt.into(),
            content: content.into(),
            created_at: Utc::now(),
            audio_path: None,
        }
    }

    /// Returns a copy of this tale that references a saved recording.
    pub fn with_audio(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            audio_path: Some(path.into()),
            ..self.clone()
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn audio_path(&self) -> Option<&Path> {
        self.audio_path.as_deref()
    }
}

/// Saved tales kept in a small JSON key-value file.
pub struct TaleStore {
    path: PathBuf,
    tales: Vec<Tale>,
}

impl TaleStore {
    /// Opens the store at `path`. A missing or unreadable file yields an
    /// empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tales = load_tales(&path);
        Self { path, tales }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tales(&self) -> &[Tale] {
        &self.tales
    }

    pub fn get(&self, id: uuid::Uuid) -> Option<&Tale> {
        self.tales.iter().find(|t| t.id == id)
    }

    /// Appends a tale and persists the store.
    pub fn save_tale(&mut self, tale: Tale) -> Result<(), TaleError> {
        if self.get(tale.id).is_some() {
            return Err(TaleError::Validation(format!("tale {} already saved", tale.id)));
        }
        self.tales.push(tale);
        self.persist()
    }

    /// Replaces a saved tale with a copy that references `audio_path`.
    pub fn attach_audio(
        &mut self,
        id: uuid::Uuid,
        audio_path: impl Into<PathBuf>,
    ) -> Result<&Tale, TaleError> {
        let idx = self
            .tales
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| TaleError::Validation(format!("unknown tale {id}")))?;
        self.tales[idx] = self.tales[idx].with_audio(audio_path);
        self.persist()?;
        Ok(&self.tales[idx])
    }

    fn persist(&self) -> Result<(), TaleError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| TaleError::storage(&parent.display().to_string(), e))?;
        }
        let mut doc = BTreeMap::new();
        doc.insert(SAVE_KEY, &self.tales);
        let encoded = serde_json::to_vec_pretty(&doc)
            .map_err(|e| TaleError::storage("encode tales", e))?;
        std::fs::write(&self.path, encoded)
            .map_err(|e| TaleError::storage(&self.path.display().to_string(), e))
    }
}

fn load_tales(path: &Path) -> Vec<Tale> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read tale store");
            return Vec::new();
        }
    };
    match serde_json::from_slice::<BTreeMap<String, Vec<Tale>>>(&data) {
        Ok(mut doc) => doc.remove(SAVE_KEY).unwrap_or_default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable tale store");
            Vec::new()
        }
    }
}
