use std::path::Path;

use bytes::Bytes;

use crate::errors::PlaybackError;

/// Capability that turns a staged audio file into something playable.
///
/// The returned handle must not depend on the file still existing; the file
/// is removed as soon as `open` returns.
pub trait AudioPlayer: Send + Sync {
    type Handle;

    fn open(&self, path: &Path) -> Result<Self::Handle, PlaybackError>;
}

/// Container formats recognized by `ClipLoader`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
    Ogg,
    Flac,
}

impl AudioFormat {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [b'I', b'D', b'3', ..] => Some(Self::Mp3),
            [0xFF, second, ..] if second & 0xE0 == 0xE0 => Some(Self::Mp3),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Some(Self::Wav),
            [b'O', b'g', b'g', b'S', ..] => Some(Self::Ogg),
            [b'f', b'L', b'a', b'C', ..] => Some(Self::Flac),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
        }
    }
}

/// Fully loaded audio ready to be played or saved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioClip {
    pub format: AudioFormat,
    pub bytes: Bytes,
}

impl AudioClip {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// `AudioPlayer` that reads the staged file into memory and checks its
/// container signature.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClipLoader;

impl AudioPlayer for ClipLoader {
    type Handle = AudioClip;

    fn open(&self, path: &Path) -> Result<AudioClip, PlaybackError> {
        let bytes = std::fs::read(path)
            .map_err(|e| PlaybackError::Unreadable(format!("{}: {e}", path.display())))?;
        let format = AudioFormat::sniff(&bytes).ok_or_else(|| {
            PlaybackError::Unsupported(format!(
                "{} bytes without a known audio signature",
                bytes.len()
            ))
        })?;
        Ok(AudioClip {
            format,
            bytes: Bytes::from(bytes),
        })
    }
}
