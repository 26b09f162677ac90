//! Opaque handles to external media sources.
//!
//! The engine stores a producer handle plus in/out/speed and never interprets
//! the payload; decoding and playback belong to external collaborators.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TimelineError};

/// Reference to a decodable media source owned by an external subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerHandle {
    /// Locator understood by the external media layer (path, URL, ...).
    pub uri: String,
    /// Total length of the source in frames.
    pub length: i64,
    /// Whether the source supports random access. Non-seekable sources
    /// (live inputs) cannot be trimmed or split.
    pub seekable: bool,
    /// Content hash, when known, for bulk replace-by-hash.
    pub hash: Option<String>,
    /// Whether the source carries an audio stream.
    pub has_audio: bool,
}

impl ProducerHandle {
    /// Create a seekable handle with no hash.
    pub fn new(uri: impl Into<String>, length: i64) -> Self {
        Self {
            uri: uri.into(),
            length,
            seekable: true,
            hash: None,
            has_audio: true,
        }
    }

    /// Reject non-seekable sources for operations that require random access.
    pub fn require_seekable(&self) -> Result<()> {
        if self.seekable {
            Ok(())
        } else {
            Err(TimelineError::NonSeekableSource(self.uri.clone()))
        }
    }

    /// An audio-only view of the same source, used when detaching audio.
    pub fn audio_only(&self) -> Self {
        Self {
            uri: format!("audio:{}", self.uri),
            length: self.length,
            seekable: self.seekable,
            hash: self.hash.clone(),
            has_audio: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_seekable() {
        let mut handle = ProducerHandle::new("clip.mp4", 100);
        assert!(handle.require_seekable().is_ok());
        handle.seekable = false;
        assert!(matches!(
            handle.require_seekable(),
            Err(TimelineError::NonSeekableSource(_))
        ));
    }
}
