//! Document serialization with versioning and migration.
//!
//! The project-file layer and drag/drop both consume this: a full
//! [`TimelineDocument`] round-trips the model, while a [`DocumentFragment`]
//! carries a subset of clips to be inserted or overwritten at a drop target.

use framecut_core::{Result, TimelineError};
use serde::{Deserialize, Serialize};

use crate::clip::Clip;
use crate::marker::MarkerManager;
use crate::model::MultitrackModel;

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Versioned serialized form of the whole timeline.
#[derive(Debug, Serialize, Deserialize)]
pub struct TimelineDocument {
    /// Schema version for migration.
    pub version: u32,
    pub model: MultitrackModel,
    pub markers: MarkerManager,
    /// Application version that wrote this document.
    pub app_version: String,
}

impl TimelineDocument {
    pub fn new(model: MultitrackModel, markers: MarkerManager) -> Self {
        Self {
            version: CURRENT_VERSION,
            model,
            markers,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| {
            TimelineError::Serialization(format!("failed to serialize document: {}", e))
        })
    }

    /// Deserialize from JSON bytes, applying migrations if needed.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| TimelineError::Serialization(format!("invalid JSON: {}", e)))?;

        let version = raw.get("version").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        if version > CURRENT_VERSION {
            return Err(TimelineError::Serialization(format!(
                "document version {} is newer than supported version {}",
                version, CURRENT_VERSION
            )));
        }

        let migrated = migrate(raw, version)?;
        let document: Self = serde_json::from_value(migrated)
            .map_err(|e| TimelineError::Serialization(format!("failed to parse document: {}", e)))?;

        // A document from disk is untrusted: re-check the track invariant
        // before letting it anywhere near the engine.
        document.model.check_invariants()?;
        Ok(document)
    }
}

/// Apply sequential migrations from `from_version` to `CURRENT_VERSION`.
fn migrate(mut data: serde_json::Value, from_version: u32) -> Result<serde_json::Value> {
    let mut version = from_version;
    while version < CURRENT_VERSION {
        match version {
            0 => {
                // v0: a bare model with no wrapper.
                if data.get("version").is_none() {
                    data = serde_json::json!({
                        "version": 1,
                        "model": data,
                        "markers": MarkerManager::default(),
                        "app_version": "0.1.0",
                    });
                }
                version = 1;
            }
            _ => {
                return Err(TimelineError::Serialization(format!(
                    "no migration path from version {}",
                    version
                )));
            }
        }
    }
    Ok(data)
}

/// A clip payload for drag/drop: clip attributes with positions relative to
/// the fragment start. Fresh identities are assigned on insertion so a drop
/// is a copy, never an aliased reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentFragment {
    pub clips: Vec<Clip>,
}

impl DocumentFragment {
    /// Build a fragment from clips, rebasing positions so the earliest clip
    /// starts at 0.
    pub fn from_clips(mut clips: Vec<Clip>) -> Self {
        clips.sort_by_key(|c| c.position);
        let base = clips.first().map_or(0, |c| c.position);
        for clip in &mut clips {
            clip.position -= base;
        }
        Self { clips }
    }

    /// Total span covered by the fragment.
    pub fn length(&self) -> i64 {
        self.clips.iter().map(Clip::end).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            TimelineError::Serialization(format!("failed to serialize fragment: {}", e))
        })
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| TimelineError::Serialization(format!("invalid fragment: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{ClipSpec, TrackEntry};
    use framecut_core::ProducerHandle;

    fn sample_model() -> MultitrackModel {
        let mut model = MultitrackModel::default();
        let mut pos = 0;
        for len in [10, 20] {
            let mut clip = ClipSpec::with_range(ProducerHandle::new("a.mp4", 100), 0, len)
                .materialize(pos);
            clip.fade_in = 2;
            clip.gain = 0.5;
            model.tracks[0].entries.push(TrackEntry::Clip(clip));
            pos += len;
        }
        model
    }

    #[test]
    fn test_document_roundtrip_preserves_model() {
        let model = sample_model();
        let mut markers = MarkerManager::default();
        markers.create(5, "scene 1", "#ff0000");

        let doc = TimelineDocument::new(model.clone(), markers.clone());
        let json = doc.to_json().unwrap();
        let loaded = TimelineDocument::from_json(&json).unwrap();

        assert_eq!(loaded.version, CURRENT_VERSION);
        assert_eq!(loaded.model, model);
        assert_eq!(loaded.markers, markers);
    }

    #[test]
    fn test_v0_bare_model_migrates() {
        let model = sample_model();
        let raw = serde_json::to_vec(&model).unwrap();
        let loaded = TimelineDocument::from_json(&raw).unwrap();
        assert_eq!(loaded.version, CURRENT_VERSION);
        assert_eq!(loaded.model, model);
    }

    #[test]
    fn test_future_version_rejected() {
        let json = serde_json::json!({
            "version": 999,
            "model": {},
            "markers": {},
            "app_version": "99.0.0",
        });
        let data = serde_json::to_vec(&json).unwrap();
        assert!(TimelineDocument::from_json(&data).is_err());
    }

    #[test]
    fn test_corrupt_positions_rejected() {
        let mut model = sample_model();
        // Break the contiguity invariant.
        model.tracks[0].entries[1].set_position(99);
        let doc = TimelineDocument::new(model, MarkerManager::default());
        let json = doc.to_json().unwrap();
        assert!(TimelineDocument::from_json(&json).is_err());
    }

    #[test]
    fn test_fragment_rebases_positions() {
        let model = sample_model();
        let clips: Vec<Clip> = model.tracks[0]
            .entries
            .iter()
            .filter_map(|e| e.as_clip().cloned())
            .collect();
        let fragment = DocumentFragment::from_clips(clips);
        assert_eq!(fragment.clips[0].position, 0);
        assert_eq!(fragment.clips[1].position, 10);
        assert_eq!(fragment.length(), 30);

        let json = fragment.to_json().unwrap();
        let loaded = DocumentFragment::from_json(&json).unwrap();
        assert_eq!(loaded.clips.len(), 2);
    }
}
