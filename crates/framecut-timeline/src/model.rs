//! The multitrack model: the ordered collection of tracks.
//!
//! Owns global duration and the cross-track lookup used by identity-based
//! selection and grouping. Mutations go through [`crate::undo::EditCommand`]
//! so every change is invertible; the model itself only offers mechanical
//! track management and queries.

use framecut_core::{FrameRate, Result, TimelineError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clip::Clip;
use crate::track::{Track, TrackKind};

/// The ordered list of tracks making up the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultitrackModel {
    pub tracks: Vec<Track>,
    pub frame_rate: FrameRate,
    /// When set, ripple removals apply the same shift at the same position
    /// on every unlocked track. Locked tracks are skipped, not a veto.
    pub ripple_all_tracks: bool,
}

impl MultitrackModel {
    pub fn new(frame_rate: FrameRate) -> Self {
        Self {
            tracks: Vec::new(),
            frame_rate,
            ripple_all_tracks: false,
        }
    }

    /// Global duration: the longest track's duration.
    pub fn duration(&self) -> i64 {
        self.tracks.iter().map(Track::duration).max().unwrap_or(0)
    }

    pub fn track(&self, index: usize) -> Result<&Track> {
        self.tracks
            .get(index)
            .ok_or_else(|| TimelineError::InvalidIndex(format!("no track {}", index)))
    }

    pub fn track_mut(&mut self, index: usize) -> Result<&mut Track> {
        self.tracks
            .get_mut(index)
            .ok_or_else(|| TimelineError::InvalidIndex(format!("no track {}", index)))
    }

    pub fn track_by_id(&self, id: Uuid) -> Result<&Track> {
        self.tracks
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| TimelineError::InvalidIndex(format!("no track with id {}", id)))
    }

    pub fn track_by_id_mut(&mut self, id: Uuid) -> Result<&mut Track> {
        self.tracks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| TimelineError::InvalidIndex(format!("no track with id {}", id)))
    }

    pub fn track_index(&self, id: Uuid) -> Result<usize> {
        self.tracks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| TimelineError::InvalidIndex(format!("no track with id {}", id)))
    }

    /// Locate a clip by stable identity. Returns (track index, entry index).
    pub fn find_clip(&self, id: Uuid) -> Option<(usize, usize)> {
        self.tracks.iter().enumerate().find_map(|(ti, track)| {
            track.find_clip(id).map(|(ci, _)| (ti, ci))
        })
    }

    /// The clip at (track, entry) indices, or `InvalidIndex`.
    pub fn clip(&self, track_index: usize, entry_index: usize) -> Result<&Clip> {
        self.track(track_index)?.clip_at(entry_index).ok_or_else(|| {
            TimelineError::InvalidIndex(format!(
                "no clip at track {} entry {}",
                track_index, entry_index
            ))
        })
    }

    /// All clips carrying the given group id, in track order.
    pub fn clips_in_group(&self, group: Uuid) -> Vec<Uuid> {
        self.tracks
            .iter()
            .flat_map(|track| track.entries.iter())
            .filter_map(|entry| entry.as_clip())
            .filter(|clip| clip.group == Some(group))
            .map(|clip| clip.id)
            .collect()
    }

    /// First index of an unlocked track of the given kind, if any.
    pub fn first_unlocked(&self, kind: TrackKind) -> Option<usize> {
        self.tracks
            .iter()
            .position(|t| t.kind == kind && !t.locked)
    }

    // ── Mechanical track management (used by commands) ──────────

    pub(crate) fn insert_track_at(&mut self, index: usize, track: Track) {
        let index = index.min(self.tracks.len());
        self.tracks.insert(index, track);
    }

    pub(crate) fn remove_track_at(&mut self, index: usize) -> Result<Track> {
        if index >= self.tracks.len() {
            return Err(TimelineError::InvalidIndex(format!("no track {}", index)));
        }
        Ok(self.tracks.remove(index))
    }

    pub(crate) fn move_track(&mut self, from: usize, to: usize) -> Result<()> {
        if from >= self.tracks.len() || to >= self.tracks.len() {
            return Err(TimelineError::InvalidIndex(format!(
                "track move {} -> {} out of range",
                from, to
            )));
        }
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);
        Ok(())
    }

    /// Verify the contiguity invariant on every track.
    pub fn check_invariants(&self) -> Result<()> {
        for track in &self.tracks {
            track.check_invariants()?;
        }
        Ok(())
    }
}

impl Default for MultitrackModel {
    fn default() -> Self {
        let mut model = Self::new(FrameRate::default());
        model.tracks.push(Track::new_video("V1"));
        model.tracks.push(Track::new_audio("A1"));
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{ClipSpec, TrackEntry};
    use framecut_core::ProducerHandle;

    fn model_with_clip() -> (MultitrackModel, Uuid) {
        let mut model = MultitrackModel::default();
        let clip = ClipSpec::with_range(ProducerHandle::new("a.mp4", 100), 0, 10).materialize(0);
        let id = clip.id;
        model.tracks[0].entries.push(TrackEntry::Clip(clip));
        (model, id)
    }

    #[test]
    fn test_duration_is_max_over_tracks() {
        let (mut model, _) = model_with_clip();
        assert_eq!(model.duration(), 10);
        let long = ClipSpec::with_range(ProducerHandle::new("b.mp4", 100), 0, 40).materialize(0);
        model.tracks[1].entries.push(TrackEntry::Clip(long));
        assert_eq!(model.duration(), 40);
    }

    #[test]
    fn test_find_clip_by_identity() {
        let (model, id) = model_with_clip();
        assert_eq!(model.find_clip(id), Some((0, 0)));
        assert_eq!(model.find_clip(Uuid::new_v4()), None);
    }

    #[test]
    fn test_move_track_reorders() {
        let mut model = MultitrackModel::default();
        let v1 = model.tracks[0].id;
        model.move_track(0, 1).unwrap();
        assert_eq!(model.tracks[1].id, v1);
        assert!(model.move_track(0, 5).is_err());
    }
}
