//! Selection bookkeeping.
//!
//! Three mutually exclusive modes: a set of clips, a whole track, or the
//! whole multitrack. Clips are referenced by stable identity so selection
//! survives the index renumbering caused by ripple edits and full reloads.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::SelectionAspect;
use crate::model::MultitrackModel;

/// A (track index, entry index) pair addressing a clip in the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipAddress {
    pub track: usize,
    pub index: usize,
}

impl ClipAddress {
    pub fn new(track: usize, index: usize) -> Self {
        Self { track, index }
    }
}

/// What is selected. Modes are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionState {
    #[default]
    None,
    /// Clip identities, in selection order.
    Clips(Vec<Uuid>),
    /// A whole track, by identity.
    Track(Uuid),
    /// The whole multitrack.
    Multitrack,
}

/// Identity-based snapshot used by the undo stack and by `save`/`restore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSnapshot {
    pub state: SelectionState,
    pub current_track: usize,
}

/// Tracks the current selection and the current-track pointer.
#[derive(Debug, Default)]
pub struct SelectionManager {
    state: SelectionState,
    /// Track used by track-scoped operations (append, record).
    current_track: usize,
    saved: Option<SelectionSnapshot>,
    /// Aspects changed since the last flush; drained by the engine so a
    /// burst of remaps yields one externally visible notification.
    pending: Vec<SelectionAspect>,
}

impl SelectionManager {
    /// Replace the selection with the clips at the given addresses.
    /// Addresses that do not resolve to a clip are ignored.
    pub fn select(&mut self, model: &MultitrackModel, addresses: &[ClipAddress]) {
        let ids = resolve(model, addresses);
        self.set_state(if ids.is_empty() {
            SelectionState::None
        } else {
            SelectionState::Clips(ids)
        });
    }

    /// Add clips to an existing clip selection (or start one).
    pub fn add_to_selection(&mut self, model: &MultitrackModel, addresses: &[ClipAddress]) {
        let mut ids = match &self.state {
            SelectionState::Clips(ids) => ids.clone(),
            _ => Vec::new(),
        };
        for id in resolve(model, addresses) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        if !ids.is_empty() {
            self.set_state(SelectionState::Clips(ids));
        }
    }

    pub fn clear(&mut self) {
        self.set_state(SelectionState::None);
    }

    /// Select every clip on every track.
    pub fn select_all(&mut self, model: &MultitrackModel) {
        let ids: Vec<Uuid> = model
            .tracks
            .iter()
            .flat_map(|t| t.entries.iter())
            .filter_map(|e| e.as_clip())
            .map(|c| c.id)
            .collect();
        self.set_state(if ids.is_empty() {
            SelectionState::None
        } else {
            SelectionState::Clips(ids)
        });
    }

    /// Select every clip on one track.
    pub fn select_all_on_track(&mut self, model: &MultitrackModel, track: usize) {
        let Some(track_ref) = model.tracks.get(track) else {
            return;
        };
        let ids: Vec<Uuid> = track_ref
            .entries
            .iter()
            .filter_map(|e| e.as_clip())
            .map(|c| c.id)
            .collect();
        self.set_current_track(track);
        self.set_state(if ids.is_empty() {
            SelectionState::None
        } else {
            SelectionState::Clips(ids)
        });
    }

    /// Select the whole multitrack, clearing any clip or track selection.
    pub fn select_multitrack(&mut self) {
        self.set_state(SelectionState::Multitrack);
        self.note(SelectionAspect::Multitrack);
    }

    /// Select a whole track head, clearing any clip or multitrack selection.
    pub fn select_track(&mut self, model: &MultitrackModel, track: usize) {
        if let Some(track_ref) = model.tracks.get(track) {
            self.set_current_track(track);
            self.set_state(SelectionState::Track(track_ref.id));
            self.note(SelectionAspect::Track);
        }
    }

    pub fn is_multitrack_selected(&self) -> bool {
        self.state == SelectionState::Multitrack
    }

    /// Index of the selected track, if a track is selected and still exists.
    pub fn selected_track(&self, model: &MultitrackModel) -> Option<usize> {
        match &self.state {
            SelectionState::Track(id) => model.track_index(*id).ok(),
            _ => None,
        }
    }

    /// The selected clip identities, in selection order.
    pub fn selected_clips(&self) -> &[Uuid] {
        match &self.state {
            SelectionState::Clips(ids) => ids,
            _ => &[],
        }
    }

    /// Resolve the selection to current (track, index) addresses.
    pub fn selected_addresses(&self, model: &MultitrackModel) -> Vec<ClipAddress> {
        self.selected_clips()
            .iter()
            .filter_map(|id| model.find_clip(*id))
            .map(|(track, index)| ClipAddress::new(track, index))
            .collect()
    }

    pub fn current_track(&self) -> usize {
        self.current_track
    }

    pub fn set_current_track(&mut self, track: usize) {
        if self.current_track != track {
            self.current_track = track;
            self.note(SelectionAspect::CurrentTrack);
        }
    }

    /// Drop selected ids whose clips no longer exist. Called after every
    /// structural mutation; the identity-based state needs no index remap.
    pub fn prune(&mut self, model: &MultitrackModel) {
        let next = match &self.state {
            SelectionState::Clips(ids) => {
                let live: Vec<Uuid> = ids
                    .iter()
                    .copied()
                    .filter(|id| model.find_clip(*id).is_some())
                    .collect();
                if live.len() == ids.len() {
                    return;
                }
                if live.is_empty() {
                    SelectionState::None
                } else {
                    SelectionState::Clips(live)
                }
            }
            SelectionState::Track(id) => {
                if model.track_index(*id).is_ok() {
                    return;
                }
                SelectionState::None
            }
            _ => return,
        };
        self.set_state(next);
    }

    // ── Snapshots ───────────────────────────────────────────────

    pub fn snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            state: self.state.clone(),
            current_track: self.current_track,
        }
    }

    /// Apply a snapshot, then drop dead identities.
    pub fn apply_snapshot(&mut self, model: &MultitrackModel, snapshot: SelectionSnapshot) {
        self.set_state(snapshot.state);
        self.set_current_track(snapshot.current_track);
        self.prune(model);
    }

    /// Save the current selection and clear it (used around full reloads).
    pub fn save_snapshot(&mut self) {
        self.saved = Some(self.snapshot());
        self.clear();
    }

    /// Restore the saved selection by identity.
    pub fn restore(&mut self, model: &MultitrackModel) {
        if let Some(saved) = self.saved.take() {
            self.apply_snapshot(model, saved);
        }
    }

    // ── Pending change aspects ──────────────────────────────────

    /// Drain the accumulated change aspects. Empty when nothing changed
    /// since the last flush.
    pub fn take_pending(&mut self) -> Vec<SelectionAspect> {
        std::mem::take(&mut self.pending)
    }

    fn set_state(&mut self, state: SelectionState) {
        if self.state != state {
            self.state = state;
            self.note(SelectionAspect::Clips);
        }
    }

    fn note(&mut self, aspect: SelectionAspect) {
        if !self.pending.contains(&aspect) {
            self.pending.push(aspect);
        }
    }
}

fn resolve(model: &MultitrackModel, addresses: &[ClipAddress]) -> Vec<Uuid> {
    addresses
        .iter()
        .filter_map(|addr| {
            model
                .tracks
                .get(addr.track)
                .and_then(|t| t.clip_at(addr.index))
                .map(|c| c.id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{ClipSpec, TrackEntry};
    use framecut_core::ProducerHandle;

    fn model_with_clips(count: usize) -> MultitrackModel {
        let mut model = MultitrackModel::default();
        for _ in 0..count {
            let clip =
                ClipSpec::with_range(ProducerHandle::new("a.mp4", 100), 0, 10).materialize(0);
            model.tracks[0].entries.push(TrackEntry::Clip(clip));
        }
        model.tracks[0].entries = {
            let mut entries = std::mem::take(&mut model.tracks[0].entries);
            let mut pos = 0;
            for e in &mut entries {
                e.set_position(pos);
                pos += e.length();
            }
            entries
        };
        model
    }

    #[test]
    fn test_modes_are_mutually_exclusive() {
        let model = model_with_clips(2);
        let mut sel = SelectionManager::default();

        sel.select(&model, &[ClipAddress::new(0, 0)]);
        assert_eq!(sel.selected_clips().len(), 1);

        sel.select_multitrack();
        assert!(sel.is_multitrack_selected());
        assert!(sel.selected_clips().is_empty());

        sel.select_track(&model, 0);
        assert!(!sel.is_multitrack_selected());
        assert_eq!(sel.selected_track(&model), Some(0));

        sel.select(&model, &[ClipAddress::new(0, 1)]);
        assert_eq!(sel.selected_track(&model), None);
    }

    #[test]
    fn test_prune_drops_dead_identities() {
        let mut model = model_with_clips(2);
        let mut sel = SelectionManager::default();
        sel.select_all(&model);
        assert_eq!(sel.selected_clips().len(), 2);

        model.tracks[0].entries.remove(0);
        sel.prune(&model);
        assert_eq!(sel.selected_clips().len(), 1);
    }

    #[test]
    fn test_snapshot_survives_reorder() {
        let mut model = model_with_clips(3);
        let mut sel = SelectionManager::default();
        sel.select(&model, &[ClipAddress::new(0, 2)]);
        let id = sel.selected_clips()[0];

        sel.save_snapshot();
        assert!(sel.selected_clips().is_empty());

        // Simulate a ripple: the clip moves to index 1.
        model.tracks[0].entries.remove(0);
        sel.restore(&model);
        assert_eq!(sel.selected_clips(), &[id]);
        assert_eq!(sel.selected_addresses(&model), vec![ClipAddress::new(0, 1)]);
    }

    #[test]
    fn test_pending_aspects_accumulate_once() {
        let model = model_with_clips(2);
        let mut sel = SelectionManager::default();
        sel.select(&model, &[ClipAddress::new(0, 0)]);
        sel.add_to_selection(&model, &[ClipAddress::new(0, 1)]);
        sel.set_current_track(1);

        let aspects = sel.take_pending();
        assert_eq!(aspects.len(), 2); // Clips (deduped) + CurrentTrack
        assert!(aspects.contains(&SelectionAspect::Clips));
        assert!(aspects.contains(&SelectionAspect::CurrentTrack));
        assert!(sel.take_pending().is_empty());
    }

    #[test]
    fn test_select_all_on_track_sets_current() {
        let model = model_with_clips(2);
        let mut sel = SelectionManager::default();
        sel.select_all_on_track(&model, 0);
        assert_eq!(sel.current_track(), 0);
        assert_eq!(sel.selected_clips().len(), 2);
    }
}
