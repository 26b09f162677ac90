//! Track: an ordered, contiguous sequence of clip/blank entries.
//!
//! This layer is mechanical: it maintains the contiguity invariant and offers
//! the primitive mutations (splice, split, join, trim) that edit commands are
//! built from. Business validation (locks, group atomicity, clamping policy)
//! lives in the engine.

use framecut_core::{FrameSpan, Result, TimelineError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clip::{Clip, TrackEntry};

/// Kind of track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Audio,
}

/// Composite mode for video tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositeMode {
    Over,
    None,
}

/// A single lane of the timeline.
///
/// Invariant: entries are strictly ordered, contiguous, and non-overlapping —
/// the end of entry `i` equals the stored position of entry `i + 1`, and the
/// first entry starts at frame 0. `check_invariants` verifies this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    pub name: String,
    pub kind: TrackKind,
    pub entries: Vec<TrackEntry>,
    pub locked: bool,
    pub hidden: bool,
    pub muted: bool,
    /// Compositing with lower video tracks. Ignored for audio tracks.
    pub composite: CompositeMode,
}

impl Track {
    pub fn new_video(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind: TrackKind::Video,
            entries: Vec::new(),
            locked: false,
            hidden: false,
            muted: false,
            composite: CompositeMode::Over,
        }
    }

    pub fn new_audio(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind: TrackKind::Audio,
            entries: Vec::new(),
            locked: false,
            hidden: false,
            muted: false,
            composite: CompositeMode::None,
        }
    }

    /// Track duration: the end of the last entry.
    pub fn duration(&self) -> i64 {
        self.entries.last().map_or(0, |entry| entry.end())
    }

    /// Number of clip entries (blanks excluded).
    pub fn clip_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.is_blank())
            .count()
    }

    /// The clip at `index`, if the entry is a clip.
    pub fn clip_at(&self, index: usize) -> Option<&Clip> {
        self.entries.get(index).and_then(TrackEntry::as_clip)
    }

    pub fn clip_at_mut(&mut self, index: usize) -> Option<&mut Clip> {
        self.entries.get_mut(index).and_then(TrackEntry::as_clip_mut)
    }

    /// Find a clip by identity. Returns (index, &Clip).
    pub fn find_clip(&self, id: Uuid) -> Option<(usize, &Clip)> {
        self.entries.iter().enumerate().find_map(|(i, entry)| {
            entry.as_clip().filter(|clip| clip.id == id).map(|c| (i, c))
        })
    }

    /// Index of the entry containing `frame`, if any.
    pub fn entry_index_at(&self, frame: i64) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.span().contains(frame))
    }

    /// Recompute stored positions from cumulative lengths.
    pub(crate) fn reindex(&mut self) {
        let mut position = 0;
        for entry in &mut self.entries {
            entry.set_position(position);
            position += entry.length();
        }
    }

    /// Verify the contiguity invariant and stored positions.
    pub fn check_invariants(&self) -> Result<()> {
        let mut expected = 0;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.length() <= 0 {
                return Err(TimelineError::InvalidIndex(format!(
                    "track {}: entry {} has non-positive length {}",
                    self.name,
                    i,
                    entry.length()
                )));
            }
            if entry.position() != expected {
                return Err(TimelineError::InvalidIndex(format!(
                    "track {}: entry {} starts at {} but previous ends at {}",
                    self.name,
                    i,
                    entry.position(),
                    expected
                )));
            }
            expected = entry.end();
        }
        Ok(())
    }

    // ── Primitive mutations ─────────────────────────────────────

    /// Replace the entries occupying `[at, at + remove_len)` with
    /// `replacement`, shifting later entries by the length difference.
    /// Returns the removed entries.
    ///
    /// `at` and `at + remove_len` must fall on entry boundaries (use
    /// [`split_at`](Self::split_at) first); `at` past the current duration
    /// pads the track with a blank.
    pub(crate) fn splice(
        &mut self,
        at: i64,
        remove_len: i64,
        replacement: Vec<TrackEntry>,
    ) -> Result<Vec<TrackEntry>> {
        let duration = self.duration();
        if at > duration {
            if remove_len > 0 {
                return Err(TimelineError::OutOfBounds(format!(
                    "splice at {} past track end {}",
                    at, duration
                )));
            }
            self.entries.push(TrackEntry::blank(duration, at - duration));
        }

        let span = FrameSpan::with_length(at, remove_len);
        let first = self
            .entries
            .iter()
            .position(|e| e.position() >= span.start)
            .unwrap_or(self.entries.len());
        let mut last = first;
        while last < self.entries.len() && self.entries[last].end() <= span.end {
            last += 1;
        }
        // Boundary misalignment means the caller forgot to split.
        if let Some(entry) = self.entries.get(first) {
            if remove_len > 0 && entry.position() != span.start {
                return Err(TimelineError::OutOfBounds(format!(
                    "splice start {} is not an entry boundary",
                    span.start
                )));
            }
        }
        let removed_end = self
            .entries
            .get(first..last)
            .map_or(at, |s| s.last().map_or(at, |e| e.end()));
        if remove_len > 0 && removed_end != span.end {
            return Err(TimelineError::OutOfBounds(format!(
                "splice end {} is not an entry boundary",
                span.end
            )));
        }

        let removed: Vec<TrackEntry> = self.entries.splice(first..last, replacement).collect();
        self.reindex();
        Ok(removed)
    }

    /// Split the entry containing `at` into two, the right half starting at
    /// `at`. A split clip's right half takes `right_id` as its identity so
    /// redo reproduces identical state. No-op if `at` is already a boundary.
    pub(crate) fn split_at(&mut self, at: i64, right_id: Uuid) -> Result<()> {
        let Some(index) = self.entry_index_at(at) else {
            return Err(TimelineError::OutOfBounds(format!(
                "no entry at frame {}",
                at
            )));
        };
        let entry = &self.entries[index];
        if entry.position() == at {
            return Ok(());
        }
        let left_len = at - entry.position();
        match &mut self.entries[index] {
            TrackEntry::Blank { length, .. } => {
                let right_len = *length - left_len;
                *length = left_len;
                self.entries
                    .insert(index + 1, TrackEntry::blank(at, right_len));
            }
            TrackEntry::Clip(clip) => {
                let mut right = clip.clone();
                right.id = right_id;
                right.in_point = clip.in_point + left_len;
                right.length = clip.length - left_len;
                right.position = at;
                right.fade_in = 0;
                clip.length = left_len;
                clip.fade_out = 0;
                self.entries.insert(index + 1, TrackEntry::Clip(right));
            }
        }
        Ok(())
    }

    /// Merge the two entries meeting at boundary `at` back into one.
    ///
    /// Clips must share a producer, speed, and contiguous source frames;
    /// blanks always join. Returns the identity of the removed right clip
    /// (None when joining blanks).
    pub(crate) fn join_at(&mut self, at: i64) -> Result<Option<Uuid>> {
        let right_index = self
            .entries
            .iter()
            .position(|e| e.position() == at)
            .ok_or_else(|| {
                TimelineError::OutOfBounds(format!("no entry boundary at frame {}", at))
            })?;
        if right_index == 0 {
            return Err(TimelineError::InvalidIndex(
                "cannot join at track start".into(),
            ));
        }
        let (left, right) = (&self.entries[right_index - 1], &self.entries[right_index]);
        match (left, right) {
            (TrackEntry::Blank { .. }, TrackEntry::Blank { length, .. }) => {
                let extra = *length;
                self.entries.remove(right_index);
                let prev_len = self.entries[right_index - 1].length();
                self.entries[right_index - 1].set_length(prev_len + extra);
                Ok(None)
            }
            (TrackEntry::Clip(l), TrackEntry::Clip(r)) => {
                if l.producer != r.producer
                    || l.speed != r.speed
                    || r.in_point != l.out_point()
                {
                    return Err(TimelineError::InvalidIndex(
                        "entries are not mergeable".into(),
                    ));
                }
                let removed_id = r.id;
                let extra = r.length;
                let fade_out = r.fade_out;
                self.entries.remove(right_index);
                let left = self.entries[right_index - 1]
                    .as_clip_mut()
                    .ok_or_else(|| TimelineError::InvalidIndex("expected clip".into()))?;
                left.length += extra;
                left.fade_out = fade_out;
                Ok(Some(removed_id))
            }
            _ => Err(TimelineError::InvalidIndex(
                "cannot join a clip with a blank".into(),
            )),
        }
    }

    /// Whether the entries at `index` and `index + 1` could be joined.
    pub fn mergeable_with_next(&self, index: usize) -> bool {
        match (self.entries.get(index), self.entries.get(index + 1)) {
            (Some(TrackEntry::Clip(l)), Some(TrackEntry::Clip(r))) => {
                l.producer == r.producer && l.speed == r.speed && r.in_point == l.out_point()
            }
            _ => false,
        }
    }

    /// Merge adjacent blanks. A trailing blank is reserved time (lifting the
    /// last clip leaves one) and must survive a save/load cycle, so blanks
    /// are merged but never dropped. Used when normalizing deserialized
    /// documents; edit commands never coalesce so they stay invertible.
    pub(crate) fn coalesce_blanks(&mut self) {
        let mut i = 0;
        while i + 1 < self.entries.len() {
            if self.entries[i].is_blank() && self.entries[i + 1].is_blank() {
                let extra = self.entries.remove(i + 1).length();
                let len = self.entries[i].length();
                self.entries[i].set_length(len + extra);
            } else {
                i += 1;
            }
        }
        self.reindex();
    }

    // ── Trim mechanics ──────────────────────────────────────────
    //
    // `delta` is the change to the clip's length: positive grows, negative
    // shrinks. Each branch is symmetric under negation so trim commands
    // invert by flipping the sign.

    /// Adjust the start boundary of the clip at `index`.
    pub(crate) fn apply_trim_in(
        &mut self,
        index: usize,
        delta: i64,
        ripple: bool,
        roll: bool,
    ) -> Result<()> {
        let clip = self
            .clip_at(index)
            .ok_or_else(|| TimelineError::InvalidIndex(format!("no clip at entry {}", index)))?;
        if clip.length + delta <= 0 {
            return Err(TimelineError::ZeroLength);
        }
        if delta > clip.head_room() {
            return Err(TimelineError::OutOfBounds(
                "trim before start of source".into(),
            ));
        }

        if roll {
            // The shared boundary moves; the previous clip's out point moves
            // with it. Total track duration is unchanged.
            let prev = index
                .checked_sub(1)
                .and_then(|i| self.clip_at(i))
                .ok_or_else(|| {
                    TimelineError::InvalidIndex("roll trim requires a preceding clip".into())
                })?;
            if prev.length - delta <= 0 {
                return Err(TimelineError::ZeroLength);
            }
            if delta < 0 && -delta > prev.tail_room() {
                return Err(TimelineError::OutOfBounds(
                    "roll past end of neighbor source".into(),
                ));
            }
            let prev = self.clip_at_mut(index - 1).expect("checked above");
            prev.length -= delta;
            let clip = self.clip_at_mut(index).expect("checked above");
            clip.in_point -= delta;
            clip.length += delta;
        } else if ripple {
            // Start stays anchored; the clip reaches further back into its
            // source and everything downstream shifts.
            let clip = self.clip_at_mut(index).expect("checked above");
            clip.in_point -= delta;
            clip.length += delta;
        } else {
            // Plain trim: consume or grow the blank before the clip.
            match index.checked_sub(1).map(|i| &self.entries[i]) {
                None => {
                    if delta > 0 {
                        return Err(TimelineError::Overlap(0));
                    }
                    // Shrinking the first clip opens a blank at frame 0.
                    let clip = self.clip_at_mut(index).expect("checked above");
                    clip.in_point -= delta;
                    clip.length += delta;
                    self.entries.insert(0, TrackEntry::blank(0, -delta));
                }
                Some(TrackEntry::Blank { length, .. }) => {
                    let blank_len = *length;
                    if delta > blank_len {
                        return Err(TimelineError::Overlap(self.entries[index - 1].position()));
                    }
                    let clip = self.clip_at_mut(index).expect("checked above");
                    clip.in_point -= delta;
                    clip.length += delta;
                    if delta == blank_len {
                        self.entries.remove(index - 1);
                    } else {
                        self.entries[index - 1].set_length(blank_len - delta);
                    }
                }
                Some(TrackEntry::Clip(prev)) => {
                    if delta > 0 {
                        return Err(TimelineError::Overlap(prev.end()));
                    }
                    let clip = self.clip_at_mut(index).expect("checked above");
                    clip.in_point -= delta;
                    clip.length += delta;
                    let at = self.entries[index - 1].end();
                    self.entries.insert(index, TrackEntry::blank(at, -delta));
                }
            }
        }
        self.reindex();
        Ok(())
    }

    /// Adjust the end boundary of the clip at `index`.
    pub(crate) fn apply_trim_out(
        &mut self,
        index: usize,
        delta: i64,
        ripple: bool,
        roll: bool,
    ) -> Result<()> {
        let clip = self
            .clip_at(index)
            .ok_or_else(|| TimelineError::InvalidIndex(format!("no clip at entry {}", index)))?;
        if clip.length + delta <= 0 {
            return Err(TimelineError::ZeroLength);
        }
        if delta > clip.tail_room() {
            return Err(TimelineError::OutOfBounds(
                "trim past end of source".into(),
            ));
        }

        if roll {
            let next = self.clip_at(index + 1).ok_or_else(|| {
                TimelineError::InvalidIndex("roll trim requires a following clip".into())
            })?;
            if next.length - delta <= 0 {
                return Err(TimelineError::ZeroLength);
            }
            if delta < 0 && -delta > next.head_room() {
                return Err(TimelineError::OutOfBounds(
                    "roll before start of neighbor source".into(),
                ));
            }
            let next = self.clip_at_mut(index + 1).expect("checked above");
            next.in_point += delta;
            next.length -= delta;
            let clip = self.clip_at_mut(index).expect("checked above");
            clip.length += delta;
        } else if ripple {
            let clip = self.clip_at_mut(index).expect("checked above");
            clip.length += delta;
        } else {
            match self.entries.get(index + 1) {
                None => {
                    // Last entry: the track simply gets longer or shorter.
                    let clip = self.clip_at_mut(index).expect("checked above");
                    clip.length += delta;
                }
                Some(TrackEntry::Blank { length, .. }) => {
                    let blank_len = *length;
                    if delta > blank_len {
                        return Err(TimelineError::Overlap(self.entries[index + 1].end()));
                    }
                    let clip = self.clip_at_mut(index).expect("checked above");
                    clip.length += delta;
                    if delta == blank_len {
                        self.entries.remove(index + 1);
                    } else {
                        self.entries[index + 1].set_length(blank_len - delta);
                    }
                }
                Some(TrackEntry::Clip(next)) => {
                    if delta > 0 {
                        return Err(TimelineError::Overlap(next.position));
                    }
                    let at = self.entries[index].end() + delta;
                    let clip = self.clip_at_mut(index).expect("checked above");
                    clip.length += delta;
                    self.entries.insert(index + 1, TrackEntry::blank(at, -delta));
                }
            }
        }
        self.reindex();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::ClipSpec;
    use framecut_core::ProducerHandle;
    use proptest::prelude::*;

    fn clip(len: i64) -> Clip {
        ClipSpec::with_range(ProducerHandle::new("src.mp4", 1000), 100, len).materialize(0)
    }

    fn track_with(lengths: &[i64]) -> Track {
        let mut track = Track::new_video("V1");
        for &len in lengths {
            track.entries.push(TrackEntry::Clip(clip(len)));
        }
        track.reindex();
        track
    }

    #[test]
    fn test_duration_and_positions() {
        let track = track_with(&[10, 20, 5]);
        assert_eq!(track.duration(), 35);
        assert_eq!(track.entries[1].position(), 10);
        assert_eq!(track.entries[2].position(), 30);
        track.check_invariants().unwrap();
    }

    #[test]
    fn test_splice_insert_shifts_later_entries() {
        let mut track = track_with(&[10, 10]);
        let inserted = clip(5);
        track.splice(10, 0, vec![TrackEntry::Clip(inserted)]).unwrap();
        assert_eq!(track.duration(), 25);
        assert_eq!(track.entries[2].position(), 15);
        track.check_invariants().unwrap();
    }

    #[test]
    fn test_splice_remove_closes_gap() {
        let mut track = track_with(&[10, 10, 10]);
        let removed = track.splice(10, 10, Vec::new()).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(track.duration(), 20);
        assert_eq!(track.entries[1].position(), 10);
        track.check_invariants().unwrap();
    }

    #[test]
    fn test_splice_rejects_misaligned_boundary() {
        let mut track = track_with(&[10, 10]);
        assert!(track.splice(5, 10, Vec::new()).is_err());
    }

    #[test]
    fn test_splice_pads_past_end() {
        let mut track = track_with(&[10]);
        track
            .splice(20, 0, vec![TrackEntry::Clip(clip(5))])
            .unwrap();
        assert_eq!(track.entries.len(), 3);
        assert!(track.entries[1].is_blank());
        assert_eq!(track.entries[1].span(), framecut_core::FrameSpan::new(10, 20));
        assert_eq!(track.duration(), 25);
        track.check_invariants().unwrap();
    }

    #[test]
    fn test_split_then_join_roundtrip() {
        let mut track = track_with(&[20]);
        let right_id = Uuid::new_v4();
        track.split_at(8, right_id).unwrap();
        assert_eq!(track.entries.len(), 2);
        assert_eq!(track.clip_at(0).unwrap().length, 8);
        assert_eq!(track.clip_at(1).unwrap().id, right_id);
        assert_eq!(track.clip_at(1).unwrap().in_point, 108);
        assert!(track.mergeable_with_next(0));

        let removed = track.join_at(8).unwrap();
        assert_eq!(removed, Some(right_id));
        assert_eq!(track.entries.len(), 1);
        assert_eq!(track.clip_at(0).unwrap().length, 20);
        track.check_invariants().unwrap();
    }

    #[test]
    fn test_join_rejects_different_sources() {
        let mut track = track_with(&[10]);
        let other =
            ClipSpec::with_range(ProducerHandle::new("other.mp4", 100), 0, 10).materialize(10);
        track.entries.push(TrackEntry::Clip(other));
        track.reindex();
        assert!(!track.mergeable_with_next(0));
        assert!(track.join_at(10).is_err());
    }

    #[test]
    fn test_trim_out_plain_consumes_blank() {
        let mut track = track_with(&[10]);
        track.entries.push(TrackEntry::blank(10, 5));
        track.entries.push(TrackEntry::Clip(clip(10)));
        track.reindex();

        track.apply_trim_out(0, 3, false, false).unwrap();
        assert_eq!(track.clip_at(0).unwrap().length, 13);
        assert_eq!(track.entries[1].length(), 2);
        assert_eq!(track.duration(), 25);

        // Exactly consuming the blank removes it.
        track.apply_trim_out(0, 2, false, false).unwrap();
        assert_eq!(track.entries.len(), 2);
        assert!(track.apply_trim_out(0, 1, false, false).is_err()); // next is a clip

        // Inverse restores the blank.
        track.apply_trim_out(0, -5, false, false).unwrap();
        assert_eq!(track.entries[1].length(), 5);
        track.check_invariants().unwrap();
    }

    #[test]
    fn test_trim_in_plain_first_clip() {
        let mut track = track_with(&[10, 10]);
        // Growing leftward at frame 0 has nowhere to go.
        assert!(track.apply_trim_in(0, 3, false, false).is_err());
        // Shrinking opens a blank at the front.
        track.apply_trim_in(0, -4, false, false).unwrap();
        assert!(track.entries[0].is_blank());
        assert_eq!(track.entries[0].length(), 4);
        assert_eq!(track.clip_at(1).unwrap().in_point, 104);
        assert_eq!(track.duration(), 20);
        track.check_invariants().unwrap();
    }

    #[test]
    fn test_trim_roll_preserves_duration() {
        let mut track = track_with(&[10, 10]);
        track.apply_trim_out(0, 4, false, true).unwrap();
        assert_eq!(track.clip_at(0).unwrap().length, 14);
        assert_eq!(track.clip_at(1).unwrap().length, 6);
        assert_eq!(track.clip_at(1).unwrap().in_point, 104);
        assert_eq!(track.duration(), 20);
        track.check_invariants().unwrap();
    }

    #[test]
    fn test_trim_rejects_zero_length() {
        let mut track = track_with(&[10]);
        assert!(matches!(
            track.apply_trim_out(0, -10, false, false),
            Err(TimelineError::ZeroLength)
        ));
    }

    #[test]
    fn test_trim_clamps_at_source_bounds() {
        let mut track = track_with(&[10]);
        // clip uses source [100, 110) of a 1000-frame producer
        assert!(track.apply_trim_out(0, 890, false, false).is_ok());
        let mut track = track_with(&[10]);
        assert!(track.apply_trim_out(0, 891, false, false).is_err());
    }

    #[test]
    fn test_coalesce_blanks() {
        let mut track = Track::new_video("V1");
        track.entries.push(TrackEntry::blank(0, 5));
        track.entries.push(TrackEntry::blank(5, 5));
        track.entries.push(TrackEntry::Clip(clip(10)));
        track.entries.push(TrackEntry::blank(20, 3));
        track.entries.push(TrackEntry::blank(23, 4));
        track.reindex();
        track.coalesce_blanks();
        // Leading blanks merge; the trailing blank merges but stays.
        assert_eq!(track.entries.len(), 3);
        assert_eq!(track.entries[0].length(), 10);
        assert_eq!(track.entries[2].length(), 7);
        assert_eq!(track.duration(), 27);
    }

    proptest! {
        /// Any sequence of boundary-aligned splices keeps the track
        /// contiguous with correct stored positions.
        #[test]
        fn prop_splice_preserves_contiguity(ops in prop::collection::vec((0usize..4, 1i64..30), 1..20)) {
            let mut track = track_with(&[10, 10, 10]);
            for (kind, len) in ops {
                let duration = track.duration();
                match kind {
                    0 => {
                        // insert at a random existing boundary
                        let boundaries: Vec<i64> =
                            track.entries.iter().map(|e| e.position()).collect();
                        let at = boundaries.get((len as usize) % boundaries.len().max(1)).copied().unwrap_or(0);
                        track.splice(at, 0, vec![TrackEntry::Clip(clip(len))]).unwrap();
                    }
                    1 => {
                        // append past the end (pads a blank)
                        track.splice(duration + len, 0, vec![TrackEntry::Clip(clip(len))]).unwrap();
                    }
                    2 => {
                        // remove the first entry
                        if let Some(first) = track.entries.first() {
                            let (at, l) = (first.position(), first.length());
                            track.splice(at, l, Vec::new()).unwrap();
                        }
                    }
                    _ => {
                        // lift the first entry into a blank
                        if let Some(first) = track.entries.first() {
                            let (at, l) = (first.position(), first.length());
                            track.splice(at, l, vec![TrackEntry::blank(at, l)]).unwrap();
                        }
                    }
                }
                prop_assert!(track.check_invariants().is_ok());
            }
        }
    }
}
