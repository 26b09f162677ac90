//! The edit operation engine.
//!
//! [`Timeline`] bundles the multitrack model, selection, groups, markers,
//! and undo stack into one explicit context. Every mutating operation:
//!
//! 1. validates against the current model (locks, bounds, zero-length),
//! 2. builds invertible commands and applies them to a scratch copy,
//! 3. swaps the copy in only when every step succeeded (all-or-nothing),
//! 4. prunes the selection, records the command, and notifies observers.
//!
//! Operations targeting a grouped clip propagate the same delta to every
//! member; a failure on any member rejects the whole batch. Interactive
//! trims follow an explicit begin/update/commit-or-abort protocol so a
//! whole drag lands as one undo entry.

use framecut_core::{FrameRate, FrameSpan, ProducerHandle, Result, TimelineError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clip::{Clip, ClipSpec, TrackEntry};
use crate::events::{ChangeEvent, Observers, TimelineObserver};
use crate::group::GroupManager;
use crate::marker::MarkerManager;
use crate::model::MultitrackModel;
use crate::selection::{ClipAddress, SelectionManager, SelectionSnapshot};
use crate::serialization::{DocumentFragment, TimelineDocument};
use crate::track::{Track, TrackKind};
use crate::undo::{EditCommand, UndoEntry, UndoStack};

/// Which clip boundary a trim adjusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimSide {
    In,
    Out,
}

/// Completion report from the external job subsystem.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub success: bool,
    pub producer: Option<ProducerHandle>,
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn succeeded(producer: ProducerHandle) -> Self {
        Self {
            success: true,
            producer: Some(producer),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            producer: None,
            error: Some(error.into()),
        }
    }
}

/// In-progress interactive trim.
#[derive(Debug)]
struct TrimDrag {
    clip_id: Uuid,
    side: TrimSide,
    ripple: bool,
    roll: bool,
    /// Net delta applied so far.
    applied: i64,
    /// Model state at `begin_trim`, restored on abort.
    baseline: MultitrackModel,
    before: SelectionSnapshot,
}

/// In-flight recording job.
#[derive(Debug)]
struct RecordJob {
    track_id: Uuid,
}

/// The editing context: model, bookkeeping managers, undo history, and
/// observer registry, threaded through every operation explicitly.
#[derive(Debug, Default)]
pub struct Timeline {
    pub model: MultitrackModel,
    pub selection: SelectionManager,
    pub groups: GroupManager,
    pub markers: MarkerManager,
    undo: UndoStack,
    observers: Observers,
    drag: Option<TrimDrag>,
    recording: Option<RecordJob>,
}

impl Timeline {
    pub fn new(frame_rate: FrameRate) -> Self {
        let mut model = MultitrackModel::new(frame_rate);
        model.tracks.push(Track::new_video("V1"));
        model.tracks.push(Track::new_audio("A1"));
        Self {
            model,
            undo: UndoStack::new(200),
            ..Default::default()
        }
    }

    // ── Observers ───────────────────────────────────────────────

    pub fn add_observer(&mut self, observer: Box<dyn TimelineObserver>) {
        self.observers.add(observer);
    }

    fn emit(&mut self, event: ChangeEvent) {
        self.observers.emit(&event);
    }

    /// Deliver one coalesced selection notification for everything that
    /// changed since the last flush. Intended to be driven by the host's
    /// scheduling tick so a burst of remaps yields one event.
    pub fn flush_selection_changes(&mut self) {
        let aspects = self.selection.take_pending();
        if !aspects.is_empty() {
            self.emit(ChangeEvent::SelectionChanged { aspects });
        }
    }

    // ── Clip operations ─────────────────────────────────────────

    /// Open space at `position` and insert a clip; later entries shift right.
    pub fn insert(
        &mut self,
        track_index: usize,
        position: i64,
        spec: ClipSpec,
    ) -> Result<ClipAddress> {
        let clip = self.validated_clip(track_index, position, &spec)?;
        let clip_id = clip.id;
        let track_id = self.model.track(track_index)?.id;
        debug!(track = track_index, position, "insert");

        let before = self.selection.snapshot();
        let mut trial = self.model.clone();
        let mut cmds = Vec::new();
        plan_insert(&mut trial, track_id, clip, &mut cmds)?;
        self.finalize(trial, cmds, before)?;

        let address = self.address_of(clip_id);
        self.emit(ChangeEvent::ClipInserted {
            track: address.track,
            index: address.index,
        });
        Ok(address)
    }

    /// Replace `[position, position + length)` with a new clip. Track
    /// duration changes only when the clip extends past the current end.
    pub fn overwrite(
        &mut self,
        track_index: usize,
        position: i64,
        spec: ClipSpec,
    ) -> Result<ClipAddress> {
        let clip = self.validated_clip(track_index, position, &spec)?;
        let clip_id = clip.id;
        let track_id = self.model.track(track_index)?.id;
        debug!(track = track_index, position, "overwrite");

        let before = self.selection.snapshot();
        let mut trial = self.model.clone();
        let mut cmds = Vec::new();
        plan_overwrite(&mut trial, track_id, clip, &mut cmds)?;
        self.finalize(trial, cmds, before)?;

        let address = self.address_of(clip_id);
        self.emit(ChangeEvent::ClipInserted {
            track: address.track,
            index: address.index,
        });
        Ok(address)
    }

    /// Insert at the end of the track.
    pub fn append(&mut self, track_index: usize, spec: ClipSpec) -> Result<ClipAddress> {
        let position = self.model.track(track_index)?.duration();
        self.insert(track_index, position, spec)
    }

    /// Append to the current track (track-scoped convenience used by the
    /// playhead-driven append action).
    pub fn append_to_current(&mut self, spec: ClipSpec) -> Result<ClipAddress> {
        self.append(self.selection.current_track(), spec)
    }

    /// Replace the entry with a blank of equal length. Duration is
    /// unchanged; lifting an already-blank entry is a no-op.
    pub fn lift(&mut self, track_index: usize, index: usize) -> Result<()> {
        let track = self.model.track(track_index)?;
        if track.locked {
            return Err(TimelineError::LockedTrack);
        }
        let Some(entry) = track.entries.get(index) else {
            return Err(TimelineError::InvalidIndex(format!(
                "no entry {} on track {}",
                index, track_index
            )));
        };
        if entry.is_blank() {
            return Ok(());
        }
        let (track_id, at, len) = (track.id, entry.position(), entry.length());
        debug!(track = track_index, index, "lift");

        let before = self.selection.snapshot();
        let mut trial = self.model.clone();
        let mut cmds = Vec::new();
        plan_step(
            &mut trial,
            EditCommand::Splice {
                track_id,
                at,
                remove_len: len,
                insert: vec![TrackEntry::blank(at, len)],
                removed: Vec::new(),
            },
            &mut cmds,
        )?;
        self.finalize(trial, cmds, before)?;
        self.emit(ChangeEvent::ClipRemoved { track: track_index });
        Ok(())
    }

    /// Remove the entry. With `ripple`, later entries shift left to close
    /// the gap (and the same span closes on every unlocked track when
    /// `ripple_all_tracks` is set); without, the span becomes a blank.
    pub fn remove(&mut self, track_index: usize, index: usize, ripple: bool) -> Result<()> {
        if !ripple {
            return self.lift(track_index, index);
        }
        let track = self.model.track(track_index)?;
        if track.locked {
            return Err(TimelineError::LockedTrack);
        }
        let Some(entry) = track.entries.get(index) else {
            return Err(TimelineError::InvalidIndex(format!(
                "no entry {} on track {}",
                index, track_index
            )));
        };
        let (target_id, at, len) = (track.id, entry.position(), entry.length());
        debug!(track = track_index, index, len, "ripple remove");

        let before = self.selection.snapshot();
        let mut trial = self.model.clone();
        let mut cmds = Vec::new();
        plan_step(
            &mut trial,
            EditCommand::Splice {
                track_id: target_id,
                at,
                remove_len: len,
                insert: Vec::new(),
                removed: Vec::new(),
            },
            &mut cmds,
        )?;

        let mut affected = vec![track_index];
        if self.model.ripple_all_tracks {
            let others: Vec<(usize, Uuid)> = trial
                .tracks
                .iter()
                .enumerate()
                .filter(|(i, t)| *i != track_index && !t.locked)
                .map(|(i, t)| (i, t.id))
                .collect();
            for (other_index, other_id) in others {
                let duration = trial.track_by_id(other_id)?.duration();
                if at >= duration {
                    continue;
                }
                let span_len = len.min(duration - at);
                plan_clear_span(&mut trial, other_id, at, span_len, &mut cmds)?;
                affected.push(other_index);
            }
        }
        self.finalize(trial, cmds, before)?;
        for track in affected {
            self.emit(ChangeEvent::ClipRemoved { track });
        }
        Ok(())
    }

    /// Adjust the start boundary of a clip by `delta` frames (positive
    /// grows). Clamped to the source head room; returns the applied delta.
    pub fn trim_in(
        &mut self,
        track_index: usize,
        index: usize,
        delta: i64,
        ripple: bool,
        roll: bool,
    ) -> Result<i64> {
        self.trim(track_index, index, TrimSide::In, delta, ripple, roll)
    }

    /// Adjust the end boundary of a clip by `delta` frames (positive grows).
    pub fn trim_out(
        &mut self,
        track_index: usize,
        index: usize,
        delta: i64,
        ripple: bool,
        roll: bool,
    ) -> Result<i64> {
        self.trim(track_index, index, TrimSide::Out, delta, ripple, roll)
    }

    fn trim(
        &mut self,
        track_index: usize,
        index: usize,
        side: TrimSide,
        delta: i64,
        ripple: bool,
        roll: bool,
    ) -> Result<i64> {
        let track = self.model.track(track_index)?;
        if track.locked {
            return Err(TimelineError::LockedTrack);
        }
        let clip = track.clip_at(index).ok_or_else(|| {
            TimelineError::InvalidIndex(format!("no clip at track {} entry {}", track_index, index))
        })?;
        clip.producer.require_seekable()?;
        let delta = clamp_trim(clip, side, delta)?;
        if delta == 0 {
            return Ok(0);
        }

        // An operation on a grouped clip propagates the same delta to every
        // member, re-validating per member; any failure rejects the whole.
        let members = self.gather_members(clip.id, clip.group)?;
        for (member_track, member_clip) in &members {
            let track = self.model.track_by_id(*member_track)?;
            if track.locked {
                return Err(TimelineError::LockedTrack);
            }
            let (_, member) = track.find_clip(*member_clip).ok_or_else(|| {
                TimelineError::InvalidIndex(format!("no clip {}", member_clip))
            })?;
            member.producer.require_seekable()?;
            if clamp_trim(member, side, delta)? != delta {
                return Err(TimelineError::OutOfBounds(
                    "group member cannot trim by the full delta".into(),
                ));
            }
        }
        debug!(track = track_index, index, delta, ripple, roll, "trim");

        let before = self.selection.snapshot();
        let mut trial = self.model.clone();
        let mut cmds = Vec::new();
        for (member_track, member_clip) in &members {
            let command = match side {
                TrimSide::In => EditCommand::TrimIn {
                    track_id: *member_track,
                    clip_id: *member_clip,
                    delta,
                    ripple,
                    roll,
                },
                TrimSide::Out => EditCommand::TrimOut {
                    track_id: *member_track,
                    clip_id: *member_clip,
                    delta,
                    ripple,
                    roll,
                },
            };
            plan_step(&mut trial, command, &mut cmds)?;
        }
        self.finalize(trial, cmds, before)?;

        for (member_track, member_clip) in members {
            if let Ok(track) = self.model.track_index(member_track) {
                self.emit(ChangeEvent::ClipResized {
                    track,
                    clip: member_clip,
                });
            }
        }
        Ok(delta)
    }

    /// Relocate a clip, possibly across tracks. One undoable command; group
    /// members move by the same delta on their own tracks.
    pub fn move_clip(
        &mut self,
        from_track: usize,
        to_track: usize,
        index: usize,
        new_position: i64,
        ripple: bool,
    ) -> Result<()> {
        let source = self.model.track(from_track)?;
        let dest = self.model.track(to_track)?;
        if source.locked || dest.locked {
            return Err(TimelineError::LockedTrack);
        }
        let clip = source.clip_at(index).ok_or_else(|| {
            TimelineError::InvalidIndex(format!(
                "no clip at track {} entry {}",
                from_track, index
            ))
        })?;
        if new_position < 0 {
            return Err(TimelineError::OutOfBounds("negative position".into()));
        }
        let delta = new_position - clip.position;
        let primary_id = clip.id;
        let dest_id = dest.id;
        let members = self.gather_members(clip.id, clip.group)?;
        debug!(from_track, to_track, index, new_position, ripple, "move clip");

        // Validate locks and capture (source track, clip, target track,
        // target position) per member before anything moves.
        let mut moves = Vec::new();
        for (member_track, member_clip) in &members {
            let track = self.model.track_by_id(*member_track)?;
            if track.locked {
                return Err(TimelineError::LockedTrack);
            }
            let (_, member) = track.find_clip(*member_clip).ok_or_else(|| {
                TimelineError::InvalidIndex(format!("no clip {}", member_clip))
            })?;
            let target_track = if *member_clip == primary_id {
                dest_id
            } else {
                *member_track
            };
            let target = member.position + delta;
            if target < 0 {
                return Err(TimelineError::OutOfBounds(
                    "group member would move before frame 0".into(),
                ));
            }
            moves.push((*member_track, *member_clip, target_track, target));
        }

        let before = self.selection.snapshot();
        let mut trial = self.model.clone();
        let mut cmds = Vec::new();

        // Phase 1: take every member off its track.
        let mut lifted = Vec::new();
        for (member_track, member_clip, target_track, target) in &moves {
            let track = trial.track_by_id(*member_track)?;
            let (_, member) = track.find_clip(*member_clip).ok_or_else(|| {
                TimelineError::InvalidIndex(format!("no clip {}", member_clip))
            })?;
            let member = member.clone();
            let (at, len) = (member.position, member.length);
            let insert = if ripple {
                Vec::new()
            } else {
                vec![TrackEntry::blank(at, len)]
            };
            plan_step(
                &mut trial,
                EditCommand::Splice {
                    track_id: *member_track,
                    at,
                    remove_len: len,
                    insert,
                    removed: Vec::new(),
                },
                &mut cmds,
            )?;
            lifted.push((member, *target_track, *target));
        }

        // Phase 2: put them back down at their targets.
        for (member, target_track, target) in lifted {
            let mut placed = member;
            placed.position = target;
            if ripple {
                plan_insert(&mut trial, target_track, placed, &mut cmds)?;
            } else {
                plan_place_into_blank(&mut trial, target_track, placed, &mut cmds)?;
            }
        }
        self.finalize(trial, cmds, before)?;

        for (member_track, member_clip, target_track, _) in moves {
            let from = self.model.track_index(member_track).unwrap_or(from_track);
            let to = self.model.track_index(target_track).unwrap_or(to_track);
            self.emit(ChangeEvent::ClipMoved {
                from_track: from,
                to_track: to,
                clip: member_clip,
            });
        }
        Ok(())
    }

    /// Set fade-in duration, clamped to the clip length.
    pub fn fade_in(&mut self, track_index: usize, index: usize, duration: i64) -> Result<()> {
        self.set_fade(track_index, index, duration, true)
    }

    /// Set fade-out duration, clamped to the clip length.
    pub fn fade_out(&mut self, track_index: usize, index: usize, duration: i64) -> Result<()> {
        self.set_fade(track_index, index, duration, false)
    }

    fn set_fade(
        &mut self,
        track_index: usize,
        index: usize,
        duration: i64,
        fade_in: bool,
    ) -> Result<()> {
        let track = self.model.track(track_index)?;
        if track.locked {
            return Err(TimelineError::LockedTrack);
        }
        let clip = track.clip_at(index).ok_or_else(|| {
            TimelineError::InvalidIndex(format!("no clip at track {} entry {}", track_index, index))
        })?;
        let new = duration.clamp(0, clip.length);
        let old = if fade_in { clip.fade_in } else { clip.fade_out };
        let (track_id, clip_id) = (track.id, clip.id);
        if new == old {
            return Ok(());
        }
        self.apply_simple(vec![EditCommand::SetFade {
            track_id,
            clip_id,
            fade_in,
            old,
            new,
        }])?;
        self.emit(ChangeEvent::ClipChanged {
            track: track_index,
            clip: clip_id,
        });
        Ok(())
    }

    /// Set audio gain on a clip.
    pub fn set_gain(&mut self, track_index: usize, index: usize, gain: f64) -> Result<()> {
        let track = self.model.track(track_index)?;
        if track.locked {
            return Err(TimelineError::LockedTrack);
        }
        let clip = track.clip_at(index).ok_or_else(|| {
            TimelineError::InvalidIndex(format!("no clip at track {} entry {}", track_index, index))
        })?;
        let (track_id, clip_id, old) = (track.id, clip.id, clip.gain);
        self.apply_simple(vec![EditCommand::SetGain {
            track_id,
            clip_id,
            old,
            new: gain,
        }])?;
        self.emit(ChangeEvent::ClipChanged {
            track: track_index,
            clip: clip_id,
        });
        Ok(())
    }

    /// Copy a clip's audio onto an audio track (created if none has room)
    /// and silence the original.
    pub fn detach_audio(&mut self, track_index: usize, index: usize) -> Result<ClipAddress> {
        let track = self.model.track(track_index)?;
        if track.locked {
            return Err(TimelineError::LockedTrack);
        }
        if track.kind != TrackKind::Video {
            return Err(TimelineError::InvalidIndex(
                "detach audio targets a video track clip".into(),
            ));
        }
        let clip = track.clip_at(index).ok_or_else(|| {
            TimelineError::InvalidIndex(format!("no clip at track {} entry {}", track_index, index))
        })?;
        if !clip.producer.has_audio {
            return Err(TimelineError::InvalidIndex("source has no audio".into()));
        }
        let source = clip.clone();
        let source_track_id = track.id;
        debug!(track = track_index, index, "detach audio");

        let before = self.selection.snapshot();
        let mut trial = self.model.clone();
        let mut cmds = Vec::new();

        // Find an unlocked audio track with room, or add one.
        let target_id = match trial.tracks.iter().find(|t| {
            t.kind == TrackKind::Audio && !t.locked && span_is_free(t, source.span())
        }) {
            Some(track) => track.id,
            None => {
                let count = trial
                    .tracks
                    .iter()
                    .filter(|t| t.kind == TrackKind::Audio)
                    .count();
                let new_track = Track::new_audio(format!("A{}", count + 1));
                let id = new_track.id;
                let index = trial.tracks.len();
                plan_step(
                    &mut trial,
                    EditCommand::AddTrack {
                        index,
                        track: new_track,
                    },
                    &mut cmds,
                )?;
                id
            }
        };

        let mut audio = source.clone();
        audio.id = Uuid::new_v4();
        audio.producer = source.producer.audio_only();
        audio.group = None;
        audio.filters.clear();
        let audio_id = audio.id;
        plan_place_into_blank(&mut trial, target_id, audio, &mut cmds)?;
        plan_step(
            &mut trial,
            EditCommand::SetGain {
                track_id: source_track_id,
                clip_id: source.id,
                old: source.gain,
                new: 0.0,
            },
            &mut cmds,
        )?;

        let track_count_before = self.model.tracks.len();
        self.finalize(trial, cmds, before)?;
        if self.model.tracks.len() != track_count_before {
            self.emit(ChangeEvent::TrackAdded {
                index: self.model.tracks.len() - 1,
            });
        }
        let address = self.address_of(audio_id);
        self.emit(ChangeEvent::ClipInserted {
            track: address.track,
            index: address.index,
        });
        self.emit(ChangeEvent::ClipChanged {
            track: track_index,
            clip: source.id,
        });
        Ok(address)
    }

    /// Merge the clip with its contiguous same-source neighbor. With
    /// `dryrun`, only report feasibility.
    pub fn merge_clip_with_next(
        &mut self,
        track_index: usize,
        index: usize,
        dryrun: bool,
    ) -> Result<bool> {
        let track = self.model.track(track_index)?;
        let feasible = !track.locked && track.mergeable_with_next(index);
        if dryrun {
            return Ok(feasible);
        }
        if track.locked {
            return Err(TimelineError::LockedTrack);
        }
        if !feasible {
            return Err(TimelineError::InvalidIndex(
                "entries are not mergeable".into(),
            ));
        }
        let track_id = track.id;
        let at = track.entries[index + 1].position();
        let clip_id = track.clip_at(index).map(|c| c.id).expect("mergeable");
        self.apply_simple(vec![EditCommand::Join {
            track_id,
            at,
            right_id: None,
        }])?;
        self.emit(ChangeEvent::ClipResized {
            track: track_index,
            clip: clip_id,
        });
        Ok(true)
    }

    /// Swap a clip's source, keeping its slot length.
    pub fn replace(&mut self, track_index: usize, index: usize, spec: ClipSpec) -> Result<()> {
        let track = self.model.track(track_index)?;
        if track.locked {
            return Err(TimelineError::LockedTrack);
        }
        let clip = track.clip_at(index).ok_or_else(|| {
            TimelineError::InvalidIndex(format!("no clip at track {} entry {}", track_index, index))
        })?;
        if spec.in_point + clip.length > spec.producer.length {
            return Err(TimelineError::OutOfBounds(
                "replacement source shorter than slot".into(),
            ));
        }
        let command = EditCommand::Replace {
            track_id: track.id,
            clip_id: clip.id,
            old_producer: clip.producer.clone(),
            old_in_point: clip.in_point,
            new_producer: spec.producer.clone(),
            new_in_point: spec.in_point,
        };
        let clip_id = clip.id;
        self.apply_simple(vec![command])?;
        self.emit(ChangeEvent::ClipChanged {
            track: track_index,
            clip: clip_id,
        });
        Ok(())
    }

    /// Bulk-swap every clip whose source hash matches. Clips the new source
    /// cannot cover are skipped. Returns the number replaced.
    pub fn replace_clips_with_hash(
        &mut self,
        hash: &str,
        producer: ProducerHandle,
    ) -> Result<usize> {
        let mut cmds = Vec::new();
        let mut changed = Vec::new();
        for (track_index, track) in self.model.tracks.iter().enumerate() {
            if track.locked {
                continue;
            }
            for entry in &track.entries {
                let Some(clip) = entry.as_clip() else { continue };
                if clip.producer.hash.as_deref() != Some(hash) {
                    continue;
                }
                if clip.out_point() > producer.length {
                    warn!(clip = %clip.id, "replacement source too short, skipping");
                    continue;
                }
                cmds.push(EditCommand::Replace {
                    track_id: track.id,
                    clip_id: clip.id,
                    old_producer: clip.producer.clone(),
                    old_in_point: clip.in_point,
                    new_producer: producer.clone(),
                    new_in_point: clip.in_point,
                });
                changed.push((track_index, clip.id));
            }
        }
        if cmds.is_empty() {
            return Ok(0);
        }
        let count = cmds.len();
        self.apply_simple(cmds)?;
        for (track, clip) in changed {
            self.emit(ChangeEvent::ClipChanged { track, clip });
        }
        Ok(count)
    }

    // ── Track management ────────────────────────────────────────

    /// Add a video track above the existing ones. Returns its index.
    pub fn add_video_track(&mut self) -> Result<usize> {
        let count = self.count_tracks(TrackKind::Video);
        self.insert_track(0, TrackKind::Video, format!("V{}", count + 1))?;
        Ok(0)
    }

    /// Add an audio track below the existing ones. Returns its index.
    pub fn add_audio_track(&mut self) -> Result<usize> {
        let count = self.count_tracks(TrackKind::Audio);
        let index = self.model.tracks.len();
        self.insert_track(index, TrackKind::Audio, format!("A{}", count + 1))?;
        Ok(index)
    }

    /// Insert a new empty track at `index`.
    pub fn insert_track(
        &mut self,
        index: usize,
        kind: TrackKind,
        name: impl Into<String>,
    ) -> Result<()> {
        let track = match kind {
            TrackKind::Video => Track::new_video(name),
            TrackKind::Audio => Track::new_audio(name),
        };
        let index = index.min(self.model.tracks.len());
        self.apply_simple(vec![EditCommand::AddTrack { index, track }])?;
        self.emit(ChangeEvent::TrackAdded { index });
        Ok(())
    }

    /// Remove a track and everything on it.
    pub fn remove_track(&mut self, index: usize) -> Result<()> {
        let track = self.model.track(index)?;
        if track.locked {
            return Err(TimelineError::LockedTrack);
        }
        self.apply_simple(vec![EditCommand::RemoveTrack { index, track: None }])?;
        self.emit(ChangeEvent::TrackRemoved { index });
        Ok(())
    }

    /// Reorder tracks.
    pub fn move_track(&mut self, from: usize, to: usize) -> Result<()> {
        if from == to {
            return Ok(());
        }
        self.model.track(from)?;
        self.model.track(to)?;
        self.apply_simple(vec![EditCommand::MoveTrack { from, to }])?;
        self.emit(ChangeEvent::TrackMoved { from, to });
        Ok(())
    }

    pub fn set_track_name(&mut self, index: usize, name: impl Into<String>) -> Result<()> {
        self.model.track_mut(index)?.name = name.into();
        self.emit(ChangeEvent::TrackChanged { index });
        Ok(())
    }

    pub fn set_track_lock(&mut self, index: usize, locked: bool) -> Result<()> {
        self.model.track_mut(index)?.locked = locked;
        self.emit(ChangeEvent::TrackChanged { index });
        Ok(())
    }

    pub fn set_track_mute(&mut self, index: usize, muted: bool) -> Result<()> {
        self.model.track_mut(index)?.muted = muted;
        self.emit(ChangeEvent::TrackChanged { index });
        Ok(())
    }

    pub fn set_track_hidden(&mut self, index: usize, hidden: bool) -> Result<()> {
        self.model.track_mut(index)?.hidden = hidden;
        self.emit(ChangeEvent::TrackChanged { index });
        Ok(())
    }

    pub fn set_track_composite(
        &mut self,
        index: usize,
        composite: crate::track::CompositeMode,
    ) -> Result<()> {
        self.model.track_mut(index)?.composite = composite;
        self.emit(ChangeEvent::TrackChanged { index });
        Ok(())
    }

    // ── Grouping ────────────────────────────────────────────────

    /// Create a group from the current multi-clip selection. No-op (None)
    /// for fewer than two selected clips.
    pub fn group_selection(&mut self) -> Result<Option<Uuid>> {
        let ids = self.selection.selected_clips().to_vec();
        if ids.len() < 2 {
            return Ok(None);
        }
        let group = Uuid::new_v4();
        let assignments = ids
            .iter()
            .map(|id| (*id, self.group_of(*id), Some(group)))
            .collect();
        self.apply_simple(vec![EditCommand::SetGroup { assignments }])?;
        self.emit(ChangeEvent::GroupChanged { group });
        Ok(Some(group))
    }

    /// Dissolve a group.
    pub fn ungroup(&mut self, group: Uuid) -> Result<()> {
        let members = self.groups.member_ids(&self.model, group)?;
        let assignments = members
            .into_iter()
            .map(|id| (id, Some(group), None))
            .collect();
        self.apply_simple(vec![EditCommand::SetGroup { assignments }])?;
        self.emit(ChangeEvent::GroupChanged { group });
        Ok(())
    }

    /// All member addresses of the group containing the given clip.
    pub fn group_for_clip(&self, track: usize, index: usize) -> Vec<ClipAddress> {
        self.groups.group_for_clip(&self.model, track, index)
    }

    // ── Markers ─────────────────────────────────────────────────
    //
    // Markers are timeline annotations, not edit state; they do not
    // participate in undo. The wrappers exist so observers hear about
    // changes.

    pub fn create_marker(
        &mut self,
        position: i64,
        label: impl Into<String>,
        color: impl Into<String>,
    ) -> usize {
        let index = self.markers.create(position, label, color);
        self.emit(ChangeEvent::MarkerChanged);
        index
    }

    pub fn edit_marker(
        &mut self,
        index: usize,
        position: i64,
        label: impl Into<String>,
        color: impl Into<String>,
    ) -> Result<()> {
        self.markers.edit(index, position, label, color)?;
        self.emit(ChangeEvent::MarkerChanged);
        Ok(())
    }

    pub fn delete_marker(&mut self, index: usize) -> Result<()> {
        self.markers.delete(index)?;
        self.emit(ChangeEvent::MarkerChanged);
        Ok(())
    }

    /// Delete the marker nearest the playhead. No-op when there are none.
    pub fn delete_marker_nearest(&mut self, playhead: i64) {
        if self.markers.delete_nearest(playhead).is_some() {
            self.emit(ChangeEvent::MarkerChanged);
        }
    }

    // ── Undo / redo ─────────────────────────────────────────────

    /// Undo the last operation. Past the bottom of the stack this is a
    /// no-op, not an error.
    pub fn undo(&mut self) {
        if self.drag.is_some() {
            warn!("undo ignored while a trim drag is in progress");
            return;
        }
        let Some(entry) = self.undo.peek_undo() else {
            debug!("undo: nothing to undo");
            return;
        };
        let mut inverse = entry.command.invert();
        let before = entry.before.clone();
        let mut trial = self.model.clone();
        if let Err(error) = inverse.apply(&mut trial) {
            warn!(%error, "undo failed to apply inverse");
            return;
        }
        self.model = trial;
        self.undo.retreat();
        self.selection.apply_snapshot(&self.model, before);
        self.emit(ChangeEvent::ModelReloaded);
    }

    /// Redo the last undone operation. Past the top this is a no-op.
    pub fn redo(&mut self) {
        if self.drag.is_some() {
            warn!("redo ignored while a trim drag is in progress");
            return;
        }
        let Some(entry) = self.undo.peek_redo() else {
            debug!("redo: nothing to redo");
            return;
        };
        let mut command = entry.command.clone();
        let after = entry.after.clone();
        let mut trial = self.model.clone();
        if let Err(error) = command.apply(&mut trial) {
            warn!(%error, "redo failed to apply command");
            return;
        }
        self.model = trial;
        self.undo.advance();
        self.selection.apply_snapshot(&self.model, after);
        self.emit(ChangeEvent::ModelReloaded);
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    // ── Interactive trim drag ───────────────────────────────────

    /// Start an interactive trim. Subsequent `update_trim` deltas mutate the
    /// model directly; `commit_trim` lands the whole drag as one undo entry,
    /// `abort_trim` rolls everything back.
    pub fn begin_trim(
        &mut self,
        track_index: usize,
        index: usize,
        side: TrimSide,
        ripple: bool,
        roll: bool,
    ) -> Result<()> {
        if self.drag.is_some() {
            return Err(TimelineError::InvalidIndex(
                "a trim drag is already in progress".into(),
            ));
        }
        let track = self.model.track(track_index)?;
        if track.locked {
            return Err(TimelineError::LockedTrack);
        }
        let clip = track.clip_at(index).ok_or_else(|| {
            TimelineError::InvalidIndex(format!("no clip at track {} entry {}", track_index, index))
        })?;
        clip.producer.require_seekable()?;
        self.drag = Some(TrimDrag {
            clip_id: clip.id,
            side,
            ripple,
            roll,
            applied: 0,
            baseline: self.model.clone(),
            before: self.selection.snapshot(),
        });
        Ok(())
    }

    /// Apply one incremental delta of the in-progress drag. Returns the
    /// delta actually applied after clamping.
    pub fn update_trim(&mut self, delta: i64) -> Result<i64> {
        let (clip_id, side, ripple, roll) = match &self.drag {
            Some(drag) => (drag.clip_id, drag.side, drag.ripple, drag.roll),
            None => {
                return Err(TimelineError::InvalidIndex(
                    "no trim drag in progress".into(),
                ))
            }
        };
        let (track_index, index) = self.model.find_clip(clip_id).ok_or_else(|| {
            TimelineError::InvalidIndex("dragged clip no longer exists".into())
        })?;
        let clip = self.model.tracks[track_index]
            .clip_at(index)
            .expect("find_clip");
        let delta = clamp_trim(clip, side, delta)?;
        if delta == 0 {
            return Ok(0);
        }
        let track = &mut self.model.tracks[track_index];
        match side {
            TrimSide::In => track.apply_trim_in(index, delta, ripple, roll)?,
            TrimSide::Out => track.apply_trim_out(index, delta, ripple, roll)?,
        }
        if let Some(drag) = self.drag.as_mut() {
            drag.applied += delta;
        }
        self.emit(ChangeEvent::ClipResized {
            track: track_index,
            clip: clip_id,
        });
        Ok(delta)
    }

    /// Finalize the drag: exactly one undo entry for the net delta (none if
    /// the drag went nowhere).
    pub fn commit_trim(&mut self) -> Result<()> {
        let drag = self.drag.take().ok_or_else(|| {
            TimelineError::InvalidIndex("no trim drag in progress".into())
        })?;
        if drag.applied == 0 {
            return Ok(());
        }
        let (track_index, _) = self.model.find_clip(drag.clip_id).ok_or_else(|| {
            TimelineError::InvalidIndex("dragged clip no longer exists".into())
        })?;
        let track_id = self.model.tracks[track_index].id;
        let command = match drag.side {
            TrimSide::In => EditCommand::TrimIn {
                track_id,
                clip_id: drag.clip_id,
                delta: drag.applied,
                ripple: drag.ripple,
                roll: drag.roll,
            },
            TrimSide::Out => EditCommand::TrimOut {
                track_id,
                clip_id: drag.clip_id,
                delta: drag.applied,
                ripple: drag.ripple,
                roll: drag.roll,
            },
        };
        let after = self.selection.snapshot();
        self.undo.push(UndoEntry {
            command,
            before: drag.before,
            after,
        });
        Ok(())
    }

    /// Roll the model back to its pre-drag state. Nothing reaches the undo
    /// stack.
    pub fn abort_trim(&mut self) {
        if let Some(drag) = self.drag.take() {
            self.model = drag.baseline;
            self.selection.apply_snapshot(&self.model, drag.before);
            self.emit(ChangeEvent::ModelReloaded);
        }
    }

    // ── Recording jobs ──────────────────────────────────────────

    /// Mark a recording in flight targeting the given track. The actual
    /// capture runs in the external job subsystem.
    pub fn start_record(&mut self, track_index: usize) -> Result<()> {
        if self.recording.is_some() {
            return Err(TimelineError::InvalidIndex(
                "a recording is already in progress".into(),
            ));
        }
        let track = self.model.track(track_index)?;
        if track.locked {
            return Err(TimelineError::LockedTrack);
        }
        self.recording = Some(RecordJob { track_id: track.id });
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Stop an in-flight recording. With `discard` the pending job is
    /// dropped and a later completion notification becomes an error;
    /// otherwise the engine keeps waiting for the job subsystem to finalize
    /// and deliver the clip via [`finish_record`](Self::finish_record).
    pub fn stop_record(&mut self, discard: bool) {
        if discard {
            self.recording = None;
        }
    }

    /// Consume the completion notification from the job subsystem. On
    /// success the produced clip is appended (undoably); on failure the
    /// model is untouched.
    pub fn finish_record(&mut self, outcome: JobOutcome) -> Result<Option<ClipAddress>> {
        let job = self.recording.take().ok_or_else(|| {
            TimelineError::InvalidIndex("no recording in progress".into())
        })?;
        if !outcome.success {
            warn!(error = ?outcome.error, "record job failed");
            return Ok(None);
        }
        let producer = outcome.producer.ok_or_else(|| {
            TimelineError::InvalidIndex("successful job carried no producer".into())
        })?;
        let track_index = self.model.track_index(job.track_id)?;
        let address = self.append(track_index, ClipSpec::new(producer))?;
        Ok(Some(address))
    }

    // ── Serialization ───────────────────────────────────────────

    /// Snapshot the whole timeline as a versioned document.
    pub fn serialize(&self) -> TimelineDocument {
        TimelineDocument::new(self.model.clone(), self.markers.clone())
    }

    /// Replace the timeline from a document. Clears undo history; the
    /// identity-based selection survives where clips still exist.
    pub fn load(&mut self, document: TimelineDocument) -> Result<()> {
        document.model.check_invariants()?;
        self.model = document.model;
        for track in &mut self.model.tracks {
            track.coalesce_blanks();
        }
        self.markers = document.markers;
        self.undo.clear();
        self.drag = None;
        self.selection.prune(&self.model);
        self.emit(ChangeEvent::ModelReloaded);
        Ok(())
    }

    /// Copy the current clip selection as a drag/drop payload.
    pub fn copy_selection(&self) -> DocumentFragment {
        let clips = self
            .selection
            .selected_addresses(&self.model)
            .iter()
            .filter_map(|addr| {
                self.model
                    .tracks
                    .get(addr.track)
                    .and_then(|t| t.clip_at(addr.index))
                    .cloned()
            })
            .collect();
        DocumentFragment::from_clips(clips)
    }

    /// Drop a document fragment at a target position, as one undoable
    /// command. `overwrite` replaces the covered range; otherwise entries
    /// shift right to make room.
    pub fn insert_fragment(
        &mut self,
        track_index: usize,
        position: i64,
        fragment: &DocumentFragment,
        overwrite: bool,
    ) -> Result<()> {
        if fragment.is_empty() {
            return Ok(());
        }
        let track = self.model.track(track_index)?;
        if track.locked {
            return Err(TimelineError::LockedTrack);
        }
        if position < 0 {
            return Err(TimelineError::OutOfBounds("negative position".into()));
        }
        let track_id = track.id;
        debug!(track = track_index, position, overwrite, "drop fragment");

        let before = self.selection.snapshot();
        let mut trial = self.model.clone();
        let mut cmds = Vec::new();
        for clip in &fragment.clips {
            let mut placed = clip.clone();
            placed.id = Uuid::new_v4();
            placed.group = None;
            placed.position = position + clip.position;
            if overwrite {
                plan_overwrite(&mut trial, track_id, placed, &mut cmds)?;
            } else {
                plan_insert(&mut trial, track_id, placed, &mut cmds)?;
            }
        }
        self.finalize(trial, cmds, before)?;
        self.emit(ChangeEvent::ClipInserted {
            track: track_index,
            index: self
                .model
                .track(track_index)?
                .entry_index_at(position)
                .unwrap_or(0),
        });
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────

    /// Validate and materialize a clip spec for insert/overwrite.
    fn validated_clip(
        &self,
        track_index: usize,
        position: i64,
        spec: &ClipSpec,
    ) -> Result<Clip> {
        let track = self.model.track(track_index)?;
        if track.locked {
            return Err(TimelineError::LockedTrack);
        }
        if position < 0 {
            return Err(TimelineError::OutOfBounds("negative position".into()));
        }
        if spec.effective_length() <= 0 {
            return Err(TimelineError::ZeroLength);
        }
        Ok(spec.materialize(position))
    }

    /// Complete a planned mutation: auto-dissolve undersized groups, verify
    /// invariants, swap the trial in, prune selection, and record undo.
    fn finalize(
        &mut self,
        mut trial: MultitrackModel,
        mut cmds: Vec<EditCommand>,
        before: SelectionSnapshot,
    ) -> Result<()> {
        let fix = self.groups.dissolve_orphans(&trial);
        let mut dissolved: Vec<Uuid> = Vec::new();
        if !fix.is_empty() {
            for (_, old, _) in &fix {
                if let Some(group) = *old {
                    if !dissolved.contains(&group) {
                        dissolved.push(group);
                    }
                }
            }
            plan_step(&mut trial, EditCommand::SetGroup { assignments: fix }, &mut cmds)?;
        }
        trial.check_invariants()?;

        let old_duration = self.model.duration();
        self.model = trial;
        self.selection.prune(&self.model);
        let after = self.selection.snapshot();
        let command = if cmds.len() == 1 {
            cmds.pop().expect("len checked")
        } else {
            EditCommand::Batch(cmds)
        };
        self.undo.push(UndoEntry {
            command,
            before,
            after,
        });

        // The trial can still be rejected above; observers only hear about
        // dissolved groups once the new model is in place.
        for group in dissolved {
            self.emit(ChangeEvent::GroupChanged { group });
        }

        let duration = self.model.duration();
        if duration != old_duration {
            self.emit(ChangeEvent::DurationChanged { duration });
        }
        Ok(())
    }

    /// One-shot plan-and-finalize for simple command lists.
    fn apply_simple(&mut self, cmds: Vec<EditCommand>) -> Result<()> {
        let before = self.selection.snapshot();
        let mut trial = self.model.clone();
        let mut applied = Vec::new();
        for command in cmds {
            plan_step(&mut trial, command, &mut applied)?;
        }
        self.finalize(trial, applied, before)
    }

    /// The clip itself plus its group members, as (track id, clip id).
    fn gather_members(&self, clip_id: Uuid, group: Option<Uuid>) -> Result<Vec<(Uuid, Uuid)>> {
        let ids = match group {
            Some(group) => self.groups.member_ids(&self.model, group)?,
            None => vec![clip_id],
        };
        ids.into_iter()
            .map(|id| {
                let (track_index, _) = self.model.find_clip(id).ok_or_else(|| {
                    TimelineError::InvalidIndex(format!("no clip {}", id))
                })?;
                Ok((self.model.tracks[track_index].id, id))
            })
            .collect()
    }

    fn group_of(&self, clip_id: Uuid) -> Option<Uuid> {
        let (track, index) = self.model.find_clip(clip_id)?;
        self.model.tracks[track].clip_at(index).and_then(|c| c.group)
    }

    fn count_tracks(&self, kind: TrackKind) -> usize {
        self.model.tracks.iter().filter(|t| t.kind == kind).count()
    }

    fn address_of(&self, clip_id: Uuid) -> ClipAddress {
        let (track, index) = self
            .model
            .find_clip(clip_id)
            .expect("clip placed by a just-committed command");
        ClipAddress::new(track, index)
    }
}

// ── Planning helpers ────────────────────────────────────────────
//
// Each helper applies a command to the trial model and records it, so the
// plan is always built against the state it will actually see.

fn plan_step(
    trial: &mut MultitrackModel,
    command: EditCommand,
    cmds: &mut Vec<EditCommand>,
) -> Result<()> {
    let mut command = command;
    command.apply(trial)?;
    cmds.push(command);
    Ok(())
}

fn needs_split(track: &Track, at: i64) -> bool {
    track
        .entry_index_at(at)
        .is_some_and(|i| track.entries[i].position() != at)
}

/// Ripple insert: open space at the clip's position. An insert past the
/// track end carries its padding blank in the command so undo removes it.
fn plan_insert(
    trial: &mut MultitrackModel,
    track_id: Uuid,
    clip: Clip,
    cmds: &mut Vec<EditCommand>,
) -> Result<()> {
    let at = clip.position;
    let duration = trial.track_by_id(track_id)?.duration();
    if needs_split(trial.track_by_id(track_id)?, at) {
        plan_step(
            trial,
            EditCommand::Split {
                track_id,
                at,
                right_id: Uuid::new_v4(),
            },
            cmds,
        )?;
    }
    let mut insert = Vec::new();
    if at > duration {
        insert.push(TrackEntry::blank(duration, at - duration));
    }
    insert.push(TrackEntry::Clip(clip));
    plan_step(
        trial,
        EditCommand::Splice {
            track_id,
            at: at.min(duration),
            remove_len: 0,
            insert,
            removed: Vec::new(),
        },
        cmds,
    )
}

/// Overwrite: replace the covered range, extending the track only past its
/// end.
fn plan_overwrite(
    trial: &mut MultitrackModel,
    track_id: Uuid,
    clip: Clip,
    cmds: &mut Vec<EditCommand>,
) -> Result<()> {
    let at = clip.position;
    let length = clip.length;
    let duration = trial.track_by_id(track_id)?.duration();
    let covered = (duration - at).clamp(0, length);
    if covered > 0 {
        if needs_split(trial.track_by_id(track_id)?, at) {
            plan_step(
                trial,
                EditCommand::Split {
                    track_id,
                    at,
                    right_id: Uuid::new_v4(),
                },
                cmds,
            )?;
        }
        let end = at + covered;
        if end < duration && needs_split(trial.track_by_id(track_id)?, end) {
            plan_step(
                trial,
                EditCommand::Split {
                    track_id,
                    at: end,
                    right_id: Uuid::new_v4(),
                },
                cmds,
            )?;
        }
    }
    let mut insert = Vec::new();
    if at > duration {
        insert.push(TrackEntry::blank(duration, at - duration));
    }
    insert.push(TrackEntry::Clip(clip));
    plan_step(
        trial,
        EditCommand::Splice {
            track_id,
            at: at.min(duration),
            remove_len: covered,
            insert,
            removed: Vec::new(),
        },
        cmds,
    )
}

/// Close `[at, at + len)` on a track, splitting edge entries as needed.
/// Used by the ripple-all-tracks removal path.
fn plan_clear_span(
    trial: &mut MultitrackModel,
    track_id: Uuid,
    at: i64,
    len: i64,
    cmds: &mut Vec<EditCommand>,
) -> Result<()> {
    if needs_split(trial.track_by_id(track_id)?, at) {
        plan_step(
            trial,
            EditCommand::Split {
                track_id,
                at,
                right_id: Uuid::new_v4(),
            },
            cmds,
        )?;
    }
    let end = at + len;
    if needs_split(trial.track_by_id(track_id)?, end) {
        plan_step(
            trial,
            EditCommand::Split {
                track_id,
                at: end,
                right_id: Uuid::new_v4(),
            },
            cmds,
        )?;
    }
    plan_step(
        trial,
        EditCommand::Splice {
            track_id,
            at,
            remove_len: len,
            insert: Vec::new(),
            removed: Vec::new(),
        },
        cmds,
    )
}

fn span_is_free(track: &Track, span: FrameSpan) -> bool {
    track
        .entries
        .iter()
        .filter(|e| e.span().overlaps(span))
        .all(TrackEntry::is_blank)
}

/// Place a clip into blank space (or past the end) without shifting
/// anything. Rejected with `Overlap` when the span is occupied.
fn plan_place_into_blank(
    trial: &mut MultitrackModel,
    track_id: Uuid,
    clip: Clip,
    cmds: &mut Vec<EditCommand>,
) -> Result<()> {
    let span = clip.span();
    let track = trial.track_by_id(track_id)?;
    if !span_is_free(track, span) {
        let conflict = track
            .entries
            .iter()
            .filter(|e| !e.is_blank() && e.span().overlaps(span))
            .map(|e| e.position().max(span.start))
            .min()
            .unwrap_or(span.start);
        return Err(TimelineError::Overlap(conflict));
    }
    // The covered range is all blank, so an overwrite plan degenerates to
    // blank splits plus the splice.
    plan_overwrite(trial, track_id, clip, cmds)
}

/// Clamp a trim delta to the clip's available source material.
fn clamp_trim(clip: &Clip, side: TrimSide, delta: i64) -> Result<i64> {
    let room = match side {
        TrimSide::In => clip.head_room(),
        TrimSide::Out => clip.tail_room(),
    };
    let delta = delta.min(room);
    if clip.length + delta <= 0 {
        return Err(TimelineError::ZeroLength);
    }
    Ok(delta)
}
