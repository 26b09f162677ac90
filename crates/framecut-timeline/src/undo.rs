//! Reversible edit commands and the undo stack.
//!
//! Every mutation is an `EditCommand` that knows how to apply itself and
//! produce its inverse. Commands capture target identity and before/after
//! boundary values, not whole track lists; structural commands (`Splice`)
//! store exactly the entries they displaced. The stack is append-only with a
//! cursor: undo steps the cursor back, redo replays the original command.

use framecut_core::{Result, TimelineError};
use tracing::warn;
use uuid::Uuid;

use crate::clip::TrackEntry;
use crate::model::MultitrackModel;
use crate::selection::SelectionSnapshot;
use crate::track::Track;

/// A reversible edit operation on the multitrack model.
#[derive(Debug, Clone)]
pub enum EditCommand {
    /// Replace the entries occupying `[at, at + remove_len)` with `insert`,
    /// shifting later entries by the length difference. The workhorse behind
    /// insert, overwrite, append, lift, remove, move, and fragment drops.
    Splice {
        track_id: Uuid,
        at: i64,
        remove_len: i64,
        insert: Vec<TrackEntry>,
        /// Populated when the command is executed; used by the inverse.
        removed: Vec<TrackEntry>,
    },
    /// Split the entry containing `at`; the right half takes `right_id` so
    /// redo reproduces identical identities.
    Split {
        track_id: Uuid,
        at: i64,
        right_id: Uuid,
    },
    /// Merge the two entries meeting at `at` (inverse of `Split`, also the
    /// merge-with-next operation).
    Join {
        track_id: Uuid,
        at: i64,
        /// Identity of the removed right clip, populated on execution.
        right_id: Option<Uuid>,
    },
    /// Adjust a clip's start boundary. `delta` is the length change.
    TrimIn {
        track_id: Uuid,
        clip_id: Uuid,
        delta: i64,
        ripple: bool,
        roll: bool,
    },
    /// Adjust a clip's end boundary.
    TrimOut {
        track_id: Uuid,
        clip_id: Uuid,
        delta: i64,
        ripple: bool,
        roll: bool,
    },
    /// Set fade-in or fade-out duration.
    SetFade {
        track_id: Uuid,
        clip_id: Uuid,
        fade_in: bool,
        old: i64,
        new: i64,
    },
    /// Set audio gain.
    SetGain {
        track_id: Uuid,
        clip_id: Uuid,
        old: f64,
        new: f64,
    },
    /// Assign or clear group membership for a set of clips.
    SetGroup {
        /// (clip id, old membership, new membership)
        assignments: Vec<(Uuid, Option<Uuid>, Option<Uuid>)>,
    },
    /// Swap a clip's producer, keeping its slot length.
    Replace {
        track_id: Uuid,
        clip_id: Uuid,
        old_producer: framecut_core::ProducerHandle,
        old_in_point: i64,
        new_producer: framecut_core::ProducerHandle,
        new_in_point: i64,
    },
    AddTrack {
        index: usize,
        track: Track,
    },
    RemoveTrack {
        index: usize,
        /// Populated on execution, including all entries, for undo.
        track: Option<Track>,
    },
    MoveTrack {
        from: usize,
        to: usize,
    },
    /// A group of commands applied in order, undone in reverse order.
    Batch(Vec<EditCommand>),
}

impl EditCommand {
    /// Apply this command to the model.
    ///
    /// `&mut self` because some variants record data during execution
    /// (`Splice` stores the displaced entries, `RemoveTrack` the track).
    pub fn apply(&mut self, model: &mut MultitrackModel) -> Result<()> {
        match self {
            Self::Splice {
                track_id,
                at,
                remove_len,
                insert,
                removed,
            } => {
                let track = model.track_by_id_mut(*track_id)?;
                *removed = track.splice(*at, *remove_len, insert.clone())?;
                Ok(())
            }
            Self::Split {
                track_id,
                at,
                right_id,
            } => model.track_by_id_mut(*track_id)?.split_at(*at, *right_id),
            Self::Join {
                track_id,
                at,
                right_id,
            } => {
                *right_id = model.track_by_id_mut(*track_id)?.join_at(*at)?;
                Ok(())
            }
            Self::TrimIn {
                track_id,
                clip_id,
                delta,
                ripple,
                roll,
            } => {
                let track = model.track_by_id_mut(*track_id)?;
                let (index, _) = track.find_clip(*clip_id).ok_or_else(|| {
                    TimelineError::InvalidIndex(format!("no clip {}", clip_id))
                })?;
                track.apply_trim_in(index, *delta, *ripple, *roll)
            }
            Self::TrimOut {
                track_id,
                clip_id,
                delta,
                ripple,
                roll,
            } => {
                let track = model.track_by_id_mut(*track_id)?;
                let (index, _) = track.find_clip(*clip_id).ok_or_else(|| {
                    TimelineError::InvalidIndex(format!("no clip {}", clip_id))
                })?;
                track.apply_trim_out(index, *delta, *ripple, *roll)
            }
            Self::SetFade {
                track_id,
                clip_id,
                fade_in,
                new,
                ..
            } => {
                let clip = find_clip_mut(model, *track_id, *clip_id)?;
                if *fade_in {
                    clip.fade_in = *new;
                } else {
                    clip.fade_out = *new;
                }
                Ok(())
            }
            Self::SetGain {
                track_id,
                clip_id,
                new,
                ..
            } => {
                find_clip_mut(model, *track_id, *clip_id)?.gain = *new;
                Ok(())
            }
            Self::SetGroup { assignments } => {
                for (clip_id, _, new) in assignments.iter() {
                    if let Some((ti, ci)) = model.find_clip(*clip_id) {
                        if let Some(clip) = model.tracks[ti].clip_at_mut(ci) {
                            clip.group = *new;
                        }
                    }
                }
                Ok(())
            }
            Self::Replace {
                track_id,
                clip_id,
                new_producer,
                new_in_point,
                ..
            } => {
                let clip = find_clip_mut(model, *track_id, *clip_id)?;
                clip.producer = new_producer.clone();
                clip.in_point = *new_in_point;
                Ok(())
            }
            Self::AddTrack { index, track } => {
                model.insert_track_at(*index, track.clone());
                Ok(())
            }
            Self::RemoveTrack { index, track } => {
                *track = Some(model.remove_track_at(*index)?);
                Ok(())
            }
            Self::MoveTrack { from, to } => model.move_track(*from, *to),
            Self::Batch(commands) => {
                for command in commands {
                    command.apply(model)?;
                }
                Ok(())
            }
        }
    }

    /// Produce the inverse command (for undo). Must be called after `apply`
    /// for variants that record execution data.
    pub fn invert(&self) -> Self {
        match self {
            Self::Splice {
                track_id,
                at,
                insert,
                removed,
                ..
            } => Self::Splice {
                track_id: *track_id,
                at: *at,
                remove_len: insert.iter().map(TrackEntry::length).sum(),
                insert: removed.clone(),
                removed: Vec::new(),
            },
            Self::Split {
                track_id,
                at,
                right_id,
            } => Self::Join {
                track_id: *track_id,
                at: *at,
                right_id: Some(*right_id),
            },
            Self::Join {
                track_id,
                at,
                right_id,
            } => Self::Split {
                track_id: *track_id,
                at: *at,
                right_id: right_id.unwrap_or_else(Uuid::new_v4),
            },
            Self::TrimIn {
                track_id,
                clip_id,
                delta,
                ripple,
                roll,
            } => Self::TrimIn {
                track_id: *track_id,
                clip_id: *clip_id,
                delta: -*delta,
                ripple: *ripple,
                roll: *roll,
            },
            Self::TrimOut {
                track_id,
                clip_id,
                delta,
                ripple,
                roll,
            } => Self::TrimOut {
                track_id: *track_id,
                clip_id: *clip_id,
                delta: -*delta,
                ripple: *ripple,
                roll: *roll,
            },
            Self::SetFade {
                track_id,
                clip_id,
                fade_in,
                old,
                new,
            } => Self::SetFade {
                track_id: *track_id,
                clip_id: *clip_id,
                fade_in: *fade_in,
                old: *new,
                new: *old,
            },
            Self::SetGain {
                track_id,
                clip_id,
                old,
                new,
            } => Self::SetGain {
                track_id: *track_id,
                clip_id: *clip_id,
                old: *new,
                new: *old,
            },
            Self::SetGroup { assignments } => Self::SetGroup {
                assignments: assignments
                    .iter()
                    .map(|(id, old, new)| (*id, *new, *old))
                    .collect(),
            },
            Self::Replace {
                track_id,
                clip_id,
                old_producer,
                old_in_point,
                new_producer,
                new_in_point,
            } => Self::Replace {
                track_id: *track_id,
                clip_id: *clip_id,
                old_producer: new_producer.clone(),
                old_in_point: *new_in_point,
                new_producer: old_producer.clone(),
                new_in_point: *old_in_point,
            },
            Self::AddTrack { index, .. } => Self::RemoveTrack {
                index: *index,
                track: None,
            },
            Self::RemoveTrack { index, track } => Self::AddTrack {
                index: *index,
                track: track.clone().expect("removed track must be populated"),
            },
            Self::MoveTrack { from, to } => Self::MoveTrack {
                from: *to,
                to: *from,
            },
            Self::Batch(commands) => {
                Self::Batch(commands.iter().rev().map(Self::invert).collect())
            }
        }
    }
}

fn find_clip_mut<'a>(
    model: &'a mut MultitrackModel,
    track_id: Uuid,
    clip_id: Uuid,
) -> Result<&'a mut crate::clip::Clip> {
    let track = model.track_by_id_mut(track_id)?;
    let (index, _) = track
        .find_clip(clip_id)
        .ok_or_else(|| TimelineError::InvalidIndex(format!("no clip {}", clip_id)))?;
    Ok(track.clip_at_mut(index).expect("index from find_clip"))
}

// ── Undo stack ──────────────────────────────────────────────────

/// One executed operation: the command plus the selection on either side,
/// so undo/redo restore selection state exactly.
#[derive(Debug, Clone)]
pub struct UndoEntry {
    pub command: EditCommand,
    pub before: SelectionSnapshot,
    pub after: SelectionSnapshot,
}

/// Append-only command history with a cursor for redo.
///
/// Entries `[0, cursor)` are applied; `[cursor, len)` have been undone.
/// Pushing a new entry truncates the undone tail.
#[derive(Debug, Default)]
pub struct UndoStack {
    entries: Vec<UndoEntry>,
    cursor: usize,
    max_depth: usize,
}

impl UndoStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            max_depth,
        }
    }

    /// Record an already-applied command.
    pub fn push(&mut self, entry: UndoEntry) {
        self.entries.truncate(self.cursor);
        self.entries.push(entry);
        if self.max_depth > 0 && self.entries.len() > self.max_depth {
            self.entries.remove(0);
        }
        self.cursor = self.entries.len();
    }

    /// The entry the cursor would step back over, without moving it.
    pub fn peek_undo(&self) -> Option<&UndoEntry> {
        self.cursor.checked_sub(1).map(|i| &self.entries[i])
    }

    /// The entry the cursor would replay, without moving it.
    pub fn peek_redo(&self) -> Option<&UndoEntry> {
        self.entries.get(self.cursor)
    }

    /// Step the cursor back after a successful inverse application.
    pub fn retreat(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
        } else {
            warn!("undo cursor already at bottom");
        }
    }

    /// Step the cursor forward after a successful re-application.
    pub fn advance(&mut self) {
        if self.cursor < self.entries.len() {
            self.cursor += 1;
        } else {
            warn!("redo cursor already at top");
        }
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    /// Number of applied entries.
    pub fn applied_count(&self) -> usize {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::ClipSpec;
    use crate::selection::SelectionSnapshot;
    use framecut_core::ProducerHandle;

    fn snapshot() -> SelectionSnapshot {
        SelectionSnapshot {
            state: Default::default(),
            current_track: 0,
        }
    }

    fn entry(len: i64) -> TrackEntry {
        TrackEntry::Clip(
            ClipSpec::with_range(ProducerHandle::new("a.mp4", 500), 0, len).materialize(0),
        )
    }

    fn insert_cmd(model: &MultitrackModel, at: i64, len: i64) -> EditCommand {
        EditCommand::Splice {
            track_id: model.tracks[0].id,
            at,
            remove_len: 0,
            insert: vec![entry(len)],
            removed: Vec::new(),
        }
    }

    #[test]
    fn test_splice_apply_then_invert_restores() {
        let mut model = MultitrackModel::default();
        let mut cmd = insert_cmd(&model, 0, 10);
        cmd.apply(&mut model).unwrap();
        assert_eq!(model.tracks[0].clip_count(), 1);

        let mut inv = cmd.invert();
        inv.apply(&mut model).unwrap();
        assert_eq!(model.tracks[0].clip_count(), 0);
        assert!(model.tracks[0].entries.is_empty());
    }

    #[test]
    fn test_trim_invert_negates_delta() {
        let cmd = EditCommand::TrimOut {
            track_id: Uuid::nil(),
            clip_id: Uuid::nil(),
            delta: 5,
            ripple: true,
            roll: false,
        };
        match cmd.invert() {
            EditCommand::TrimOut { delta, ripple, .. } => {
                assert_eq!(delta, -5);
                assert!(ripple);
            }
            other => panic!("unexpected inverse {:?}", other),
        }
    }

    #[test]
    fn test_batch_inverts_in_reverse_order() {
        let mut model = MultitrackModel::default();
        let mut cmd = EditCommand::Batch(vec![
            insert_cmd(&model, 0, 10),
            EditCommand::Split {
                track_id: model.tracks[0].id,
                at: 4,
                right_id: Uuid::new_v4(),
            },
        ]);
        cmd.apply(&mut model).unwrap();
        assert_eq!(model.tracks[0].entries.len(), 2);

        let mut inv = cmd.invert();
        if let EditCommand::Batch(cmds) = &inv {
            assert!(matches!(cmds[0], EditCommand::Join { .. }));
            assert!(matches!(cmds[1], EditCommand::Splice { .. }));
        } else {
            panic!("expected batch inverse");
        }
        inv.apply(&mut model).unwrap();
        assert!(model.tracks[0].entries.is_empty());
    }

    #[test]
    fn test_remove_track_roundtrip() {
        let mut model = MultitrackModel::default();
        let name = model.tracks[0].name.clone();
        let mut cmd = EditCommand::RemoveTrack {
            index: 0,
            track: None,
        };
        cmd.apply(&mut model).unwrap();
        assert_eq!(model.tracks.len(), 1);

        let mut inv = cmd.invert();
        inv.apply(&mut model).unwrap();
        assert_eq!(model.tracks.len(), 2);
        assert_eq!(model.tracks[0].name, name);
    }

    #[test]
    fn test_cursor_walks_both_ways() {
        let mut stack = UndoStack::new(100);
        assert!(!stack.can_undo());
        assert!(!stack.can_redo());

        let model = MultitrackModel::default();
        stack.push(UndoEntry {
            command: insert_cmd(&model, 0, 10),
            before: snapshot(),
            after: snapshot(),
        });
        assert!(stack.can_undo());

        stack.retreat();
        assert!(!stack.can_undo());
        assert!(stack.can_redo());

        stack.advance();
        assert!(stack.can_undo());
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_push_truncates_redo_tail() {
        let mut stack = UndoStack::new(100);
        let model = MultitrackModel::default();
        for at in [0, 10] {
            stack.push(UndoEntry {
                command: insert_cmd(&model, at, 10),
                before: snapshot(),
                after: snapshot(),
            });
        }
        stack.retreat();
        assert!(stack.can_redo());
        stack.push(UndoEntry {
            command: insert_cmd(&model, 10, 5),
            before: snapshot(),
            after: snapshot(),
        });
        assert!(!stack.can_redo());
        assert_eq!(stack.applied_count(), 2);
    }

    #[test]
    fn test_max_depth_drops_oldest() {
        let mut stack = UndoStack::new(3);
        let model = MultitrackModel::default();
        for _ in 0..5 {
            stack.push(UndoEntry {
                command: insert_cmd(&model, 0, 10),
                before: snapshot(),
                after: snapshot(),
            });
        }
        assert_eq!(stack.applied_count(), 3);
    }
}
