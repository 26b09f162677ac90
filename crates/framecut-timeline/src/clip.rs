//! Clip and track-entry types.

use framecut_core::{FrameSpan, ProducerHandle};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

/// A clip on the timeline.
///
/// `position` is derivable from the cumulative lengths of preceding entries;
/// it is stored anyway and checked by [`crate::track::Track::check_invariants`]
/// so that position arithmetic stays O(1) and corruption is caught early.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Stable identity. Survives index renumbering caused by ripple edits,
    /// and model reloads; selection and groups bind to this, never to indices.
    pub id: Uuid,
    /// The external media source. Never interpreted by the engine.
    pub producer: ProducerHandle,
    /// First source frame used by this clip.
    pub in_point: i64,
    /// Length on the timeline, in frames.
    pub length: i64,
    /// Start frame on the timeline (invariant-checked, see above).
    pub position: i64,
    /// Playback speed (1.0 = normal).
    pub speed: f64,
    /// Fade-in duration in frames.
    pub fade_in: i64,
    /// Fade-out duration in frames.
    pub fade_out: i64,
    /// Audio gain (1.0 = unity).
    pub gain: f64,
    /// Group membership, if any.
    pub group: Option<Uuid>,
    /// Opaque filter descriptors, applied by the external render layer.
    pub filters: SmallVec<[String; 2]>,
}

impl Clip {
    /// Last source frame (exclusive) used by this clip.
    #[inline]
    pub fn out_point(&self) -> i64 {
        self.in_point + self.length
    }

    /// Timeline frame just past the clip.
    #[inline]
    pub fn end(&self) -> i64 {
        self.position + self.length
    }

    /// The timeline span occupied by this clip.
    #[inline]
    pub fn span(&self) -> FrameSpan {
        FrameSpan::with_length(self.position, self.length)
    }

    /// Source frames still available before the in-point.
    #[inline]
    pub fn head_room(&self) -> i64 {
        self.in_point
    }

    /// Source frames still available past the out-point.
    #[inline]
    pub fn tail_room(&self) -> i64 {
        self.producer.length - self.out_point()
    }
}

/// Parameters for creating a clip via insert/overwrite/append.
///
/// Length defaults to the full remaining source when not given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSpec {
    pub producer: ProducerHandle,
    pub in_point: i64,
    pub length: Option<i64>,
    pub speed: f64,
}

impl ClipSpec {
    pub fn new(producer: ProducerHandle) -> Self {
        Self {
            producer,
            in_point: 0,
            length: None,
            speed: 1.0,
        }
    }

    pub fn with_range(producer: ProducerHandle, in_point: i64, length: i64) -> Self {
        Self {
            producer,
            in_point,
            length: Some(length),
            speed: 1.0,
        }
    }

    /// Effective timeline length of the clip this spec would create.
    pub fn effective_length(&self) -> i64 {
        self.length
            .unwrap_or(self.producer.length - self.in_point)
            .max(0)
    }

    /// Materialize a clip at the given position with a fresh identity.
    pub fn materialize(&self, position: i64) -> Clip {
        Clip {
            id: Uuid::new_v4(),
            producer: self.producer.clone(),
            in_point: self.in_point,
            length: self.effective_length(),
            position,
            speed: self.speed,
            fade_in: 0,
            fade_out: 0,
            gain: 1.0,
            group: None,
            filters: SmallVec::new(),
        }
    }
}

/// An entry in a track: media, or explicitly reserved empty time.
///
/// Blanks keep position arithmetic well-defined; a lifted clip leaves a blank
/// of equal length rather than shifting its neighbors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackEntry {
    Clip(Clip),
    Blank { position: i64, length: i64 },
}

impl TrackEntry {
    /// Create a blank entry.
    pub fn blank(position: i64, length: i64) -> Self {
        Self::Blank { position, length }
    }

    #[inline]
    pub fn position(&self) -> i64 {
        match self {
            Self::Clip(clip) => clip.position,
            Self::Blank { position, .. } => *position,
        }
    }

    #[inline]
    pub fn length(&self) -> i64 {
        match self {
            Self::Clip(clip) => clip.length,
            Self::Blank { length, .. } => *length,
        }
    }

    #[inline]
    pub fn end(&self) -> i64 {
        self.position() + self.length()
    }

    #[inline]
    pub fn span(&self) -> FrameSpan {
        FrameSpan::with_length(self.position(), self.length())
    }

    #[inline]
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Blank { .. })
    }

    pub fn as_clip(&self) -> Option<&Clip> {
        match self {
            Self::Clip(clip) => Some(clip),
            Self::Blank { .. } => None,
        }
    }

    pub fn as_clip_mut(&mut self) -> Option<&mut Clip> {
        match self {
            Self::Clip(clip) => Some(clip),
            Self::Blank { .. } => None,
        }
    }

    pub(crate) fn set_position(&mut self, new_position: i64) {
        match self {
            Self::Clip(clip) => clip.position = new_position,
            Self::Blank { position, .. } => *position = new_position,
        }
    }

    pub(crate) fn set_length(&mut self, new_length: i64) {
        match self {
            Self::Clip(clip) => clip.length = new_length,
            Self::Blank { length, .. } => *length = new_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_handle(length: i64) -> ProducerHandle {
        ProducerHandle::new("test.mp4", length)
    }

    #[test]
    fn test_spec_defaults_to_remaining_source() {
        let spec = ClipSpec {
            producer: make_handle(100),
            in_point: 30,
            length: None,
            speed: 1.0,
        };
        assert_eq!(spec.effective_length(), 70);
    }

    #[test]
    fn test_materialize_sets_position_and_identity() {
        let spec = ClipSpec::with_range(make_handle(100), 10, 20);
        let a = spec.materialize(5);
        let b = spec.materialize(5);
        assert_eq!(a.position, 5);
        assert_eq!(a.length, 20);
        assert_eq!(a.span(), FrameSpan::new(5, 25));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_room_accounting() {
        let spec = ClipSpec::with_range(make_handle(100), 10, 20);
        let clip = spec.materialize(0);
        assert_eq!(clip.head_room(), 10);
        assert_eq!(clip.tail_room(), 70);
        assert_eq!(clip.out_point(), 30);
    }
}
