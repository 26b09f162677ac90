//! Framecut Timeline - Multitrack timeline editing engine
//!
//! Implements the editing model behind the timeline view:
//! - Tracks of contiguous clip/blank entries
//! - Validated, atomic edit operations with ripple/roll variants
//! - Selection, grouping, and marker bookkeeping
//! - Undo/redo with interactive drag coalescing
//! - Versioned document serialization

pub mod clip;
pub mod engine;
pub mod events;
pub mod group;
pub mod marker;
pub mod model;
pub mod selection;
pub mod serialization;
pub mod track;
pub mod undo;

pub use clip::{Clip, ClipSpec, TrackEntry};
pub use engine::{JobOutcome, Timeline, TrimSide};
pub use events::{ChangeEvent, SelectionAspect, TimelineObserver};
pub use group::GroupManager;
pub use marker::{Marker, MarkerManager};
pub use model::MultitrackModel;
pub use selection::{ClipAddress, SelectionManager, SelectionSnapshot};
pub use serialization::{DocumentFragment, TimelineDocument};
pub use track::{CompositeMode, Track, TrackKind};
pub use undo::{EditCommand, UndoStack};
