//! Error types for Framecut.

use thiserror::Error;

/// Main error type for timeline operations.
///
/// Every mutating operation validates before touching state, so a returned
/// error guarantees the model was not modified.
#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("track is locked")]
    LockedTrack,

    #[error("operation would overlap an existing entry at frame {0}")]
    Overlap(i64),

    #[error("invalid index: {0}")]
    InvalidIndex(String),

    #[error("operation would produce a zero-length clip")]
    ZeroLength,

    #[error("source is not seekable: {0}")]
    NonSeekableSource(String),

    #[error("no such group: {0}")]
    MissingGroup(uuid::Uuid),

    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for timeline operations.
pub type Result<T> = std::result::Result<T, TimelineError>;
