//! Framecut Core - Foundation types for the timeline engine
//!
//! This crate provides the fundamental types used throughout Framecut:
//! - Frame-accurate time (FrameRate, FrameSpan)
//! - Error types shared by all engine operations
//! - Opaque producer handles for external media sources

pub mod error;
pub mod producer;
pub mod time;

pub use error::{Result, TimelineError};
pub use producer::ProducerHandle;
pub use time::{FrameRate, FrameSpan};
