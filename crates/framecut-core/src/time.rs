//! Frame-accurate time representation
//!
//! The timeline is addressed in integer frame units. Frame rates are exact
//! rationals (30000/1001, not 29.97) so frame/second conversion never
//! accumulates floating-point error.

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An exact frame rate expressed as frames-per-second numerator/denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    pub numerator: i64,
    pub denominator: i64,
}

impl FrameRate {
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const NTSC_30: Self = Self::new(30000, 1001);
    pub const NTSC_60: Self = Self::new(60000, 1001);

    #[inline]
    pub const fn new(numerator: i64, denominator: i64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Frames-per-second as an exact rational.
    #[inline]
    pub fn as_rational(self) -> Rational64 {
        Rational64::new(self.numerator, self.denominator)
    }

    /// Convert a frame count to seconds (lossy, for display only).
    pub fn frames_to_seconds(self, frames: i64) -> f64 {
        frames as f64 * self.denominator as f64 / self.numerator as f64
    }

    /// Convert seconds to the nearest frame count.
    pub fn seconds_to_frames(self, seconds: f64) -> i64 {
        (seconds * self.numerator as f64 / self.denominator as f64).round() as i64
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_25
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{} fps", self.numerator)
        } else {
            write!(f, "{}/{} fps", self.numerator, self.denominator)
        }
    }
}

/// A half-open span of frames `[start, end)` on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSpan {
    pub start: i64,
    pub end: i64,
}

impl FrameSpan {
    #[inline]
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    #[inline]
    pub const fn with_length(start: i64, length: i64) -> Self {
        Self {
            start,
            end: start + length,
        }
    }

    #[inline]
    pub const fn length(self) -> i64 {
        self.end - self.start
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.end <= self.start
    }

    /// True if `frame` lies within `[start, end)`.
    #[inline]
    pub const fn contains(self, frame: i64) -> bool {
        frame >= self.start && frame < self.end
    }

    /// True if the two spans share at least one frame.
    #[inline]
    pub const fn overlaps(self, other: Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The overlapping span, if any.
    pub fn intersect(self, other: Self) -> Option<Self> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(Self { start, end })
    }
}

impl fmt::Display for FrameSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ntsc_rate_exact() {
        let rate = FrameRate::NTSC_30;
        // 30000 frames at 30000/1001 fps is exactly 1001 seconds
        assert_eq!(rate.frames_to_seconds(30000), 1001.0);
        assert_eq!(rate.seconds_to_frames(1001.0), 30000);
    }

    #[test]
    fn test_span_overlap() {
        let a = FrameSpan::new(0, 10);
        let b = FrameSpan::new(10, 20);
        let c = FrameSpan::new(5, 15);
        assert!(!a.overlaps(b)); // half-open: touching is not overlapping
        assert!(a.overlaps(c));
        assert_eq!(a.intersect(c), Some(FrameSpan::new(5, 10)));
        assert_eq!(a.intersect(b), None);
    }

    #[test]
    fn test_span_contains() {
        let span = FrameSpan::with_length(10, 5);
        assert!(span.contains(10));
        assert!(span.contains(14));
        assert!(!span.contains(15));
        assert_eq!(span.length(), 5);
    }
}
