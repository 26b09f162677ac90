//! Timeline markers: point annotations independent of clip identity.

use framecut_core::{Result, TimelineError};
use serde::{Deserialize, Serialize};

/// A point annotation on the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub position: i64,
    pub label: String,
    /// Display color, e.g. "#ff5500".
    pub color: String,
    /// Creation order, used as a stable tie-break for equal positions.
    seq: u64,
}

/// Ordered list of markers: primary order by position, ties broken by
/// creation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerManager {
    markers: Vec<Marker>,
    next_seq: u64,
}

impl MarkerManager {
    /// Create a marker; returns its index in the ordered list.
    pub fn create(&mut self, position: i64, label: impl Into<String>, color: impl Into<String>) -> usize {
        let marker = Marker {
            position,
            label: label.into(),
            color: color.into(),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        let index = self
            .markers
            .partition_point(|m| (m.position, m.seq) <= (marker.position, marker.seq));
        self.markers.insert(index, marker);
        index
    }

    /// Edit a marker in place. Re-sorts if the position changed.
    pub fn edit(
        &mut self,
        index: usize,
        position: i64,
        label: impl Into<String>,
        color: impl Into<String>,
    ) -> Result<()> {
        let marker = self
            .markers
            .get_mut(index)
            .ok_or_else(|| TimelineError::InvalidIndex(format!("no marker {}", index)))?;
        let moved = marker.position != position;
        marker.position = position;
        marker.label = label.into();
        marker.color = color.into();
        if moved {
            self.markers.sort_by_key(|m| (m.position, m.seq));
        }
        Ok(())
    }

    pub fn delete(&mut self, index: usize) -> Result<Marker> {
        if index >= self.markers.len() {
            return Err(TimelineError::InvalidIndex(format!("no marker {}", index)));
        }
        Ok(self.markers.remove(index))
    }

    /// Delete the marker closest to the playhead, if any.
    pub fn delete_nearest(&mut self, playhead: i64) -> Option<Marker> {
        let index = self.nearest(playhead)?;
        Some(self.markers.remove(index))
    }

    /// Index of the marker closest to `playhead`.
    pub fn nearest(&self, playhead: i64) -> Option<usize> {
        self.markers
            .iter()
            .enumerate()
            .min_by_key(|(_, m)| (m.position - playhead).abs())
            .map(|(i, _)| i)
    }

    /// Position of the first marker strictly after the playhead.
    /// No wrap: at the end this is a no-op for the caller.
    pub fn seek_next(&self, playhead: i64) -> Option<i64> {
        self.markers
            .iter()
            .find(|m| m.position > playhead)
            .map(|m| m.position)
    }

    /// Position of the last marker strictly before the playhead.
    pub fn seek_prev(&self, playhead: i64) -> Option<i64> {
        self.markers
            .iter()
            .rev()
            .find(|m| m.position < playhead)
            .map(|m| m.position)
    }

    /// All markers with positions in `[start, end)`.
    pub fn in_range(&self, start: i64, end: i64) -> Vec<&Marker> {
        self.markers
            .iter()
            .filter(|m| m.position >= start && m.position < end)
            .collect()
    }

    pub fn get(&self, index: usize) -> Option<&Marker> {
        self.markers.get(index)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }
}
