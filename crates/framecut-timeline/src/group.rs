//! Clip grouping.
//!
//! A group is an equivalence class over clip identities; membership lives on
//! the clips themselves (`Clip::group`) so it persists with the document.
//! The manager is the query layer; group assignment is an edit command so
//! grouping participates in undo.

use framecut_core::{Result, TimelineError};
use uuid::Uuid;

use crate::model::MultitrackModel;
use crate::selection::ClipAddress;

/// Query layer over group membership stored in the model.
#[derive(Debug, Default)]
pub struct GroupManager;

impl GroupManager {
    /// All member addresses of the group containing the clip at the given
    /// address. Empty when the clip is ungrouped or the address is invalid.
    pub fn group_for_clip(
        &self,
        model: &MultitrackModel,
        track: usize,
        index: usize,
    ) -> Vec<ClipAddress> {
        let Ok(clip) = model.clip(track, index) else {
            return Vec::new();
        };
        let Some(group) = clip.group else {
            return Vec::new();
        };
        self.members(model, group)
    }

    /// Member addresses of a group, in track order.
    pub fn members(&self, model: &MultitrackModel, group: Uuid) -> Vec<ClipAddress> {
        model
            .clips_in_group(group)
            .iter()
            .filter_map(|id| model.find_clip(*id))
            .map(|(track, index)| ClipAddress::new(track, index))
            .collect()
    }

    /// Validate that a group exists and return its member identities.
    pub fn member_ids(&self, model: &MultitrackModel, group: Uuid) -> Result<Vec<Uuid>> {
        let ids = model.clips_in_group(group);
        if ids.is_empty() {
            return Err(TimelineError::MissingGroup(group));
        }
        Ok(ids)
    }

    /// Groups dissolve when membership drops below two. Scans the model for
    /// single-member groups and returns the membership clears needed to
    /// dissolve them, one `(clip, old, new)` assignment per orphaned clip.
    pub fn dissolve_orphans(
        &self,
        model: &MultitrackModel,
    ) -> Vec<(Uuid, Option<Uuid>, Option<Uuid>)> {
        use std::collections::HashMap;

        let mut membership: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for track in &model.tracks {
            for entry in &track.entries {
                if let Some(clip) = entry.as_clip() {
                    if let Some(group) = clip.group {
                        membership.entry(group).or_default().push(clip.id);
                    }
                }
            }
        }
        membership
            .into_iter()
            .filter(|(_, members)| members.len() == 1)
            .flat_map(|(group, members)| {
                members.into_iter().map(move |id| (id, Some(group), None))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{ClipSpec, TrackEntry};
    use framecut_core::ProducerHandle;

    fn grouped_model() -> (MultitrackModel, Uuid, Vec<Uuid>) {
        let mut model = MultitrackModel::default();
        let group = Uuid::new_v4();
        let mut ids = Vec::new();
        let mut pos = 0;
        for _ in 0..3 {
            let mut clip =
                ClipSpec::with_range(ProducerHandle::new("a.mp4", 100), 0, 10).materialize(pos);
            clip.group = Some(group);
            ids.push(clip.id);
            model.tracks[0].entries.push(TrackEntry::Clip(clip));
            pos += 10;
        }
        (model, group, ids)
    }

    #[test]
    fn test_group_for_clip_returns_all_members() {
        let (model, _, _) = grouped_model();
        let members = GroupManager.group_for_clip(&model, 0, 1);
        assert_eq!(
            members,
            vec![
                ClipAddress::new(0, 0),
                ClipAddress::new(0, 1),
                ClipAddress::new(0, 2)
            ]
        );
    }

    #[test]
    fn test_missing_group_is_an_error() {
        let (model, _, _) = grouped_model();
        assert!(matches!(
            GroupManager.member_ids(&model, Uuid::new_v4()),
            Err(TimelineError::MissingGroup(_))
        ));
    }

    #[test]
    fn test_dissolve_orphans_below_two_members() {
        let (mut model, group, ids) = grouped_model();
        // Three members is a healthy group.
        assert!(GroupManager.dissolve_orphans(&model).is_empty());
        // Dropping to one member yields a clear for the survivor.
        model.tracks[0]
            .entries
            .retain(|entry| entry.as_clip().map(|clip| clip.id) == Some(ids[2]));
        let clears = GroupManager.dissolve_orphans(&model);
        assert_eq!(clears, vec![(ids[2], Some(group), None)]);
    }
}
