use std::collections::BTreeMap;

use glam::DVec3;

use crate::coord::Position;
use crate::error::ValidationError;
use crate::formation::{
    FormationTemplate, Group, GroupId, Member, MemberOffset, Relationship, mean,
};
use crate::motion::{Animation, CoordinateMode, ParamValue, finite_position};

use super::track::{Track, TrackFlags, TrackId, TrackParameter};

/// Authoritative track and group arena.
///
/// Owned by the scheduler thread; every mutation is applied between ticks.
/// Ordered maps keep batch order stable across ticks.
#[derive(Debug, Default)]
pub struct Registry {
    tracks: BTreeMap<TrackId, Track>,
    groups: BTreeMap<GroupId, Group>,
    pending_parameters: Vec<(TrackId, TrackParameter)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub(crate) fn tracks_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.values_mut()
    }

    pub(crate) fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(&id)
    }

    pub(crate) fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.get_mut(&id)
    }

    pub(crate) fn take_parameters(&mut self) -> Vec<(TrackId, TrackParameter)> {
        std::mem::take(&mut self.pending_parameters)
    }

    /// Forces every track into the next batch, e.g. after a reconnect.
    pub fn mark_all_dirty(&mut self) {
        for track in self.tracks.values_mut() {
            track.flags.insert(TrackFlags::DIRTY);
        }
    }

    /// Replaces the parameter queue with every track's current gain, mute
    /// and color, so a freshly connected device starts from full state.
    pub(crate) fn queue_all_parameters(&mut self) {
        self.pending_parameters.clear();
        for track in self.tracks.values() {
            self.pending_parameters.extend([
                (track.id, TrackParameter::Gain(track.gain_db)),
                (track.id, TrackParameter::Mute(track.mute)),
                (track.id, TrackParameter::Color(track.color)),
            ]);
        }
    }

    pub fn add_track(
        &mut self,
        id: TrackId,
        name: impl Into<String>,
        position: Position,
    ) -> Result<(), ValidationError> {
        if id.0 == 0 {
            return Err(ValidationError::ReservedTrackId);
        }
        if self.tracks.contains_key(&id) {
            return Err(ValidationError::DuplicateTrack(id));
        }
        finite_position("position", &position)?;
        self.tracks
            .insert(id, Track::new(id, name, position.normalize()));
        Ok(())
    }

    pub fn remove_track(&mut self, id: TrackId) -> Result<Track, ValidationError> {
        let track = self
            .tracks
            .remove(&id)
            .ok_or(ValidationError::UnknownTrack(id))?;
        if let Some(group) = track.group.and_then(|g| self.groups.get_mut(&g)) {
            group.remove_member(Member::Track(id));
        }
        self.pending_parameters.retain(|(t, _)| *t != id);
        Ok(track)
    }

    pub fn set_track_position(
        &mut self,
        id: TrackId,
        position: Position,
    ) -> Result<(), ValidationError> {
        finite_position("position", &position)?;
        let track = self.existing_track(id)?;
        track.position = position.normalize();
        track.flags.insert(TrackFlags::DIRTY);
        Ok(())
    }

    pub fn set_track_active(&mut self, id: TrackId, active: bool) -> Result<(), ValidationError> {
        let track = self.existing_track(id)?;
        track.flags.set(TrackFlags::ACTIVE, active);
        if active {
            track.flags.insert(TrackFlags::DIRTY);
        }
        Ok(())
    }

    /// Binds `animation` to a track, replacing any previous one. An origin of
    /// [`crate::motion::TimeOrigin::Now`] resolves to `now`.
    pub fn attach_animation(
        &mut self,
        id: TrackId,
        mut animation: Animation,
        now: f64,
    ) -> Result<(), ValidationError> {
        let track = self.existing_track(id)?;
        animation.resolve_origin(now);
        track.animation = Some(animation);
        track.flags.remove(TrackFlags::DEGRADED);
        Ok(())
    }

    /// Unbinds the animation; the track stays where it was last sent.
    pub fn detach_animation(&mut self, id: TrackId) -> Result<Option<Animation>, ValidationError> {
        let track = self.existing_track(id)?;
        let animation = track.animation.take();
        if animation.is_some() {
            track.position = track.output;
            track.flags.insert(TrackFlags::DIRTY);
        }
        Ok(animation)
    }

    pub fn set_animation_parameter(
        &mut self,
        id: TrackId,
        name: &str,
        value: ParamValue,
    ) -> Result<(), ValidationError> {
        let track = self.existing_track(id)?;
        let animation = track
            .animation
            .as_mut()
            .ok_or_else(|| ValidationError::UnknownParameter(name.to_string()))?;
        animation.set_parameter(name, value)
    }

    pub fn set_track_parameter(
        &mut self,
        id: TrackId,
        parameter: TrackParameter,
    ) -> Result<(), ValidationError> {
        parameter.validate()?;
        let track = self.existing_track(id)?;
        track.apply_parameter(parameter);
        self.pending_parameters.push((id, parameter));
        Ok(())
    }

    /// Creates a group. A leader-follower group starts with its leader as the
    /// first member.
    pub fn add_group(
        &mut self,
        id: GroupId,
        name: impl Into<String>,
        relationship: Relationship,
    ) -> Result<(), ValidationError> {
        if self.groups.contains_key(&id) {
            return Err(ValidationError::DuplicateGroup(id));
        }
        if let Relationship::LeaderFollower { leader } = relationship {
            self.check_track_free(leader, id)?;
        }

        self.groups.insert(id, Group::new(id, name, relationship));
        if let Relationship::LeaderFollower { leader } = relationship {
            self.add_group_member(id, Member::Track(leader))?;
        }
        Ok(())
    }

    /// Removes a group; its members become ungrouped and it is detached from
    /// its parent.
    pub fn remove_group(&mut self, id: GroupId) -> Result<Group, ValidationError> {
        let group = self
            .groups
            .remove(&id)
            .ok_or(ValidationError::UnknownGroup(id))?;

        for member in group.members() {
            match *member {
                Member::Track(track) => {
                    if let Some(track) = self.tracks.get_mut(&track) {
                        track.group = None;
                    }
                }
                Member::Group(child) => {
                    if let Some(child) = self.groups.get_mut(&child) {
                        child.set_parent(None);
                    }
                }
            }
        }
        if let Some(parent) = group.parent().and_then(|p| self.groups.get_mut(&p)) {
            parent.remove_member(Member::Group(id));
        }
        Ok(group)
    }

    pub fn add_group_member(&mut self, id: GroupId, member: Member) -> Result<(), ValidationError> {
        if !self.groups.contains_key(&id) {
            return Err(ValidationError::UnknownGroup(id));
        }

        match member {
            Member::Track(track) => {
                self.check_track_free(track, id)?;
                if let Some(track) = self.tracks.get_mut(&track) {
                    track.group = Some(id);
                }
            }
            Member::Group(child) => {
                self.check_nesting(id, child)?;
                if let Some(child) = self.groups.get_mut(&child) {
                    child.set_parent(Some(id));
                }
            }
        }

        let offset = self
            .groups
            .get(&id)
            .filter(|group| !group.contains(member))
            .and_then(|group| self.joining_offset(group, member));
        if let Some(group) = self.groups.get_mut(&id) {
            group.push_member(member);
            if let Some(offset) = offset {
                group.set_offset(member, MemberOffset::Fixed(offset))?;
            }
        }
        Ok(())
    }

    pub fn remove_group_member(
        &mut self,
        id: GroupId,
        member: Member,
    ) -> Result<(), ValidationError> {
        let group = self
            .groups
            .get_mut(&id)
            .ok_or(ValidationError::UnknownGroup(id))?;
        if !group.remove_member(member) {
            return Ok(());
        }

        match member {
            Member::Track(track) => {
                if let Some(track) = self.tracks.get_mut(&track) {
                    track.group = None;
                    track.flags.insert(TrackFlags::DIRTY);
                }
            }
            Member::Group(child) => {
                if let Some(child) = self.groups.get_mut(&child) {
                    child.set_parent(None);
                }
            }
        }
        Ok(())
    }

    pub fn set_relationship(
        &mut self,
        id: GroupId,
        relationship: Relationship,
    ) -> Result<(), ValidationError> {
        let group = self.existing_group(id)?;
        if let Relationship::LeaderFollower { leader } = relationship {
            if !group.contains(Member::Track(leader)) {
                return Err(ValidationError::LeaderNotMember(leader));
            }
        }
        group.set_relationship(relationship);
        self.capture_offsets(id)
    }

    pub fn set_formation(
        &mut self,
        id: GroupId,
        formation: Option<FormationTemplate>,
    ) -> Result<(), ValidationError> {
        self.existing_group(id)?.set_formation(formation)
    }

    pub fn set_member_offset(
        &mut self,
        id: GroupId,
        member: Member,
        mut offset: MemberOffset,
        now: f64,
    ) -> Result<(), ValidationError> {
        let group = self.existing_group(id)?;
        if !group.contains(member) {
            return Err(match member {
                Member::Track(track) => ValidationError::UnknownTrack(track),
                Member::Group(child) => ValidationError::UnknownGroup(child),
            });
        }
        if let MemberOffset::Animated(animation) = &mut offset {
            animation.resolve_origin(now);
        }
        group.set_offset(member, offset)
    }

    pub fn set_group_animation(
        &mut self,
        id: GroupId,
        animation: Option<Animation>,
        now: f64,
    ) -> Result<(), ValidationError> {
        let group = self.existing_group(id)?;
        let animation = animation.map(|mut a| {
            a.resolve_origin(now);
            a
        });
        group.set_animation(animation);
        Ok(())
    }

    pub fn set_group_animation_parameter(
        &mut self,
        id: GroupId,
        name: &str,
        value: ParamValue,
    ) -> Result<(), ValidationError> {
        let group = self.existing_group(id)?;
        let animation = group
            .animation_mut()
            .ok_or_else(|| ValidationError::UnknownParameter(name.to_string()))?;
        animation.set_parameter(name, value)
    }

    pub fn set_group_mode(&mut self, id: GroupId, mode: CoordinateMode) -> Result<(), ValidationError> {
        self.existing_group(id)?.mode = mode;
        Ok(())
    }

    /// Groups ordered children before parents.
    pub fn solve_order(&self) -> Vec<GroupId> {
        fn visit(registry: &Registry, id: GroupId, order: &mut Vec<GroupId>) {
            if let Some(group) = registry.groups.get(&id) {
                for member in group.members() {
                    if let Member::Group(child) = *member {
                        visit(registry, child, order);
                    }
                }
                order.push(id);
            }
        }

        let mut order = Vec::with_capacity(self.groups.len());
        for group in self.groups.values().filter(|g| g.parent().is_none()) {
            visit(self, group.id, &mut order);
        }
        order
    }

    /// Where a member sits right now: a track's last output, or a nested
    /// group's solved center (the mean of its members before the first solve).
    fn member_position(&self, member: Member) -> Option<DVec3> {
        match member {
            Member::Track(id) => self.tracks.get(&id).map(|t| t.output.to_vec3()),
            Member::Group(id) => {
                let group = self.groups.get(&id)?;
                if group.last_reference().is_some() {
                    return Some(group.center());
                }
                let positions: Vec<DVec3> = group
                    .members()
                    .iter()
                    .filter_map(|&m| self.member_position(m))
                    .collect();
                (!positions.is_empty()).then(|| mean(positions.into_iter()))
            }
        }
    }

    /// Offset that keeps a joining member where it is once the group
    /// reapplies offsets every tick.
    fn joining_offset(&self, group: &Group, member: Member) -> Option<DVec3> {
        let position = self.member_position(member)?;
        let offset = match group.relationship() {
            Relationship::LeaderFollower { leader } => {
                let reference = self
                    .member_position(Member::Track(leader))
                    .or(group.last_reference())?;
                position - reference
            }
            Relationship::Isobarycentric => {
                let current: Vec<(Member, DVec3)> = group
                    .members()
                    .iter()
                    .filter_map(|&m| self.member_position(m).map(|p| (m, p)))
                    .collect();
                if current.is_empty() {
                    return Some(DVec3::ZERO);
                }
                // The solver subtracts the mean offset, so the newcomer is
                // expressed in the same frame as the existing offsets.
                let center = mean(current.iter().map(|(_, p)| *p));
                let drift = mean(current.iter().map(|&(m, p)| match group.offset(m) {
                    Some(MemberOffset::Fixed(offset)) => *offset,
                    _ => p - center,
                }));
                position - center + drift
            }
        };
        offset.is_finite().then_some(offset)
    }

    /// Records every member's current place relative to the group's
    /// reference.
    fn capture_offsets(&mut self, id: GroupId) -> Result<(), ValidationError> {
        let group = self.groups.get(&id).ok_or(ValidationError::UnknownGroup(id))?;
        let positions: Vec<(Member, DVec3)> = group
            .members()
            .iter()
            .filter_map(|&m| self.member_position(m).map(|p| (m, p)))
            .collect();
        let reference = match group.relationship() {
            Relationship::LeaderFollower { leader } => positions
                .iter()
                .find(|(m, _)| *m == Member::Track(leader))
                .map(|(_, p)| *p),
            Relationship::Isobarycentric => {
                (!positions.is_empty()).then(|| mean(positions.iter().map(|(_, p)| *p)))
            }
        };
        let Some(reference) = reference else {
            return Ok(());
        };

        let group = self.existing_group(id)?;
        for (member, position) in positions {
            let offset = position - reference;
            if offset.is_finite() {
                group.set_offset(member, MemberOffset::Fixed(offset))?;
            }
        }
        Ok(())
    }

    fn existing_track(&mut self, id: TrackId) -> Result<&mut Track, ValidationError> {
        self.tracks
            .get_mut(&id)
            .ok_or(ValidationError::UnknownTrack(id))
    }

    fn existing_group(&mut self, id: GroupId) -> Result<&mut Group, ValidationError> {
        self.groups
            .get_mut(&id)
            .ok_or(ValidationError::UnknownGroup(id))
    }

    fn check_track_free(&self, track: TrackId, joining: GroupId) -> Result<(), ValidationError> {
        let track = self
            .tracks
            .get(&track)
            .ok_or(ValidationError::UnknownTrack(track))?;
        match track.group {
            Some(group) if group != joining => Err(ValidationError::TrackAlreadyGrouped {
                track: track.id,
                group,
            }),
            _ => Ok(()),
        }
    }

    fn check_nesting(&self, parent: GroupId, child: GroupId) -> Result<(), ValidationError> {
        let nested = self
            .groups
            .get(&child)
            .ok_or(ValidationError::UnknownGroup(child))?;

        let mut cursor = Some(parent);
        while let Some(ancestor) = cursor {
            if ancestor == child {
                return Err(ValidationError::GroupCycle { parent, child });
            }
            cursor = self.groups.get(&ancestor).and_then(Group::parent);
        }

        match nested.parent() {
            Some(existing) if existing != parent => Err(ValidationError::GroupAlreadyNested {
                child,
                parent: existing,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_tracks(n: u32) -> Registry {
        let mut registry = Registry::new();
        for id in 1..=n {
            registry
                .add_track(TrackId(id), format!("t{id}"), Position::cartesian(id as f64, 0.0, 0.0))
                .unwrap();
        }
        registry
    }

    #[test]
    fn track_ids_are_unique_and_non_zero() {
        let mut registry = registry_with_tracks(1);
        assert_eq!(
            registry.add_track(TrackId(1), "dup", Position::default()),
            Err(ValidationError::DuplicateTrack(TrackId(1)))
        );
        assert_eq!(
            registry.add_track(TrackId(0), "zero", Position::default()),
            Err(ValidationError::ReservedTrackId)
        );
        assert!(
            registry
                .add_track(TrackId(2), "nan", Position::cartesian(f64::NAN, 0.0, 0.0))
                .is_err()
        );
    }

    #[test]
    fn track_belongs_to_one_group() {
        let mut registry = registry_with_tracks(2);
        registry
            .add_group(GroupId(1), "a", Relationship::Isobarycentric)
            .unwrap();
        registry
            .add_group(GroupId(2), "b", Relationship::Isobarycentric)
            .unwrap();

        registry
            .add_group_member(GroupId(1), Member::Track(TrackId(1)))
            .unwrap();
        assert_eq!(
            registry.add_group_member(GroupId(2), Member::Track(TrackId(1))),
            Err(ValidationError::TrackAlreadyGrouped {
                track: TrackId(1),
                group: GroupId(1),
            })
        );

        // Re-adding to the same group is a no-op.
        registry
            .add_group_member(GroupId(1), Member::Track(TrackId(1)))
            .unwrap();
        assert_eq!(registry.group(GroupId(1)).unwrap().members().len(), 1);

        registry
            .remove_group_member(GroupId(1), Member::Track(TrackId(1)))
            .unwrap();
        registry
            .add_group_member(GroupId(2), Member::Track(TrackId(1)))
            .unwrap();
        assert_eq!(registry.track(TrackId(1)).unwrap().group(), Some(GroupId(2)));
    }

    #[test]
    fn nesting_cycles_are_rejected() {
        let mut registry = Registry::new();
        for id in 1..=3 {
            registry
                .add_group(GroupId(id), "g", Relationship::Isobarycentric)
                .unwrap();
        }
        registry
            .add_group_member(GroupId(1), Member::Group(GroupId(2)))
            .unwrap();
        registry
            .add_group_member(GroupId(2), Member::Group(GroupId(3)))
            .unwrap();

        assert_eq!(
            registry.add_group_member(GroupId(3), Member::Group(GroupId(1))),
            Err(ValidationError::GroupCycle {
                parent: GroupId(3),
                child: GroupId(1),
            })
        );
        assert_eq!(
            registry.add_group_member(GroupId(2), Member::Group(GroupId(2))),
            Err(ValidationError::GroupCycle {
                parent: GroupId(2),
                child: GroupId(2),
            })
        );
        assert_eq!(
            registry.add_group_member(GroupId(1), Member::Group(GroupId(3))),
            Err(ValidationError::GroupAlreadyNested {
                child: GroupId(3),
                parent: GroupId(2),
            })
        );
        assert_eq!(
            registry.solve_order(),
            vec![GroupId(3), GroupId(2), GroupId(1)]
        );
    }

    #[test]
    fn leader_is_first_member() {
        let mut registry = registry_with_tracks(3);
        registry
            .add_group(
                GroupId(1),
                "lf",
                Relationship::LeaderFollower {
                    leader: TrackId(2),
                },
            )
            .unwrap();
        registry
            .add_group_member(GroupId(1), Member::Track(TrackId(3)))
            .unwrap();

        let group = registry.group(GroupId(1)).unwrap();
        assert_eq!(
            group.members(),
            &[Member::Track(TrackId(2)), Member::Track(TrackId(3))]
        );
        assert_eq!(
            registry.set_relationship(
                GroupId(1),
                Relationship::LeaderFollower {
                    leader: TrackId(1),
                }
            ),
            Err(ValidationError::LeaderNotMember(TrackId(1)))
        );
    }

    #[test]
    fn removing_a_track_releases_membership() {
        let mut registry = registry_with_tracks(2);
        registry
            .add_group(
                GroupId(1),
                "lf",
                Relationship::LeaderFollower {
                    leader: TrackId(1),
                },
            )
            .unwrap();
        registry
            .add_group_member(GroupId(1), Member::Track(TrackId(2)))
            .unwrap();

        registry.remove_track(TrackId(1)).unwrap();
        let group = registry.group(GroupId(1)).unwrap();
        assert_eq!(group.members(), &[Member::Track(TrackId(2))]);
        // The relationship still names the removed leader.
        assert_eq!(group.leader(), Some(TrackId(1)));

        registry.remove_group(GroupId(1)).unwrap();
        assert_eq!(registry.track(TrackId(2)).unwrap().group(), None);
    }

    #[test]
    fn animation_parameter_needs_an_animation() {
        let mut registry = registry_with_tracks(1);
        assert!(
            registry
                .set_animation_parameter(TrackId(1), "radius", 1.0.into())
                .is_err()
        );
    }

    #[test]
    fn joining_and_relationship_changes_capture_offsets() {
        let mut registry = registry_with_tracks(3);
        registry
            .add_group(GroupId(1), "g", Relationship::Isobarycentric)
            .unwrap();
        for id in 1..=3 {
            registry
                .add_group_member(GroupId(1), Member::Track(TrackId(id)))
                .unwrap();
        }
        let group = registry.group(GroupId(1)).unwrap();
        assert!(group.members().iter().all(|&m| group.offset(m).is_some()));

        registry
            .set_relationship(
                GroupId(1),
                Relationship::LeaderFollower {
                    leader: TrackId(2),
                },
            )
            .unwrap();
        let group = registry.group(GroupId(1)).unwrap();
        assert_eq!(
            group.offset(Member::Track(TrackId(1))),
            Some(&MemberOffset::Fixed(DVec3::new(-1.0, 0.0, 0.0)))
        );
        assert_eq!(
            group.offset(Member::Track(TrackId(3))),
            Some(&MemberOffset::Fixed(DVec3::new(1.0, 0.0, 0.0)))
        );
    }

    #[test]
    fn parameters_are_queued_once() {
        let mut registry = registry_with_tracks(1);
        registry
            .set_track_parameter(TrackId(1), TrackParameter::Gain(-6.0))
            .unwrap();
        assert!(
            registry
                .set_track_parameter(TrackId(1), TrackParameter::Gain(40.0))
                .is_err()
        );

        assert_eq!(registry.track(TrackId(1)).unwrap().gain_db, -6.0);
        assert_eq!(
            registry.take_parameters(),
            vec![(TrackId(1), TrackParameter::Gain(-6.0))]
        );
        assert!(registry.take_parameters().is_empty());
    }

    #[test]
    fn reconnect_queues_current_parameters_once() {
        let mut registry = registry_with_tracks(1);
        registry
            .set_track_parameter(TrackId(1), TrackParameter::Gain(-6.0))
            .unwrap();
        registry
            .set_track_parameter(TrackId(1), TrackParameter::Gain(-3.0))
            .unwrap();

        registry.queue_all_parameters();

        let color = registry.track(TrackId(1)).unwrap().color;
        assert_eq!(
            registry.take_parameters(),
            vec![
                (TrackId(1), TrackParameter::Gain(-3.0)),
                (TrackId(1), TrackParameter::Mute(false)),
                (TrackId(1), TrackParameter::Color(color)),
            ]
        );
    }
}
