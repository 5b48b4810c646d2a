use crate::coord::Position;
use crate::error::ValidationError;
use crate::formation::{FormationTemplate, GroupId, Member, MemberOffset, Relationship};
use crate::motion::{Animation, CoordinateMode, ParamValue};

use super::store::Registry;
use super::track::{TrackId, TrackParameter};

/// A registry mutation queued by the host and applied between ticks.
#[derive(Debug, Clone)]
pub enum Command {
    AddTrack {
        id: TrackId,
        name: String,
        position: Position,
    },
    RemoveTrack(TrackId),
    SetTrackPosition(TrackId, Position),
    SetTrackActive(TrackId, bool),
    AttachAnimation(TrackId, Animation),
    DetachAnimation(TrackId),
    SetAnimationParameter {
        track: TrackId,
        name: String,
        value: ParamValue,
    },
    SetTrackParameter(TrackId, TrackParameter),
    AddGroup {
        id: GroupId,
        name: String,
        relationship: Relationship,
    },
    RemoveGroup(GroupId),
    AddGroupMember(GroupId, Member),
    RemoveGroupMember(GroupId, Member),
    SetRelationship(GroupId, Relationship),
    SetFormation(GroupId, Option<FormationTemplate>),
    SetMemberOffset(GroupId, Member, MemberOffset),
    SetGroupAnimation(GroupId, Option<Animation>),
    SetGroupAnimationParameter {
        group: GroupId,
        name: String,
        value: ParamValue,
    },
    SetGroupMode(GroupId, CoordinateMode),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddTrack { .. } => "add_track",
            Self::RemoveTrack(_) => "remove_track",
            Self::SetTrackPosition(..) => "set_track_position",
            Self::SetTrackActive(..) => "set_track_active",
            Self::AttachAnimation(..) => "attach_animation",
            Self::DetachAnimation(_) => "detach_animation",
            Self::SetAnimationParameter { .. } => "set_animation_parameter",
            Self::SetTrackParameter(..) => "set_track_parameter",
            Self::AddGroup { .. } => "add_group",
            Self::RemoveGroup(_) => "remove_group",
            Self::AddGroupMember(..) => "add_group_member",
            Self::RemoveGroupMember(..) => "remove_group_member",
            Self::SetRelationship(..) => "set_relationship",
            Self::SetFormation(..) => "set_formation",
            Self::SetMemberOffset(..) => "set_member_offset",
            Self::SetGroupAnimation(..) => "set_group_animation",
            Self::SetGroupAnimationParameter { .. } => "set_group_animation_parameter",
            Self::SetGroupMode(..) => "set_group_mode",
        }
    }
}

impl Registry {
    /// Applies one command; `now` is the engine clock at the tick boundary.
    pub fn apply(&mut self, command: Command, now: f64) -> Result<(), ValidationError> {
        match command {
            Command::AddTrack { id, name, position } => self.add_track(id, name, position),
            Command::RemoveTrack(id) => self.remove_track(id).map(drop),
            Command::SetTrackPosition(id, position) => self.set_track_position(id, position),
            Command::SetTrackActive(id, active) => self.set_track_active(id, active),
            Command::AttachAnimation(id, animation) => self.attach_animation(id, animation, now),
            Command::DetachAnimation(id) => self.detach_animation(id).map(drop),
            Command::SetAnimationParameter { track, name, value } => {
                self.set_animation_parameter(track, &name, value)
            }
            Command::SetTrackParameter(id, parameter) => self.set_track_parameter(id, parameter),
            Command::AddGroup {
                id,
                name,
                relationship,
            } => self.add_group(id, name, relationship),
            Command::RemoveGroup(id) => self.remove_group(id).map(drop),
            Command::AddGroupMember(id, member) => self.add_group_member(id, member),
            Command::RemoveGroupMember(id, member) => self.remove_group_member(id, member),
            Command::SetRelationship(id, relationship) => self.set_relationship(id, relationship),
            Command::SetFormation(id, formation) => self.set_formation(id, formation),
            Command::SetMemberOffset(id, member, offset) => {
                self.set_member_offset(id, member, offset, now)
            }
            Command::SetGroupAnimation(id, animation) => {
                self.set_group_animation(id, animation, now)
            }
            Command::SetGroupAnimationParameter { group, name, value } => {
                self.set_group_animation_parameter(group, &name, value)
            }
            Command::SetGroupMode(id, mode) => self.set_group_mode(id, mode),
        }
    }
}
