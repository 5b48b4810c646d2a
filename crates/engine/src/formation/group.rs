use std::collections::HashMap;

use bitflags::bitflags;
use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::motion::{Animation, CoordinateMode, finite_vec};
use crate::registry::TrackId;

use super::template::FormationTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Member {
    Track(TrackId),
    /// A nested group, represented by its center.
    Group(GroupId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relationship {
    LeaderFollower { leader: TrackId },
    Isobarycentric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemberOffset {
    Fixed(DVec3),
    /// Offset driven by its own motion model, e.g. orbiting a moving leader.
    Animated(Animation),
}

impl MemberOffset {
    pub fn at(&self, now: f64) -> DVec3 {
        match self {
            Self::Fixed(offset) => *offset,
            Self::Animated(animation) => animation.evaluate_at(now).to_vec3(),
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GroupFlags: u8 {
        /// The reference (leader) is missing; the last known one is frozen.
        const DEGRADED = 1 << 0;
    }
}

/// A set of members moving under one relationship.
///
/// Membership order is insertion order and doubles as priority when slots
/// collide.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub mode: CoordinateMode,
    members: Vec<Member>,
    relationship: Relationship,
    formation: Option<FormationTemplate>,
    offsets: HashMap<Member, MemberOffset>,
    animation: Option<Animation>,
    center: DVec3,
    last_reference: Option<DVec3>,
    parent: Option<GroupId>,
    flags: GroupFlags,
}

impl Group {
    pub fn new(id: GroupId, name: impl Into<String>, relationship: Relationship) -> Self {
        Self {
            id,
            name: name.into(),
            mode: CoordinateMode::Cartesian,
            members: Vec::new(),
            relationship,
            formation: None,
            offsets: HashMap::new(),
            animation: None,
            center: DVec3::ZERO,
            last_reference: None,
            parent: None,
            flags: GroupFlags::empty(),
        }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn contains(&self, member: Member) -> bool {
        self.members.contains(&member)
    }

    pub fn relationship(&self) -> Relationship {
        self.relationship
    }

    pub fn formation(&self) -> Option<&FormationTemplate> {
        self.formation.as_ref()
    }

    pub fn animation(&self) -> Option<&Animation> {
        self.animation.as_ref()
    }

    pub fn offset(&self, member: Member) -> Option<&MemberOffset> {
        self.offsets.get(&member)
    }

    pub fn center(&self) -> DVec3 {
        self.center
    }

    pub fn parent(&self) -> Option<GroupId> {
        self.parent
    }

    pub fn flags(&self) -> GroupFlags {
        self.flags
    }

    pub fn is_degraded(&self) -> bool {
        self.flags.contains(GroupFlags::DEGRADED)
    }

    pub fn last_reference(&self) -> Option<DVec3> {
        self.last_reference
    }

    pub fn leader(&self) -> Option<TrackId> {
        match self.relationship {
            Relationship::LeaderFollower { leader } => Some(leader),
            Relationship::Isobarycentric => None,
        }
    }

    pub(crate) fn push_member(&mut self, member: Member) {
        if !self.members.contains(&member) {
            self.members.push(member);
        }
    }

    pub(crate) fn remove_member(&mut self, member: Member) -> bool {
        let before = self.members.len();
        self.members.retain(|m| *m != member);
        self.offsets.remove(&member);
        self.members.len() != before
    }

    pub(crate) fn set_relationship(&mut self, relationship: Relationship) {
        self.relationship = relationship;
        self.offsets.clear();
        self.last_reference = None;
        self.flags.remove(GroupFlags::DEGRADED);
    }

    pub(crate) fn set_formation(
        &mut self,
        formation: Option<FormationTemplate>,
    ) -> Result<(), ValidationError> {
        if let Some(template) = &formation {
            template.validate()?;
        }
        self.formation = formation;
        Ok(())
    }

    pub(crate) fn set_offset(
        &mut self,
        member: Member,
        offset: MemberOffset,
    ) -> Result<(), ValidationError> {
        if let MemberOffset::Fixed(v) = offset {
            finite_vec("offset", v)?;
        }
        self.offsets.insert(member, offset);
        Ok(())
    }

    pub(crate) fn animation_mut(&mut self) -> Option<&mut Animation> {
        self.animation.as_mut()
    }

    pub(crate) fn set_animation(&mut self, animation: Option<Animation>) {
        self.animation = animation;
    }

    pub(crate) fn set_parent(&mut self, parent: Option<GroupId>) {
        self.parent = parent;
    }

    pub(crate) fn record_solution(&mut self, center: DVec3, reference: DVec3, degraded: bool) {
        self.center = center;
        self.last_reference = Some(reference);
        self.flags.set(GroupFlags::DEGRADED, degraded);
    }
}
