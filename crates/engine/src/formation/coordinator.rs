use glam::DVec3;

use super::group::{Group, Member, Relationship};

/// Per-tick result of solving one group.
#[derive(Debug, Clone, PartialEq)]
pub struct FormationOutput {
    /// Derived center: the isobarycenter, or the leader position.
    pub center: DVec3,
    /// Position every offset was applied to this tick.
    pub reference: DVec3,
    /// One target per member present this tick, in insertion order.
    pub positions: Vec<(Member, DVec3)>,
    pub degraded: bool,
}

impl FormationOutput {
    pub fn position_of(&self, member: Member) -> Option<DVec3> {
        self.positions
            .iter()
            .find(|(m, _)| *m == member)
            .map(|(_, p)| *p)
    }
}

/// Computes member targets for `group`.
///
/// `natural` yields the position a member would have outside the group
/// (its own animation, its stored position, or a nested group's center),
/// or `None` when the member no longer exists. Pure: the group is only read.
pub fn solve<F>(group: &Group, natural: F, now: f64) -> FormationOutput
where
    F: Fn(Member) -> Option<DVec3>,
{
    let present: Vec<(Member, DVec3)> = group
        .members()
        .iter()
        .filter_map(|&m| natural(m).map(|p| (m, p)))
        .collect();

    match group.relationship() {
        Relationship::Isobarycentric => solve_isobarycentric(group, &present, now),
        Relationship::LeaderFollower { leader } => {
            solve_leader_follower(group, Member::Track(leader), &present, now)
        }
    }
}

fn solve_isobarycentric(group: &Group, present: &[(Member, DVec3)], now: f64) -> FormationOutput {
    let animated_center = group.animation().map(|a| a.evaluate_at(now).to_vec3());

    if present.is_empty() {
        let center = animated_center.unwrap_or(group.center());
        return FormationOutput {
            center,
            reference: center,
            positions: Vec::new(),
            degraded: false,
        };
    }

    let natural_center = mean(present.iter().map(|(_, p)| *p));
    let center = animated_center.unwrap_or(natural_center);

    let offsets = member_offsets(group, present, natural_center, now);
    let drift = mean(offsets.iter().copied());

    let positions = present
        .iter()
        .zip(offsets)
        .map(|(&(member, _), offset)| (member, center + offset - drift))
        .collect();

    FormationOutput {
        center,
        reference: center,
        positions,
        degraded: false,
    }
}

fn solve_leader_follower(
    group: &Group,
    leader: Member,
    present: &[(Member, DVec3)],
    now: f64,
) -> FormationOutput {
    let leader_position = present
        .iter()
        .find(|(m, _)| *m == leader)
        .map(|(_, p)| *p);
    let degraded = leader_position.is_none();

    let reference = match (group.animation(), leader_position) {
        (Some(animation), _) => animation.evaluate_at(now).to_vec3(),
        (None, Some(position)) => position,
        (None, None) => group.last_reference().unwrap_or(group.center()),
    };

    let followers: Vec<(Member, DVec3)> =
        present.iter().copied().filter(|(m, _)| *m != leader).collect();
    let offsets = member_offsets(group, &followers, leader_position.unwrap_or(reference), now);

    let mut positions = Vec::with_capacity(present.len());
    if leader_position.is_some() {
        positions.push((leader, reference));
    }
    positions.extend(
        followers
            .iter()
            .zip(offsets)
            .map(|(&(member, _), offset)| (member, reference + offset)),
    );

    FormationOutput {
        center: reference,
        reference,
        positions,
        degraded,
    }
}

/// Template slots when a formation is set, otherwise each member's stored
/// offset. Members joined through the registry always carry one; a member
/// without it stays where it currently sits relative to `origin`.
fn member_offsets(
    group: &Group,
    members: &[(Member, DVec3)],
    origin: DVec3,
    now: f64,
) -> Vec<DVec3> {
    if let Some(template) = group.formation() {
        return template.offsets(members.len());
    }

    members
        .iter()
        .map(|&(member, natural)| match group.offset(member) {
            Some(offset) => offset.at(now),
            None => natural - origin,
        })
        .collect()
}

pub(crate) fn mean(points: impl Iterator<Item = DVec3>) -> DVec3 {
    let (sum, count) = points.fold((DVec3::ZERO, 0usize), |(s, n), p| (s + p, n + 1));
    if count == 0 {
        DVec3::ZERO
    } else {
        sum / count as f64
    }
}
