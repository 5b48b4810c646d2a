mod coordinator;
mod group;
mod template;

pub use coordinator::{FormationOutput, solve};
pub(crate) use coordinator::mean;
pub use group::{Group, GroupFlags, GroupId, Member, MemberOffset, Relationship};
pub use template::{FormationTemplate, SLOT_EPSILON, separate};
