use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::motion::{finite, non_negative};

/// Minimum separation enforced between generated slots, in meters.
pub const SLOT_EPSILON: f64 = 1e-3;

/// Named shapes whose offsets are generated from the member count, so adding
/// or removing a member reflows every slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FormationTemplate {
    Ring { radius: f64, rotation: f64 },
    Line { spacing: f64, rotation: f64 },
    Grid { spacing: f64, columns: u32, rotation: f64 },
}

impl FormationTemplate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            Self::Ring { radius, rotation } => {
                non_negative("radius", radius)?;
                finite("rotation", rotation)
            }
            Self::Line { spacing, rotation } => {
                non_negative("spacing", spacing)?;
                finite("rotation", rotation)
            }
            Self::Grid {
                spacing,
                columns,
                rotation,
            } => {
                non_negative("spacing", spacing)?;
                if columns == 0 {
                    return Err(ValidationError::OutOfRange {
                        name: "columns",
                        expected: ">= 1",
                        value: 0.0,
                    });
                }
                finite("rotation", rotation)
            }
        }
    }

    /// Slot offsets for `count` members, indexed by insertion order.
    pub fn offsets(&self, count: usize) -> Vec<DVec3> {
        let mut slots: Vec<DVec3> = (0..count).map(|i| self.slot(i, count)).collect();
        separate(&mut slots);
        slots
    }

    fn slot(&self, index: usize, count: usize) -> DVec3 {
        let (local, rotation) = match *self {
            Self::Ring { radius, rotation } => {
                let angle = index as f64 / count as f64 * std::f64::consts::TAU;
                let (sin, cos) = angle.sin_cos();
                (DVec3::new(radius * cos, radius * sin, 0.0), rotation)
            }
            Self::Line { spacing, rotation } => {
                let centered = index as f64 - (count as f64 - 1.0) / 2.0;
                (DVec3::new(centered * spacing, 0.0, 0.0), rotation)
            }
            Self::Grid {
                spacing,
                columns,
                rotation,
            } => {
                let columns = columns as usize;
                let rows = count.div_ceil(columns);
                let used_columns = columns.min(count);
                let column = (index % columns) as f64 - (used_columns as f64 - 1.0) / 2.0;
                let row = (index / columns) as f64 - (rows as f64 - 1.0) / 2.0;
                (DVec3::new(column * spacing, row * spacing, 0.0), rotation)
            }
        };

        DQuat::from_rotation_z(rotation.to_radians()) * local
    }
}

/// Nudges later slots that land on an earlier one, so that degenerate
/// parameters never stack two sources on the same point.
pub fn separate(slots: &mut [DVec3]) {
    for i in 1..slots.len() {
        let mut attempts = 0;
        while attempts <= slots.len()
            && slots[..i]
                .iter()
                .any(|earlier| earlier.distance(slots[i]) < SLOT_EPSILON)
        {
            slots[i].x += SLOT_EPSILON * i as f64;
            attempts += 1;
        }
    }
}
