//! Roll modifiers and target numbers.
//!
//! A [`RollModifier`] is a tagged contribution to a dice target. Each variant
//! carries its numeric value together with the context that produced it; the
//! combat math only ever reads [`RollModifier::value`]. Rendering a modifier
//! as text lives in [`crate::audit`].

use crate::dice::DiceRoll;
use crate::terrain::Terrain;
use crate::unit::{ActuatorKind, Location, MovementMode};
use serde::{Deserialize, Serialize};

/// Lowest target number a roll can be asked to meet.
pub const MIN_TARGET: i32 = 2;
/// Highest target number a roll can be asked to meet.
pub const MAX_TARGET: i32 = 12;

/// Range bands for weapon fire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeBracket {
    Short,
    Medium,
    Long,
}

impl RangeBracket {
    pub const fn modifier(&self) -> i32 {
        match self {
            RangeBracket::Short => 0,
            RangeBracket::Medium => 2,
            RangeBracket::Long => 4,
        }
    }
}

/// A named numeric contributor to a dice target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RollModifier {
    Range {
        bracket: RangeBracket,
        distance: u32,
        value: i32,
    },
    MinimumRange {
        minimum: u32,
        distance: u32,
        value: i32,
    },
    AttackerMovement {
        mode: MovementMode,
        value: i32,
    },
    TargetMovement {
        hexes_moved: u32,
        jumped: bool,
        value: i32,
    },
    Heat {
        heat: u32,
        value: i32,
    },
    TargetTerrain {
        terrain: Terrain,
        value: i32,
    },
    SensorDamage {
        hits: u32,
        value: i32,
    },
    ArmActuator {
        location: Location,
        actuator: ActuatorKind,
        value: i32,
    },
    TargetProne {
        adjacent: bool,
        value: i32,
    },
    TargetImmobile {
        value: i32,
    },
    GyroDamage {
        hits: u32,
        value: i32,
    },
    LegActuator {
        location: Location,
        actuator: ActuatorKind,
        value: i32,
    },
    LegDestroyed {
        location: Location,
        value: i32,
    },
    LandingTerrain {
        terrain: Terrain,
        value: i32,
    },
}

impl RollModifier {
    /// The signed contribution to the target number.
    pub const fn value(&self) -> i32 {
        match self {
            RollModifier::Range { value, .. }
            | RollModifier::MinimumRange { value, .. }
            | RollModifier::AttackerMovement { value, .. }
            | RollModifier::TargetMovement { value, .. }
            | RollModifier::Heat { value, .. }
            | RollModifier::TargetTerrain { value, .. }
            | RollModifier::SensorDamage { value, .. }
            | RollModifier::ArmActuator { value, .. }
            | RollModifier::TargetProne { value, .. }
            | RollModifier::TargetImmobile { value }
            | RollModifier::GyroDamage { value, .. }
            | RollModifier::LegActuator { value, .. }
            | RollModifier::LegDestroyed { value, .. }
            | RollModifier::LandingTerrain { value, .. } => *value,
        }
    }
}

/// Sum of all modifier contributions.
pub fn sum_modifiers(modifiers: &[RollModifier]) -> i32 {
    modifiers.iter().map(RollModifier::value).sum()
}

/// A computed target number together with everything that went into it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetNumber {
    /// Skill value the modifiers are added to.
    pub base: i32,
    pub modifiers: Vec<RollModifier>,
    /// `base + Σ modifiers`, clamped to `[MIN_TARGET, MAX_TARGET]`.
    pub value: i32,
}

impl TargetNumber {
    pub fn new(base: i32, modifiers: Vec<RollModifier>) -> Self {
        let value = (base + sum_modifiers(&modifiers)).clamp(MIN_TARGET, MAX_TARGET);
        Self {
            base,
            modifiers,
            value,
        }
    }

    /// A roll succeeds when its total meets or exceeds the target.
    pub fn is_met_by(&self, roll: &DiceRoll) -> bool {
        roll.total() as i32 >= self.value
    }
}
