//! Heat scale effects.

use crate::dice::DiceRoll;
use crate::modifiers::RollModifier;
use crate::unit::Unit;
use serde::{Deserialize, Serialize};

/// Heat at which the shutdown avoidance roll starts.
pub const SHUTDOWN_THRESHOLD: u32 = 14;

/// Heat at which a damaged life support wounds the pilot.
pub const LIFE_SUPPORT_THRESHOLD: u32 = 15;

/// Heat at which shutdown is automatic.
pub const AUTOMATIC_SHUTDOWN: u32 = 30;

/// Walking MP lost to heat: one per five points.
pub fn movement_penalty(heat: u32) -> u32 {
    heat / 5
}

/// To-hit penalty from the attacker's current heat.
pub fn fire_modifier(heat: u32) -> Option<RollModifier> {
    let value = match heat {
        24.. => 4,
        17.. => 3,
        13.. => 2,
        8.. => 1,
        _ => return None,
    };
    Some(RollModifier::Heat { heat, value })
}

/// What a unit at `heat` must roll to stay powered up.
pub fn shutdown_check(heat: u32) -> ShutdownCheck {
    match heat {
        AUTOMATIC_SHUTDOWN.. => ShutdownCheck::Automatic,
        26.. => ShutdownCheck::Avoid(10),
        22.. => ShutdownCheck::Avoid(8),
        18.. => ShutdownCheck::Avoid(6),
        SHUTDOWN_THRESHOLD.. => ShutdownCheck::Avoid(4),
        _ => ShutdownCheck::None,
    }
}

/// What the heat scale demands at a given heat level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownCheck {
    None,
    Avoid(u32),
    Automatic,
}

/// Heat bookkeeping for one unit in one heat phase.
///
/// Built by the authority with every roll already made; applying it to a
/// unit needs no dice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeatReport {
    pub unit_id: u64,
    pub previous_heat: u32,
    pub movement_heat: u32,
    pub weapon_heat: u32,
    pub engine_heat: u32,
    pub dissipated: u32,
    pub new_heat: u32,
    pub life_support_wound: bool,
    /// Avoidance roll, when one was made.
    pub shutdown_roll: Option<DiceRoll>,
    pub shutdown_target: Option<u32>,
    pub shutdown: bool,
}

impl HeatReport {
    /// Work out a unit's heat phase. `roll` is only called if a roll is needed.
    pub fn resolve(
        unit: &Unit,
        shutdown_enabled: bool,
        mut roll: impl FnMut() -> DiceRoll,
    ) -> Self {
        let movement_heat = unit.turn.mode.heat(unit.turn.hexes_moved);
        let weapon_heat = unit.turn.heat_generated.saturating_sub(movement_heat);
        let engine_heat = unit.engine_heat_penalty();
        let dissipated = unit.heat_dissipation();
        let new_heat = unit
            .heat
            .saturating_add(unit.turn.heat_generated)
            .saturating_add(engine_heat)
            .saturating_sub(dissipated);

        let life_support_wound =
            unit.life_support_damaged() && new_heat >= LIFE_SUPPORT_THRESHOLD;

        let (shutdown_roll, shutdown_target, shutdown) = if !shutdown_enabled {
            (None, None, false)
        } else {
            match shutdown_check(new_heat) {
                ShutdownCheck::None => (None, None, false),
                ShutdownCheck::Automatic => (None, None, true),
                ShutdownCheck::Avoid(target) => {
                    let dice = roll();
                    let failed = dice.total() < target;
                    (Some(dice), Some(target), failed)
                }
            }
        };

        Self {
            unit_id: unit.id,
            previous_heat: unit.heat,
            movement_heat,
            weapon_heat,
            engine_heat,
            dissipated,
            new_heat,
            life_support_wound,
            shutdown_roll,
            shutdown_target,
            shutdown,
        }
    }

    /// Apply the report to the unit it was built for.
    ///
    /// A shut-down unit whose avoidance roll succeeds (or whose heat fell
    /// below the threshold) starts up again.
    pub fn apply(&self, unit: &mut Unit) {
        unit.heat = self.new_heat;
        if self.life_support_wound {
            unit.wound_pilot(1);
        }
        unit.shutdown = self.shutdown;
    }
}
