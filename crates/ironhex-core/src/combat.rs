//! Weapon attack resolution.
//!
//! Resolution is split in two. [`CombatResolver::resolve_attack`] reads the
//! units, rolls every die the attack needs and produces an [`AttackOutcome`]
//! without touching the real units. [`AttackOutcome::apply_to_target`] then
//! replays the recorded results onto the target with no dice at all, so the
//! authority and every mirror end up in the same state.

use crate::dice::{DiceRoll, DiceRoller};
use crate::heat;
use crate::hex::{AttackArc, HexCoord};
use crate::map::BattleMap;
use crate::modifiers::{RangeBracket, RollModifier, TargetNumber};
use crate::movement::piloting_target;
use crate::types::UnitId;
use crate::unit::{CriticalEffect, DamageStep, Location, MovementMode, Unit};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Damage from a single attack that forces a piloting check.
pub const HEAVY_DAMAGE: u32 = 20;

/// Why a weapon cannot be fired at a target.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FireBlocker {
    #[error("unit {0} is not on the map")]
    NotDeployed(UnitId),
    #[error("no weapon at slot {0}")]
    NoSuchWeapon(usize),
    #[error("{0} is not operational")]
    WeaponInoperable(String),
    #[error("target at {distance} hexes is beyond long range {long}")]
    OutOfRange { distance: u32, long: u32 },
    #[error("line of fire blocked at {0}")]
    LineOfFireBlocked(HexCoord),
}

/// Hit location for a 2d6 total on the table for `arc`.
pub fn hit_location(arc: AttackArc, roll: u32) -> Location {
    use Location::*;
    match arc {
        AttackArc::Front | AttackArc::Rear => match roll {
            2 | 7 => CenterTorso,
            3 | 4 => RightArm,
            5 => RightLeg,
            6 => RightTorso,
            8 => LeftTorso,
            9 => LeftLeg,
            10 | 11 => LeftArm,
            _ => Head,
        },
        AttackArc::Left => match roll {
            2 | 7 => LeftTorso,
            3 | 6 => LeftLeg,
            4 | 5 => LeftArm,
            8 => CenterTorso,
            9 => RightTorso,
            10 => RightArm,
            11 => RightLeg,
            _ => Head,
        },
        AttackArc::Right => match roll {
            2 | 7 => RightTorso,
            3 | 6 => RightLeg,
            4 | 5 => RightArm,
            8 => CenterTorso,
            9 => LeftTorso,
            10 => LeftArm,
            11 => LeftLeg,
            _ => Head,
        },
    }
}

/// Critical hits called for by a determination roll total.
pub fn critical_count(roll: u32) -> usize {
    match roll {
        12.. => 3,
        10 | 11 => 2,
        8 | 9 => 1,
        _ => 0,
    }
}

/// Target movement modifier for hexes moved this turn.
pub fn target_movement_modifier(hexes_moved: u32) -> i32 {
    match hexes_moved {
        0..=2 => 0,
        3..=4 => 1,
        5..=6 => 2,
        7..=9 => 3,
        10..=17 => 4,
        18..=24 => 5,
        _ => 6,
    }
}

/// One critical hit on one component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalHit {
    pub component_index: usize,
    pub component: String,
    /// The two dice that picked the component.
    pub selection: DiceRoll,
    pub effect: CriticalEffect,
}

/// The critical check for one location that took structure damage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalCheck {
    pub location: Location,
    pub determination: DiceRoll,
    pub hits: Vec<CriticalHit>,
}

/// Where a hit landed and what it did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitRecord {
    pub location_roll: DiceRoll,
    pub location: Location,
    pub rear: bool,
    pub damage: u32,
    pub steps: Vec<DamageStep>,
    pub criticals: Vec<CriticalCheck>,
}

/// One weapon's shot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotOutcome {
    pub weapon_index: usize,
    pub weapon: String,
    pub target_number: TargetNumber,
    pub roll: DiceRoll,
    pub hit: Option<HitRecord>,
}

/// Why a piloting check was demanded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PilotingReason {
    GyroHit,
    LegDestroyed,
    HeavyDamage,
    JumpLanding,
}

/// A resolved piloting check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PilotingCheck {
    pub unit_id: UnitId,
    pub reason: PilotingReason,
    pub target_number: TargetNumber,
    pub roll: DiceRoll,
    pub passed: bool,
}

impl PilotingCheck {
    pub fn roll(
        unit: &Unit,
        reason: PilotingReason,
        target_number: TargetNumber,
        dice: &mut dyn DiceRoller,
    ) -> Self {
        let roll = dice.roll_2d6();
        let passed = target_number.is_met_by(&roll);
        Self {
            unit_id: unit.id,
            reason,
            target_number,
            roll,
            passed,
        }
    }

    /// A failed check knocks the unit down.
    pub fn apply(&self, unit: &mut Unit) {
        if !self.passed {
            unit.fall();
        }
    }
}

/// Everything that happened during one weapon attack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub attacker_id: UnitId,
    pub target_id: UnitId,
    pub arc: AttackArc,
    pub distance: u32,
    pub shots: Vec<ShotOutcome>,
    pub piloting_checks: Vec<PilotingCheck>,
    pub heat_generated: u32,
    pub target_destroyed: bool,
}

impl AttackOutcome {
    /// Total damage that landed.
    pub fn damage_dealt(&self) -> u32 {
        self.shots
            .iter()
            .filter_map(|s| s.hit.as_ref())
            .map(|h| h.damage)
            .sum()
    }

    pub fn hits(&self) -> usize {
        self.shots.iter().filter(|s| s.hit.is_some()).count()
    }

    /// Replay the outcome onto the target.
    pub fn apply_to_target(&self, target: &mut Unit) {
        for hit in self.shots.iter().filter_map(|s| s.hit.as_ref()) {
            target.apply_damage(hit.location, hit.damage, hit.rear);
            for check in &hit.criticals {
                for critical in &check.hits {
                    target.apply_critical(critical.component_index);
                }
            }
        }
        for check in &self.piloting_checks {
            check.apply(target);
        }
    }

    /// Record the attack against the attacker's turn.
    pub fn apply_to_attacker(&self, attacker: &mut Unit) {
        attacker.turn.attacked = true;
        attacker.turn.heat_generated = attacker
            .turn
            .heat_generated
            .saturating_add(self.heat_generated);
    }
}

/// Computes to-hit numbers and resolves attacks on one map.
pub struct CombatResolver<'a> {
    map: &'a BattleMap,
}

impl<'a> CombatResolver<'a> {
    pub fn new(map: &'a BattleMap) -> Self {
        Self { map }
    }

    /// First hex between the two units that blocks fire, if any.
    pub fn blocking_hex(&self, from: &HexCoord, to: &HexCoord) -> Option<HexCoord> {
        let elevation = |c: &HexCoord| self.map.get(c).map_or(0, |h| h.elevation);
        let ceiling = elevation(from).max(elevation(to)) + 1;
        let line = from.line_to(to);
        if line.len() <= 2 {
            return None;
        }
        line[1..line.len() - 1]
            .iter()
            .find(|c| {
                self.map
                    .get(c)
                    .map_or(false, |h| h.is_impassable() || h.elevation > ceiling)
            })
            .copied()
    }

    /// Distance and range bracket if the weapon can fire at the target.
    pub fn check_fire(
        &self,
        attacker: &Unit,
        target: &Unit,
        weapon_index: usize,
    ) -> Result<(u32, RangeBracket), FireBlocker> {
        let from = attacker.position.ok_or(FireBlocker::NotDeployed(attacker.id))?;
        let to = target.position.ok_or(FireBlocker::NotDeployed(target.id))?;
        let (_, weapon) = attacker
            .weapon(weapon_index)
            .ok_or(FireBlocker::NoSuchWeapon(weapon_index))?;
        if !attacker.can_fire(weapon_index) {
            return Err(FireBlocker::WeaponInoperable(weapon.name.clone()));
        }
        let distance = from.coord.distance(&to.coord);
        let bracket = weapon.bracket(distance).ok_or(FireBlocker::OutOfRange {
            distance,
            long: weapon.long_range,
        })?;
        if let Some(hex) = self.blocking_hex(&from.coord, &to.coord) {
            return Err(FireBlocker::LineOfFireBlocked(hex));
        }
        Ok((distance, bracket))
    }

    /// To-hit target number for one weapon against one target.
    pub fn target_number(
        &self,
        attacker: &Unit,
        target: &Unit,
        weapon_index: usize,
    ) -> Result<TargetNumber, FireBlocker> {
        let (distance, bracket) = self.check_fire(attacker, target, weapon_index)?;
        let mut mods = vec![RollModifier::Range {
            bracket,
            distance,
            value: bracket.modifier(),
        }];

        if let Some((component, weapon)) = attacker.weapon(weapon_index) {
            if weapon.min_range > 0 && distance <= weapon.min_range {
                mods.push(RollModifier::MinimumRange {
                    minimum: weapon.min_range,
                    distance,
                    value: (weapon.min_range - distance + 1) as i32,
                });
            }
            mods.extend(attacker.arm_actuator_modifiers(component.location));
        }

        if attacker.turn.mode != MovementMode::Stationary {
            mods.push(RollModifier::AttackerMovement {
                mode: attacker.turn.mode,
                value: attacker.turn.mode.attacker_modifier(),
            });
        }

        let jumped = target.turn.mode == MovementMode::Jump;
        let movement = target_movement_modifier(target.turn.hexes_moved) + i32::from(jumped);
        if movement > 0 {
            mods.push(RollModifier::TargetMovement {
                hexes_moved: target.turn.hexes_moved,
                jumped,
                value: movement,
            });
        }

        mods.extend(heat::fire_modifier(attacker.heat));

        if let Some(hex) = target.position.and_then(|p| self.map.get(&p.coord)) {
            mods.extend(
                hex.terrain
                    .iter()
                    .filter(|t| t.cover_modifier() != 0)
                    .map(|t| RollModifier::TargetTerrain {
                        terrain: *t,
                        value: t.cover_modifier(),
                    }),
            );
        }

        let sensor_hits = attacker.sensor_hits();
        if sensor_hits > 0 {
            mods.push(RollModifier::SensorDamage {
                hits: sensor_hits,
                value: 2 * sensor_hits as i32,
            });
        }

        if target.prone {
            let adjacent = distance <= 1;
            mods.push(RollModifier::TargetProne {
                adjacent,
                value: if adjacent { -2 } else { 1 },
            });
        }

        if target.is_immobile() {
            mods.push(RollModifier::TargetImmobile { value: -4 });
        }

        Ok(TargetNumber::new(attacker.pilot.gunnery, mods))
    }

    /// Roll every weapon in `weapons` against `target`.
    ///
    /// The units are not modified; the returned outcome carries every roll.
    pub fn resolve_attack(
        &self,
        attacker: &Unit,
        target: &Unit,
        weapons: &[usize],
        dice: &mut dyn DiceRoller,
    ) -> Result<AttackOutcome, FireBlocker> {
        let from = attacker.position.ok_or(FireBlocker::NotDeployed(attacker.id))?;
        let to = target.position.ok_or(FireBlocker::NotDeployed(target.id))?;
        let arc = to.attack_arc(&from.coord);
        let distance = from.coord.distance(&to.coord);

        let numbers = weapons
            .iter()
            .map(|&w| self.target_number(attacker, target, w).map(|tn| (w, tn)))
            .collect::<Result<Vec<_>, _>>()?;

        // Damage lands on a scratch copy so later shots see earlier effects
        let mut scratch = target.clone();
        let mut shots = Vec::with_capacity(numbers.len());
        let mut heat_generated: u32 = 0;

        for (weapon_index, target_number) in numbers {
            let Some((_, weapon)) = attacker.weapon(weapon_index) else {
                return Err(FireBlocker::NoSuchWeapon(weapon_index));
            };
            heat_generated = heat_generated.saturating_add(weapon.heat);
            let roll = dice.roll_2d6();
            let hit = if target_number.is_met_by(&roll) && !scratch.destroyed {
                Some(resolve_hit(&mut scratch, arc, weapon.damage, dice))
            } else {
                None
            };
            shots.push(ShotOutcome {
                weapon_index,
                weapon: weapon.name.clone(),
                target_number,
                roll,
                hit,
            });
        }

        let piloting_checks = post_attack_checks(&mut scratch, &shots, dice);

        Ok(AttackOutcome {
            attacker_id: attacker.id,
            target_id: target.id,
            arc,
            distance,
            shots,
            piloting_checks,
            heat_generated,
            target_destroyed: scratch.destroyed,
        })
    }
}

fn resolve_hit(target: &mut Unit, arc: AttackArc, damage: u32, dice: &mut dyn DiceRoller) -> HitRecord {
    let location_roll = dice.roll_2d6();
    let location = hit_location(arc, location_roll.total());
    let rear = arc == AttackArc::Rear;
    let steps = target.apply_damage(location, damage, rear);

    let mut criticals = Vec::new();
    for step in steps.iter().filter(|s| s.structure_damage > 0) {
        let determination = dice.roll_2d6();
        let mut hits = Vec::new();
        for _ in 0..critical_count(determination.total()) {
            let candidates = target.critical_candidates(step.location);
            if candidates.is_empty() {
                break;
            }
            let selection = dice.roll_2d6();
            let (a, b) = (selection.dice[0] as usize, selection.dice[1] as usize);
            let slot = ((a - 1) * 6 + (b - 1)) % candidates.len();
            let component_index = candidates[slot];
            let component = target.components[component_index].name.clone();
            let effect = target.apply_critical(component_index);
            hits.push(CriticalHit {
                component_index,
                component,
                selection,
                effect,
            });
        }
        criticals.push(CriticalCheck {
            location: step.location,
            determination,
            hits,
        });
    }

    HitRecord {
        location_roll,
        location,
        rear,
        damage,
        steps,
        criticals,
    }
}

fn post_attack_checks(
    target: &mut Unit,
    shots: &[ShotOutcome],
    dice: &mut dyn DiceRoller,
) -> Vec<PilotingCheck> {
    if target.is_out_of_action() || target.prone {
        return Vec::new();
    }

    let hits: Vec<&HitRecord> = shots.iter().filter_map(|s| s.hit.as_ref()).collect();
    let gyro_hit = hits
        .iter()
        .flat_map(|h| h.criticals.iter())
        .flat_map(|c| c.hits.iter())
        .any(|c| matches!(c.effect, CriticalEffect::GyroHit { .. }));
    let leg_lost = hits
        .iter()
        .flat_map(|h| h.steps.iter())
        .any(|s| s.location.is_leg() && s.location_destroyed);
    let damage: u32 = hits.iter().map(|h| h.damage).sum();

    let reason = if gyro_hit {
        PilotingReason::GyroHit
    } else if leg_lost {
        PilotingReason::LegDestroyed
    } else if damage >= HEAVY_DAMAGE {
        PilotingReason::HeavyDamage
    } else {
        return Vec::new();
    };

    let check = PilotingCheck::roll(target, reason, piloting_target(target, Vec::new()), dice);
    check.apply(target);
    vec![check]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::FixedDice;
    use crate::hex::{Facing, Position};
    use crate::map::Hex;
    use crate::terrain::Terrain;
    use crate::unit::{ComponentKind, UnitSpec, Weapon};

    fn placed(id: UnitId, owner: &str, q: i32, r: i32, facing: Facing) -> Unit {
        let mut unit = Unit::new(id, owner.to_string(), &UnitSpec::standard("Griffin"));
        unit.position = Some(Position::new(HexCoord::new(q, r), facing));
        unit
    }

    fn medium_laser(unit: &Unit) -> usize {
        unit.weapons()
            .find(|(_, _, w)| **w == Weapon::medium_laser())
            .map(|(i, _, _)| i)
            .unwrap()
    }

    #[test]
    fn test_location_tables_cover_all_rolls() {
        for arc in [AttackArc::Front, AttackArc::Left, AttackArc::Right, AttackArc::Rear] {
            for roll in 2..=12 {
                let _ = hit_location(arc, roll);
            }
            assert_eq!(hit_location(arc, 12), Location::Head);
        }
        assert_eq!(hit_location(AttackArc::Front, 7), Location::CenterTorso);
        assert_eq!(hit_location(AttackArc::Left, 7), Location::LeftTorso);
        assert_eq!(hit_location(AttackArc::Right, 7), Location::RightTorso);
    }

    #[test]
    fn test_critical_count_table() {
        assert_eq!(critical_count(7), 0);
        assert_eq!(critical_count(8), 1);
        assert_eq!(critical_count(11), 2);
        assert_eq!(critical_count(12), 3);
    }

    #[test]
    fn test_target_number_with_range_and_heat() {
        let map = BattleMap::open_field(12, 12);
        let mut attacker = placed(1, "a", 2, 8, Facing::North);
        attacker.heat = 9;
        let target = placed(2, "b", 2, 3, Facing::South);
        let resolver = CombatResolver::new(&map);

        let laser = medium_laser(&attacker);
        let tn = resolver.target_number(&attacker, &target, laser).unwrap();
        assert_eq!(tn.base, 4);
        assert_eq!(tn.value, 7);
    }

    #[test]
    fn test_target_modifiers_stack() {
        let mut map = BattleMap::open_field(12, 12);
        map.set(Hex::new(HexCoord::new(2, 3), vec![Terrain::LightWoods], 0));
        let mut attacker = placed(1, "a", 2, 5, Facing::North);
        attacker.turn.mode = MovementMode::Run;
        let mut target = placed(2, "b", 2, 3, Facing::South);
        target.turn.mode = MovementMode::Jump;
        target.turn.hexes_moved = 4;
        let resolver = CombatResolver::new(&map);

        let tn = resolver
            .target_number(&attacker, &target, medium_laser(&attacker))
            .unwrap();
        // 4 gunnery + 0 short + 2 run + (1 + 1 jumped) + 1 woods
        assert_eq!(tn.value, 9);
    }

    #[test]
    fn test_out_of_range_and_blocked() {
        let mut map = BattleMap::open_field(20, 20);
        let attacker = placed(1, "a", 2, 15, Facing::North);
        let far = placed(2, "b", 2, 2, Facing::South);
        let resolver = CombatResolver::new(&map);
        assert!(matches!(
            resolver.target_number(&attacker, &far, medium_laser(&attacker)),
            Err(FireBlocker::OutOfRange { distance: 13, .. })
        ));

        map.set(Hex::new(HexCoord::new(2, 12), vec![Terrain::Clear], 4));
        let near = placed(3, "b", 2, 10, Facing::South);
        let resolver = CombatResolver::new(&map);
        assert_eq!(
            resolver.check_fire(&attacker, &near, medium_laser(&attacker)),
            Err(FireBlocker::LineOfFireBlocked(HexCoord::new(2, 12)))
        );
    }

    #[test]
    fn test_resolve_attack_is_read_only_and_replayable() {
        let map = BattleMap::open_field(12, 12);
        let attacker = placed(1, "a", 2, 6, Facing::North);
        let target = placed(2, "b", 2, 3, Facing::South);
        let resolver = CombatResolver::new(&map);
        let weapons: Vec<usize> = attacker.weapons().map(|(i, _, _)| i).collect();

        let mut dice = FixedDice::new(vec![6, 6, 3, 4, 5, 5, 1, 1]);
        let outcome = resolver
            .resolve_attack(&attacker, &target, &weapons, &mut dice)
            .unwrap();
        assert_eq!(outcome.shots.len(), 3);
        assert_eq!(outcome.arc, AttackArc::Front);
        assert_eq!(target.remaining_points(), placed(2, "b", 2, 3, Facing::South).remaining_points());

        let mut replayed = target.clone();
        outcome.apply_to_target(&mut replayed);
        assert_eq!(
            replayed.remaining_points(),
            target.remaining_points() - outcome.damage_dealt()
        );

        let mut attacker_after = attacker.clone();
        outcome.apply_to_attacker(&mut attacker_after);
        assert!(attacker_after.turn.attacked);
        assert_eq!(attacker_after.turn.heat_generated, 8 + 3 + 3);
    }

    #[test]
    fn test_rear_hits_strike_rear_armor() {
        let map = BattleMap::open_field(12, 12);
        let attacker = placed(1, "a", 2, 6, Facing::North);
        // Target faces away from the attacker
        let target = placed(2, "b", 2, 4, Facing::North);
        let resolver = CombatResolver::new(&map);

        // to-hit 5+1=6 hits, location 3+4=7 center torso
        let mut dice = FixedDice::new(vec![5, 1, 3, 4]);
        let outcome = resolver
            .resolve_attack(&attacker, &target, &[medium_laser(&attacker)], &mut dice)
            .unwrap();
        let hit = outcome.shots[0].hit.as_ref().unwrap();
        assert_eq!(outcome.arc, AttackArc::Rear);
        assert!(hit.rear);
        assert_eq!(hit.location, Location::CenterTorso);

        let mut replayed = target.clone();
        outcome.apply_to_target(&mut replayed);
        let ct = replayed.location(Location::CenterTorso).unwrap();
        assert_eq!(ct.rear_armor, 2);
        assert_eq!(ct.armor, 20);
    }

    #[test]
    fn test_structure_damage_rolls_criticals() {
        let map = BattleMap::open_field(12, 12);
        let attacker = placed(1, "a", 2, 6, Facing::North);
        let mut target = placed(2, "b", 2, 4, Facing::South);
        target.locations.get_mut(&Location::CenterTorso).unwrap().armor = 0;
        let resolver = CombatResolver::new(&map);

        // hit, CT, determination 8 (one crit), selection (1,1) -> first candidate
        let mut dice = FixedDice::new(vec![6, 6, 3, 4, 4, 4, 1, 1, 1, 1]);
        let outcome = resolver
            .resolve_attack(&attacker, &target, &[medium_laser(&attacker)], &mut dice)
            .unwrap();
        let hit = outcome.shots[0].hit.as_ref().unwrap();
        assert_eq!(hit.criticals.len(), 1);
        assert_eq!(hit.criticals[0].hits.len(), 1);
        let critical = &hit.criticals[0].hits[0];
        assert!(matches!(
            target.components[critical.component_index].kind,
            ComponentKind::Engine
        ));
        assert_eq!(critical.effect, CriticalEffect::EngineHit { hits: 1 });

        let mut replayed = target.clone();
        outcome.apply_to_target(&mut replayed);
        assert_eq!(replayed.engine_hits(), 1);
    }

    #[test]
    fn test_miss_applies_nothing() {
        let map = BattleMap::open_field(12, 12);
        let attacker = placed(1, "a", 2, 6, Facing::North);
        let target = placed(2, "b", 2, 4, Facing::South);
        let resolver = CombatResolver::new(&map);
        let mut dice = FixedDice::new(vec![1, 1]);
        let outcome = resolver
            .resolve_attack(&attacker, &target, &[medium_laser(&attacker)], &mut dice)
            .unwrap();
        assert_eq!(outcome.hits(), 0);
        let mut replayed = target.clone();
        outcome.apply_to_target(&mut replayed);
        assert_eq!(replayed, target);
    }
}
