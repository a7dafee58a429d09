//! Mechs, their body locations, components and pilots.
//!
//! A [`Unit`] is owned by exactly one player but only remembers that
//! player's id; the player keeps the list of unit ids.

use crate::heat;
use crate::hex::Position;
use crate::modifiers::{RangeBracket, RollModifier};
use crate::types::{PlayerId, UnitId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Wounds that kill a pilot outright.
pub const LETHAL_WOUNDS: u32 = 6;

/// Heat added per engine critical while the engine still runs.
pub const ENGINE_HIT_HEAT: u32 = 5;

/// Engine criticals that destroy the engine.
pub const ENGINE_DESTROYED_HITS: u32 = 3;

/// Largest walking or jumping MP a roster entry may declare.
pub const MAX_SPEC_MP: u32 = 12;

/// Largest gunnery or piloting skill value (0 is best).
pub const MAX_SPEC_SKILL: i32 = 8;

/// Largest heat sink count a roster entry may declare.
pub const MAX_SPEC_HEAT_SINKS: u32 = 40;

/// Largest front or rear armor value of one location.
pub const MAX_SPEC_ARMOR: u32 = 60;

/// Largest internal structure value of one location.
pub const MAX_SPEC_STRUCTURE: u32 = 40;

/// Largest number of weapons a roster entry may carry.
pub const MAX_SPEC_WEAPONS: usize = 12;

/// Largest damage or heat of one weapon shot.
pub const MAX_WEAPON_VALUE: u32 = 30;

/// Longest weapon reach in hexes.
pub const MAX_WEAPON_RANGE: u32 = 30;

/// Gyro criticals that destroy the gyro.
pub const GYRO_DESTROYED_HITS: u32 = 2;

/// How a unit moved during the current turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementMode {
    #[default]
    Stationary,
    Walk,
    Run,
    Jump,
}

impl MovementMode {
    /// Heat generated by moving this way over `hexes` hexes.
    pub fn heat(&self, hexes: u32) -> u32 {
        match self {
            MovementMode::Stationary => 0,
            MovementMode::Walk => 1,
            MovementMode::Run => 2,
            MovementMode::Jump => hexes.max(3),
        }
    }

    /// To-hit penalty for firing after moving this way.
    pub const fn attacker_modifier(&self) -> i32 {
        match self {
            MovementMode::Stationary => 0,
            MovementMode::Walk => 1,
            MovementMode::Run => 2,
            MovementMode::Jump => 3,
        }
    }
}

/// Body locations of a mech.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Location {
    Head,
    CenterTorso,
    LeftTorso,
    RightTorso,
    LeftArm,
    RightArm,
    LeftLeg,
    RightLeg,
}

impl Location {
    pub const ALL: [Location; 8] = [
        Location::Head,
        Location::CenterTorso,
        Location::LeftTorso,
        Location::RightTorso,
        Location::LeftArm,
        Location::RightArm,
        Location::LeftLeg,
        Location::RightLeg,
    ];

    pub const fn is_leg(&self) -> bool {
        matches!(self, Location::LeftLeg | Location::RightLeg)
    }

    pub const fn is_arm(&self) -> bool {
        matches!(self, Location::LeftArm | Location::RightArm)
    }

    /// Torso locations carry separate rear armor.
    pub const fn has_rear(&self) -> bool {
        matches!(
            self,
            Location::CenterTorso | Location::LeftTorso | Location::RightTorso
        )
    }

    /// Where excess damage goes once this location is destroyed.
    pub const fn transfer_to(&self) -> Option<Location> {
        match self {
            Location::LeftArm | Location::LeftLeg => Some(Location::LeftTorso),
            Location::RightArm | Location::RightLeg => Some(Location::RightTorso),
            Location::LeftTorso | Location::RightTorso => Some(Location::CenterTorso),
            Location::Head | Location::CenterTorso => None,
        }
    }

    /// The limb that is lost together with this location.
    pub const fn dependent_limb(&self) -> Option<Location> {
        match self {
            Location::LeftTorso => Some(Location::LeftArm),
            Location::RightTorso => Some(Location::RightArm),
            _ => None,
        }
    }

    /// Losing this location destroys the whole unit.
    pub const fn is_vital(&self) -> bool {
        matches!(self, Location::Head | Location::CenterTorso)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Location::Head => "head",
            Location::CenterTorso => "center torso",
            Location::LeftTorso => "left torso",
            Location::RightTorso => "right torso",
            Location::LeftArm => "left arm",
            Location::RightArm => "right arm",
            Location::LeftLeg => "left leg",
            Location::RightLeg => "right leg",
        };
        f.write_str(name)
    }
}

/// Armor and internal structure of one location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationState {
    pub armor: u32,
    pub rear_armor: u32,
    pub structure: u32,
    pub destroyed: bool,
}

impl LocationState {
    pub fn new(armor: u32, rear_armor: u32, structure: u32) -> Self {
        Self {
            armor,
            rear_armor,
            structure,
            destroyed: false,
        }
    }
}

/// Actuators in limbs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActuatorKind {
    Shoulder,
    UpperArm,
    LowerArm,
    Hand,
    Hip,
    UpperLeg,
    LowerLeg,
    Foot,
}

impl ActuatorKind {
    /// To-hit penalty for weapons fired from an arm with this actuator damaged.
    pub const fn arm_fire_modifier(&self) -> i32 {
        match self {
            ActuatorKind::Shoulder => 4,
            ActuatorKind::UpperArm | ActuatorKind::LowerArm => 1,
            _ => 0,
        }
    }

    /// Piloting penalty for a damaged leg actuator.
    pub const fn piloting_modifier(&self) -> i32 {
        match self {
            ActuatorKind::Hip => 2,
            ActuatorKind::UpperLeg | ActuatorKind::LowerLeg | ActuatorKind::Foot => 1,
            _ => 0,
        }
    }

    pub const fn is_leg(&self) -> bool {
        matches!(
            self,
            ActuatorKind::Hip | ActuatorKind::UpperLeg | ActuatorKind::LowerLeg | ActuatorKind::Foot
        )
    }
}

/// A direct-fire weapon profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weapon {
    pub name: String,
    pub damage: u32,
    pub heat: u32,
    pub min_range: u32,
    pub short_range: u32,
    pub medium_range: u32,
    pub long_range: u32,
}

impl Weapon {
    pub fn medium_laser() -> Self {
        Self {
            name: "Medium Laser".to_string(),
            damage: 5,
            heat: 3,
            min_range: 0,
            short_range: 3,
            medium_range: 6,
            long_range: 9,
        }
    }

    pub fn large_laser() -> Self {
        Self {
            name: "Large Laser".to_string(),
            damage: 8,
            heat: 8,
            min_range: 0,
            short_range: 5,
            medium_range: 10,
            long_range: 15,
        }
    }

    pub fn ppc() -> Self {
        Self {
            name: "PPC".to_string(),
            damage: 10,
            heat: 10,
            min_range: 3,
            short_range: 6,
            medium_range: 12,
            long_range: 18,
        }
    }

    fn validate(&self) -> Result<(), UnitSpecError> {
        if self.name.trim().is_empty() {
            return Err(UnitSpecError::UnnamedWeapon);
        }
        if self.damage == 0 || self.damage > MAX_WEAPON_VALUE || self.heat > MAX_WEAPON_VALUE {
            return Err(UnitSpecError::WeaponStats {
                weapon: self.name.clone(),
            });
        }
        let ordered = self.min_range <= self.short_range
            && self.short_range <= self.medium_range
            && self.medium_range <= self.long_range;
        if self.short_range == 0 || !ordered || self.long_range > MAX_WEAPON_RANGE {
            return Err(UnitSpecError::WeaponRanges {
                weapon: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Range bracket at a distance, or `None` when out of range.
    pub fn bracket(&self, distance: u32) -> Option<RangeBracket> {
        if distance == 0 || distance > self.long_range {
            None
        } else if distance <= self.short_range {
            Some(RangeBracket::Short)
        } else if distance <= self.medium_range {
            Some(RangeBracket::Medium)
        } else {
            Some(RangeBracket::Long)
        }
    }
}

/// What a component is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ComponentKind {
    Engine,
    Gyro,
    Cockpit,
    Sensors,
    LifeSupport,
    HeatSink,
    Actuator { actuator: ActuatorKind },
    Weapon { weapon: Weapon },
}

/// Equipment mounted in a location that critical hits can damage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub kind: ComponentKind,
    pub location: Location,
    /// Critical hits the component absorbs before it is destroyed.
    pub health: u32,
    pub hits: u32,
    pub destroyed: bool,
    /// Whether the component can be salvaged or swapped between battles.
    pub removable: bool,
}

impl Component {
    pub fn new(kind: ComponentKind, location: Location) -> Self {
        let (name, health, removable) = match &kind {
            ComponentKind::Engine => ("Engine".to_string(), ENGINE_DESTROYED_HITS, false),
            ComponentKind::Gyro => ("Gyro".to_string(), GYRO_DESTROYED_HITS, false),
            ComponentKind::Cockpit => ("Cockpit".to_string(), 1, false),
            ComponentKind::Sensors => ("Sensors".to_string(), 2, false),
            ComponentKind::LifeSupport => ("Life Support".to_string(), 1, false),
            ComponentKind::HeatSink => ("Heat Sink".to_string(), 1, true),
            ComponentKind::Actuator { actuator } => (format!("{:?} Actuator", actuator), 1, false),
            ComponentKind::Weapon { weapon } => (weapon.name.clone(), 1, true),
        };
        Self {
            name,
            kind,
            location,
            health,
            hits: 0,
            destroyed: false,
            removable,
        }
    }

    /// Register one critical hit. Returns true if this hit destroyed it.
    pub fn hit(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        self.hits += 1;
        if self.hits >= self.health {
            self.destroyed = true;
            return true;
        }
        false
    }

    pub fn weapon(&self) -> Option<&Weapon> {
        match &self.kind {
            ComponentKind::Weapon { weapon } => Some(weapon),
            _ => None,
        }
    }

    pub fn actuator(&self) -> Option<ActuatorKind> {
        match self.kind {
            ComponentKind::Actuator { actuator } => Some(actuator),
            _ => None,
        }
    }
}

/// The MechWarrior at the controls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pilot {
    pub name: String,
    pub gunnery: i32,
    pub piloting: i32,
    pub wounds: u32,
    pub alive: bool,
}

impl Pilot {
    pub fn new(name: String, gunnery: i32, piloting: i32) -> Self {
        Self {
            name,
            gunnery,
            piloting,
            wounds: 0,
            alive: true,
        }
    }

    /// Apply wounds. Returns true if they killed the pilot.
    pub fn wound(&mut self, wounds: u32) -> bool {
        if !self.alive {
            return false;
        }
        self.wounds = (self.wounds + wounds).min(LETHAL_WOUNDS);
        if self.wounds >= LETHAL_WOUNDS {
            self.alive = false;
            return true;
        }
        false
    }

    pub fn kill(&mut self) {
        self.wounds = LETHAL_WOUNDS;
        self.alive = false;
    }
}

/// What the unit has done during the current turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub mode: MovementMode,
    pub hexes_moved: u32,
    pub moved: bool,
    pub attacked: bool,
    /// Heat from movement and weapon fire, folded in during the heat phase.
    pub heat_generated: u32,
}

/// A roster entry: everything needed to field a unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub name: String,
    pub pilot_name: String,
    pub gunnery: i32,
    pub piloting: i32,
    pub walk_mp: u32,
    pub jump_mp: u32,
    pub heat_sinks: u32,
    /// (front armor, rear armor, structure) per location.
    pub locations: Vec<(Location, u32, u32, u32)>,
    pub weapons: Vec<(Location, Weapon)>,
}

impl UnitSpec {
    /// A 50-ton line mech.
    pub fn standard(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pilot_name: format!("{} pilot", name),
            gunnery: 4,
            piloting: 5,
            walk_mp: 4,
            jump_mp: 4,
            heat_sinks: 10,
            locations: vec![
                (Location::Head, 9, 0, 3),
                (Location::CenterTorso, 20, 7, 16),
                (Location::LeftTorso, 15, 5, 12),
                (Location::RightTorso, 15, 5, 12),
                (Location::LeftArm, 12, 0, 8),
                (Location::RightArm, 12, 0, 8),
                (Location::LeftLeg, 16, 0, 12),
                (Location::RightLeg, 16, 0, 12),
            ],
            weapons: vec![
                (Location::RightArm, Weapon::large_laser()),
                (Location::LeftArm, Weapon::medium_laser()),
                (Location::CenterTorso, Weapon::medium_laser()),
            ],
        }
    }

    /// Check a roster entry received from a player before it is fielded.
    pub fn validate(&self) -> Result<(), UnitSpecError> {
        if self.name.trim().is_empty() {
            return Err(UnitSpecError::EmptyName);
        }
        for (skill, value) in [("gunnery", self.gunnery), ("piloting", self.piloting)] {
            if !(0..=MAX_SPEC_SKILL).contains(&value) {
                return Err(UnitSpecError::Skill { skill, value });
            }
        }
        if self.walk_mp > MAX_SPEC_MP || self.jump_mp > MAX_SPEC_MP {
            return Err(UnitSpecError::Movement {
                walk: self.walk_mp,
                jump: self.jump_mp,
            });
        }
        if self.heat_sinks > MAX_SPEC_HEAT_SINKS {
            return Err(UnitSpecError::HeatSinks(self.heat_sinks));
        }
        for location in Location::ALL {
            let count = self.locations.iter().filter(|l| l.0 == location).count();
            if count != 1 {
                return Err(UnitSpecError::LocationCount { location, count });
            }
        }
        for &(location, armor, rear, structure) in &self.locations {
            if armor > MAX_SPEC_ARMOR
                || rear > MAX_SPEC_ARMOR
                || structure == 0
                || structure > MAX_SPEC_STRUCTURE
            {
                return Err(UnitSpecError::LocationValues { location });
            }
        }
        if self.weapons.len() > MAX_SPEC_WEAPONS {
            return Err(UnitSpecError::TooManyWeapons(self.weapons.len()));
        }
        for (_, weapon) in &self.weapons {
            weapon.validate()?;
        }
        Ok(())
    }

    /// A 25-ton fast scout.
    pub fn scout(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pilot_name: format!("{} pilot", name),
            gunnery: 4,
            piloting: 5,
            walk_mp: 6,
            jump_mp: 6,
            heat_sinks: 10,
            locations: vec![
                (Location::Head, 6, 0, 3),
                (Location::CenterTorso, 10, 3, 8),
                (Location::LeftTorso, 8, 2, 6),
                (Location::RightTorso, 8, 2, 6),
                (Location::LeftArm, 5, 0, 4),
                (Location::RightArm, 5, 0, 4),
                (Location::LeftLeg, 8, 0, 6),
                (Location::RightLeg, 8, 0, 6),
            ],
            weapons: vec![
                (Location::RightArm, Weapon::medium_laser()),
                (Location::LeftArm, Weapon::medium_laser()),
            ],
        }
    }
}

/// Why a roster entry cannot be fielded.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum UnitSpecError {
    #[error("unit name cannot be empty")]
    EmptyName,
    #[error("{skill} {value} is outside 0..={max}", max = MAX_SPEC_SKILL)]
    Skill { skill: &'static str, value: i32 },
    #[error("walk {walk} / jump {jump} exceeds {max} MP", max = MAX_SPEC_MP)]
    Movement { walk: u32, jump: u32 },
    #[error("{0} heat sinks exceed {max}", max = MAX_SPEC_HEAT_SINKS)]
    HeatSinks(u32),
    #[error("location {location:?} listed {count} times, expected once")]
    LocationCount { location: Location, count: usize },
    #[error("location {location:?} has out of range armor or structure")]
    LocationValues { location: Location },
    #[error("{0} weapons exceed {max}", max = MAX_SPEC_WEAPONS)]
    TooManyWeapons(usize),
    #[error("weapon name cannot be empty")]
    UnnamedWeapon,
    #[error("weapon {weapon} has out of range damage or heat")]
    WeaponStats { weapon: String },
    #[error("weapon {weapon} has unordered or out of range brackets")]
    WeaponRanges { weapon: String },
}

/// Result of applying one damage step to one location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageStep {
    pub location: Location,
    pub rear: bool,
    pub armor_damage: u32,
    pub structure_damage: u32,
    pub location_destroyed: bool,
}

/// What a critical hit did to the unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriticalEffect {
    EngineHit { hits: u32 },
    EngineDestroyed,
    GyroHit { hits: u32 },
    GyroDestroyed,
    PilotKilled,
    SensorsHit { hits: u32 },
    LifeSupportDestroyed,
    ComponentDestroyed { name: String },
    /// The component had already been destroyed.
    NoEffect,
}

/// A mech on the battlefield.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Unique identifier.
    pub id: UnitId,
    /// Owning player (lookup key into the player registry).
    pub owner: PlayerId,
    pub name: String,
    /// Current hex and facing; `None` until deployed.
    pub position: Option<Position>,
    pub locations: BTreeMap<Location, LocationState>,
    pub heat: u32,
    pub pilot: Pilot,
    pub components: Vec<Component>,
    pub walk_mp: u32,
    pub jump_mp: u32,
    pub turn: TurnRecord,
    pub shutdown: bool,
    pub prone: bool,
    pub destroyed: bool,
    /// Engine knocked out: the unit is still standing but out of the fight.
    pub disabled: bool,
}

impl Unit {
    /// Field a unit from a roster entry.
    pub fn new(id: UnitId, owner: PlayerId, spec: &UnitSpec) -> Self {
        let locations = spec
            .locations
            .iter()
            .map(|&(loc, armor, rear, structure)| (loc, LocationState::new(armor, rear, structure)))
            .collect();

        let mut components = vec![
            Component::new(ComponentKind::Cockpit, Location::Head),
            Component::new(ComponentKind::Sensors, Location::Head),
            Component::new(ComponentKind::LifeSupport, Location::Head),
            Component::new(ComponentKind::Engine, Location::CenterTorso),
            Component::new(ComponentKind::Gyro, Location::CenterTorso),
        ];
        for arm in [Location::LeftArm, Location::RightArm] {
            for actuator in [
                ActuatorKind::Shoulder,
                ActuatorKind::UpperArm,
                ActuatorKind::LowerArm,
                ActuatorKind::Hand,
            ] {
                components.push(Component::new(ComponentKind::Actuator { actuator }, arm));
            }
        }
        for leg in [Location::LeftLeg, Location::RightLeg] {
            for actuator in [
                ActuatorKind::Hip,
                ActuatorKind::UpperLeg,
                ActuatorKind::LowerLeg,
                ActuatorKind::Foot,
            ] {
                components.push(Component::new(ComponentKind::Actuator { actuator }, leg));
            }
        }
        for i in 0..spec.heat_sinks {
            let location = if i % 2 == 0 {
                Location::LeftTorso
            } else {
                Location::RightTorso
            };
            components.push(Component::new(ComponentKind::HeatSink, location));
        }
        for (location, weapon) in &spec.weapons {
            components.push(Component::new(
                ComponentKind::Weapon {
                    weapon: weapon.clone(),
                },
                *location,
            ));
        }

        Self {
            id,
            owner,
            name: spec.name.clone(),
            position: None,
            locations,
            heat: 0,
            pilot: Pilot::new(spec.pilot_name.clone(), spec.gunnery, spec.piloting),
            components,
            walk_mp: spec.walk_mp,
            jump_mp: spec.jump_mp,
            turn: TurnRecord::default(),
            shutdown: false,
            prone: false,
            destroyed: false,
            disabled: false,
        }
    }

    pub fn is_deployed(&self) -> bool {
        self.position.is_some()
    }

    /// Destroyed or disabled: the unit no longer counts for its side.
    pub fn is_out_of_action(&self) -> bool {
        self.destroyed || self.disabled
    }

    /// Unable to move or dodge this turn.
    pub fn is_immobile(&self) -> bool {
        self.is_out_of_action() || self.shutdown || self.gyro_destroyed() || self.both_legs_destroyed()
    }

    pub fn location(&self, location: Location) -> Option<&LocationState> {
        self.locations.get(&location)
    }

    pub fn is_location_destroyed(&self, location: Location) -> bool {
        self.locations.get(&location).map_or(true, |l| l.destroyed)
    }

    fn legs_destroyed(&self) -> usize {
        [Location::LeftLeg, Location::RightLeg]
            .iter()
            .filter(|&&leg| self.is_location_destroyed(leg))
            .count()
    }

    fn both_legs_destroyed(&self) -> bool {
        self.legs_destroyed() == 2
    }

    fn hits_on(&self, predicate: impl Fn(&ComponentKind) -> bool) -> u32 {
        self.components
            .iter()
            .filter(|c| predicate(&c.kind))
            .map(|c| c.hits)
            .sum()
    }

    pub fn engine_hits(&self) -> u32 {
        self.hits_on(|k| matches!(k, ComponentKind::Engine))
    }

    pub fn gyro_hits(&self) -> u32 {
        self.hits_on(|k| matches!(k, ComponentKind::Gyro))
    }

    pub fn sensor_hits(&self) -> u32 {
        self.hits_on(|k| matches!(k, ComponentKind::Sensors))
    }

    pub fn engine_destroyed(&self) -> bool {
        self.engine_hits() >= ENGINE_DESTROYED_HITS
    }

    pub fn gyro_destroyed(&self) -> bool {
        self.gyro_hits() >= GYRO_DESTROYED_HITS
    }

    pub fn sensors_destroyed(&self) -> bool {
        self.components
            .iter()
            .any(|c| matches!(c.kind, ComponentKind::Sensors) && c.destroyed)
    }

    pub fn life_support_damaged(&self) -> bool {
        self.components
            .iter()
            .any(|c| matches!(c.kind, ComponentKind::LifeSupport) && c.hits > 0)
    }

    /// Extra heat added each heat phase by engine damage.
    ///
    /// A destroyed engine no longer runs and contributes nothing.
    pub fn engine_heat_penalty(&self) -> u32 {
        if self.engine_destroyed() {
            0
        } else {
            self.engine_hits() * ENGINE_HIT_HEAT
        }
    }

    /// Heat removed each heat phase by working heat sinks.
    pub fn heat_dissipation(&self) -> u32 {
        self.components
            .iter()
            .filter(|c| matches!(c.kind, ComponentKind::HeatSink) && !c.destroyed)
            .count() as u32
    }

    fn damaged_leg_actuators(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(|c| {
            c.destroyed
                && c.actuator().map_or(false, |a| a.is_leg())
                && !self.is_location_destroyed(c.location)
        })
    }

    /// Walking MP after damage and heat.
    pub fn walk_mp(&self) -> u32 {
        if self.is_immobile() {
            return 0;
        }
        if self.legs_destroyed() == 1 {
            return 1;
        }
        let mut mp = self.walk_mp;
        for actuator in self.damaged_leg_actuators().filter_map(Component::actuator) {
            if actuator == ActuatorKind::Hip {
                mp /= 2;
            } else {
                mp = mp.saturating_sub(1);
            }
        }
        mp.saturating_sub(heat::movement_penalty(self.heat))
    }

    /// Running MP: one and a half times walking, rounded up.
    pub fn run_mp(&self) -> u32 {
        let walk = self.walk_mp();
        let hip_damaged = self
            .damaged_leg_actuators()
            .any(|c| c.actuator() == Some(ActuatorKind::Hip));
        if self.legs_destroyed() > 0 || hip_damaged {
            return walk;
        }
        walk.saturating_add(walk.div_ceil(2))
    }

    pub fn jump_mp(&self) -> u32 {
        if self.is_immobile() || self.prone {
            0
        } else {
            self.jump_mp
        }
    }

    /// Movement points available for a movement mode.
    pub fn movement_budget(&self, mode: MovementMode) -> u32 {
        match mode {
            MovementMode::Stationary => 0,
            MovementMode::Walk => self.walk_mp(),
            MovementMode::Run => self.run_mp(),
            MovementMode::Jump => self.jump_mp(),
        }
    }

    /// Standing piloting modifiers from damage.
    pub fn piloting_modifiers(&self) -> Vec<RollModifier> {
        let mut mods = Vec::new();
        let gyro_hits = self.gyro_hits();
        if gyro_hits > 0 {
            mods.push(RollModifier::GyroDamage {
                hits: gyro_hits,
                value: 3 * gyro_hits as i32,
            });
        }
        for leg in [Location::LeftLeg, Location::RightLeg] {
            if self.is_location_destroyed(leg) {
                mods.push(RollModifier::LegDestroyed {
                    location: leg,
                    value: 5,
                });
            }
        }
        for c in self.damaged_leg_actuators() {
            if let Some(actuator) = c.actuator() {
                mods.push(RollModifier::LegActuator {
                    location: c.location,
                    actuator,
                    value: actuator.piloting_modifier(),
                });
            }
        }
        mods
    }

    /// Weapon components, keyed by their component index.
    pub fn weapons(&self) -> impl Iterator<Item = (usize, &Component, &Weapon)> {
        self.components
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.weapon().map(|w| (i, c, w)))
    }

    pub fn weapon(&self, index: usize) -> Option<(&Component, &Weapon)> {
        let component = self.components.get(index)?;
        component.weapon().map(|w| (component, w))
    }

    /// Whether the weapon at `index` can fire right now.
    pub fn can_fire(&self, index: usize) -> bool {
        match self.weapon(index) {
            Some((component, _)) => {
                !component.destroyed
                    && !self.is_location_destroyed(component.location)
                    && !self.sensors_destroyed()
            }
            None => false,
        }
    }

    /// Whether the unit could make an attack this phase.
    pub fn can_attack(&self) -> bool {
        self.is_deployed()
            && !self.is_out_of_action()
            && !self.shutdown
            && !self.turn.attacked
            && self.weapons().any(|(i, _, _)| self.can_fire(i))
    }

    /// Whether the unit still has to move this turn.
    pub fn can_move(&self) -> bool {
        self.is_deployed() && !self.turn.moved && self.walk_mp() > 0
    }

    /// Damaged arm actuators that hinder a weapon in `location`.
    pub fn arm_actuator_modifiers(&self, location: Location) -> Vec<RollModifier> {
        if !location.is_arm() {
            return Vec::new();
        }
        self.components
            .iter()
            .filter(|c| c.location == location && c.destroyed)
            .filter_map(|c| c.actuator())
            .filter(|a| a.arm_fire_modifier() != 0)
            .map(|actuator| RollModifier::ArmActuator {
                location,
                actuator,
                value: actuator.arm_fire_modifier(),
            })
            .collect()
    }

    /// Apply weapon damage to a location, armor first, then structure,
    /// transferring what is left inward once a location is destroyed.
    pub fn apply_damage(&mut self, location: Location, amount: u32, rear: bool) -> Vec<DamageStep> {
        let mut steps = Vec::new();
        let mut remaining = amount;
        let mut current = Some(location);

        if location == Location::Head && amount > 0 {
            self.wound_pilot(1);
        }

        while let (Some(loc), true) = (current, remaining > 0) {
            let use_rear = rear && loc.has_rear();
            let Some(state) = self.locations.get_mut(&loc) else {
                break;
            };
            if state.destroyed {
                current = loc.transfer_to();
                continue;
            }

            let armor = if use_rear {
                &mut state.rear_armor
            } else {
                &mut state.armor
            };
            let armor_damage = remaining.min(*armor);
            *armor -= armor_damage;
            remaining -= armor_damage;

            let structure_damage = remaining.min(state.structure);
            state.structure -= structure_damage;
            remaining -= structure_damage;

            let destroyed = state.structure == 0;
            steps.push(DamageStep {
                location: loc,
                rear: use_rear,
                armor_damage,
                structure_damage,
                location_destroyed: destroyed,
            });

            if destroyed {
                self.destroy_location(loc);
                current = loc.transfer_to();
            } else {
                current = None;
            }
        }

        steps
    }

    /// Mark a location lost along with everything mounted in it.
    pub fn destroy_location(&mut self, location: Location) {
        if let Some(state) = self.locations.get_mut(&location) {
            state.armor = 0;
            state.rear_armor = 0;
            state.structure = 0;
            state.destroyed = true;
        }
        for component in self.components.iter_mut().filter(|c| c.location == location) {
            component.destroyed = true;
        }
        if location.is_vital() {
            if location == Location::Head {
                self.pilot.kill();
            }
            self.destroyed = true;
        }
        if let Some(limb) = location.dependent_limb() {
            if !self.is_location_destroyed(limb) {
                self.destroy_location(limb);
            }
        }
    }

    /// Indices of components a critical hit in `location` may strike.
    pub fn critical_candidates(&self, location: Location) -> Vec<usize> {
        self.components
            .iter()
            .enumerate()
            .filter(|(_, c)| c.location == location && !c.destroyed)
            .map(|(i, _)| i)
            .collect()
    }

    /// Register a critical hit on the component at `index`.
    pub fn apply_critical(&mut self, index: usize) -> CriticalEffect {
        let Some(component) = self.components.get_mut(index) else {
            return CriticalEffect::NoEffect;
        };
        if component.destroyed {
            return CriticalEffect::NoEffect;
        }
        let destroyed = component.hit();
        let hits = component.hits;
        let name = component.name.clone();

        match component.kind {
            ComponentKind::Engine if destroyed => {
                self.disabled = true;
                CriticalEffect::EngineDestroyed
            }
            ComponentKind::Engine => CriticalEffect::EngineHit { hits },
            ComponentKind::Gyro if destroyed => {
                self.prone = true;
                CriticalEffect::GyroDestroyed
            }
            ComponentKind::Gyro => CriticalEffect::GyroHit { hits },
            ComponentKind::Cockpit => {
                self.pilot.kill();
                self.destroyed = true;
                CriticalEffect::PilotKilled
            }
            ComponentKind::Sensors => CriticalEffect::SensorsHit { hits },
            ComponentKind::LifeSupport => CriticalEffect::LifeSupportDestroyed,
            _ => CriticalEffect::ComponentDestroyed { name },
        }
    }

    /// Wound the pilot; a dead pilot takes the unit out for good.
    pub fn wound_pilot(&mut self, wounds: u32) -> bool {
        let killed = self.pilot.wound(wounds);
        if killed {
            self.destroyed = true;
        }
        killed
    }

    /// A failed piloting check: the unit falls and the pilot is hurt.
    pub fn fall(&mut self) {
        self.prone = true;
        self.wound_pilot(1);
    }

    /// Clear the per-turn record at the end of a turn.
    pub fn reset_turn(&mut self) {
        self.turn = TurnRecord::default();
    }

    /// Total remaining armor and structure, for summaries.
    pub fn remaining_points(&self) -> u32 {
        self.locations
            .values()
            .map(|l| l.armor + l.rear_armor + l.structure)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_unit() -> Unit {
        Unit::new(1, "alice".to_string(), &UnitSpec::standard("Hunchback"))
    }

    fn component_index(unit: &Unit, predicate: impl Fn(&ComponentKind) -> bool) -> usize {
        unit.components
            .iter()
            .position(|c| predicate(&c.kind))
            .expect("component present")
    }

    #[test]
    fn test_new_unit_layout() {
        let unit = test_unit();
        assert_eq!(unit.locations.len(), 8);
        assert_eq!(unit.weapons().count(), 3);
        assert_eq!(unit.heat_dissipation(), 10);
        assert!(!unit.is_deployed());
        assert_eq!(unit.walk_mp(), 4);
        assert_eq!(unit.run_mp(), 6);
    }

    #[test]
    fn test_presets_are_valid_specs() {
        assert_eq!(UnitSpec::standard("Griffin").validate(), Ok(()));
        assert_eq!(UnitSpec::scout("Locust").validate(), Ok(()));
    }

    #[test]
    fn test_spec_validation() {
        let mut spec = UnitSpec::standard("Griffin");
        spec.gunnery = -1;
        assert!(matches!(spec.validate(), Err(UnitSpecError::Skill { .. })));

        let mut spec = UnitSpec::standard("Griffin");
        spec.locations.push((Location::Head, 9, 0, 3));
        assert_eq!(
            spec.validate(),
            Err(UnitSpecError::LocationCount {
                location: Location::Head,
                count: 2
            })
        );

        let mut spec = UnitSpec::standard("Griffin");
        spec.weapons[1].1.short_range = 20;
        assert!(matches!(spec.validate(), Err(UnitSpecError::WeaponRanges { .. })));

        let mut spec = UnitSpec::standard("Griffin");
        spec.jump_mp = MAX_SPEC_MP + 1;
        assert!(matches!(spec.validate(), Err(UnitSpecError::Movement { .. })));
    }

    #[test]
    fn test_run_mp_saturates() {
        let mut unit = test_unit();
        unit.walk_mp = u32::MAX;
        assert!(unit.run_mp() >= unit.walk_mp());
    }

    #[test]
    fn test_armor_then_structure() {
        let mut unit = test_unit();
        let steps = unit.apply_damage(Location::LeftArm, 15, false);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].armor_damage, 12);
        assert_eq!(steps[0].structure_damage, 3);
        let arm = unit.location(Location::LeftArm).unwrap();
        assert_eq!(arm.armor, 0);
        assert_eq!(arm.structure, 5);
        assert!(!arm.destroyed);
    }

    #[test]
    fn test_damage_transfers_inward() {
        let mut unit = test_unit();
        let steps = unit.apply_damage(Location::LeftArm, 25, false);
        assert_eq!(steps.len(), 2);
        assert!(steps[0].location_destroyed);
        assert_eq!(steps[1].location, Location::LeftTorso);
        assert_eq!(steps[1].armor_damage, 5);
        assert!(unit.components
            .iter()
            .filter(|c| c.location == Location::LeftArm)
            .all(|c| c.destroyed));
    }

    #[test]
    fn test_rear_armor_used_for_torso() {
        let mut unit = test_unit();
        unit.apply_damage(Location::CenterTorso, 5, true);
        let ct = unit.location(Location::CenterTorso).unwrap();
        assert_eq!(ct.rear_armor, 2);
        assert_eq!(ct.armor, 20);
    }

    #[test]
    fn test_side_torso_takes_arm() {
        let mut unit = test_unit();
        unit.apply_damage(Location::RightTorso, 27, false);
        assert!(unit.is_location_destroyed(Location::RightTorso));
        assert!(unit.is_location_destroyed(Location::RightArm));
        assert!(!unit.destroyed);
    }

    #[test]
    fn test_center_torso_destroys_unit() {
        let mut unit = test_unit();
        unit.apply_damage(Location::CenterTorso, 36, false);
        assert!(unit.destroyed);
    }

    #[test]
    fn test_head_hit_wounds_pilot() {
        let mut unit = test_unit();
        unit.apply_damage(Location::Head, 2, false);
        assert_eq!(unit.pilot.wounds, 1);
        assert!(unit.pilot.alive);
    }

    #[test]
    fn test_cockpit_critical_kills_pilot() {
        let mut unit = test_unit();
        let cockpit = component_index(&unit, |k| matches!(k, ComponentKind::Cockpit));
        assert_eq!(unit.apply_critical(cockpit), CriticalEffect::PilotKilled);
        assert!(!unit.pilot.alive);
        assert!(unit.destroyed);
    }

    #[test]
    fn test_third_engine_hit_disables_and_drops_heat_penalty() {
        let mut unit = test_unit();
        let engine = component_index(&unit, |k| matches!(k, ComponentKind::Engine));

        assert_eq!(unit.apply_critical(engine), CriticalEffect::EngineHit { hits: 1 });
        assert_eq!(unit.engine_heat_penalty(), 5);
        assert_eq!(unit.apply_critical(engine), CriticalEffect::EngineHit { hits: 2 });
        assert_eq!(unit.engine_heat_penalty(), 10);
        assert!(!unit.disabled);

        assert_eq!(unit.apply_critical(engine), CriticalEffect::EngineDestroyed);
        assert!(unit.disabled);
        assert_eq!(unit.engine_heat_penalty(), 0);
        assert_eq!(unit.walk_mp(), 0);
    }

    #[test]
    fn test_gyro_hits_raise_piloting_and_destroy() {
        let mut unit = test_unit();
        let gyro = component_index(&unit, |k| matches!(k, ComponentKind::Gyro));
        unit.apply_critical(gyro);
        let mods = unit.piloting_modifiers();
        assert_eq!(crate::modifiers::sum_modifiers(&mods), 3);
        assert_eq!(unit.apply_critical(gyro), CriticalEffect::GyroDestroyed);
        assert!(unit.prone);
        assert_eq!(unit.walk_mp(), 0);
    }

    #[test]
    fn test_leg_damage_reduces_movement() {
        let mut unit = test_unit();
        let hip = unit
            .components
            .iter()
            .position(|c| c.actuator() == Some(ActuatorKind::Hip))
            .unwrap();
        unit.apply_critical(hip);
        assert_eq!(unit.walk_mp(), 2);
        assert_eq!(unit.run_mp(), 2);

        let mut unit = test_unit();
        unit.apply_damage(Location::LeftLeg, 28, false);
        assert_eq!(unit.walk_mp(), 1);
        assert_eq!(unit.run_mp(), 1);
    }

    #[test]
    fn test_heat_reduces_movement() {
        let mut unit = test_unit();
        unit.heat = 11;
        assert_eq!(unit.walk_mp(), 2);
        assert_eq!(unit.run_mp(), 3);
    }

    #[test]
    fn test_sensors_destroyed_stops_fire() {
        let mut unit = test_unit();
        let sensors = component_index(&unit, |k| matches!(k, ComponentKind::Sensors));
        let weapon = unit.weapons().next().unwrap().0;
        assert!(unit.can_fire(weapon));
        unit.apply_critical(sensors);
        unit.apply_critical(sensors);
        assert!(!unit.can_fire(weapon));
    }

    #[test]
    fn test_weapon_brackets() {
        let laser = Weapon::medium_laser();
        assert_eq!(laser.bracket(0), None);
        assert_eq!(laser.bracket(3), Some(RangeBracket::Short));
        assert_eq!(laser.bracket(6), Some(RangeBracket::Medium));
        assert_eq!(laser.bracket(9), Some(RangeBracket::Long));
        assert_eq!(laser.bracket(10), None);
    }
}
