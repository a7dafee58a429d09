//! Movement reachability and path planning over (hex, facing) states.
//!
//! Ground movement is a Dijkstra search where every state is a hex plus a
//! facing. Forward steps enter the hex ahead, backward steps enter the hex
//! behind, and a one-hexside turn costs a single movement point. Jumps
//! ignore terrain entirely and land anywhere within jump range.

use crate::hex::{Facing, HexCoord, Position};
use crate::map::{BattleMap, Hex};
use crate::modifiers::{RollModifier, TargetNumber};
use crate::unit::{MovementMode, Unit};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

/// Most elevation levels a unit can climb or drop in one step.
pub const MAX_ELEVATION_CHANGE: i32 = 2;

/// Movement points spent getting a prone unit back on its feet.
pub const STAND_UP_COST: u32 = 2;

/// Cost to turn one hexside.
pub const TURN_COST: u32 = 1;

type State = (HexCoord, Facing);

/// One segment of a realized path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    /// Where the unit stands after the segment.
    pub position: Position,
    /// Movement points the segment cost.
    pub cost: u32,
    /// Whether the segment was a backward step.
    pub reversed: bool,
}

/// A realized move, ready for replay and animation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPath {
    pub mode: MovementMode,
    pub start: Position,
    pub steps: Vec<PathStep>,
    pub total_cost: u32,
    /// Hexes entered (for jumps, the distance jumped).
    pub hexes_moved: u32,
}

impl MovementPath {
    /// Final position of the unit.
    pub fn destination(&self) -> Position {
        self.steps.last().map_or(self.start, |s| s.position)
    }

    /// Heat generated by this move.
    pub fn heat(&self) -> u32 {
        self.mode.heat(self.hexes_moved)
    }
}

/// Hexes a unit can reach this phase, split by direction of travel.
///
/// Forward and backward sets are searched separately and never merged: a
/// hex appearing in both keeps both costs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReachableHexes {
    pub mode: MovementMode,
    pub budget: u32,
    pub forward: BTreeMap<HexCoord, u32>,
    pub backward: BTreeMap<HexCoord, u32>,
}

impl ReachableHexes {
    /// Every reachable hex, in row-major order.
    pub fn all(&self) -> BTreeSet<HexCoord> {
        self.forward.keys().chain(self.backward.keys()).copied().collect()
    }

    pub fn contains(&self, coord: &HexCoord) -> bool {
        self.forward.contains_key(coord) || self.backward.contains_key(coord)
    }

    pub fn forward_cost(&self, coord: &HexCoord) -> Option<u32> {
        self.forward.get(coord).copied()
    }

    pub fn backward_cost(&self, coord: &HexCoord) -> Option<u32> {
        self.backward.get(coord).copied()
    }
}

/// Node in the Dijkstra priority queue.
#[derive(Clone, Copy, Eq, PartialEq)]
struct PathNode {
    cost: u32,
    coord: HexCoord,
    facing: Facing,
}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap, ties broken by position for determinism
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.coord.cmp(&self.coord))
            .then_with(|| other.facing.cmp(&self.facing))
    }
}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Copy)]
struct Link {
    from: State,
    cost: u32,
    reversed: bool,
}

/// Result of one directional search.
struct Search {
    costs: BTreeMap<State, u32>,
    came_from: BTreeMap<State, Link>,
}

impl Search {
    /// Cheapest state at `coord`, optionally with a required facing.
    fn best_at(&self, coord: HexCoord, facing: Option<Facing>) -> Option<(State, u32)> {
        Facing::ALL
            .iter()
            .filter(|f| facing.map_or(true, |wanted| wanted == **f))
            .filter_map(|f| self.costs.get(&(coord, *f)).map(|c| ((coord, *f), *c)))
            .min_by_key(|(_, cost)| *cost)
    }

    fn hex_costs(&self) -> BTreeMap<HexCoord, u32> {
        let mut hexes = BTreeMap::new();
        for (&(coord, _), &cost) in &self.costs {
            hexes
                .entry(coord)
                .and_modify(|c: &mut u32| *c = (*c).min(cost))
                .or_insert(cost);
        }
        hexes
    }

    fn steps_to(&self, goal: State) -> Vec<PathStep> {
        let mut steps = Vec::new();
        let mut current = goal;
        while let Some(link) = self.came_from.get(&current) {
            steps.push(PathStep {
                position: Position::new(current.0, current.1),
                cost: link.cost,
                reversed: link.reversed,
            });
            current = link.from;
        }
        steps.reverse();
        steps
    }
}

/// Computes reachable hexes and realized paths on one map.
pub struct MovementResolver<'a> {
    map: &'a BattleMap,
    blocked: BTreeSet<HexCoord>,
}

impl<'a> MovementResolver<'a> {
    pub fn new(map: &'a BattleMap) -> Self {
        Self {
            map,
            blocked: BTreeSet::new(),
        }
    }

    /// Hexes the unit may not enter, such as those held by enemy units.
    pub fn with_blocked(mut self, blocked: impl IntoIterator<Item = HexCoord>) -> Self {
        self.blocked = blocked.into_iter().collect();
        self
    }

    /// Cost of stepping from one hex into an adjacent one.
    ///
    /// Backward steps may not change elevation.
    pub fn step_cost(&self, from: &Hex, to: &Hex, reversed: bool) -> Option<u32> {
        if self.blocked.contains(&to.coord) {
            return None;
        }
        let climb = (to.elevation - from.elevation).abs();
        if climb > MAX_ELEVATION_CHANGE || (reversed && climb != 0) {
            return None;
        }
        to.entry_cost().map(|cost| cost + climb as u32)
    }

    fn start_cost(unit: &Unit) -> u32 {
        if unit.prone {
            STAND_UP_COST
        } else {
            0
        }
    }

    fn search(&self, start: Position, budget: u32, initial: u32, reversed: bool) -> Search {
        let mut costs: BTreeMap<State, u32> = BTreeMap::new();
        let mut came_from: BTreeMap<State, Link> = BTreeMap::new();
        let mut frontier = BinaryHeap::new();

        if initial <= budget && self.map.contains(&start.coord) {
            costs.insert((start.coord, start.facing), initial);
            frontier.push(PathNode {
                cost: initial,
                coord: start.coord,
                facing: start.facing,
            });
        }

        while let Some(node) = frontier.pop() {
            let state = (node.coord, node.facing);
            if costs.get(&state).map_or(false, |&c| node.cost > c) {
                continue;
            }

            let mut moves: Vec<(State, u32)> = vec![
                ((node.coord, node.facing.clockwise()), TURN_COST),
                ((node.coord, node.facing.counter_clockwise()), TURN_COST),
            ];
            let direction = if reversed {
                node.facing.opposite()
            } else {
                node.facing
            };
            let next = node.coord.neighbor(direction);
            if let (Some(from), Some(to)) = (self.map.get(&node.coord), self.map.get(&next)) {
                if let Some(cost) = self.step_cost(from, to, reversed) {
                    moves.push(((next, node.facing), cost));
                }
            }

            for (target, step) in moves {
                let total = node.cost.saturating_add(step);
                // Never take a step that overruns the remaining budget
                if total > budget {
                    continue;
                }
                if total < *costs.get(&target).unwrap_or(&u32::MAX) {
                    costs.insert(target, total);
                    came_from.insert(
                        target,
                        Link {
                            from: state,
                            cost: step,
                            reversed: reversed && target.0 != state.0,
                        },
                    );
                    frontier.push(PathNode {
                        cost: total,
                        coord: target.0,
                        facing: target.1,
                    });
                }
            }
        }

        Search { costs, came_from }
    }

    fn jump_targets(&self, start: HexCoord, jump_mp: u32) -> BTreeMap<HexCoord, u32> {
        start
            .hexes_in_radius(jump_mp)
            .into_iter()
            .filter(|c| *c != start && !self.blocked.contains(c))
            .filter_map(|c| self.map.get(&c))
            .filter(|hex| !hex.is_impassable())
            .map(|hex| (hex.coord, start.distance(&hex.coord)))
            .collect()
    }

    /// Hexes the unit can reach moving in `mode` this phase.
    pub fn reachable(&self, unit: &Unit, mode: MovementMode) -> ReachableHexes {
        let budget = unit.movement_budget(mode);
        let mut result = ReachableHexes {
            mode,
            budget,
            ..Default::default()
        };
        let Some(start) = unit.position else {
            return result;
        };

        match mode {
            MovementMode::Stationary => {}
            MovementMode::Jump => {
                result.forward = self.jump_targets(start.coord, budget);
            }
            MovementMode::Walk | MovementMode::Run => {
                let initial = Self::start_cost(unit);
                result.forward = self.search(start, budget, initial, false).hex_costs();
                if mode == MovementMode::Walk {
                    result.backward = self.search(start, budget, initial, true).hex_costs();
                }
            }
        }
        result
    }

    /// Cheapest realized path to `destination`, ending with `facing` if given.
    ///
    /// Returns `None` when the destination is out of reach.
    pub fn plan(
        &self,
        unit: &Unit,
        mode: MovementMode,
        destination: HexCoord,
        facing: Option<Facing>,
    ) -> Option<MovementPath> {
        let start = unit.position?;
        let budget = unit.movement_budget(mode);

        match mode {
            MovementMode::Stationary => None,
            MovementMode::Jump => {
                let distance = *self.jump_targets(start.coord, budget).get(&destination)?;
                let landing = Position::new(
                    destination,
                    facing.or_else(|| start.coord.direction_to(&destination)).unwrap_or(start.facing),
                );
                Some(MovementPath {
                    mode,
                    start,
                    steps: vec![PathStep {
                        position: landing,
                        cost: distance,
                        reversed: false,
                    }],
                    total_cost: distance,
                    hexes_moved: distance,
                })
            }
            MovementMode::Walk | MovementMode::Run => {
                let initial = Self::start_cost(unit);
                let forward = self.search(start, budget, initial, false);
                let mut best = forward
                    .best_at(destination, facing)
                    .map(|(state, cost)| (forward.steps_to(state), cost));

                if mode == MovementMode::Walk {
                    let backward = self.search(start, budget, initial, true);
                    if let Some((state, cost)) = backward.best_at(destination, facing) {
                        if best.as_ref().map_or(true, |(_, c)| cost < *c) {
                            best = Some((backward.steps_to(state), cost));
                        }
                    }
                }

                let (steps, total_cost) = best?;
                let hexes_moved = count_hexes(start.coord, &steps);
                Some(MovementPath {
                    mode,
                    start,
                    steps,
                    total_cost,
                    hexes_moved,
                })
            }
        }
    }

    /// Piloting check demanded by landing a jump, if any.
    pub fn landing_check(&self, unit: &Unit, path: &MovementPath) -> Option<TargetNumber> {
        if path.mode != MovementMode::Jump {
            return None;
        }
        let hex = self.map.get(&path.destination().coord)?;
        let mut extra: Vec<RollModifier> = hex
            .terrain
            .iter()
            .filter(|t| t.is_hazardous_landing())
            .map(|t| RollModifier::LandingTerrain {
                terrain: *t,
                value: 1,
            })
            .collect();
        if extra.is_empty() && unit.gyro_hits() == 0 {
            return None;
        }
        extra.extend(unit.piloting_modifiers());
        Some(TargetNumber::new(unit.pilot.piloting, extra))
    }
}

fn count_hexes(start: HexCoord, steps: &[PathStep]) -> u32 {
    let mut last = start;
    let mut count = 0;
    for step in steps {
        if step.position.coord != last {
            count += 1;
            last = step.position.coord;
        }
    }
    count
}

/// Piloting target for the unit with any situational modifiers added.
pub fn piloting_target(unit: &Unit, mut situational: Vec<RollModifier>) -> TargetNumber {
    situational.extend(unit.piloting_modifiers());
    TargetNumber::new(unit.pilot.piloting, situational)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::Terrain;
    use crate::unit::UnitSpec;

    fn unit_at(q: i32, r: i32, facing: Facing) -> Unit {
        let mut unit = Unit::new(1, "p1".to_string(), &UnitSpec::standard("Centurion"));
        unit.position = Some(Position::new(HexCoord::new(q, r), facing));
        unit
    }

    #[test]
    fn test_straight_walk_costs_one_per_hex() {
        let map = BattleMap::open_field(10, 10);
        let unit = unit_at(4, 8, Facing::North);
        let resolver = MovementResolver::new(&map);

        let path = resolver
            .plan(&unit, MovementMode::Walk, HexCoord::new(4, 4), None)
            .unwrap();
        assert_eq!(path.total_cost, 4);
        assert_eq!(path.hexes_moved, 4);
        assert_eq!(path.destination(), Position::new(HexCoord::new(4, 4), Facing::North));
        assert!(path.steps.iter().all(|s| !s.reversed));
    }

    #[test]
    fn test_turning_costs_movement() {
        let map = BattleMap::open_field(10, 10);
        let unit = unit_at(4, 4, Facing::North);
        let resolver = MovementResolver::new(&map);

        let path = resolver
            .plan(&unit, MovementMode::Walk, HexCoord::new(4, 4), Some(Facing::South))
            .unwrap();
        assert_eq!(path.total_cost, 3);
        assert_eq!(path.hexes_moved, 0);
    }

    #[test]
    fn test_backward_step_keeps_facing() {
        let map = BattleMap::open_field(10, 10);
        let unit = unit_at(4, 4, Facing::North);
        let resolver = MovementResolver::new(&map);

        let path = resolver
            .plan(&unit, MovementMode::Walk, HexCoord::new(4, 5), Some(Facing::North))
            .unwrap();
        assert_eq!(path.total_cost, 1);
        assert_eq!(path.steps.len(), 1);
        assert!(path.steps[0].reversed);
        assert_eq!(path.destination().facing, Facing::North);
    }

    #[test]
    fn test_no_backward_while_running() {
        let map = BattleMap::open_field(10, 10);
        let unit = unit_at(4, 4, Facing::North);
        let reach = MovementResolver::new(&map).reachable(&unit, MovementMode::Run);
        assert!(reach.backward.is_empty());
        assert_eq!(reach.budget, 6);
    }

    #[test]
    fn test_reachable_sets_within_budget() {
        let mut map = BattleMap::open_field(12, 12);
        map.set(Hex::new(HexCoord::new(5, 4), vec![Terrain::HeavyWoods], 0));
        map.set(Hex::new(HexCoord::new(6, 6), vec![Terrain::Clear], 3));
        let unit = unit_at(5, 6, Facing::North);
        let resolver = MovementResolver::new(&map);
        let reach = resolver.reachable(&unit, MovementMode::Walk);

        for (coord, cost) in reach.forward.iter().chain(reach.backward.iter()) {
            assert!(*cost <= reach.budget, "{} cost {}", coord, cost);
        }
        // One hex ahead, then heavy woods at 3: total 4
        assert_eq!(reach.forward_cost(&HexCoord::new(5, 4)), Some(4));
        // Three levels up is a cliff
        assert!(!reach.contains(&HexCoord::new(6, 6)));
        assert_eq!(reach.backward_cost(&HexCoord::new(5, 7)), Some(1));
        assert!(reach.all().contains(&HexCoord::new(5, 7)));
    }

    #[test]
    fn test_forward_and_backward_kept_distinct() {
        let map = BattleMap::open_field(10, 10);
        let unit = unit_at(4, 4, Facing::North);
        let reach = MovementResolver::new(&map).reachable(&unit, MovementMode::Walk);
        let behind = HexCoord::new(4, 5);
        assert_eq!(reach.backward_cost(&behind), Some(1));
        // Forward needs three turns and a step
        assert_eq!(reach.forward_cost(&behind), Some(4));
    }

    #[test]
    fn test_backward_step_cannot_change_elevation() {
        let mut map = BattleMap::open_field(10, 10);
        map.set(Hex::new(HexCoord::new(4, 5), vec![Terrain::Clear], 1));
        let unit = unit_at(4, 4, Facing::North);
        let reach = MovementResolver::new(&map).reachable(&unit, MovementMode::Walk);
        assert_eq!(reach.backward_cost(&HexCoord::new(4, 5)), None);
    }

    #[test]
    fn test_blocked_hexes_are_avoided() {
        let map = BattleMap::open_field(10, 10);
        let unit = unit_at(4, 8, Facing::North);
        let resolver = MovementResolver::new(&map).with_blocked([HexCoord::new(4, 7)]);
        assert!(resolver
            .plan(&unit, MovementMode::Walk, HexCoord::new(4, 6), None)
            .is_none());
        let path = resolver
            .plan(&unit, MovementMode::Run, HexCoord::new(4, 6), None)
            .unwrap();
        assert_eq!(path.total_cost, 6);
        assert!(path.steps.iter().all(|s| s.position.coord != HexCoord::new(4, 7)));
    }

    #[test]
    fn test_out_of_reach_returns_none() {
        let map = BattleMap::open_field(20, 20);
        let unit = unit_at(2, 10, Facing::North);
        let resolver = MovementResolver::new(&map);
        assert!(resolver
            .plan(&unit, MovementMode::Walk, HexCoord::new(2, 2), None)
            .is_none());
        assert!(resolver
            .plan(&unit, MovementMode::Run, HexCoord::new(2, 4), None)
            .is_some());
    }

    #[test]
    fn test_jump_ignores_terrain_and_checks_landing() {
        let mut map = BattleMap::open_field(10, 10);
        map.set(Hex::new(HexCoord::new(4, 2), vec![Terrain::Rubble], 0));
        map.set(Hex::new(HexCoord::new(4, 3), vec![Terrain::Impassable], 0));
        let unit = unit_at(4, 5, Facing::North);
        let resolver = MovementResolver::new(&map);

        let reach = resolver.reachable(&unit, MovementMode::Jump);
        assert!(!reach.contains(&HexCoord::new(4, 3)));
        assert!(reach.contains(&HexCoord::new(4, 2)));

        let path = resolver
            .plan(&unit, MovementMode::Jump, HexCoord::new(4, 2), None)
            .unwrap();
        assert_eq!(path.hexes_moved, 3);
        assert_eq!(path.heat(), 3);
        let check = resolver.landing_check(&unit, &path).unwrap();
        assert_eq!(check.value, 6);

        let clear = resolver
            .plan(&unit, MovementMode::Jump, HexCoord::new(4, 4), None)
            .unwrap();
        assert!(resolver.landing_check(&unit, &clear).is_none());
    }

    #[test]
    fn test_prone_unit_pays_to_stand() {
        let map = BattleMap::open_field(10, 10);
        let mut unit = unit_at(4, 8, Facing::North);
        unit.prone = true;
        let reach = MovementResolver::new(&map).reachable(&unit, MovementMode::Walk);
        assert_eq!(reach.forward_cost(&HexCoord::new(4, 7)), Some(3));
        assert!(!reach.contains(&HexCoord::new(4, 5)));
    }
}
