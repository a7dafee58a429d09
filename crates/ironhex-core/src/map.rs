//! Battle map structure with hexes and spatial queries.
//!
//! The map is external, read-only input to the resolvers: a hex is its
//! coordinates, an ordered list of terrain tags and an elevation level.

use crate::hex::HexCoord;
use crate::terrain::Terrain;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The battle map containing all hexes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BattleMap {
    /// Map width in hexes.
    pub width: u32,
    /// Map height in hexes.
    pub height: u32,
    /// All hexes indexed by coordinate.
    #[serde(with = "hex_list")]
    pub hexes: BTreeMap<HexCoord, Hex>,
}

impl BattleMap {
    /// Create a new empty map with the given dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            hexes: BTreeMap::new(),
        }
    }

    /// Create a map filled with clear, level ground.
    pub fn open_field(width: u32, height: u32) -> Self {
        let mut map = Self::new(width, height);
        for q in 0..width as i32 {
            for r in 0..height as i32 {
                let coord = HexCoord::new(q, r);
                map.hexes.insert(coord, Hex::new(coord, vec![Terrain::Clear], 0));
            }
        }
        map
    }

    /// Get a hex at the given coordinate.
    pub fn get(&self, coord: &HexCoord) -> Option<&Hex> {
        self.hexes.get(coord)
    }

    /// Insert or replace a hex. Hexes outside the map bounds are ignored.
    pub fn set(&mut self, hex: Hex) {
        if self.in_bounds(&hex.coord) {
            self.hexes.insert(hex.coord, hex);
        }
    }

    /// Check if a coordinate is within the map bounds.
    pub fn in_bounds(&self, coord: &HexCoord) -> bool {
        coord.q >= 0
            && coord.r >= 0
            && (coord.q as u32) < self.width
            && (coord.r as u32) < self.height
    }

    /// Check if a coordinate names a hex that exists on the map.
    pub fn contains(&self, coord: &HexCoord) -> bool {
        self.hexes.contains_key(coord)
    }

    /// Get valid neighbors of a hex (respecting map boundaries).
    pub fn neighbors(&self, coord: &HexCoord) -> Vec<HexCoord> {
        coord
            .neighbors()
            .into_iter()
            .filter(|c| self.contains(c))
            .collect()
    }

    /// Count total hexes in the map.
    pub fn hex_count(&self) -> usize {
        self.hexes.len()
    }
}

impl Default for BattleMap {
    fn default() -> Self {
        Self::open_field(16, 17)
    }
}

/// A single hex on the map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hex {
    /// Position on the map.
    pub coord: HexCoord,
    /// Terrain tags, in the order the map source listed them.
    pub terrain: Vec<Terrain>,
    /// Ground level.
    pub elevation: i32,
}

impl Hex {
    /// Create a new hex.
    pub fn new(coord: HexCoord, terrain: Vec<Terrain>, elevation: i32) -> Self {
        Self {
            coord,
            terrain,
            elevation,
        }
    }

    /// Movement points needed to enter this hex, ignoring elevation change.
    ///
    /// Returns `None` when any tag forbids entry.
    pub fn entry_cost(&self) -> Option<u32> {
        self.terrain
            .iter()
            .try_fold(1u32, |cost, t| t.movement_cost().map(|extra| cost + extra))
    }

    /// Combined to-hit penalty for a target standing here.
    pub fn cover_modifier(&self) -> i32 {
        self.terrain.iter().map(Terrain::cover_modifier).sum()
    }

    /// Whether a jump landing here demands a piloting check.
    pub fn is_hazardous_landing(&self) -> bool {
        self.terrain.iter().any(Terrain::is_hazardous_landing)
    }

    /// Whether any tag on this hex forbids entry.
    pub fn is_impassable(&self) -> bool {
        self.entry_cost().is_none()
    }

    pub fn has(&self, terrain: Terrain) -> bool {
        self.terrain.contains(&terrain)
    }
}

/// Serialize the hex map as a list since JSON requires string keys.
mod hex_list {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(map: &BTreeMap<HexCoord, Hex>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<HexCoord, Hex>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hexes: Vec<Hex> = Deserialize::deserialize(deserializer)?;
        Ok(hexes.into_iter().map(|h| (h.coord, h)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_field() {
        let map = BattleMap::open_field(10, 8);
        assert_eq!(map.hex_count(), 80);
        assert_eq!(map.get(&HexCoord::new(3, 3)).unwrap().entry_cost(), Some(1));
    }

    #[test]
    fn test_edge_neighbors() {
        let map = BattleMap::open_field(10, 10);
        assert_eq!(map.neighbors(&HexCoord::new(5, 5)).len(), 6);
        assert!(map.neighbors(&HexCoord::new(0, 0)).len() < 6);
    }

    #[test]
    fn test_entry_cost_stacks_tags() {
        let hex = Hex::new(
            HexCoord::new(0, 0),
            vec![Terrain::Rough, Terrain::LightWoods],
            0,
        );
        assert_eq!(hex.entry_cost(), Some(3));
        assert_eq!(hex.cover_modifier(), 1);

        let blocked = Hex::new(HexCoord::new(0, 0), vec![Terrain::Impassable], 0);
        assert!(blocked.is_impassable());
    }

    #[test]
    fn test_set_out_of_bounds_is_ignored() {
        let mut map = BattleMap::open_field(4, 4);
        map.set(Hex::new(HexCoord::new(9, 9), vec![Terrain::Clear], 0));
        assert_eq!(map.hex_count(), 16);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut map = BattleMap::open_field(3, 3);
        map.set(Hex::new(HexCoord::new(1, 1), vec![Terrain::HeavyWoods], 2));
        let json = serde_json::to_string(&map).unwrap();
        let back: BattleMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
