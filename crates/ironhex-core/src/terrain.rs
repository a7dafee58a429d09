//! Terrain tags for battle map hexes.
//!
//! A hex carries an ordered list of terrain tags; costs and modifiers are
//! the sum of the contributions of every tag present.

use serde::{Deserialize, Serialize};

/// A terrain tag attached to a hex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "level")]
pub enum Terrain {
    Clear,
    Pavement,
    Road,
    LightWoods,
    HeavyWoods,
    Rough,
    Rubble,
    /// Water of the given depth (levels below the hex elevation).
    Water(u8),
    /// Impassable terrain such as sheer cliffs or hardened structures.
    Impassable,
}

impl Terrain {
    /// Extra movement points needed to enter a hex with this tag.
    ///
    /// `None` means the tag forbids ground movement into the hex.
    pub const fn movement_cost(&self) -> Option<u32> {
        match self {
            Terrain::Clear | Terrain::Pavement | Terrain::Road => Some(0),
            Terrain::LightWoods | Terrain::Rough | Terrain::Rubble => Some(1),
            Terrain::HeavyWoods => Some(2),
            Terrain::Water(0) => Some(0),
            Terrain::Water(1) => Some(1),
            Terrain::Water(_) => Some(3),
            Terrain::Impassable => None,
        }
    }

    /// To-hit penalty for attacks against a unit standing in this terrain.
    pub const fn cover_modifier(&self) -> i32 {
        match self {
            Terrain::LightWoods => 1,
            Terrain::HeavyWoods => 2,
            Terrain::Water(1) => 1,
            _ => 0,
        }
    }

    /// Whether landing a jump here demands a piloting check.
    pub const fn is_hazardous_landing(&self) -> bool {
        matches!(self, Terrain::Rubble | Terrain::Water(1..))
    }

    /// Whether this tag represents water deep enough to matter.
    pub const fn is_water(&self) -> bool {
        matches!(self, Terrain::Water(1..))
    }
}

impl std::fmt::Display for Terrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Terrain::Clear => write!(f, "clear"),
            Terrain::Pavement => write!(f, "pavement"),
            Terrain::Road => write!(f, "road"),
            Terrain::LightWoods => write!(f, "light woods"),
            Terrain::HeavyWoods => write!(f, "heavy woods"),
            Terrain::Rough => write!(f, "rough"),
            Terrain::Rubble => write!(f, "rubble"),
            Terrain::Water(depth) => write!(f, "water (depth {})", depth),
            Terrain::Impassable => write!(f, "impassable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_costs() {
        assert_eq!(Terrain::Clear.movement_cost(), Some(0));
        assert_eq!(Terrain::LightWoods.movement_cost(), Some(1));
        assert_eq!(Terrain::HeavyWoods.movement_cost(), Some(2));
        assert_eq!(Terrain::Water(1).movement_cost(), Some(1));
        assert_eq!(Terrain::Water(3).movement_cost(), Some(3));
        assert_eq!(Terrain::Impassable.movement_cost(), None);
    }

    #[test]
    fn test_hazardous_landing() {
        assert!(Terrain::Rubble.is_hazardous_landing());
        assert!(Terrain::Water(2).is_hazardous_landing());
        assert!(!Terrain::Water(0).is_hazardous_landing());
        assert!(!Terrain::LightWoods.is_hazardous_landing());
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&Terrain::Water(2)).unwrap();
        assert_eq!(json, r#"{"type":"Water","level":2}"#);
        let back: Terrain = serde_json::from_str(r#"{"type":"HeavyWoods"}"#).unwrap();
        assert_eq!(back, Terrain::HeavyWoods);
    }
}
