//! Hex coordinate system for the battle map.
//!
//! Uses offset "odd-q" coordinates where odd columns are shifted down,
//! laid out with flat-topped hexes so that every hex has a true north
//! neighbor. Facings are the six hexsides in clockwise order starting at
//! north.

use serde::{Deserialize, Serialize};

/// Offset coordinates for the hex grid (odd-q).
///
/// In this coordinate system:
/// - `q` is the column (x-axis)
/// - `r` is the row (y-axis), growing southwards
/// - Odd columns are shifted down by half a hex
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct HexCoord {
    /// Column coordinate
    pub q: i32,
    /// Row coordinate
    pub r: i32,
}

impl PartialOrd for HexCoord {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HexCoord {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Row-major ordering for deterministic iteration
        (self.r, self.q).cmp(&(other.r, other.q))
    }
}

impl HexCoord {
    /// Create a new hex coordinate.
    #[inline]
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// The adjacent hex across the given hexside.
    pub fn neighbor(&self, facing: Facing) -> HexCoord {
        let (x, y, z) = self.to_cube();
        let (dx, dy, dz) = facing.cube_delta();
        HexCoord::from_cube(x + dx, y + dy, z + dz)
    }

    /// All 6 neighboring hexes in clockwise order starting from north.
    pub fn neighbors(&self) -> [HexCoord; 6] {
        Facing::ALL.map(|facing| self.neighbor(facing))
    }

    /// Calculate the distance to another hex (in hex steps).
    pub fn distance(&self, other: &HexCoord) -> u32 {
        let (x1, y1, z1) = self.to_cube();
        let (x2, y2, z2) = other.to_cube();

        let dx = (x1 - x2).abs();
        let dy = (y1 - y2).abs();
        let dz = (z1 - z2).abs();

        dx.max(dy).max(dz) as u32
    }

    /// Convert offset coordinates to cube coordinates.
    ///
    /// Cube coordinates satisfy x + y + z = 0.
    pub fn to_cube(&self) -> (i32, i32, i32) {
        let x = self.q;
        let z = self.r - (self.q - (self.q & 1)) / 2;
        let y = -x - z;
        (x, y, z)
    }

    /// Create a HexCoord from cube coordinates.
    ///
    /// Note: Input must satisfy x + y + z = 0
    pub fn from_cube(x: i32, _y: i32, z: i32) -> Self {
        let q = x;
        let r = z + (x - (x & 1)) / 2;
        Self { q, r }
    }

    /// The hexside of `self` that points most directly at `other`.
    ///
    /// Returns `None` for the same hex. When `other` lies exactly on the line
    /// between two hexsides, the first one in clockwise order wins.
    pub fn direction_to(&self, other: &HexCoord) -> Option<Facing> {
        if self == other {
            return None;
        }
        let (x1, y1, z1) = self.to_cube();
        let (x2, y2, z2) = other.to_cube();
        let delta = (x2 - x1, y2 - y1, z2 - z1);

        let mut best = Facing::North;
        let mut best_dot = i32::MIN;
        for facing in Facing::ALL {
            let (dx, dy, dz) = facing.cube_delta();
            let dot = delta.0 * dx + delta.1 * dy + delta.2 * dz;
            if dot > best_dot {
                best_dot = dot;
                best = facing;
            }
        }
        Some(best)
    }

    /// Get all hexes within a given radius (inclusive).
    pub fn hexes_in_radius(&self, radius: u32) -> Vec<HexCoord> {
        let mut result = Vec::new();
        let r = radius as i32;

        for dq in -r..=r {
            for dr in -r - 1..=r + 1 {
                let candidate = HexCoord::new(self.q + dq, self.r + dr);
                if self.distance(&candidate) <= radius {
                    result.push(candidate);
                }
            }
        }

        result.sort();
        result
    }

    /// Hexes crossed by a straight line to `other`, both ends included.
    ///
    /// Lines running exactly along a hexside are nudged to one side so the
    /// result is deterministic.
    pub fn line_to(&self, other: &HexCoord) -> Vec<HexCoord> {
        let n = self.distance(other);
        if n == 0 {
            return vec![*self];
        }
        let (x1, y1, z1) = self.to_cube();
        let (x2, y2, z2) = other.to_cube();
        let lerp = |a: i32, b: i32, t: f64, nudge: f64| a as f64 + (b - a) as f64 * t + nudge;

        (0..=n)
            .map(|i| {
                let t = i as f64 / n as f64;
                cube_round(
                    lerp(x1, x2, t, 1e-6),
                    lerp(y1, y2, t, 1e-6),
                    lerp(z1, z2, t, -2e-6),
                )
            })
            .collect()
    }
}

fn cube_round(x: f64, y: f64, z: f64) -> HexCoord {
    let (mut rx, mut ry, mut rz) = (x.round(), y.round(), z.round());
    let (dx, dy, dz) = ((rx - x).abs(), (ry - y).abs(), (rz - z).abs());
    if dx > dy && dx > dz {
        rx = -ry - rz;
    } else if dy > dz {
        ry = -rx - rz;
    } else {
        rz = -rx - ry;
    }
    HexCoord::from_cube(rx as i32, ry as i32, rz as i32)
}

impl std::fmt::Display for HexCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.q, self.r)
    }
}

/// One of the six hexsides a unit can face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Facing {
    #[default]
    North,
    NorthEast,
    SouthEast,
    South,
    SouthWest,
    NorthWest,
}

impl Facing {
    /// All facings in clockwise order.
    pub const ALL: [Facing; 6] = [
        Facing::North,
        Facing::NorthEast,
        Facing::SouthEast,
        Facing::South,
        Facing::SouthWest,
        Facing::NorthWest,
    ];

    /// Clockwise index (North = 0).
    pub const fn index(&self) -> usize {
        match self {
            Facing::North => 0,
            Facing::NorthEast => 1,
            Facing::SouthEast => 2,
            Facing::South => 3,
            Facing::SouthWest => 4,
            Facing::NorthWest => 5,
        }
    }

    pub const fn from_index(index: usize) -> Facing {
        Facing::ALL[index % 6]
    }

    /// Cube-coordinate step for this hexside.
    const fn cube_delta(&self) -> (i32, i32, i32) {
        match self {
            Facing::North => (0, 1, -1),
            Facing::NorthEast => (1, 0, -1),
            Facing::SouthEast => (1, -1, 0),
            Facing::South => (0, -1, 1),
            Facing::SouthWest => (-1, 0, 1),
            Facing::NorthWest => (-1, 1, 0),
        }
    }

    pub const fn clockwise(&self) -> Facing {
        Facing::from_index(self.index() + 1)
    }

    pub const fn counter_clockwise(&self) -> Facing {
        Facing::from_index(self.index() + 5)
    }

    pub const fn opposite(&self) -> Facing {
        Facing::from_index(self.index() + 3)
    }

    /// Minimum number of single-hexside turns between two facings.
    pub const fn turns_to(&self, other: Facing) -> u32 {
        let diff = (other.index() + 6 - self.index()) % 6;
        if diff > 3 {
            (6 - diff) as u32
        } else {
            diff as u32
        }
    }
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Facing::North => "N",
            Facing::NorthEast => "NE",
            Facing::SouthEast => "SE",
            Facing::South => "S",
            Facing::SouthWest => "SW",
            Facing::NorthWest => "NW",
        };
        f.write_str(name)
    }
}

/// A hex plus the hexside a unit faces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub coord: HexCoord,
    pub facing: Facing,
}

impl Position {
    pub const fn new(coord: HexCoord, facing: Facing) -> Self {
        Self { coord, facing }
    }

    /// Which side of a unit at this position an attack from `from` strikes.
    pub fn attack_arc(&self, from: &HexCoord) -> AttackArc {
        let Some(direction) = self.coord.direction_to(from) else {
            return AttackArc::Front;
        };
        match (direction.index() + 6 - self.facing.index()) % 6 {
            0 | 1 | 5 => AttackArc::Front,
            2 => AttackArc::Right,
            3 => AttackArc::Rear,
            _ => AttackArc::Left,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} facing {}", self.coord, self.facing)
    }
}

/// Attack direction relative to the target's facing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackArc {
    Front,
    Left,
    Right,
    Rear,
}
