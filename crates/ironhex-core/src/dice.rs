//! Session-scoped dice.
//!
//! Every random outcome in a session comes from one injected [`DiceRoller`]
//! owned by the authority. Results travel to mirrors as already-rolled
//! [`DiceRoll`] values, so mirrors never hold a roller at all.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A source of six-sided die results.
pub trait DiceRoller: Send {
    /// Roll a single die, returning a value in `1..=6`.
    fn roll_d6(&mut self) -> u8;

    /// Roll `count` dice.
    fn roll(&mut self, count: usize) -> DiceRoll {
        DiceRoll {
            dice: (0..count).map(|_| self.roll_d6()).collect(),
        }
    }

    /// Roll two dice, the standard target roll.
    fn roll_2d6(&mut self) -> DiceRoll {
        self.roll(2)
    }
}

/// The faces of one roll, in the order they were produced.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiceRoll {
    pub dice: Vec<u8>,
}

impl DiceRoll {
    pub fn new(dice: Vec<u8>) -> Self {
        Self { dice }
    }

    pub fn total(&self) -> u32 {
        self.dice.iter().map(|&d| d as u32).sum()
    }
}

impl std::fmt::Display for DiceRoll {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let faces: Vec<String> = self.dice.iter().map(|d| d.to_string()).collect();
        write!(f, "{} [{}]", self.total(), faces.join("+"))
    }
}

/// Reproducible dice backed by a seeded [`StdRng`].
#[derive(Debug)]
pub struct SeededDice {
    rng: StdRng,
}

impl SeededDice {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Dice seeded from the operating system's entropy source.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl DiceRoller for SeededDice {
    fn roll_d6(&mut self) -> u8 {
        self.rng.gen_range(1..=6)
    }
}

/// Dice that replay a fixed script of faces.
///
/// Once the script is exhausted it starts over from the beginning. Faces
/// outside `1..=6` are clamped into range.
#[derive(Clone, Debug)]
pub struct FixedDice {
    script: Vec<u8>,
    pending: VecDeque<u8>,
}

impl FixedDice {
    pub fn new(script: Vec<u8>) -> Self {
        let script: Vec<u8> = if script.is_empty() {
            vec![1]
        } else {
            script.into_iter().map(|d| d.clamp(1, 6)).collect()
        };
        Self {
            pending: script.iter().copied().collect(),
            script,
        }
    }

    /// Number of faces left before the script repeats.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl DiceRoller for FixedDice {
    fn roll_d6(&mut self) -> u8 {
        if self.pending.is_empty() {
            self.pending.extend(self.script.iter().copied());
        }
        self.pending.pop_front().unwrap_or(1)
    }
}
