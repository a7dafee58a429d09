//! Ironhex Core Library
//!
//! This crate contains the rules engine for Ironhex, a turn-based hex mech
//! combat game played through one authoritative session and any number of
//! passive mirrors.
//!
//! # Design Principles
//!
//! - **No I/O**: This crate is purely game logic; transport lives elsewhere
//! - **Deterministic**: Commands resolve into events with every die already
//!   rolled, and one apply path serves the authority and its mirrors
//! - **Retry-safe**: Every command carries an idempotency key
//! - **Serializable**: Commands, events and state round-trip through serde

// Board
pub mod hex;
pub mod map;
pub mod terrain;
pub mod types;

// Dice and target numbers
pub mod dice;
pub mod modifiers;

// Units and their rules
pub mod combat;
pub mod heat;
pub mod movement;
pub mod unit;

// Session
pub mod command;
pub mod events;
pub mod mirror;
pub mod player;
pub mod session;
pub mod settings;
pub mod state;
pub mod validator;

// Audit log rendering
pub mod audit;

// Re-exports for convenience
pub use audit::{describe_event, describe_modifier, render_log};
pub use combat::{AttackOutcome, CombatResolver, FireBlocker, PilotingCheck};
pub use command::{CommandHeader, CommandKind, CommandPayload, GameCommand, IdempotencyKey};
pub use dice::{DiceRoll, DiceRoller, FixedDice, SeededDice};
pub use events::{Broadcast, EventLog, EventLogError, SessionEvent};
pub use heat::HeatReport;
pub use hex::{AttackArc, Facing, HexCoord, Position};
pub use map::{BattleMap, Hex};
pub use mirror::SessionMirror;
pub use modifiers::{RangeBracket, RollModifier, TargetNumber};
pub use movement::{MovementPath, MovementResolver, ReachableHexes};
pub use player::{Player, PlayerStatus};
pub use session::{Accepted, GameSession, SubmitError};
pub use settings::{SessionSettings, SettingsError};
pub use state::{GamePhase, LobbySnapshot, SessionError, SessionState};
pub use terrain::Terrain;
pub use types::*;
pub use unit::{Location, MovementMode, Unit, UnitSpec, UnitSpecError, Weapon};
pub use validator::{CommandRejection, CommandValidator};
