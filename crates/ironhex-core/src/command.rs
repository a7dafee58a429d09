//! Commands participants send to the authority.

use crate::hex::{Facing, HexCoord, Position};
use crate::player::PlayerStatus;
use crate::state::GamePhase;
use crate::types::{PlayerColor, PlayerId, SessionId, Timestamp, UnitId};
use crate::unit::{MovementMode, UnitSpec};
use serde::{Deserialize, Serialize};

/// Addressing and bookkeeping common to every command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandHeader {
    pub session_id: SessionId,
    pub player_id: PlayerId,
    /// Unit the command acts for, if any.
    pub unit_id: Option<UnitId>,
    /// Phase the sender believes the session is in.
    pub phase: GamePhase,
    /// Turn the sender believes the session is in.
    pub turn: u32,
    /// Bumped by the sender for a deliberate new try; kept for retries.
    pub attempt: u32,
    /// Originator's clock, milliseconds since the Unix epoch.
    pub timestamp: Timestamp,
}

impl CommandHeader {
    pub fn new(session_id: &str, player_id: &str, phase: GamePhase, turn: u32) -> Self {
        Self {
            session_id: session_id.to_string(),
            player_id: player_id.to_string(),
            unit_id: None,
            phase,
            turn,
            attempt: 0,
            timestamp: 0,
        }
    }

    pub fn for_unit(mut self, unit_id: UnitId) -> Self {
        self.unit_id = Some(unit_id);
        self
    }

    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// What the command asks for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CommandPayload {
    JoinGame {
        name: String,
        color: Option<PlayerColor>,
        roster: Vec<UnitSpec>,
    },
    UpdatePlayerStatus { status: PlayerStatus },
    RequestLobbyStatus,
    RollDice { count: usize },
    Deploy { position: Position },
    Move {
        mode: MovementMode,
        destination: HexCoord,
        facing: Option<Facing>,
    },
    Attack { target: UnitId, weapons: Vec<usize> },
    EndPhase,
    Concede,
}

/// Payload discriminant, used for phase rules and idempotency keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommandKind {
    JoinGame,
    UpdatePlayerStatus,
    RequestLobbyStatus,
    RollDice,
    Deploy,
    Move,
    Attack,
    EndPhase,
    Concede,
}

impl CommandKind {
    /// Kinds accepted regardless of the phase the sender declared.
    pub const fn is_phase_agnostic(&self) -> bool {
        matches!(
            self,
            CommandKind::RequestLobbyStatus
                | CommandKind::RollDice
                | CommandKind::UpdatePlayerStatus
                | CommandKind::Concede
        )
    }

    /// Whether the kind may be issued while the session is in `phase`.
    pub const fn allowed_in(&self, phase: GamePhase) -> bool {
        if phase.is_terminal() {
            return matches!(self, CommandKind::RequestLobbyStatus);
        }
        match self {
            CommandKind::JoinGame => matches!(phase, GamePhase::Lobby),
            CommandKind::Deploy => matches!(phase, GamePhase::Deployment),
            CommandKind::Move => matches!(phase, GamePhase::Movement),
            CommandKind::Attack => matches!(phase, GamePhase::WeaponsAttack),
            CommandKind::EndPhase => phase.has_player_actions(),
            CommandKind::Concede => !matches!(phase, GamePhase::Lobby),
            CommandKind::RequestLobbyStatus
            | CommandKind::RollDice
            | CommandKind::UpdatePlayerStatus => true,
        }
    }

    /// Kinds that must name one of the sender's units.
    pub const fn needs_unit(&self) -> bool {
        matches!(
            self,
            CommandKind::Deploy | CommandKind::Move | CommandKind::Attack
        )
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Identity of a command for duplicate suppression.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub session_id: SessionId,
    pub player_id: PlayerId,
    pub unit_id: Option<UnitId>,
    pub phase: GamePhase,
    pub turn: u32,
    pub kind: CommandKind,
    pub attempt: u32,
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.session_id, self.player_id)?;
        if let Some(unit) = self.unit_id {
            write!(f, "/unit {}", unit)?;
        }
        write!(
            f,
            "/{}/turn {}/{}#{}",
            self.phase, self.turn, self.kind, self.attempt
        )
    }
}

/// A command as it travels over the channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameCommand {
    pub header: CommandHeader,
    pub payload: CommandPayload,
}

impl GameCommand {
    pub fn new(header: CommandHeader, payload: CommandPayload) -> Self {
        Self { header, payload }
    }

    pub fn kind(&self) -> CommandKind {
        match &self.payload {
            CommandPayload::JoinGame { .. } => CommandKind::JoinGame,
            CommandPayload::UpdatePlayerStatus { .. } => CommandKind::UpdatePlayerStatus,
            CommandPayload::RequestLobbyStatus => CommandKind::RequestLobbyStatus,
            CommandPayload::RollDice { .. } => CommandKind::RollDice,
            CommandPayload::Deploy { .. } => CommandKind::Deploy,
            CommandPayload::Move { .. } => CommandKind::Move,
            CommandPayload::Attack { .. } => CommandKind::Attack,
            CommandPayload::EndPhase => CommandKind::EndPhase,
            CommandPayload::Concede => CommandKind::Concede,
        }
    }

    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey {
            session_id: self.header.session_id.clone(),
            player_id: self.header.player_id.clone(),
            unit_id: self.header.unit_id,
            phase: self.header.phase,
            turn: self.header.turn,
            kind: self.kind(),
            attempt: self.header.attempt,
        }
    }

    /// The same command as a deliberate new attempt.
    pub fn retry_as_new_attempt(&self) -> Self {
        let mut next = self.clone();
        next.header.attempt += 1;
        next
    }
}
