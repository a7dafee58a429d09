//! Resolved session events and the broadcast envelope.
//!
//! Every accepted command turns into one or more [`SessionEvent`]s with all
//! randomness already rolled. The authority wraps each event in a
//! [`Broadcast`] carrying a gap-free sequence number; mirrors apply the
//! broadcasts in that order.

use crate::combat::{AttackOutcome, PilotingCheck};
use crate::dice::DiceRoll;
use crate::heat::HeatReport;
use crate::hex::Position;
use crate::movement::MovementPath;
use crate::player::{Player, PlayerStatus};
use crate::state::GamePhase;
use crate::types::{PlayerId, Sequence, SessionId, Timestamp, UnitId};
use crate::unit::Unit;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A state change decided by the authority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// A join request was accepted; carries the registered roster.
    PlayerJoined { player: Player, units: Vec<Unit> },
    PlayerStatusChanged {
        player_id: PlayerId,
        status: PlayerStatus,
    },
    DiceRolled { player_id: PlayerId, roll: DiceRoll },
    /// The player declared themselves done with the current phase.
    PhaseEnded { player_id: PlayerId },
    UnitDeployed { unit_id: UnitId, position: Position },
    UnitMoved {
        unit_id: UnitId,
        path: MovementPath,
        /// Piloting check for a jump landing, if one was needed.
        landing: Option<PilotingCheck>,
    },
    AttackResolved { outcome: AttackOutcome },
    HeatResolved { reports: Vec<HeatReport> },
    PhaseChanged {
        from: GamePhase,
        to: GamePhase,
        turn: u32,
    },
    PlayerConceded { player_id: PlayerId },
    GameOver { winner: Option<PlayerId> },
}

impl SessionEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::PlayerJoined { .. } => "player_joined",
            SessionEvent::PlayerStatusChanged { .. } => "player_status_changed",
            SessionEvent::DiceRolled { .. } => "dice_rolled",
            SessionEvent::PhaseEnded { .. } => "phase_ended",
            SessionEvent::UnitDeployed { .. } => "unit_deployed",
            SessionEvent::UnitMoved { .. } => "unit_moved",
            SessionEvent::AttackResolved { .. } => "attack_resolved",
            SessionEvent::HeatResolved { .. } => "heat_resolved",
            SessionEvent::PhaseChanged { .. } => "phase_changed",
            SessionEvent::PlayerConceded { .. } => "player_conceded",
            SessionEvent::GameOver { .. } => "game_over",
        }
    }
}

/// An event as the authority sends it out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    pub session_id: SessionId,
    /// Position in the session's event sequence, starting at 1.
    pub sequence: Sequence,
    /// Authority's clock when the event was produced.
    pub timestamp: Timestamp,
    /// Player whose command caused the event; `None` for automatic steps.
    pub origin: Option<PlayerId>,
    pub event: SessionEvent,
}

/// Errors from event log operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EventLogError {
    #[error("broadcast belongs to session {0}")]
    WrongSession(SessionId),
    #[error("expected sequence {expected}, got {got}")]
    InvalidSequence { expected: Sequence, got: Sequence },
}

/// Ordered history of every broadcast in a session.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    session_id: SessionId,
    broadcasts: Vec<Broadcast>,
}

impl EventLog {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            broadcasts: Vec::new(),
        }
    }

    /// Append a broadcast; sequences must follow on without gaps.
    pub fn add(&mut self, broadcast: Broadcast) -> Result<(), EventLogError> {
        if broadcast.session_id != self.session_id {
            return Err(EventLogError::WrongSession(broadcast.session_id));
        }
        let expected = self.last_sequence() + 1;
        if broadcast.sequence != expected {
            return Err(EventLogError::InvalidSequence {
                expected,
                got: broadcast.sequence,
            });
        }
        self.broadcasts.push(broadcast);
        Ok(())
    }

    pub fn last_sequence(&self) -> Sequence {
        self.broadcasts.last().map_or(0, |b| b.sequence)
    }

    /// Broadcasts after `sequence`, for catching up a late mirror.
    pub fn since(&self, sequence: Sequence) -> &[Broadcast] {
        let start = (sequence as usize).min(self.broadcasts.len());
        &self.broadcasts[start..]
    }

    pub fn broadcasts(&self) -> &[Broadcast] {
        &self.broadcasts
    }

    pub fn len(&self) -> usize {
        self.broadcasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.broadcasts.is_empty()
    }
}
