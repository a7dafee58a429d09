//! Player state and lobby status.

use crate::dice::DiceRoll;
use crate::types::{PlayerColor, PlayerId, UnitId};
use serde::{Deserialize, Serialize};

/// Where a player stands in the join handshake.
///
/// `NotJoined`, `Joining` and `JoinFailed` only ever live on the client;
/// the authority creates players directly in `JoinRequested`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerStatus {
    #[default]
    NotJoined,
    Joining,
    JoinRequested,
    Ready,
    Joined,
    JoinFailed,
}

impl PlayerStatus {
    /// Whether a player may move from this status to `next`.
    pub fn can_transition_to(&self, next: PlayerStatus) -> bool {
        use PlayerStatus::*;
        matches!(
            (self, next),
            (NotJoined, Joining)
                | (Joining, JoinRequested)
                | (Joining, JoinFailed)
                | (JoinFailed, Joining)
                | (JoinRequested, Ready)
                | (Ready, JoinRequested)
                | (Ready, Joined)
        )
    }

    /// Statuses a player may request for themselves while in the lobby.
    pub fn is_player_selectable(&self) -> bool {
        matches!(self, PlayerStatus::Ready | PlayerStatus::JoinRequested)
    }
}

impl std::fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlayerStatus::NotJoined => "not joined",
            PlayerStatus::Joining => "joining",
            PlayerStatus::JoinRequested => "join requested",
            PlayerStatus::Ready => "ready",
            PlayerStatus::Joined => "joined",
            PlayerStatus::JoinFailed => "join failed",
        };
        f.write_str(name)
    }
}

/// A participant in a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    /// Display name, unique within a session.
    pub name: String,
    /// Player's color for map display.
    pub color: PlayerColor,
    pub status: PlayerStatus,
    /// Units this player owns, in registration order.
    pub units: Vec<UnitId>,
    pub conceded: bool,
    /// Most recent initiative or ad hoc roll.
    pub last_roll: Option<DiceRoll>,
    /// Whether the player has finished the current phase.
    pub phase_done: bool,
}

impl Player {
    /// Create a player as the authority first records it.
    pub fn new(id: PlayerId, name: String, color: PlayerColor) -> Self {
        Self {
            id,
            name,
            color,
            status: PlayerStatus::JoinRequested,
            units: Vec::new(),
            conceded: false,
            last_roll: None,
            phase_done: false,
        }
    }

    /// Still taking part: joined the battle and not conceded.
    pub fn is_active(&self) -> bool {
        !self.conceded && self.status == PlayerStatus::Joined
    }

    pub fn owns(&self, unit: UnitId) -> bool {
        self.units.contains(&unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_creation() {
        let player = Player::new(
            "p1".to_string(),
            "Natasha".to_string(),
            PlayerColor::default_for_slot(0),
        );
        assert_eq!(player.status, PlayerStatus::JoinRequested);
        assert!(player.units.is_empty());
        assert!(!player.is_active());
    }

    #[test]
    fn test_status_transitions() {
        use PlayerStatus::*;
        assert!(NotJoined.can_transition_to(Joining));
        assert!(Joining.can_transition_to(JoinFailed));
        assert!(JoinFailed.can_transition_to(Joining));
        assert!(JoinRequested.can_transition_to(Ready));
        assert!(Ready.can_transition_to(JoinRequested));
        assert!(Ready.can_transition_to(Joined));

        assert!(!NotJoined.can_transition_to(Ready));
        assert!(!Joined.can_transition_to(Ready));
        assert!(!JoinRequested.can_transition_to(Joined));
    }

    #[test]
    fn test_active_excludes_conceded() {
        let mut player = Player::new("p1".to_string(), "Kai".to_string(), PlayerColor::default());
        player.status = PlayerStatus::Joined;
        assert!(player.is_active());
        player.conceded = true;
        assert!(!player.is_active());
    }

    #[test]
    fn test_player_serialization() {
        let mut player = Player::new("p1".to_string(), "Kai".to_string(), PlayerColor::default());
        player.units.push(3);
        let json = serde_json::to_string(&player).unwrap();
        let restored: Player = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, player);
    }
}
