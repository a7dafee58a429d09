//! Session state shared by the authority and every mirror.
//!
//! [`SessionState`] only changes through [`SessionState::apply_broadcast`],
//! which applies one already-resolved [`SessionEvent`]. Applying the same
//! broadcasts in the same order always produces the same state, whichever
//! side does it.

use crate::combat::CombatResolver;
use crate::events::{Broadcast, EventLogError, SessionEvent};
use crate::hex::HexCoord;
use crate::map::BattleMap;
use crate::player::{Player, PlayerStatus};
use crate::settings::SessionSettings;
use crate::types::{PlayerId, Sequence, SessionId, UnitId};
use crate::unit::Unit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

/// Session phases, in turn order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GamePhase {
    /// Waiting for players to join and ready up.
    #[default]
    Lobby,
    Deployment,
    Movement,
    WeaponsAttack,
    Heat,
    End,
    /// Terminal.
    GameOver,
}

impl GamePhase {
    /// The phase that normally follows this one.
    pub const fn next(&self) -> Option<GamePhase> {
        match self {
            GamePhase::Lobby => Some(GamePhase::Deployment),
            GamePhase::Deployment => Some(GamePhase::Movement),
            GamePhase::Movement => Some(GamePhase::WeaponsAttack),
            GamePhase::WeaponsAttack => Some(GamePhase::Heat),
            GamePhase::Heat => Some(GamePhase::End),
            GamePhase::End => Some(GamePhase::Movement),
            GamePhase::GameOver => None,
        }
    }

    /// Phases that wait on player actions.
    pub const fn has_player_actions(&self) -> bool {
        matches!(
            self,
            GamePhase::Deployment | GamePhase::Movement | GamePhase::WeaponsAttack
        )
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, GamePhase::GameOver)
    }
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GamePhase::Lobby => "lobby",
            GamePhase::Deployment => "deployment",
            GamePhase::Movement => "movement",
            GamePhase::WeaponsAttack => "weapons attack",
            GamePhase::Heat => "heat",
            GamePhase::End => "end",
            GamePhase::GameOver => "game over",
        };
        f.write_str(name)
    }
}

/// Internal inconsistencies. Any of these ends the session.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("unknown unit {0}")]
    MissingUnit(UnitId),
    #[error("unknown player {0}")]
    MissingPlayer(PlayerId),
    #[error("player {0} registered twice")]
    DuplicatePlayer(PlayerId),
    #[error("unit {0} registered twice")]
    DuplicateUnit(UnitId),
    #[error("phase change from {from} while the session is in {current}")]
    PhaseMismatch { from: GamePhase, current: GamePhase },
    #[error("broadcast for session {got}, expected {expected}")]
    WrongSession { expected: SessionId, got: SessionId },
    #[error("sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: Sequence, got: Sequence },
    #[error(transparent)]
    EventLog(#[from] EventLogError),
    #[error("resolution failed after validation: {0}")]
    Resolution(String),
    #[error("session has been terminated")]
    Terminated,
}

/// What a lobby query returns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbySnapshot {
    pub session_id: SessionId,
    pub name: String,
    pub phase: GamePhase,
    pub turn: u32,
    pub min_players: usize,
    pub max_players: usize,
    /// (id, name, status) in join order.
    pub players: Vec<(PlayerId, String, PlayerStatus)>,
}

/// Everything both the authority and its mirrors know about a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: SessionId,
    /// Session configuration (immutable after creation).
    pub settings: SessionSettings,
    pub map: BattleMap,
    pub phase: GamePhase,
    /// Current turn; 0 until the first movement phase.
    pub turn: u32,
    pub players: BTreeMap<PlayerId, Player>,
    /// Player ids in the order they joined.
    pub join_order: Vec<PlayerId>,
    pub units: BTreeMap<UnitId, Unit>,
    /// Whether this turn's heat has been worked out.
    pub heat_resolved: bool,
    pub winner: Option<PlayerId>,
    /// Sequence of the last applied broadcast.
    pub last_sequence: Sequence,
}

impl SessionState {
    pub fn new(session_id: SessionId, settings: SessionSettings, map: BattleMap) -> Self {
        Self {
            session_id,
            settings,
            map,
            phase: GamePhase::Lobby,
            turn: 0,
            players: BTreeMap::new(),
            join_order: Vec::new(),
            units: BTreeMap::new(),
            heat_resolved: false,
            winner: None,
            last_sequence: 0,
        }
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    fn player_mut(&mut self, id: &str) -> Result<&mut Player, SessionError> {
        self.players
            .get_mut(id)
            .ok_or_else(|| SessionError::MissingPlayer(id.to_string()))
    }

    fn unit_mut(&mut self, id: UnitId) -> Result<&mut Unit, SessionError> {
        self.units.get_mut(&id).ok_or(SessionError::MissingUnit(id))
    }

    /// Id the next registered unit will get.
    pub fn next_unit_id(&self) -> UnitId {
        self.units.keys().next_back().map_or(1, |id| id + 1)
    }

    /// Units owned by a player.
    pub fn units_of<'a>(&'a self, player: &'a str) -> impl Iterator<Item = &'a Unit> + 'a {
        self.units.values().filter(move |u| u.owner == player)
    }

    /// Unit standing on a hex, if any.
    pub fn unit_at(&self, coord: &HexCoord) -> Option<&Unit> {
        self.units
            .values()
            .find(|u| !u.destroyed && u.position.map_or(false, |p| p.coord == *coord))
    }

    /// Hexes held by other players' units that are still standing.
    pub fn enemy_positions(&self, player: &str) -> Vec<HexCoord> {
        self.units
            .values()
            .filter(|u| u.owner != player && !u.destroyed)
            .filter_map(|u| u.position.map(|p| p.coord))
            .collect()
    }

    /// Players still in the battle.
    pub fn active_players(&self) -> impl Iterator<Item = &Player> {
        self.join_order
            .iter()
            .filter_map(|id| self.players.get(id))
            .filter(|p| p.is_active())
    }

    /// Whether a unit has any enemy it could shoot at right now.
    pub fn has_target(&self, unit: &Unit) -> bool {
        let resolver = CombatResolver::new(&self.map);
        self.units
            .values()
            .filter(|t| t.owner != unit.owner && !t.is_out_of_action() && t.is_deployed())
            .any(|target| {
                unit.weapons()
                    .any(|(i, _, _)| resolver.check_fire(unit, target, i).is_ok())
            })
    }

    /// Whether the unit still owes an action in the current phase.
    pub fn unit_has_pending_action(&self, unit: &Unit) -> bool {
        if unit.is_out_of_action() {
            return false;
        }
        match self.phase {
            GamePhase::Deployment => !unit.is_deployed(),
            GamePhase::Movement => unit.can_move(),
            GamePhase::WeaponsAttack => unit.can_attack() && self.has_target(unit),
            _ => false,
        }
    }

    /// Whether the player has finished everything the phase asks of them.
    pub fn is_player_done(&self, player: &Player) -> bool {
        player.phase_done
            || !self
                .units_of(&player.id)
                .any(|u| self.unit_has_pending_action(u))
    }

    /// Lobby is full enough and everyone is ready.
    pub fn lobby_ready(&self) -> bool {
        self.players.len() >= self.settings.min_players
            && self
                .players
                .values()
                .all(|p| p.status == PlayerStatus::Ready)
    }

    /// Every active player has finished the current phase.
    pub fn all_players_done(&self) -> bool {
        self.active_players().all(|p| self.is_player_done(p))
    }

    /// Players who have not conceded and still field a working unit.
    pub fn sides_in_play(&self) -> Vec<PlayerId> {
        self.active_players()
            .filter(|p| self.units_of(&p.id).any(|u| !u.is_out_of_action()))
            .map(|p| p.id.clone())
            .collect()
    }

    /// `Some(winner)` once the battle is decided.
    pub fn battle_result(&self) -> Option<Option<PlayerId>> {
        if matches!(self.phase, GamePhase::Lobby | GamePhase::GameOver) {
            return None;
        }
        let sides = self.sides_in_play();
        let contenders = self.join_order.len();
        match (contenders, sides.len()) {
            (1, 0) => Some(None),
            (1, _) => None,
            (_, 0) => Some(None),
            (_, 1) => Some(sides.into_iter().next()),
            _ => None,
        }
    }

    pub fn lobby_snapshot(&self) -> LobbySnapshot {
        LobbySnapshot {
            session_id: self.session_id.clone(),
            name: self.settings.name.clone(),
            phase: self.phase,
            turn: self.turn,
            min_players: self.settings.min_players,
            max_players: self.settings.max_players,
            players: self
                .join_order
                .iter()
                .filter_map(|id| self.players.get(id))
                .map(|p| (p.id.clone(), p.name.clone(), p.status))
                .collect(),
        }
    }

    /// Apply one broadcast in sequence order.
    ///
    /// Returns `Ok(false)` for a broadcast that was already applied.
    pub fn apply_broadcast(&mut self, broadcast: &Broadcast) -> Result<bool, SessionError> {
        if broadcast.session_id != self.session_id {
            return Err(SessionError::WrongSession {
                expected: self.session_id.clone(),
                got: broadcast.session_id.clone(),
            });
        }
        if broadcast.sequence <= self.last_sequence {
            return Ok(false);
        }
        if broadcast.sequence != self.last_sequence + 1 {
            return Err(SessionError::SequenceGap {
                expected: self.last_sequence + 1,
                got: broadcast.sequence,
            });
        }
        self.apply_event(&broadcast.event)?;
        self.last_sequence = broadcast.sequence;
        Ok(true)
    }

    /// Apply one resolved event. No dice are involved.
    pub fn apply_event(&mut self, event: &SessionEvent) -> Result<(), SessionError> {
        match event {
            SessionEvent::PlayerJoined { player, units } => {
                if self.players.contains_key(&player.id) {
                    return Err(SessionError::DuplicatePlayer(player.id.clone()));
                }
                for unit in units {
                    if self.units.contains_key(&unit.id) {
                        return Err(SessionError::DuplicateUnit(unit.id));
                    }
                }
                let mut player = player.clone();
                player.units = units.iter().map(|u| u.id).collect();
                for unit in units {
                    self.units.insert(unit.id, unit.clone());
                }
                self.join_order.push(player.id.clone());
                self.players.insert(player.id.clone(), player);
            }
            SessionEvent::PlayerStatusChanged { player_id, status } => {
                self.player_mut(player_id)?.status = *status;
            }
            SessionEvent::DiceRolled { player_id, roll } => {
                self.player_mut(player_id)?.last_roll = Some(roll.clone());
            }
            SessionEvent::PhaseEnded { player_id } => {
                self.player_mut(player_id)?.phase_done = true;
            }
            SessionEvent::UnitDeployed { unit_id, position } => {
                self.unit_mut(*unit_id)?.position = Some(*position);
            }
            SessionEvent::UnitMoved {
                unit_id,
                path,
                landing,
            } => {
                let unit = self.unit_mut(*unit_id)?;
                unit.position = Some(path.destination());
                unit.prone = false;
                unit.turn.mode = path.mode;
                unit.turn.hexes_moved = path.hexes_moved;
                unit.turn.moved = true;
                unit.turn.heat_generated = unit.turn.heat_generated.saturating_add(path.heat());
                if let Some(check) = landing {
                    check.apply(unit);
                }
            }
            SessionEvent::AttackResolved { outcome } => {
                outcome.apply_to_attacker(self.unit_mut(outcome.attacker_id)?);
                outcome.apply_to_target(self.unit_mut(outcome.target_id)?);
            }
            SessionEvent::HeatResolved { reports } => {
                for report in reports {
                    report.apply(self.unit_mut(report.unit_id)?);
                }
                self.heat_resolved = true;
            }
            SessionEvent::PhaseChanged { from, to, turn } => {
                if *from != self.phase {
                    return Err(SessionError::PhaseMismatch {
                        from: *from,
                        current: self.phase,
                    });
                }
                self.enter_phase(*from, *to, *turn);
            }
            SessionEvent::PlayerConceded { player_id } => {
                self.player_mut(player_id)?.conceded = true;
            }
            SessionEvent::GameOver { winner } => {
                info!(session = %self.session_id, winner = ?winner, "game over");
                self.phase = GamePhase::GameOver;
                self.winner = winner.clone();
            }
        }
        Ok(())
    }

    fn enter_phase(&mut self, from: GamePhase, to: GamePhase, turn: u32) {
        debug!(session = %self.session_id, %from, %to, turn, "phase change");
        self.phase = to;
        self.turn = turn;
        self.heat_resolved = false;
        for player in self.players.values_mut() {
            player.phase_done = false;
        }
        if from == GamePhase::Lobby && to == GamePhase::Deployment {
            for player in self.players.values_mut() {
                player.status = PlayerStatus::Joined;
            }
        }
        if to == GamePhase::Movement {
            for unit in self.units.values_mut() {
                unit.reset_turn();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::{Facing, Position};
    use crate::types::PlayerColor;
    use crate::unit::UnitSpec;

    fn state() -> SessionState {
        SessionState::new(
            "s1".to_string(),
            SessionSettings::default(),
            BattleMap::open_field(10, 10),
        )
    }

    fn broadcast(sequence: Sequence, event: SessionEvent) -> Broadcast {
        Broadcast {
            session_id: "s1".to_string(),
            sequence,
            timestamp: 0,
            origin: None,
            event,
        }
    }

    fn join(id: &str, unit_id: UnitId) -> SessionEvent {
        SessionEvent::PlayerJoined {
            player: Player::new(id.to_string(), id.to_uppercase(), PlayerColor::default()),
            units: vec![Unit::new(unit_id, id.to_string(), &UnitSpec::standard("Shadow Hawk"))],
        }
    }

    #[test]
    fn test_phase_order() {
        assert_eq!(GamePhase::Lobby.next(), Some(GamePhase::Deployment));
        assert_eq!(GamePhase::End.next(), Some(GamePhase::Movement));
        assert_eq!(GamePhase::GameOver.next(), None);
    }

    #[test]
    fn test_join_registers_units() {
        let mut state = state();
        state.apply_event(&join("alice", 1)).unwrap();
        assert_eq!(state.player("alice").unwrap().units, vec![1]);
        assert_eq!(state.next_unit_id(), 2);
        assert_eq!(
            state.apply_event(&join("alice", 2)),
            Err(SessionError::DuplicatePlayer("alice".to_string()))
        );
    }

    #[test]
    fn test_sequence_rules() {
        let mut state = state();
        assert_eq!(state.apply_broadcast(&broadcast(1, join("alice", 1))), Ok(true));
        assert_eq!(state.apply_broadcast(&broadcast(1, join("alice", 1))), Ok(false));
        assert_eq!(
            state.apply_broadcast(&broadcast(3, join("bob", 2))),
            Err(SessionError::SequenceGap {
                expected: 2,
                got: 3
            })
        );
        assert_eq!(state.last_sequence, 1);
    }

    #[test]
    fn test_phase_change_must_match() {
        let mut state = state();
        let result = state.apply_event(&SessionEvent::PhaseChanged {
            from: GamePhase::Movement,
            to: GamePhase::WeaponsAttack,
            turn: 1,
        });
        assert!(matches!(result, Err(SessionError::PhaseMismatch { .. })));
        assert_eq!(state.phase, GamePhase::Lobby);
    }

    #[test]
    fn test_lobby_to_deployment_marks_joined() {
        let mut state = state();
        state.apply_event(&join("alice", 1)).unwrap();
        state.apply_event(&join("bob", 2)).unwrap();
        assert!(!state.lobby_ready());
        for id in ["alice", "bob"] {
            state
                .apply_event(&SessionEvent::PlayerStatusChanged {
                    player_id: id.to_string(),
                    status: PlayerStatus::Ready,
                })
                .unwrap();
        }
        assert!(state.lobby_ready());
        state
            .apply_event(&SessionEvent::PhaseChanged {
                from: GamePhase::Lobby,
                to: GamePhase::Deployment,
                turn: 0,
            })
            .unwrap();
        assert_eq!(state.active_players().count(), 2);
        assert!(!state.all_players_done());
        assert_eq!(state.battle_result(), None);
    }

    #[test]
    fn test_battle_result_after_destruction() {
        let mut state = state();
        state.apply_event(&join("alice", 1)).unwrap();
        state.apply_event(&join("bob", 2)).unwrap();
        state.phase = GamePhase::Movement;
        for player in state.players.values_mut() {
            player.status = PlayerStatus::Joined;
        }
        state.units.get_mut(&2).unwrap().destroyed = true;
        assert_eq!(state.battle_result(), Some(Some("alice".to_string())));
    }

    #[test]
    fn test_unit_at_and_enemies() {
        let mut state = state();
        state.apply_event(&join("alice", 1)).unwrap();
        state.apply_event(&join("bob", 2)).unwrap();
        let position = Position::new(HexCoord::new(2, 2), Facing::North);
        state
            .apply_event(&SessionEvent::UnitDeployed {
                unit_id: 2,
                position,
            })
            .unwrap();
        assert_eq!(state.unit_at(&HexCoord::new(2, 2)).map(|u| u.id), Some(2));
        assert_eq!(state.enemy_positions("alice"), vec![HexCoord::new(2, 2)]);
        assert!(state.enemy_positions("bob").is_empty());
    }
}
