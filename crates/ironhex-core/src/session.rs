//! The authoritative game session.
//!
//! [`GameSession`] is the only place commands turn into state changes. Each
//! submitted command goes through the validator, is resolved read-only into
//! [`SessionEvent`]s (with every die already rolled) and those events are
//! then applied through [`SessionState::apply_broadcast`], the same path
//! mirrors use. Phases without player actions are stepped through
//! automatically after each command.

use crate::combat::{CombatResolver, PilotingCheck, PilotingReason};
use crate::command::{CommandPayload, GameCommand, IdempotencyKey};
use crate::dice::{DiceRoller, SeededDice};
use crate::events::{Broadcast, EventLog, SessionEvent};
use crate::heat::HeatReport;
use crate::map::BattleMap;
use crate::movement::MovementResolver;
use crate::player::Player;
use crate::settings::{SessionSettings, SettingsError};
use crate::state::{GamePhase, LobbySnapshot, SessionError, SessionState};
use crate::types::{PlayerColor, PlayerId, SessionId, Timestamp, UnitId};
use crate::unit::Unit;
use crate::validator::{CommandRejection, CommandValidator};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Milliseconds since the Unix epoch from the system clock.
pub fn system_clock() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as Timestamp)
}

/// Why a submitted command produced no effect.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Rejected(#[from] CommandRejection),
    /// The session hit an internal inconsistency and has been terminated.
    #[error("session terminated: {0}")]
    Fatal(#[from] SessionError),
}

impl SubmitError {
    /// A duplicate is acknowledged rather than reported as a failure.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, SubmitError::Rejected(CommandRejection::DuplicateCommand(_)))
    }
}

/// The result of an accepted command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Accepted {
    pub key: IdempotencyKey,
    /// Everything broadcast because of the command, automatic steps included.
    pub broadcasts: Vec<Broadcast>,
    /// Answer to a lobby status request.
    pub lobby: Option<LobbySnapshot>,
}

/// Owns the authoritative state of one session.
pub struct GameSession {
    state: SessionState,
    validator: CommandValidator,
    dice: Box<dyn DiceRoller + Send>,
    history: EventLog,
    terminated: bool,
    clock: fn() -> Timestamp,
}

impl GameSession {
    /// Create a session in the lobby.
    pub fn new(
        session_id: SessionId,
        settings: SessionSettings,
        map: BattleMap,
        dice: Box<dyn DiceRoller + Send>,
    ) -> Result<Self, SettingsError> {
        settings.validate()?;
        info!(session = %session_id, name = %settings.name, "session created");
        Ok(Self {
            history: EventLog::new(session_id.clone()),
            state: SessionState::new(session_id, settings, map),
            validator: CommandValidator::new(),
            dice,
            terminated: false,
            clock: system_clock,
        })
    }

    /// A session on an open field sized by the settings, with seeded dice.
    pub fn open_field(
        session_id: SessionId,
        settings: SessionSettings,
        seed: u64,
    ) -> Result<Self, SettingsError> {
        let map = BattleMap::open_field(settings.map_width, settings.map_height);
        Self::new(session_id, settings, map, Box::new(SeededDice::new(seed)))
    }

    /// Replace the timestamp source used for broadcasts.
    pub fn with_clock(mut self, clock: fn() -> Timestamp) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn session_id(&self) -> &str {
        &self.state.session_id
    }

    pub fn phase(&self) -> GamePhase {
        self.state.phase
    }

    pub fn turn(&self) -> u32 {
        self.state.turn
    }

    pub fn history(&self) -> &EventLog {
        &self.history
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Validate and apply one command.
    pub fn submit(&mut self, command: &GameCommand) -> Result<Accepted, SubmitError> {
        if self.terminated {
            return Err(SessionError::Terminated.into());
        }

        let key = match self.validator.validate(&self.state, command) {
            Ok(key) => key,
            Err(CommandRejection::DuplicateCommand(key)) => {
                debug!(session = %self.state.session_id, %key, "duplicate command acknowledged");
                return Err(CommandRejection::DuplicateCommand(key).into());
            }
            Err(rejection) => {
                warn!(
                    session = %self.state.session_id,
                    player = %command.header.player_id,
                    kind = %command.kind(),
                    %rejection,
                    "command rejected"
                );
                return Err(rejection.into());
            }
        };

        // Recorded before anything else happens so a retry can never double-apply
        self.validator.record(key.clone());
        debug!(session = %self.state.session_id, %key, "command accepted");

        match self.process(command) {
            Ok(broadcasts) => {
                let lobby = matches!(command.payload, CommandPayload::RequestLobbyStatus)
                    .then(|| self.state.lobby_snapshot());
                Ok(Accepted {
                    key,
                    broadcasts,
                    lobby,
                })
            }
            Err(err) => {
                error!(session = %self.state.session_id, %key, error = %err, "session terminated");
                self.terminated = true;
                Err(err.into())
            }
        }
    }

    fn process(&mut self, command: &GameCommand) -> Result<Vec<Broadcast>, SessionError> {
        let origin = Some(command.header.player_id.clone());
        let events = self.resolve(command)?;

        let mut broadcasts = Vec::with_capacity(events.len());
        for event in events {
            broadcasts.push(self.emit(origin.clone(), event)?);
        }
        self.advance(&mut broadcasts)?;
        Ok(broadcasts)
    }

    /// Turn a validated command into events. Reads state, rolls dice.
    fn resolve(&mut self, command: &GameCommand) -> Result<Vec<SessionEvent>, SessionError> {
        let header = &command.header;
        let player_id = header.player_id.clone();
        let unit_id = header.unit_id;
        let state = &self.state;

        let events = match &command.payload {
            CommandPayload::JoinGame {
                name,
                color,
                roster,
            } => {
                let color = color.unwrap_or_else(|| PlayerColor::default_for_slot(state.players.len()));
                let first_id = state.next_unit_id();
                let units: Vec<Unit> = roster
                    .iter()
                    .zip(first_id..)
                    .map(|(spec, id)| Unit::new(id, player_id.clone(), spec))
                    .collect();
                let player = Player::new(player_id, name.clone(), color);
                vec![SessionEvent::PlayerJoined { player, units }]
            }
            CommandPayload::UpdatePlayerStatus { status } => {
                vec![SessionEvent::PlayerStatusChanged {
                    player_id,
                    status: *status,
                }]
            }
            CommandPayload::RequestLobbyStatus => Vec::new(),
            CommandPayload::RollDice { count } => {
                let roll = self.dice.roll(*count);
                vec![SessionEvent::DiceRolled { player_id, roll }]
            }
            CommandPayload::Deploy { position } => {
                let unit_id = require_unit(unit_id)?;
                vec![SessionEvent::UnitDeployed {
                    unit_id,
                    position: *position,
                }]
            }
            CommandPayload::Move {
                mode,
                destination,
                facing,
            } => {
                let id = require_unit(unit_id)?;
                let unit = state.unit(id).ok_or(SessionError::MissingUnit(id))?;
                let resolver =
                    MovementResolver::new(&state.map).with_blocked(state.enemy_positions(&unit.owner));
                let path = resolver
                    .plan(unit, *mode, *destination, *facing)
                    .ok_or_else(|| {
                        SessionError::Resolution(format!("no path to {} for unit {}", destination, unit.id))
                    })?;
                let landing = resolver.landing_check(unit, &path).map(|target_number| {
                    PilotingCheck::roll(
                        unit,
                        PilotingReason::JumpLanding,
                        target_number,
                        &mut *self.dice,
                    )
                });
                debug!(unit = unit.id, to = %path.destination(), cost = path.total_cost, "movement resolved");
                vec![SessionEvent::UnitMoved {
                    unit_id: unit.id,
                    path,
                    landing,
                }]
            }
            CommandPayload::Attack { target, weapons } => {
                let attacker_id = require_unit(unit_id)?;
                let attacker = state
                    .unit(attacker_id)
                    .ok_or(SessionError::MissingUnit(attacker_id))?;
                let defender = state.unit(*target).ok_or(SessionError::MissingUnit(*target))?;
                let outcome = CombatResolver::new(&state.map)
                    .resolve_attack(attacker, defender, weapons, &mut *self.dice)
                    .map_err(|blocker| SessionError::Resolution(blocker.to_string()))?;
                debug!(
                    attacker = attacker_id,
                    target = *target,
                    hits = outcome.hits(),
                    damage = outcome.damage_dealt(),
                    "attack resolved"
                );
                vec![SessionEvent::AttackResolved { outcome }]
            }
            CommandPayload::EndPhase => vec![SessionEvent::PhaseEnded { player_id }],
            CommandPayload::Concede => vec![SessionEvent::PlayerConceded { player_id }],
        };
        Ok(events)
    }

    /// Step through every transition that needs no player input.
    ///
    /// Stops after one turn wraparound so a board where nobody can act
    /// waits for an explicit end-of-phase instead of spinning.
    fn advance(&mut self, broadcasts: &mut Vec<Broadcast>) -> Result<(), SessionError> {
        let mut wrapped = false;
        while let Some(event) = self.next_automatic_event(wrapped) {
            if matches!(event, SessionEvent::PhaseChanged { from: GamePhase::End, .. }) {
                wrapped = true;
            }
            broadcasts.push(self.emit(None, event)?);
        }
        Ok(())
    }

    fn next_automatic_event(&mut self, wrapped: bool) -> Option<SessionEvent> {
        if let Some(winner) = self.state.battle_result() {
            return Some(SessionEvent::GameOver { winner });
        }

        let phase = self.state.phase;
        let turn = self.state.turn;
        let change = |to: GamePhase, turn: u32| SessionEvent::PhaseChanged {
            from: phase,
            to,
            turn,
        };

        match phase {
            GamePhase::Lobby => self
                .state
                .lobby_ready()
                .then(|| change(GamePhase::Deployment, 0)),
            GamePhase::Deployment => self
                .state
                .all_players_done()
                .then(|| change(GamePhase::Movement, turn + 1)),
            GamePhase::Movement if wrapped => None,
            GamePhase::Movement | GamePhase::WeaponsAttack => {
                let next = phase.next()?;
                self.state.all_players_done().then(|| change(next, turn))
            }
            GamePhase::Heat if !self.state.heat_resolved => Some(SessionEvent::HeatResolved {
                reports: self.resolve_heat(),
            }),
            GamePhase::Heat => Some(change(GamePhase::End, turn)),
            GamePhase::End => Some(change(GamePhase::Movement, turn + 1)),
            GamePhase::GameOver => None,
        }
    }

    fn resolve_heat(&mut self) -> Vec<HeatReport> {
        let shutdown_enabled = self.state.settings.heat_shutdown;
        let dice = &mut self.dice;
        self.state
            .units
            .values()
            .filter(|u| u.is_deployed() && !u.destroyed)
            .map(|unit| HeatReport::resolve(unit, shutdown_enabled, || dice.roll_2d6()))
            .collect()
    }

    /// Stamp, apply and record one event.
    fn emit(&mut self, origin: Option<PlayerId>, event: SessionEvent) -> Result<Broadcast, SessionError> {
        let broadcast = Broadcast {
            session_id: self.state.session_id.clone(),
            sequence: self.state.last_sequence + 1,
            timestamp: (self.clock)(),
            origin,
            event,
        };
        self.state.apply_broadcast(&broadcast)?;
        self.history.add(broadcast.clone())?;

        match &broadcast.event {
            SessionEvent::PlayerJoined { player, units } => {
                info!(session = %broadcast.session_id, player = %player.id, units = units.len(), "player joined");
            }
            SessionEvent::PhaseChanged { from, to, turn } => {
                info!(session = %broadcast.session_id, %from, %to, turn, "phase changed");
            }
            other => {
                debug!(session = %broadcast.session_id, sequence = broadcast.sequence, event = other.name(), "event applied");
            }
        }
        Ok(broadcast)
    }
}

fn require_unit(unit_id: Option<UnitId>) -> Result<UnitId, SessionError> {
    unit_id.ok_or_else(|| SessionError::Resolution("command has no unit".to_string()))
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("session_id", &self.state.session_id)
            .field("phase", &self.state.phase)
            .field("turn", &self.state.turn)
            .field("events", &self.history.len())
            .field("terminated", &self.terminated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandHeader;
    use crate::dice::FixedDice;
    use crate::hex::{Facing, HexCoord, Position};
    use crate::player::PlayerStatus;
    use crate::unit::{MovementMode, UnitSpec};

    fn fixed_clock() -> Timestamp {
        1_700_000_000_000
    }

    fn session() -> GameSession {
        GameSession::open_field("s1".to_string(), SessionSettings::duel("Test".to_string()), 7)
            .unwrap()
            .with_clock(fixed_clock)
    }

    fn command(session: &GameSession, player: &str, payload: CommandPayload) -> GameCommand {
        GameCommand::new(
            CommandHeader::new("s1", player, session.phase(), session.turn()),
            payload,
        )
    }

    fn join(session: &mut GameSession, player: &str) {
        let cmd = command(
            session,
            player,
            CommandPayload::JoinGame {
                name: player.to_uppercase(),
                color: None,
                roster: vec![UnitSpec::standard("Griffin")],
            },
        );
        session.submit(&cmd).unwrap();
    }

    fn ready(session: &mut GameSession, player: &str) -> Accepted {
        let cmd = command(
            session,
            player,
            CommandPayload::UpdatePlayerStatus {
                status: PlayerStatus::Ready,
            },
        );
        session.submit(&cmd).unwrap()
    }

    fn deploy(session: &mut GameSession, player: &str, unit: u64, q: i32, r: i32, facing: Facing) {
        let mut cmd = command(
            session,
            player,
            CommandPayload::Deploy {
                position: Position::new(HexCoord::new(q, r), facing),
            },
        );
        cmd.header.unit_id = Some(unit);
        session.submit(&cmd).unwrap();
    }

    #[test]
    fn test_lobby_to_deployment() {
        let mut session = session();
        join(&mut session, "alice");
        join(&mut session, "bob");
        ready(&mut session, "alice");
        let accepted = ready(&mut session, "bob");

        assert_eq!(session.phase(), GamePhase::Deployment);
        assert_eq!(session.turn(), 0);
        assert!(accepted.broadcasts.iter().any(|b| matches!(
            b.event,
            SessionEvent::PhaseChanged {
                to: GamePhase::Deployment,
                ..
            }
        )));
        assert!(session
            .state()
            .players
            .values()
            .all(|p| p.status == PlayerStatus::Joined));
    }

    #[test]
    fn test_units_registered_at_join() {
        let mut session = session();
        join(&mut session, "alice");
        join(&mut session, "bob");
        assert_eq!(session.state().player("alice").unwrap().units, vec![1]);
        assert_eq!(session.state().player("bob").unwrap().units, vec![2]);
        assert_ne!(
            session.state().player("alice").unwrap().color,
            session.state().player("bob").unwrap().color
        );
    }

    #[test]
    fn test_deployment_starts_turn_one() {
        let mut session = session();
        join(&mut session, "alice");
        join(&mut session, "bob");
        ready(&mut session, "alice");
        ready(&mut session, "bob");
        deploy(&mut session, "alice", 1, 2, 8, Facing::North);
        assert_eq!(session.phase(), GamePhase::Deployment);
        deploy(&mut session, "bob", 2, 2, 2, Facing::South);
        assert_eq!(session.phase(), GamePhase::Movement);
        assert_eq!(session.turn(), 1);
    }

    #[test]
    fn test_sequence_is_gap_free() {
        let mut session = session();
        join(&mut session, "alice");
        join(&mut session, "bob");
        ready(&mut session, "alice");
        ready(&mut session, "bob");
        let sequences: Vec<u64> = session
            .history()
            .broadcasts()
            .iter()
            .map(|b| b.sequence)
            .collect();
        let expected: Vec<u64> = (1..=sequences.len() as u64).collect();
        assert_eq!(sequences, expected);
        assert!(session
            .history()
            .broadcasts()
            .iter()
            .all(|b| b.timestamp == fixed_clock()));
    }

    #[test]
    fn test_lobby_snapshot_returned() {
        let mut session = session();
        join(&mut session, "alice");
        let cmd = command(&session, "alice", CommandPayload::RequestLobbyStatus);
        let accepted = session.submit(&cmd).unwrap();
        assert!(accepted.broadcasts.is_empty());
        let lobby = accepted.lobby.unwrap();
        assert_eq!(lobby.players.len(), 1);
        assert_eq!(lobby.players[0].2, PlayerStatus::JoinRequested);
    }

    #[test]
    fn test_dice_come_from_the_session() {
        let map = BattleMap::open_field(10, 10);
        let mut session = GameSession::new(
            "s1".to_string(),
            SessionSettings::solo("Range".to_string()),
            map,
            Box::new(FixedDice::new(vec![6, 1, 3])),
        )
        .unwrap();
        join(&mut session, "alice");
        let cmd = command(&session, "alice", CommandPayload::RollDice { count: 3 });
        session.submit(&cmd).unwrap();
        let roll = session.state().player("alice").unwrap().last_roll.clone().unwrap();
        assert_eq!(roll.dice, vec![6, 1, 3]);
    }

    #[test]
    fn test_concede_ends_duel() {
        let mut session = session();
        join(&mut session, "alice");
        join(&mut session, "bob");
        ready(&mut session, "alice");
        ready(&mut session, "bob");
        let cmd = command(&session, "bob", CommandPayload::Concede);
        session.submit(&cmd).unwrap();
        assert_eq!(session.phase(), GamePhase::GameOver);
        assert_eq!(session.state().winner.as_deref(), Some("alice"));

        let again = command(&session, "alice", CommandPayload::RollDice { count: 1 });
        assert!(matches!(
            session.submit(&again),
            Err(SubmitError::Rejected(CommandRejection::InvalidGameState(_)))
        ));
    }

    #[test]
    fn test_full_turn_cycle() {
        let mut session = session();
        join(&mut session, "alice");
        join(&mut session, "bob");
        ready(&mut session, "alice");
        ready(&mut session, "bob");
        deploy(&mut session, "alice", 1, 2, 16, Facing::North);
        deploy(&mut session, "bob", 2, 2, 0, Facing::South);

        for player in ["alice", "bob"] {
            let mut cmd = command(
                &session,
                player,
                CommandPayload::Move {
                    mode: MovementMode::Walk,
                    destination: if player == "alice" {
                        HexCoord::new(2, 14)
                    } else {
                        HexCoord::new(2, 2)
                    },
                    facing: None,
                },
            );
            cmd.header.unit_id = Some(if player == "alice" { 1 } else { 2 });
            session.submit(&cmd).unwrap();
        }

        // Neither side fires; both close the attack phase by hand
        assert_eq!(session.phase(), GamePhase::WeaponsAttack);
        for player in ["alice", "bob"] {
            let cmd = command(&session, player, CommandPayload::EndPhase);
            session.submit(&cmd).unwrap();
        }

        assert_eq!(session.phase(), GamePhase::Movement);
        assert_eq!(session.turn(), 2);
        let heat = session.state().unit(1).unwrap().heat;
        assert_eq!(heat, 0);
        let names: Vec<&str> = session
            .history()
            .broadcasts()
            .iter()
            .map(|b| b.event.name())
            .collect();
        assert!(names.contains(&"heat_resolved"));
    }

    #[test]
    fn test_status_changes_need_fresh_attempts() {
        let mut session = session();
        join(&mut session, "alice");
        join(&mut session, "bob");

        fn status(
            session: &mut GameSession,
            status: PlayerStatus,
            attempt: u32,
        ) -> Result<Accepted, SubmitError> {
            let mut cmd = command(session, "alice", CommandPayload::UpdatePlayerStatus { status });
            cmd.header.attempt = attempt;
            session.submit(&cmd)
        }
        status(&mut session, PlayerStatus::Ready, 1).unwrap();
        status(&mut session, PlayerStatus::JoinRequested, 2).unwrap();
        assert_eq!(
            session.state().player("alice").unwrap().status,
            PlayerStatus::JoinRequested
        );
        // A resend of the un-ready is still a duplicate
        assert!(status(&mut session, PlayerStatus::JoinRequested, 2)
            .unwrap_err()
            .is_duplicate());

        // Alice is not ready, so bob alone cannot start the battle
        ready(&mut session, "bob");
        assert_eq!(session.phase(), GamePhase::Lobby);
        status(&mut session, PlayerStatus::Ready, 3).unwrap();
        assert_eq!(session.phase(), GamePhase::Deployment);
    }

    #[test]
    fn test_inconsistency_after_validation_terminates() {
        let mut session = session();
        join(&mut session, "alice");
        // State and event log disagree about the last sequence
        session.state.last_sequence = 0;

        let roll = command(&session, "alice", CommandPayload::RollDice { count: 2 });
        let err = session.submit(&roll).unwrap_err();
        assert!(matches!(err, SubmitError::Fatal(_)));
        assert!(session.is_terminated());

        let query = command(&session, "bob", CommandPayload::RequestLobbyStatus);
        assert_eq!(
            session.submit(&query),
            Err(SubmitError::Fatal(SessionError::Terminated))
        );
    }

    #[test]
    fn test_terminated_session_rejects_everything() {
        let mut session = session();
        session.terminated = true;
        let cmd = command(&session, "alice", CommandPayload::RequestLobbyStatus);
        assert_eq!(
            session.submit(&cmd),
            Err(SubmitError::Fatal(SessionError::Terminated))
        );
    }
}
