//! Authoritative gatekeeper for incoming commands.
//!
//! Checks run in a fixed order: idempotency, then phase legality, then the
//! rules of the game. The first failing check decides the rejection.

use crate::combat::CombatResolver;
use crate::command::{CommandKind, CommandPayload, GameCommand, IdempotencyKey};
use crate::hex::{Facing, HexCoord, Position};
use crate::movement::MovementResolver;
use crate::player::{Player, PlayerStatus};
use crate::state::SessionState;
use crate::types::UnitId;
use crate::unit::{MovementMode, Unit, UnitSpec};
use std::collections::BTreeSet;
use thiserror::Error;

/// Most dice a single roll request may ask for.
pub const MAX_DICE_PER_ROLL: usize = 10;

/// Why a command was refused. None of these change session state.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandRejection {
    /// Already processed; acknowledged without effect.
    #[error("duplicate command {0}")]
    DuplicateCommand(IdempotencyKey),
    #[error("invalid game state: {0}")]
    InvalidGameState(String),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
}

fn invalid(reason: impl Into<String>) -> CommandRejection {
    CommandRejection::ValidationFailed(reason.into())
}

/// Idempotency bookkeeping plus the rule checks.
#[derive(Clone, Debug, Default)]
pub struct CommandValidator {
    seen: BTreeSet<IdempotencyKey>,
}

impl CommandValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_seen(&self, key: &IdempotencyKey) -> bool {
        self.seen.contains(key)
    }

    /// Remember a key. Call before applying any effect of the command.
    pub fn record(&mut self, key: IdempotencyKey) -> bool {
        self.seen.insert(key)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Run every check against the current state.
    pub fn validate(
        &self,
        state: &SessionState,
        command: &GameCommand,
    ) -> Result<IdempotencyKey, CommandRejection> {
        let key = command.idempotency_key();
        if self.has_seen(&key) {
            return Err(CommandRejection::DuplicateCommand(key));
        }

        check_phase(state, command)?;
        check_rules(state, command)?;
        Ok(key)
    }
}

fn check_phase(state: &SessionState, command: &GameCommand) -> Result<(), CommandRejection> {
    let kind = command.kind();
    if !kind.allowed_in(state.phase) {
        return Err(CommandRejection::InvalidGameState(format!(
            "{} is not allowed during {}",
            kind, state.phase
        )));
    }
    if kind.is_phase_agnostic() {
        return Ok(());
    }
    let header = &command.header;
    if header.phase != state.phase || header.turn != state.turn {
        return Err(CommandRejection::InvalidGameState(format!(
            "command declared {} turn {}, session is in {} turn {}",
            header.phase, header.turn, state.phase, state.turn
        )));
    }
    Ok(())
}

fn check_rules(state: &SessionState, command: &GameCommand) -> Result<(), CommandRejection> {
    let header = &command.header;
    if header.session_id != state.session_id {
        return Err(invalid(format!("unknown session {}", header.session_id)));
    }

    if let CommandPayload::JoinGame {
        name,
        color: _,
        roster,
    } = &command.payload
    {
        return check_join(state, &header.player_id, name, roster);
    }

    let player = state
        .player(&header.player_id)
        .ok_or_else(|| invalid(format!("player {} has not joined", header.player_id)))?;

    let unit = if command.kind().needs_unit() {
        Some(owned_unit(state, player, header.unit_id)?)
    } else {
        None
    };

    match (&command.payload, unit) {
        (CommandPayload::UpdatePlayerStatus { status }, _) => check_status(player, *status),
        (CommandPayload::RequestLobbyStatus, _) => Ok(()),
        (CommandPayload::RollDice { count }, _) => {
            if (1..=MAX_DICE_PER_ROLL).contains(count) {
                Ok(())
            } else {
                Err(invalid(format!(
                    "can roll between 1 and {} dice, asked for {}",
                    MAX_DICE_PER_ROLL, count
                )))
            }
        }
        (CommandPayload::Deploy { position }, Some(unit)) => {
            require_active(player)?;
            check_deploy(state, unit, position)
        }
        (
            CommandPayload::Move {
                mode,
                destination,
                facing,
            },
            Some(unit),
        ) => {
            require_active(player)?;
            check_move(state, unit, *mode, destination, *facing)
        }
        (CommandPayload::Attack { target, weapons }, Some(unit)) => {
            require_active(player)?;
            check_attack(state, unit, *target, weapons)
        }
        (CommandPayload::EndPhase, _) => {
            require_active(player)?;
            if player.phase_done {
                Err(invalid("phase already ended for this player"))
            } else {
                Ok(())
            }
        }
        (CommandPayload::Concede, _) => require_active(player),
        (CommandPayload::JoinGame { .. }, _)
        | (CommandPayload::Deploy { .. }, None)
        | (CommandPayload::Move { .. }, None)
        | (CommandPayload::Attack { .. }, None) => Err(invalid("command needs a unit")),
    }
}

fn require_active(player: &Player) -> Result<(), CommandRejection> {
    if player.conceded {
        return Err(invalid(format!("{} has conceded", player.name)));
    }
    if player.status != PlayerStatus::Joined {
        return Err(invalid(format!("{} is {}", player.name, player.status)));
    }
    Ok(())
}

fn owned_unit<'a>(
    state: &'a SessionState,
    player: &Player,
    unit_id: Option<UnitId>,
) -> Result<&'a Unit, CommandRejection> {
    let id = unit_id.ok_or_else(|| invalid("command needs a unit"))?;
    let unit = state
        .unit(id)
        .ok_or_else(|| invalid(format!("unknown unit {}", id)))?;
    if unit.owner != player.id || !player.owns(id) {
        return Err(invalid(format!("unit {} does not belong to {}", id, player.id)));
    }
    if unit.is_out_of_action() {
        return Err(invalid(format!("unit {} is out of action", id)));
    }
    Ok(unit)
}

fn check_join(
    state: &SessionState,
    player_id: &str,
    name: &str,
    roster: &[UnitSpec],
) -> Result<(), CommandRejection> {
    if state.player(player_id).is_some() {
        return Err(invalid(format!("player {} already joined", player_id)));
    }
    if name.trim().is_empty() {
        return Err(invalid("player name cannot be empty"));
    }
    if state.players.values().any(|p| p.name == name) {
        return Err(invalid(format!("name {} is taken", name)));
    }
    if state.players.len() >= state.settings.max_players {
        return Err(invalid("lobby is full"));
    }
    if roster.is_empty() {
        return Err(invalid("roster is empty"));
    }
    if roster.len() > state.settings.max_units_per_player {
        return Err(invalid(format!(
            "roster has {} units, limit is {}",
            roster.len(),
            state.settings.max_units_per_player
        )));
    }
    for spec in roster {
        spec.validate()
            .map_err(|err| invalid(format!("unit {}: {}", spec.name, err)))?;
    }
    Ok(())
}

fn check_status(player: &Player, status: PlayerStatus) -> Result<(), CommandRejection> {
    if !status.is_player_selectable() {
        return Err(invalid(format!("players cannot set status {}", status)));
    }
    if !player.status.can_transition_to(status) {
        return Err(invalid(format!(
            "cannot go from {} to {}",
            player.status, status
        )));
    }
    Ok(())
}

fn check_deploy(
    state: &SessionState,
    unit: &Unit,
    position: &Position,
) -> Result<(), CommandRejection> {
    if unit.is_deployed() {
        return Err(invalid(format!("unit {} is already deployed", unit.id)));
    }
    let hex = state
        .map
        .get(&position.coord)
        .ok_or_else(|| invalid(format!("{} is off the map", position.coord)))?;
    if hex.is_impassable() {
        return Err(invalid(format!("{} is impassable", position.coord)));
    }
    if let Some(other) = state.unit_at(&position.coord) {
        return Err(invalid(format!(
            "{} is occupied by unit {}",
            position.coord, other.id
        )));
    }
    Ok(())
}

fn check_move(
    state: &SessionState,
    unit: &Unit,
    mode: MovementMode,
    destination: &HexCoord,
    facing: Option<Facing>,
) -> Result<(), CommandRejection> {
    let Some(start) = unit.position else {
        return Err(invalid(format!("unit {} is not deployed", unit.id)));
    };
    if unit.turn.moved {
        return Err(invalid(format!("unit {} has already moved", unit.id)));
    }
    if mode == MovementMode::Stationary {
        return Err(invalid("stationary is not a move"));
    }
    if unit.movement_budget(mode) == 0 {
        return Err(invalid(format!("unit {} cannot {:?}", unit.id, mode)));
    }
    if *destination != start.coord && state.unit_at(destination).is_some() {
        return Err(invalid(format!("{} is occupied", destination)));
    }
    let resolver =
        MovementResolver::new(&state.map).with_blocked(state.enemy_positions(&unit.owner));
    if resolver.plan(unit, mode, *destination, facing).is_none() {
        return Err(invalid(format!(
            "{} is not reachable by {:?} from {}",
            destination, mode, start
        )));
    }
    Ok(())
}

fn check_attack(
    state: &SessionState,
    unit: &Unit,
    target_id: UnitId,
    weapons: &[usize],
) -> Result<(), CommandRejection> {
    if unit.turn.attacked {
        return Err(invalid(format!("unit {} has already attacked", unit.id)));
    }
    if unit.shutdown {
        return Err(invalid(format!("unit {} is shut down", unit.id)));
    }
    let target = state
        .unit(target_id)
        .ok_or_else(|| invalid(format!("unknown target {}", target_id)))?;
    if target.owner == unit.owner {
        return Err(invalid("cannot attack a friendly unit"));
    }
    if target.is_out_of_action() {
        return Err(invalid(format!("target {} is out of action", target_id)));
    }
    if weapons.is_empty() {
        return Err(invalid("no weapons selected"));
    }
    let distinct: BTreeSet<usize> = weapons.iter().copied().collect();
    if distinct.len() != weapons.len() {
        return Err(invalid("a weapon was selected twice"));
    }
    let resolver = CombatResolver::new(&state.map);
    for &weapon in weapons {
        resolver
            .check_fire(unit, target, weapon)
            .map_err(|blocker| invalid(blocker.to_string()))?;
    }
    Ok(())
}
