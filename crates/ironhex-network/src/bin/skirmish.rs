//! Two scripted pilots fight a duel on an open field.
//!
//! Usage: `skirmish [settings.json]`
//!
//! `SKIRMISH_SEED` fixes the dice, `SKIRMISH_TURNS` caps the length of the
//! battle, `RUST_LOG` and `LOG_FORMAT=json` control logging. The audit log
//! of the whole session is printed at the end.

use ironhex_network::ironhex_core::session::system_clock;
use ironhex_network::ironhex_core::{
    render_log, CombatResolver, Facing, GamePhase, GameSession, HexCoord, MovementMode,
    MovementResolver, Position, SessionSettings, SessionState, UnitId, UnitSpec,
};
use ironhex_network::{ChannelError, Participant, ParticipantError, SessionHost};
use tracing::{debug, info, warn};

const DEFAULT_TURNS: u32 = 12;

/// Distance the pilots try to keep from the nearest enemy.
const PREFERRED_RANGE: u32 = 3;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}

/// Which edge of the map a pilot deploys on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    North,
    South,
}

impl Side {
    fn home_row(self, state: &SessionState) -> i32 {
        match self {
            Side::North => 1,
            Side::South => state.map.height as i32 - 2,
        }
    }

    fn facing(self) -> Facing {
        match self {
            Side::North => Facing::South,
            Side::South => Facing::North,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Action {
    Deploy(UnitId, Position),
    Move(UnitId, HexCoord),
    Attack(UnitId, UnitId, Vec<usize>),
    EndPhase,
    Wait,
    Stop,
}

fn next_action(state: &SessionState, me: &str, side: Side, max_turns: u32) -> Action {
    if state.phase.is_terminal() || state.turn > max_turns {
        return Action::Stop;
    }
    let Some(player) = state.player(me) else {
        return Action::Wait;
    };
    if player.conceded {
        return Action::Stop;
    }
    if !state.phase.has_player_actions() {
        return Action::Wait;
    }
    if state.is_player_done(player) {
        // Nobody can act but the phase is still open
        if !player.phase_done && state.all_players_done() {
            return Action::EndPhase;
        }
        return Action::Wait;
    }
    let Some(unit) = state
        .units_of(me)
        .find(|u| state.unit_has_pending_action(u))
    else {
        return Action::EndPhase;
    };

    match state.phase {
        GamePhase::Deployment => {
            let row = side.home_row(state);
            (0..state.map.width as i32)
                .map(|q| HexCoord::new(q, row))
                .find(|c| {
                    state.map.get(c).is_some_and(|hex| !hex.is_impassable())
                        && state.unit_at(c).is_none()
                })
                .map_or(Action::EndPhase, |coord| {
                    Action::Deploy(unit.id, Position::new(coord, side.facing()))
                })
        }
        GamePhase::Movement => {
            let Some(start) = unit.position else {
                return Action::EndPhase;
            };
            let enemies = state.enemy_positions(me);
            let reach = MovementResolver::new(&state.map)
                .with_blocked(enemies.iter().copied())
                .reachable(unit, MovementMode::Walk);
            let score = |coord: &HexCoord| {
                enemies
                    .iter()
                    .map(|e| coord.distance(e).abs_diff(PREFERRED_RANGE))
                    .min()
                    .unwrap_or(0)
            };
            reach
                .all()
                .into_iter()
                .filter(|c| *c != start.coord && state.unit_at(c).is_none())
                .min_by_key(score)
                .map_or(Action::EndPhase, |coord| Action::Move(unit.id, coord))
        }
        GamePhase::WeaponsAttack => {
            let resolver = CombatResolver::new(&state.map);
            state
                .units
                .values()
                .filter(|t| t.owner != me && t.is_deployed() && !t.is_out_of_action())
                .map(|target| {
                    let weapons: Vec<usize> = unit
                        .weapons()
                        .map(|(i, _, _)| i)
                        .filter(|&i| resolver.check_fire(unit, target, i).is_ok())
                        .collect();
                    (target.id, weapons)
                })
                .max_by_key(|(_, weapons)| weapons.len())
                .filter(|(_, weapons)| !weapons.is_empty())
                .map_or(Action::EndPhase, |(target, weapons)| {
                    Action::Attack(unit.id, target, weapons)
                })
        }
        _ => Action::Wait,
    }
}

async fn pilot(
    mut me: Participant,
    name: &str,
    side: Side,
    max_turns: u32,
) -> Result<(), ParticipantError> {
    let mut feed = me.subscribe();
    me.join(name, None, vec![UnitSpec::standard(name)]).await?;
    me.set_ready().await?;

    loop {
        me.catch_up().await?;
        let player = me.player_id().to_string();
        let action = me
            .view(|state| next_action(state, &player, side, max_turns))
            .await;
        debug!(%player, ?action, "pilot decided");

        let result = match action {
            Action::Stop => return Ok(()),
            Action::Wait => match feed.recv().await {
                Ok(_) | Err(ChannelError::Lagged(_)) => continue,
                Err(err) => return Err(err.into()),
            },
            Action::Deploy(unit, position) => me.deploy(unit, position).await,
            Action::Move(unit, destination) => {
                me.move_unit(unit, MovementMode::Walk, destination, None)
                    .await
            }
            Action::Attack(unit, target, weapons) => me.attack(unit, target, weapons).await,
            Action::EndPhase => me.end_phase().await,
        };
        match result {
            Ok(_) => {}
            Err(err) if err.is_rejection() => {
                debug!(%player, error = %err, "command rejected");
                // Nothing moved on, so the plan itself was bad; give up the phase
                if me.catch_up().await? == 0 {
                    match me.end_phase().await {
                        Ok(_) => {}
                        Err(err) if err.is_rejection() => {}
                        Err(err) => return Err(err),
                    }
                }
            }
            Err(err) => return Err(err),
        }
    }
}

fn env_number(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let settings = match std::env::args().nth(1) {
        Some(path) => SessionSettings::from_json(&std::fs::read_to_string(path)?)?,
        None => SessionSettings::duel("Skirmish".to_string()),
    };
    if settings.min_players > 2 || settings.max_players < 2 {
        return Err("skirmish plays exactly two sides".into());
    }
    let seed = env_number("SKIRMISH_SEED").unwrap_or_else(system_clock);
    let max_turns = env_number("SKIRMISH_TURNS").map_or(DEFAULT_TURNS, |turns| turns as u32);
    info!(seed, max_turns, name = %settings.name, "starting skirmish");

    let session = GameSession::open_field("skirmish".to_string(), settings, seed)?;
    let host = SessionHost::spawn(session);

    let red = Participant::connect("red", host.channel()).await?;
    let blue = Participant::connect("blue", host.channel()).await?;
    let red = tokio::spawn(async move { pilot(red, "Atlas", Side::North, max_turns).await });
    let blue = tokio::spawn(async move { pilot(blue, "Hunchback", Side::South, max_turns).await });
    for (name, task) in [("red", red), ("blue", blue)] {
        match task.await {
            Ok(Ok(())) => debug!(pilot = name, "pilot finished"),
            Ok(Err(err)) => warn!(pilot = name, error = %err, "pilot stopped"),
            Err(err) => warn!(pilot = name, error = %err, "pilot task failed"),
        }
    }

    let session = host.shutdown().await?;
    print!("{}", render_log(session.history().broadcasts()));
    let state = session.state();
    match (state.phase, &state.winner) {
        (GamePhase::GameOver, Some(winner)) => println!("winner: {}", winner),
        (GamePhase::GameOver, None) => println!("no survivors"),
        _ => println!("no decision after {} turns", session.turn()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironhex_network::ironhex_core::{CommandHeader, CommandPayload, GameCommand, PlayerStatus};

    fn submit(session: &mut GameSession, player: &str, payload: CommandPayload) {
        let state = session.state();
        let header = CommandHeader::new("s1", player, state.phase, state.turn);
        session.submit(&GameCommand::new(header, payload)).unwrap();
    }

    fn joined() -> GameSession {
        let mut session =
            GameSession::open_field("s1".to_string(), SessionSettings::duel("T".to_string()), 1)
                .unwrap();
        for (player, name) in [("red", "Atlas"), ("blue", "Hunchback")] {
            let payload = CommandPayload::JoinGame {
                name: name.to_string(),
                color: None,
                roster: vec![UnitSpec::standard(name)],
            };
            submit(&mut session, player, payload);
        }
        for player in ["red", "blue"] {
            let payload = CommandPayload::UpdatePlayerStatus {
                status: PlayerStatus::Ready,
            };
            submit(&mut session, player, payload);
        }
        session
    }

    #[test]
    fn test_deploys_on_home_row() {
        let session = joined();
        assert_eq!(session.phase(), GamePhase::Deployment);
        let action = next_action(session.state(), "red", Side::North, 5);
        assert_eq!(
            action,
            Action::Deploy(1, Position::new(HexCoord::new(0, 1), Facing::South))
        );
    }

    #[test]
    fn test_stops_when_battle_is_decided() {
        let mut session = joined();
        submit(&mut session, "red", CommandPayload::Concede);
        assert_eq!(session.phase(), GamePhase::GameOver);
        assert_eq!(next_action(session.state(), "blue", Side::South, 5), Action::Stop);
    }

    #[test]
    fn test_unknown_player_waits() {
        let session = joined();
        assert_eq!(next_action(session.state(), "green", Side::South, 5), Action::Wait);
    }
}
