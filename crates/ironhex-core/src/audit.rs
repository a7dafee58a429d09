//! Plain-text rendering of modifiers and events for the audit log.

use crate::combat::{AttackOutcome, PilotingCheck, PilotingReason, ShotOutcome};
use crate::events::{Broadcast, SessionEvent};
use crate::heat::HeatReport;
use crate::modifiers::{RangeBracket, RollModifier, TargetNumber};
use crate::unit::{ActuatorKind, CriticalEffect, MovementMode};
use std::fmt::Write;

fn signed(value: i32) -> String {
    format!("{:+}", value)
}

fn mode_name(mode: MovementMode) -> &'static str {
    match mode {
        MovementMode::Stationary => "stationary",
        MovementMode::Walk => "walked",
        MovementMode::Run => "ran",
        MovementMode::Jump => "jumped",
    }
}

fn actuator_name(actuator: ActuatorKind) -> &'static str {
    match actuator {
        ActuatorKind::Shoulder => "shoulder",
        ActuatorKind::UpperArm => "upper arm actuator",
        ActuatorKind::LowerArm => "lower arm actuator",
        ActuatorKind::Hand => "hand actuator",
        ActuatorKind::Hip => "hip",
        ActuatorKind::UpperLeg => "upper leg actuator",
        ActuatorKind::LowerLeg => "lower leg actuator",
        ActuatorKind::Foot => "foot actuator",
    }
}

/// One modifier as a line of text, e.g. `medium range (6 hexes) +2`.
pub fn describe_modifier(modifier: &RollModifier) -> String {
    let label = match modifier {
        RollModifier::Range {
            bracket, distance, ..
        } => {
            let band = match bracket {
                RangeBracket::Short => "short",
                RangeBracket::Medium => "medium",
                RangeBracket::Long => "long",
            };
            format!("{} range ({} hexes)", band, distance)
        }
        RollModifier::MinimumRange {
            minimum, distance, ..
        } => format!("inside minimum range {} at {} hexes", minimum, distance),
        RollModifier::AttackerMovement { mode, .. } => format!("attacker {}", mode_name(*mode)),
        RollModifier::TargetMovement {
            hexes_moved,
            jumped,
            ..
        } => {
            if *jumped {
                format!("target jumped {} hexes", hexes_moved)
            } else {
                format!("target moved {} hexes", hexes_moved)
            }
        }
        RollModifier::Heat { heat, .. } => format!("heat {}", heat),
        RollModifier::TargetTerrain { terrain, .. } => format!("target in {}", terrain),
        RollModifier::SensorDamage { hits, .. } => format!("sensor hits ({})", hits),
        RollModifier::ArmActuator {
            location, actuator, ..
        } => format!("{} {} destroyed", location, actuator_name(*actuator)),
        RollModifier::TargetProne { adjacent, .. } => {
            if *adjacent {
                "prone target, adjacent".to_string()
            } else {
                "prone target".to_string()
            }
        }
        RollModifier::TargetImmobile { .. } => "immobile target".to_string(),
        RollModifier::GyroDamage { hits, .. } => format!("gyro hits ({})", hits),
        RollModifier::LegActuator {
            location, actuator, ..
        } => format!("{} {} destroyed", location, actuator_name(*actuator)),
        RollModifier::LegDestroyed { location, .. } => format!("{} destroyed", location),
        RollModifier::LandingTerrain { terrain, .. } => format!("landing in {}", terrain),
    };
    format!("{} {}", label, signed(modifier.value()))
}

/// `base 4, medium range (6 hexes) +2, heat 9 +1 = 7`
pub fn describe_target(target: &TargetNumber) -> String {
    let mut text = format!("base {}", target.base);
    for modifier in &target.modifiers {
        text.push_str(", ");
        text.push_str(&describe_modifier(modifier));
    }
    let _ = write!(text, " = {}", target.value);
    text
}

fn describe_critical(effect: &CriticalEffect) -> String {
    match effect {
        CriticalEffect::EngineHit { hits } => format!("engine hit ({})", hits),
        CriticalEffect::EngineDestroyed => "engine destroyed".to_string(),
        CriticalEffect::GyroHit { hits } => format!("gyro hit ({})", hits),
        CriticalEffect::GyroDestroyed => "gyro destroyed".to_string(),
        CriticalEffect::PilotKilled => "cockpit hit, pilot killed".to_string(),
        CriticalEffect::SensorsHit { hits } => format!("sensors hit ({})", hits),
        CriticalEffect::LifeSupportDestroyed => "life support destroyed".to_string(),
        CriticalEffect::ComponentDestroyed { name } => format!("{} destroyed", name),
        CriticalEffect::NoEffect => "no effect".to_string(),
    }
}

fn describe_shot(shot: &ShotOutcome) -> String {
    let mut text = format!(
        "{}: needs {} ({}), rolled {}",
        shot.weapon,
        shot.target_number.value,
        describe_target(&shot.target_number),
        shot.roll
    );
    match &shot.hit {
        None => text.push_str(", miss"),
        Some(hit) => {
            let side = if hit.rear { " (rear)" } else { "" };
            let _ = write!(
                text,
                ", hit {}{} for {} [location roll {}]",
                hit.location, side, hit.damage, hit.location_roll
            );
            for step in &hit.steps {
                if step.location_destroyed {
                    let _ = write!(text, "; {} destroyed", step.location);
                }
            }
            for check in &hit.criticals {
                for critical in &check.hits {
                    let _ = write!(
                        text,
                        "; critical in {}: {}",
                        check.location,
                        describe_critical(&critical.effect)
                    );
                }
            }
        }
    }
    text
}

fn describe_piloting(check: &PilotingCheck) -> String {
    let reason = match check.reason {
        PilotingReason::GyroHit => "gyro hit",
        PilotingReason::LegDestroyed => "leg destroyed",
        PilotingReason::HeavyDamage => "heavy damage",
        PilotingReason::JumpLanding => "jump landing",
    };
    format!(
        "unit {} piloting check ({}): needs {}, rolled {}, {}",
        check.unit_id,
        reason,
        check.target_number.value,
        check.roll,
        if check.passed { "stays up" } else { "falls" }
    )
}

fn describe_attack(outcome: &AttackOutcome) -> String {
    let mut text = format!(
        "unit {} fires at unit {} ({:?} arc, {} hexes)",
        outcome.attacker_id, outcome.target_id, outcome.arc, outcome.distance
    );
    for shot in &outcome.shots {
        text.push_str("\n  ");
        text.push_str(&describe_shot(shot));
    }
    for check in &outcome.piloting_checks {
        text.push_str("\n  ");
        text.push_str(&describe_piloting(check));
    }
    if outcome.target_destroyed {
        let _ = write!(text, "\n  unit {} destroyed", outcome.target_id);
    }
    text
}

fn describe_heat(report: &HeatReport) -> String {
    let mut text = format!(
        "unit {} heat {} -> {} (movement {}, weapons {}, engine {}, sinks -{})",
        report.unit_id,
        report.previous_heat,
        report.new_heat,
        report.movement_heat,
        report.weapon_heat,
        report.engine_heat,
        report.dissipated
    );
    if report.life_support_wound {
        text.push_str(", pilot wounded");
    }
    if let (Some(roll), Some(target)) = (&report.shutdown_roll, report.shutdown_target) {
        let _ = write!(text, ", shutdown avoid {}+ rolled {}", target, roll);
    }
    if report.shutdown {
        text.push_str(", shut down");
    }
    text
}

/// One event as human-readable text.
pub fn describe_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::PlayerJoined { player, units } => {
            let names: Vec<&str> = units.iter().map(|u| u.name.as_str()).collect();
            format!("{} joined with {}", player.name, names.join(", "))
        }
        SessionEvent::PlayerStatusChanged { player_id, status } => {
            format!("{} is now {}", player_id, status)
        }
        SessionEvent::DiceRolled { player_id, roll } => format!("{} rolled {}", player_id, roll),
        SessionEvent::PhaseEnded { player_id } => format!("{} ended the phase", player_id),
        SessionEvent::UnitDeployed { unit_id, position } => {
            format!("unit {} deployed at {}", unit_id, position)
        }
        SessionEvent::UnitMoved {
            unit_id,
            path,
            landing,
        } => {
            let mut text = format!(
                "unit {} {} {} hexes to {} ({} MP)",
                unit_id,
                mode_name(path.mode),
                path.hexes_moved,
                path.destination(),
                path.total_cost
            );
            if let Some(check) = landing {
                text.push_str("; ");
                text.push_str(&describe_piloting(check));
            }
            text
        }
        SessionEvent::AttackResolved { outcome } => describe_attack(outcome),
        SessionEvent::HeatResolved { reports } => {
            let mut text = String::from("heat phase");
            for report in reports {
                text.push_str("\n  ");
                text.push_str(&describe_heat(report));
            }
            text
        }
        SessionEvent::PhaseChanged { from, to, turn } => {
            format!("turn {}: {} -> {}", turn, from, to)
        }
        SessionEvent::PlayerConceded { player_id } => format!("{} conceded", player_id),
        SessionEvent::GameOver { winner } => match winner {
            Some(winner) => format!("game over, {} wins", winner),
            None => "game over, no survivors".to_string(),
        },
    }
}

/// The whole log, one numbered entry per broadcast.
pub fn render_log(broadcasts: &[Broadcast]) -> String {
    let mut out = String::new();
    for broadcast in broadcasts {
        let origin = broadcast.origin.as_deref().unwrap_or("auto");
        let _ = writeln!(
            out,
            "#{} [{}] {}",
            broadcast.sequence,
            origin,
            describe_event(&broadcast.event)
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::DiceRoll;
    use crate::state::GamePhase;
    use crate::unit::Location;

    #[test]
    fn test_describe_modifier() {
        let range = RollModifier::Range {
            bracket: RangeBracket::Medium,
            distance: 6,
            value: 2,
        };
        assert_eq!(describe_modifier(&range), "medium range (6 hexes) +2");

        let actuator = RollModifier::ArmActuator {
            location: Location::LeftArm,
            actuator: ActuatorKind::Shoulder,
            value: 4,
        };
        assert_eq!(describe_modifier(&actuator), "left arm shoulder destroyed +4");
    }

    #[test]
    fn test_describe_target() {
        let target = TargetNumber::new(
            4,
            vec![
                RollModifier::Range {
                    bracket: RangeBracket::Medium,
                    distance: 5,
                    value: 2,
                },
                RollModifier::Heat { heat: 9, value: 1 },
            ],
        );
        assert_eq!(
            describe_target(&target),
            "base 4, medium range (5 hexes) +2, heat 9 +1 = 7"
        );
    }

    #[test]
    fn test_render_log() {
        let broadcasts = vec![
            Broadcast {
                session_id: "s1".to_string(),
                sequence: 1,
                timestamp: 0,
                origin: Some("alice".to_string()),
                event: SessionEvent::DiceRolled {
                    player_id: "alice".to_string(),
                    roll: DiceRoll::new(vec![2, 5]),
                },
            },
            Broadcast {
                session_id: "s1".to_string(),
                sequence: 2,
                timestamp: 0,
                origin: None,
                event: SessionEvent::PhaseChanged {
                    from: GamePhase::Deployment,
                    to: GamePhase::Movement,
                    turn: 1,
                },
            },
        ];
        assert_eq!(
            render_log(&broadcasts),
            "#1 [alice] alice rolled 7 [2+5]\n#2 [auto] turn 1: deployment -> movement\n"
        );
    }
}
