//! Session settings and configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration for a game session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Display name for the session.
    pub name: String,
    /// Players needed before the lobby can start.
    pub min_players: usize,
    /// Lobby capacity.
    pub max_players: usize,
    /// Roster limit per player.
    pub max_units_per_player: usize,
    pub map_width: u32,
    pub map_height: u32,
    /// Roll for shutdown when heat climbs past the threshold.
    pub heat_shutdown: bool,
}

impl SessionSettings {
    /// Create default settings for a new session.
    pub fn new(name: String) -> Self {
        Self {
            name,
            min_players: 2,
            max_players: 4,
            max_units_per_player: 4,
            map_width: 16,
            map_height: 17,
            heat_shutdown: true,
        }
    }

    /// Two players, one lance each, on a small map.
    pub fn duel(name: String) -> Self {
        Self {
            min_players: 2,
            max_players: 2,
            max_units_per_player: 4,
            map_width: 15,
            map_height: 17,
            ..Self::new(name)
        }
    }

    /// A single player against the range, for drills and tests.
    pub fn solo(name: String) -> Self {
        Self {
            min_players: 1,
            max_players: 1,
            max_units_per_player: 4,
            ..Self::new(name)
        }
    }

    /// Load settings from JSON, then validate them.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings and return the first problem found.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.name.is_empty() {
            return Err(SettingsError::EmptyName);
        }
        if self.name.len() > 64 {
            return Err(SettingsError::NameTooLong);
        }
        if self.min_players == 0 {
            return Err(SettingsError::TooFewPlayers);
        }
        if self.max_players < self.min_players {
            return Err(SettingsError::PlayerRange {
                min: self.min_players,
                max: self.max_players,
            });
        }
        if self.max_players > 8 {
            return Err(SettingsError::TooManyPlayers);
        }
        if self.max_units_per_player == 0 {
            return Err(SettingsError::NoUnits);
        }
        if self.map_width < 2 || self.map_height < 2 {
            return Err(SettingsError::MapTooSmall {
                width: self.map_width,
                height: self.map_height,
            });
        }
        Ok(())
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::new("New Session".to_string())
    }
}

/// Errors from invalid session settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("session name cannot be empty")]
    EmptyName,
    #[error("session name must be 64 characters or less")]
    NameTooLong,
    #[error("need at least 1 player")]
    TooFewPlayers,
    #[error("maximum 8 players allowed")]
    TooManyPlayers,
    #[error("max players ({max}) is below min players ({min})")]
    PlayerRange { min: usize, max: usize },
    #[error("each player needs at least one unit")]
    NoUnits,
    #[error("map {width}x{height} is too small")]
    MapTooSmall { width: u32, height: u32 },
    #[error("invalid settings json: {0}")]
    Parse(#[from] serde_json::Error),
}
