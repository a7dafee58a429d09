//! Passive replicas of a session.

use crate::events::Broadcast;
use crate::map::BattleMap;
use crate::settings::SessionSettings;
use crate::state::{SessionError, SessionState};
use crate::types::{PlayerId, Sequence, SessionId};
use tracing::{debug, warn};

/// A read-only copy of a session kept up to date from broadcasts.
///
/// Mirrors never roll dice or validate commands; they apply what the
/// authority decided, through the same code path the authority uses.
#[derive(Clone, Debug)]
pub struct SessionMirror {
    /// Local player this mirror belongs to, if any.
    pub viewer: Option<PlayerId>,
    state: SessionState,
}

impl SessionMirror {
    pub fn new(session_id: SessionId, settings: SessionSettings, map: BattleMap) -> Self {
        Self {
            viewer: None,
            state: SessionState::new(session_id, settings, map),
        }
    }

    /// A fresh mirror for the same session, before any broadcast.
    pub fn of(state: &SessionState) -> Self {
        Self::new(
            state.session_id.clone(),
            state.settings.clone(),
            state.map.clone(),
        )
    }

    /// Start from a state the authority handed over; later broadcasts
    /// continue from its `last_sequence`.
    pub fn from_snapshot(state: SessionState) -> Self {
        Self {
            viewer: None,
            state,
        }
    }

    pub fn for_viewer(mut self, viewer: PlayerId) -> Self {
        self.viewer = Some(viewer);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn last_sequence(&self) -> Sequence {
        self.state.last_sequence
    }

    /// Apply one broadcast. Already-applied sequences are skipped.
    pub fn apply(&mut self, broadcast: &Broadcast) -> Result<bool, SessionError> {
        match self.state.apply_broadcast(broadcast) {
            Ok(true) => {
                debug!(
                    session = %self.state.session_id,
                    sequence = broadcast.sequence,
                    event = broadcast.event.name(),
                    "mirror applied"
                );
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(err) => {
                warn!(session = %self.state.session_id, error = %err, "mirror out of step");
                Err(err)
            }
        }
    }

    /// Apply a run of broadcasts, returning how many were new.
    pub fn apply_all<'a>(
        &mut self,
        broadcasts: impl IntoIterator<Item = &'a Broadcast>,
    ) -> Result<usize, SessionError> {
        let mut applied = 0;
        for broadcast in broadcasts {
            if self.apply(broadcast)? {
                applied += 1;
            }
        }
        Ok(applied)
    }
}
