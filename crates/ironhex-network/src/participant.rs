//! Clients that play a session through a [`CommandChannel`].
//!
//! A participant keeps its own [`SessionMirror`], stamps commands with the
//! phase and turn the mirror shows, and retries a command under the same
//! idempotency key when the host fails to answer. Humans, scripted opponents
//! and test drivers all go through this same type.

use crate::channel::{ChannelError, CommandChannel, Subscription};
use ironhex_core::session::system_clock;
use ironhex_core::{
    Accepted, Broadcast, CommandHeader, CommandPayload, CommandRejection, DiceRoll, Facing,
    GameCommand, HexCoord, LobbySnapshot, MovementMode, PlayerColor, PlayerId, PlayerStatus,
    Position, SessionError, SessionEvent, SessionMirror, SessionState, SubmitError, UnitId,
    UnitSpec,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why a participant's request did not go through.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParticipantError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("command rejected: {0}")]
    Rejected(#[from] CommandRejection),
    #[error("session failed: {0}")]
    SessionFailed(SessionError),
    #[error("mirror out of step: {0}")]
    Mirror(SessionError),
}

impl ParticipantError {
    /// A rules or phase rejection; the session itself is fine.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ParticipantError::Rejected(_))
    }
}

impl From<SubmitError> for ParticipantError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Rejected(rejection) => ParticipantError::Rejected(rejection),
            SubmitError::Fatal(err) => ParticipantError::SessionFailed(err),
        }
    }
}

/// Backoff for commands the host did not answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    pub multiplier: u32,
    /// Retries after the first try; 0 disables retrying.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            multiplier: 2,
            max_retries: 5,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based), or `None` to give up.
    pub fn delay(&self, retry: u32) -> Option<Duration> {
        if retry >= self.max_retries {
            return None;
        }
        let factor = self.multiplier.saturating_pow(retry);
        Some(self.initial_delay.saturating_mul(factor).min(self.max_delay))
    }
}

/// One player's connection to a session.
#[derive(Debug)]
pub struct Participant {
    player_id: PlayerId,
    channel: CommandChannel,
    mirror: Arc<RwLock<SessionMirror>>,
    /// Client-side status until the session knows the player.
    status: PlayerStatus,
    retry: RetryPolicy,
    /// Attempt counter for requests that are new every time they are sent:
    /// queries and lobby status changes.
    queries: u32,
}

impl Participant {
    /// Connect as `player_id`, starting the mirror from the host's snapshot.
    pub async fn connect(
        player_id: impl Into<PlayerId>,
        channel: CommandChannel,
    ) -> Result<Self, ParticipantError> {
        let player_id = player_id.into();
        let snapshot = channel.snapshot().await?;
        let status = snapshot
            .player(&player_id)
            .map_or(PlayerStatus::NotJoined, |p| p.status);
        debug!(
            player = %player_id,
            sequence = snapshot.last_sequence,
            "participant connected"
        );
        let mirror = SessionMirror::from_snapshot(snapshot).for_viewer(player_id.clone());
        Ok(Self {
            player_id,
            channel,
            mirror: Arc::new(RwLock::new(mirror)),
            status,
            retry: RetryPolicy::default(),
            queries: 0,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    /// Shared handle to the local mirror.
    pub fn mirror(&self) -> Arc<RwLock<SessionMirror>> {
        Arc::clone(&self.mirror)
    }

    /// Read the mirrored state.
    pub async fn view<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(self.mirror.read().await.state())
    }

    /// The session's view of this player once joined, the local one before.
    pub async fn status(&self) -> PlayerStatus {
        self.view(|state| state.player(&self.player_id).map(|p| p.status))
            .await
            .unwrap_or(self.status)
    }

    /// A live feed of the session's broadcasts.
    pub fn subscribe(&self) -> Subscription {
        self.channel.subscribe()
    }

    /// Pull whatever the mirror is missing from the host's log.
    pub async fn catch_up(&self) -> Result<usize, ParticipantError> {
        resync(&self.channel, &self.mirror).await
    }

    /// Keep the mirror current in the background until the host stops.
    pub fn follow(&self) -> JoinHandle<()> {
        let mut feed = self.channel.subscribe();
        let channel = self.channel.clone();
        let mirror = Arc::clone(&self.mirror);
        let player = self.player_id.clone();
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    biased;
                    received = feed.recv() => received,
                    _ = channel.closed() => break,
                };
                let in_step = match received {
                    Ok(broadcast) => mirror.write().await.apply(&broadcast).is_ok(),
                    Err(ChannelError::Lagged(missed)) => {
                        debug!(%player, missed, "mirror feed lagged");
                        false
                    }
                    Err(_) => break,
                };
                if !in_step {
                    if let Err(err) = resync(&channel, &mirror).await {
                        warn!(%player, error = %err, "mirror stopped following");
                        break;
                    }
                }
            }
        })
    }

    pub async fn join(
        &mut self,
        name: &str,
        color: Option<PlayerColor>,
        roster: Vec<UnitSpec>,
    ) -> Result<Accepted, ParticipantError> {
        self.status = PlayerStatus::Joining;
        let payload = CommandPayload::JoinGame {
            name: name.to_string(),
            color,
            roster,
        };
        match self.send(None, payload).await {
            Ok(accepted) => {
                self.status = PlayerStatus::JoinRequested;
                info!(player = %self.player_id, name, "joined session");
                Ok(accepted)
            }
            Err(err) => {
                self.status = PlayerStatus::JoinFailed;
                warn!(player = %self.player_id, error = %err, "join failed");
                Err(err)
            }
        }
    }

    pub async fn set_status(&mut self, status: PlayerStatus) -> Result<Accepted, ParticipantError> {
        self.send(None, CommandPayload::UpdatePlayerStatus { status })
            .await
    }

    pub async fn set_ready(&mut self) -> Result<Accepted, ParticipantError> {
        self.set_status(PlayerStatus::Ready).await
    }

    /// Ask the authority for the lobby roster.
    pub async fn lobby_status(&mut self) -> Result<LobbySnapshot, ParticipantError> {
        let accepted = self.send(None, CommandPayload::RequestLobbyStatus).await?;
        match accepted.lobby {
            Some(lobby) => Ok(lobby),
            None => Ok(self.view(|state| state.lobby_snapshot()).await),
        }
    }

    /// Roll `count` dice on the authority. `None` if an earlier delivery of
    /// the same request already rolled them.
    pub async fn roll_dice(&mut self, count: usize) -> Result<Option<DiceRoll>, ParticipantError> {
        let accepted = self.send(None, CommandPayload::RollDice { count }).await?;
        Ok(accepted
            .broadcasts
            .into_iter()
            .find_map(|broadcast| match broadcast.event {
                SessionEvent::DiceRolled { player_id, roll } if player_id == self.player_id => {
                    Some(roll)
                }
                _ => None,
            }))
    }

    pub async fn deploy(
        &mut self,
        unit_id: UnitId,
        position: Position,
    ) -> Result<Accepted, ParticipantError> {
        self.send(Some(unit_id), CommandPayload::Deploy { position })
            .await
    }

    pub async fn move_unit(
        &mut self,
        unit_id: UnitId,
        mode: MovementMode,
        destination: HexCoord,
        facing: Option<Facing>,
    ) -> Result<Accepted, ParticipantError> {
        let payload = CommandPayload::Move {
            mode,
            destination,
            facing,
        };
        self.send(Some(unit_id), payload).await
    }

    pub async fn attack(
        &mut self,
        unit_id: UnitId,
        target: UnitId,
        weapons: Vec<usize>,
    ) -> Result<Accepted, ParticipantError> {
        self.send(Some(unit_id), CommandPayload::Attack { target, weapons })
            .await
    }

    pub async fn end_phase(&mut self) -> Result<Accepted, ParticipantError> {
        self.send(None, CommandPayload::EndPhase).await
    }

    pub async fn concede(&mut self) -> Result<Accepted, ParticipantError> {
        info!(player = %self.player_id, "conceding");
        self.send(None, CommandPayload::Concede).await
    }

    /// Catch up, stamp the command from the mirror, and deliver it.
    pub async fn send(
        &mut self,
        unit_id: Option<UnitId>,
        payload: CommandPayload,
    ) -> Result<Accepted, ParticipantError> {
        self.catch_up().await?;
        let command = self.stamp(unit_id, payload).await;
        self.deliver(command).await
    }

    async fn stamp(&mut self, unit_id: Option<UnitId>, payload: CommandPayload) -> GameCommand {
        let mirror = self.mirror.read().await;
        let state = mirror.state();
        let mut header =
            CommandHeader::new(&state.session_id, &self.player_id, state.phase, state.turn)
                .at(system_clock());
        header.unit_id = unit_id;
        if matches!(
            payload,
            CommandPayload::RollDice { .. }
                | CommandPayload::RequestLobbyStatus
                | CommandPayload::UpdatePlayerStatus { .. }
        ) {
            self.queries += 1;
            header.attempt = self.queries;
        }
        GameCommand::new(header, payload)
    }

    /// Publish until answered; every retry reuses the same key.
    pub async fn deliver(&self, command: GameCommand) -> Result<Accepted, ParticipantError> {
        let key = command.idempotency_key();
        let mut retry = 0;
        loop {
            match self.channel.publish(command.clone()).await {
                Ok(Ok(accepted)) => {
                    self.absorb(&accepted.broadcasts).await?;
                    return Ok(accepted);
                }
                Ok(Err(SubmitError::Rejected(CommandRejection::DuplicateCommand(key)))) => {
                    // An earlier try went through; its broadcasts are in the log
                    debug!(%key, "command already applied");
                    self.catch_up().await?;
                    return Ok(Accepted {
                        key,
                        broadcasts: Vec::new(),
                        lobby: None,
                    });
                }
                Ok(Err(err)) => return Err(err.into()),
                Err(ChannelError::NoReply) => match self.retry.delay(retry) {
                    Some(delay) => {
                        warn!(%key, retry, ?delay, "no reply from host, retrying");
                        tokio::time::sleep(delay).await;
                        retry += 1;
                    }
                    None => return Err(ChannelError::NoReply.into()),
                },
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn absorb(&self, broadcasts: &[Broadcast]) -> Result<(), ParticipantError> {
        let mut mirror = self.mirror.write().await;
        let next = mirror.last_sequence() + 1;
        if broadcasts.first().map_or(true, |b| b.sequence <= next) {
            mirror
                .apply_all(broadcasts)
                .map_err(ParticipantError::Mirror)?;
            return Ok(());
        }
        drop(mirror);
        // Someone else's events landed first
        self.catch_up().await.map(|_| ())
    }
}

async fn resync(
    channel: &CommandChannel,
    mirror: &RwLock<SessionMirror>,
) -> Result<usize, ParticipantError> {
    let since = mirror.read().await.last_sequence();
    let missing = channel.history(since).await?;
    mirror
        .write()
        .await
        .apply_all(&missing)
        .map_err(ParticipantError::Mirror)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{CommandQueue, HostRequest};
    use crate::host::SessionHost;
    use ironhex_core::{GameSession, GamePhase, SessionSettings};

    fn session() -> GameSession {
        GameSession::open_field("s1".to_string(), SessionSettings::duel("Test".to_string()), 3)
            .unwrap()
    }

    fn roster() -> Vec<UnitSpec> {
        vec![UnitSpec::standard("Wolverine")]
    }

    /// A host that loses the reply to the first submit it sees.
    fn flaky_host(mut session: GameSession, mut queue: CommandQueue) -> JoinHandle<GameSession> {
        tokio::spawn(async move {
            let mut dropped = false;
            while let Some(request) = queue.requests.recv().await {
                match request {
                    HostRequest::Submit { command, reply } => {
                        let result = session.submit(&command);
                        if let Ok(accepted) = &result {
                            for broadcast in &accepted.broadcasts {
                                let _ = queue.broadcasts.send(broadcast.clone());
                            }
                        }
                        if dropped {
                            let _ = reply.send(result);
                        } else {
                            dropped = true;
                            drop(reply);
                        }
                    }
                    HostRequest::History { since, reply } => {
                        let _ = reply.send(session.history().since(since).to_vec());
                    }
                    HostRequest::Snapshot { reply } => {
                        let _ = reply.send(session.state().clone());
                    }
                    HostRequest::Shutdown => break,
                }
            }
            session
        })
    }

    #[test]
    fn test_retry_delays() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2,
            max_retries: 4,
        };
        assert_eq!(policy.delay(0), Some(Duration::from_millis(10)));
        assert_eq!(policy.delay(1), Some(Duration::from_millis(20)));
        assert_eq!(policy.delay(3), Some(Duration::from_millis(50)));
        assert_eq!(policy.delay(4), None);
        assert_eq!(RetryPolicy::none().delay(0), None);
    }

    #[tokio::test]
    async fn test_join_tracks_status() {
        let host = SessionHost::spawn(session());
        let mut alice = Participant::connect("alice", host.channel()).await.unwrap();
        assert_eq!(alice.status().await, PlayerStatus::NotJoined);

        alice.join("Alice", None, roster()).await.unwrap();
        assert_eq!(alice.status().await, PlayerStatus::JoinRequested);
        alice.set_ready().await.unwrap();
        assert_eq!(alice.status().await, PlayerStatus::Ready);

        let lobby = alice.lobby_status().await.unwrap();
        assert_eq!(lobby.players.len(), 1);
        host.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_join_fails() {
        let host = SessionHost::spawn(session());
        let mut alice = Participant::connect("alice", host.channel()).await.unwrap();
        let err = alice.join("Alice", None, Vec::new()).await.unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(alice.status().await, PlayerStatus::JoinFailed);

        // A corrected roster goes through
        alice.join("Alice", None, roster()).await.unwrap();
        assert_eq!(alice.status().await, PlayerStatus::JoinRequested);
        host.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_lost_reply_is_retried_under_same_key() {
        let (channel, queue) = CommandChannel::new();
        let task = flaky_host(session(), queue);
        let mut alice = Participant::connect("alice", channel.clone())
            .await
            .unwrap()
            .with_retry(RetryPolicy {
                initial_delay: Duration::from_millis(1),
                ..RetryPolicy::default()
            });

        // The first reply is lost; the retry is acknowledged as a duplicate
        let accepted = alice.join("Alice", None, roster()).await.unwrap();
        assert!(accepted.broadcasts.is_empty());
        assert_eq!(alice.status().await, PlayerStatus::JoinRequested);
        assert_eq!(alice.view(|s| s.players.len()).await, 1);

        channel.shutdown().await.unwrap();
        let session = task.await.unwrap();
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_ready_can_be_withdrawn() {
        let host = SessionHost::spawn(session());
        let mut alice = Participant::connect("alice", host.channel()).await.unwrap();
        let mut bob = Participant::connect("bob", host.channel()).await.unwrap();
        alice.join("Alice", None, roster()).await.unwrap();
        bob.join("Bob", None, roster()).await.unwrap();

        alice.set_ready().await.unwrap();
        let withdrawn = alice.set_status(PlayerStatus::JoinRequested).await.unwrap();
        assert_eq!(withdrawn.broadcasts.len(), 1);
        assert_eq!(alice.status().await, PlayerStatus::JoinRequested);

        // Bob being ready is not enough while alice has stepped back
        bob.set_ready().await.unwrap();
        assert_eq!(bob.view(|s| s.phase).await, GamePhase::Lobby);

        alice.set_ready().await.unwrap();
        assert_eq!(alice.view(|s| s.phase).await, GamePhase::Deployment);
        assert_eq!(alice.status().await, PlayerStatus::Joined);
        host.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_queries_are_fresh_each_time() {
        let host = SessionHost::spawn(session());
        let mut alice = Participant::connect("alice", host.channel()).await.unwrap();
        alice.join("Alice", None, roster()).await.unwrap();

        let first = alice.roll_dice(2).await.unwrap();
        let second = alice.roll_dice(2).await.unwrap();
        assert!(first.is_some());
        assert!(second.is_some());
        assert_eq!(alice.view(|s| s.last_sequence).await, 3);
        host.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_follow_keeps_mirror_current() {
        let host = SessionHost::spawn(session());
        let mut alice = Participant::connect("alice", host.channel()).await.unwrap();
        let watcher = Participant::connect("carol", host.channel()).await.unwrap();
        let follower = watcher.follow();

        let mut feed = watcher.subscribe();
        alice.join("Alice", None, roster()).await.unwrap();
        alice.set_ready().await.unwrap();
        feed.recv().await.unwrap();
        feed.recv().await.unwrap();
        // Catching up never double-applies what the follower already has
        watcher.catch_up().await.unwrap();

        let seen = watcher.view(|s| (s.last_sequence, s.phase)).await;
        assert_eq!(seen, (2, GamePhase::Lobby));
        let authority = host.channel().snapshot().await.unwrap();
        assert_eq!(watcher.view(|s| s.clone()).await, authority);

        host.shutdown().await.unwrap();
        // The follower stops with the host
        follower.await.unwrap();
    }
}
