//! The task that owns the authoritative session.
//!
//! Exactly one task ever touches a [`GameSession`]; everything else talks to
//! it through a [`CommandChannel`]. Requests are handled strictly one at a
//! time in arrival order.

use crate::channel::{ChannelError, CommandChannel, CommandQueue, HostRequest};
use ironhex_core::GameSession;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A running session host.
#[derive(Debug)]
pub struct SessionHost {
    channel: CommandChannel,
    task: JoinHandle<GameSession>,
}

impl SessionHost {
    /// Move the session into its own task and return a handle to it.
    pub fn spawn(session: GameSession) -> Self {
        let (channel, queue) = CommandChannel::new();
        Self::spawn_with(session, channel, queue)
    }

    /// Spawn on a channel the caller already created.
    pub fn spawn_with(session: GameSession, channel: CommandChannel, queue: CommandQueue) -> Self {
        info!(session = %session.session_id(), "session host starting");
        let task = tokio::spawn(run(session, queue));
        Self { channel, task }
    }

    /// A handle participants can publish on.
    pub fn channel(&self) -> CommandChannel {
        self.channel.clone()
    }

    /// Stop the host and hand the session back.
    pub async fn shutdown(self) -> Result<GameSession, ChannelError> {
        // Already gone if every request sender was dropped; the join below tells
        let _ = self.channel.shutdown().await;
        self.task
            .await
            .map_err(|err| ChannelError::HostFailed(err.to_string()))
    }
}

async fn run(mut session: GameSession, mut queue: CommandQueue) -> GameSession {
    while let Some(request) = queue.requests.recv().await {
        match request {
            HostRequest::Submit { command, reply } => {
                let result = session.submit(&command);
                if let Ok(accepted) = &result {
                    for broadcast in &accepted.broadcasts {
                        // No subscribers is fine; the log keeps everything
                        let _ = queue.broadcasts.send(broadcast.clone());
                    }
                }
                if reply.send(result).is_err() {
                    debug!(player = %command.header.player_id, "submitter went away before the reply");
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
    info!(
        session = %session.session_id(),
        events = session.history().len(),
        "session host stopped"
    );
    session
}
