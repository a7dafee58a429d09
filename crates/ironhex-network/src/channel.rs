//! In-process command channel between participants and the session host.
//!
//! Commands travel over an mpsc queue to the single task that owns the
//! authoritative session; each carries a oneshot for its reply. Accepted
//! events fan out to every subscriber over a broadcast channel.
//!
//! # Message Flow
//!
//! 1. A participant publishes a command
//! 2. The host task validates and applies it
//! 3. The submitter gets the verdict on its oneshot
//! 4. Every subscriber receives the resulting broadcasts in sequence order

use ironhex_core::{Accepted, Broadcast, GameCommand, SessionState, Sequence, SubmitError};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

/// Default depth of the command queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default number of broadcasts a slow subscriber may fall behind by.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Errors from the transport itself, never from game rules.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("session host is no longer running")]
    Closed,
    #[error("session host dropped the request without answering")]
    NoReply,
    #[error("subscriber fell behind by {0} broadcasts")]
    Lagged(u64),
    #[error("session host task failed: {0}")]
    HostFailed(String),
}

/// What the host can be asked to do.
#[derive(Debug)]
pub enum HostRequest {
    Submit {
        command: GameCommand,
        reply: oneshot::Sender<Result<Accepted, SubmitError>>,
    },
    /// Broadcasts after a sequence number, for catching up.
    History {
        since: Sequence,
        reply: oneshot::Sender<Vec<Broadcast>>,
    },
    /// Current authoritative state.
    Snapshot {
        reply: oneshot::Sender<SessionState>,
    },
    Shutdown,
}

/// The host's end of a channel.
#[derive(Debug)]
pub struct CommandQueue {
    pub requests: mpsc::Receiver<HostRequest>,
    pub broadcasts: broadcast::Sender<Broadcast>,
}

/// A cloneable handle for publishing commands and subscribing to results.
#[derive(Clone, Debug)]
pub struct CommandChannel {
    requests: mpsc::Sender<HostRequest>,
    broadcasts: broadcast::Sender<Broadcast>,
}

impl CommandChannel {
    /// Create a channel pair with default capacities.
    pub fn new() -> (Self, CommandQueue) {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY, DEFAULT_BROADCAST_CAPACITY)
    }

    pub fn with_capacity(queue: usize, broadcasts: usize) -> (Self, CommandQueue) {
        let (request_tx, request_rx) = mpsc::channel(queue);
        let (broadcast_tx, _) = broadcast::channel(broadcasts);
        (
            Self {
                requests: request_tx,
                broadcasts: broadcast_tx.clone(),
            },
            CommandQueue {
                requests: request_rx,
                broadcasts: broadcast_tx,
            },
        )
    }

    /// Send a command and wait for the authority's verdict.
    pub async fn publish(
        &self,
        command: GameCommand,
    ) -> Result<Result<Accepted, SubmitError>, ChannelError> {
        let (reply, answer) = oneshot::channel();
        self.requests
            .send(HostRequest::Submit { command, reply })
            .await
            .map_err(|_| ChannelError::Closed)?;
        answer.await.map_err(|_| ChannelError::NoReply)
    }

    /// Broadcasts after `since`, straight from the authority's log.
    pub async fn history(&self, since: Sequence) -> Result<Vec<Broadcast>, ChannelError> {
        let (reply, answer) = oneshot::channel();
        self.requests
            .send(HostRequest::History { since, reply })
            .await
            .map_err(|_| ChannelError::Closed)?;
        answer.await.map_err(|_| ChannelError::NoReply)
    }

    pub async fn snapshot(&self) -> Result<SessionState, ChannelError> {
        let (reply, answer) = oneshot::channel();
        self.requests
            .send(HostRequest::Snapshot { reply })
            .await
            .map_err(|_| ChannelError::Closed)?;
        answer.await.map_err(|_| ChannelError::NoReply)
    }

    /// Ask the host to stop after the requests already queued.
    pub async fn shutdown(&self) -> Result<(), ChannelError> {
        self.requests
            .send(HostRequest::Shutdown)
            .await
            .map_err(|_| ChannelError::Closed)
    }

    /// Receive every broadcast from now on.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            inner: self.broadcasts.subscribe(),
        }
    }

    /// Run `handler` on every broadcast until the host stops.
    pub fn subscribe_with<F>(&self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(Broadcast) + Send + 'static,
    {
        let mut subscription = self.subscribe();
        let channel = self.clone();
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    biased;
                    received = subscription.recv() => received,
                    _ = channel.closed() => break,
                };
                match received {
                    Ok(broadcast) => handler(broadcast),
                    Err(ChannelError::Lagged(missed)) => {
                        warn!(missed, "subscriber lagged; broadcasts dropped");
                    }
                    Err(_) => break,
                }
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }

    /// Resolves once the host has stopped taking requests.
    pub async fn closed(&self) {
        self.requests.closed().await
    }
}

/// A live feed of broadcasts.
#[derive(Debug)]
pub struct Subscription {
    inner: broadcast::Receiver<Broadcast>,
}

impl Subscription {
    /// Next broadcast. `Lagged` means some were skipped and the caller
    /// should fetch them with [`CommandChannel::history`].
    pub async fn recv(&mut self) -> Result<Broadcast, ChannelError> {
        match self.inner.recv().await {
            Ok(broadcast) => Ok(broadcast),
            Err(broadcast::error::RecvError::Lagged(missed)) => Err(ChannelError::Lagged(missed)),
            Err(broadcast::error::RecvError::Closed) => Err(ChannelError::Closed),
        }
    }

    /// Whether nothing is waiting to be received.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
