//! Ironhex Networking Layer
//!
//! This crate runs an Ironhex session on tokio:
//! - **Host**: one task owns the authoritative [`ironhex_core::GameSession`]
//! - **Channel**: an ordered, in-process command channel with a reply per
//!   command and a broadcast feed of accepted events
//! - **Participants**: clients with a local mirror and retry under the same
//!   idempotency key
//!
//! # Modules
//!
//! - [`channel`]: Command queue, broadcast feed and transport errors
//! - [`host`]: The single-writer session task
//! - [`participant`]: Player clients and mirror followers

// Re-export core types
pub use ironhex_core;

pub mod channel;
pub mod host;
pub mod participant;

// Re-exports for convenience
pub use channel::{ChannelError, CommandChannel, CommandQueue, HostRequest, Subscription};
pub use host::SessionHost;
pub use participant::{Participant, ParticipantError, RetryPolicy};
