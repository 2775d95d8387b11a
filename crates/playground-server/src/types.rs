//! Shared types for the playground server.
//!
//! This module defines:
//! - `SessionId`: a lightweight handle for connected clients
//! - `Channel`: a broadcast scope sessions subscribe to
//! - channel aliases for pre-encoded outbound frames

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

/// Identifier for a connected client session.
///
/// Assigned by the registry from a counter, so ids are never reused
/// while the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Ambient channel every session joins at registration.
pub const BROADCAST: &str = "broadcast";

/// A logical broadcast scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Room(String),
    /// Subscribers of a sponsor's queue.
    Queue(String),
    Ambient(String),
}

impl Channel {
    pub fn room(id: impl Into<String>) -> Self {
        Channel::Room(id.into())
    }

    pub fn queue(sponsor: impl Into<String>) -> Self {
        Channel::Queue(sponsor.into())
    }

    pub fn broadcast() -> Self {
        Channel::Ambient(BROADCAST.to_string())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Room(id) => write!(f, "room:{id}"),
            Channel::Queue(id) => write!(f, "queue:{id}"),
            Channel::Ambient(name) => f.write_str(name),
        }
    }
}

/// One encoded packet, shared by every recipient of a broadcast.
pub type Outbound = Arc<str>;

/// Bounded per-session outbound queue.
pub type OutboundTx = mpsc::Sender<Outbound>;
pub type OutboundRx = mpsc::Receiver<Outbound>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names() {
        assert_eq!(Channel::room("plaza").to_string(), "room:plaza");
        assert_eq!(Channel::queue("acme").to_string(), "queue:acme");
        assert_eq!(Channel::broadcast().to_string(), "broadcast");
    }
}
