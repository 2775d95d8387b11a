//! Error types for the core world graph.
//!
//! Two layers:
//! - [`StoreError`]: the state store could not complete a call.
//! - [`WorldError`]: a typed graph operation failed, either because the
//!   store failed underneath it or because the request does not fit the
//!   current graph (unknown entity, element in another room, ...).

use std::fmt;

use thiserror::Error;

/// Failure of a single state store call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store is unreachable or did not answer in time.
    ///
    /// Transient: the operation was not applied and may be retried.
    #[error("state store unavailable: {reason}")]
    Unavailable { reason: String },

    /// The key holds a different collection type than the call expects.
    #[error("key {key} holds the wrong type for this operation")]
    WrongType { key: String },
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        StoreError::Unavailable {
            reason: reason.into(),
        }
    }

    /// True for failures a client may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

/// Entity families kept in the store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Room,
    Character,
    Hallway,
    Element,
    Sponsor,
}

impl EntityKind {
    /// Key prefix used in the store layout (`room:<id>`, ...).
    pub fn prefix(self) -> &'static str {
        match self {
            EntityKind::Room => "room",
            EntityKind::Character => "character",
            EntityKind::Hallway => "hallway",
            EntityKind::Element => "element",
            EntityKind::Sponsor => "sponsor",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Failure of a typed world operation.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    /// A stored record could not be read back into its entity type.
    #[error("corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("{kind} {id} is not in room {room}")]
    NotInRoom {
        kind: EntityKind,
        id: String,
        room: String,
    },

    #[error("element {0} cannot be toggled")]
    NotToggleable(String),
}

impl WorldError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        WorldError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True when the underlying store call failed transiently.
    pub fn is_transient(&self) -> bool {
        matches!(self, WorldError::Store(e) if e.is_transient())
    }
}
