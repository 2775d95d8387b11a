//! Errors raised while handling a client request.

use playground_core::{ErrorCode, ServerMessage, StoreError, WorldError};
use playground_protocol::ProtocolError;
use thiserror::Error;

use crate::registry::RegistryError;
use crate::types::SessionId;

#[derive(Debug, Error)]
pub enum HubError {
    /// The target session disconnected. A benign race; never shown to users.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("session has not joined a room")]
    NotJoined,

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Encode(#[from] ProtocolError),
}

impl From<RegistryError> for HubError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::SessionNotFound(id) | RegistryError::SlowConsumer(id) => {
                HubError::SessionNotFound(id)
            }
        }
    }
}

impl HubError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        HubError::Invalid(reason.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            HubError::NotJoined => ErrorCode::NotJoined,
            HubError::Invalid(_) => ErrorCode::Invalid,
            HubError::World(e) => match e {
                WorldError::Store(StoreError::Unavailable { .. }) => ErrorCode::StoreUnavailable,
                WorldError::NotFound { .. } => ErrorCode::NotFound,
                WorldError::NotInRoom { .. } | WorldError::NotToggleable(_) => ErrorCode::Invalid,
                WorldError::Store(StoreError::WrongType { .. }) | WorldError::Corrupt { .. } => {
                    ErrorCode::Internal
                }
            },
            HubError::SessionNotFound(_) | HubError::Encode(_) => ErrorCode::Internal,
        }
    }

    /// The rejection notice sent back to the requesting session.
    pub fn to_notice(&self) -> ServerMessage {
        ServerMessage::error(self.code(), self.to_string())
    }
}
