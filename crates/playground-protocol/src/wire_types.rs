//! Packet kind registry.
//!
//! Every envelope carries a `kind` string. This module is the single list
//! of kinds each side understands:
//! - [`ClientKind`]: client → server.
//! - [`ServerKind`]: server → client.
//!
//! The decoder checks the registry before touching the payload, so an
//! unknown kind is told apart from a malformed known one. `of` maps each
//! message variant to its kind with an exhaustive `match`, so a variant
//! added to the message enums without a registry entry does not compile.

use playground_core::{ClientMessage, ServerMessage};

/// Name of the discriminator field in every envelope.
pub const KIND_FIELD: &str = "kind";

/// Client → server kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ClientKind {
    JoinRoom,
    Move,
    ToggleElement,
    Chat,
    QueueJoin,
    QueueLeave,
    QueueSubscribe,
    QueueUnsubscribe,
    QueueNext,
    QueueMedia,
}

impl ClientKind {
    pub const ALL: [ClientKind; 10] = [
        ClientKind::JoinRoom,
        ClientKind::Move,
        ClientKind::ToggleElement,
        ClientKind::Chat,
        ClientKind::QueueJoin,
        ClientKind::QueueLeave,
        ClientKind::QueueSubscribe,
        ClientKind::QueueUnsubscribe,
        ClientKind::QueueNext,
        ClientKind::QueueMedia,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClientKind::JoinRoom => "join-room",
            ClientKind::Move => "move",
            ClientKind::ToggleElement => "toggle-element",
            ClientKind::Chat => "chat",
            ClientKind::QueueJoin => "queue-join",
            ClientKind::QueueLeave => "queue-leave",
            ClientKind::QueueSubscribe => "queue-subscribe",
            ClientKind::QueueUnsubscribe => "queue-unsubscribe",
            ClientKind::QueueNext => "queue-next",
            ClientKind::QueueMedia => "queue-media",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        ClientKind::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn of(msg: &ClientMessage) -> Self {
        match msg {
            ClientMessage::JoinRoom(_) => ClientKind::JoinRoom,
            ClientMessage::Move(_) => ClientKind::Move,
            ClientMessage::ToggleElement(_) => ClientKind::ToggleElement,
            ClientMessage::Chat(_) => ClientKind::Chat,
            ClientMessage::QueueJoin(_) => ClientKind::QueueJoin,
            ClientMessage::QueueLeave(_) => ClientKind::QueueLeave,
            ClientMessage::QueueSubscribe(_) => ClientKind::QueueSubscribe,
            ClientMessage::QueueUnsubscribe(_) => ClientKind::QueueUnsubscribe,
            ClientMessage::QueueNext(_) => ClientKind::QueueNext,
            ClientMessage::QueueMedia(_) => ClientKind::QueueMedia,
        }
    }
}

/// Server → client kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ServerKind {
    RoomSnapshot,
    CharacterJoined,
    CharacterLeft,
    CharacterMoved,
    ElementToggled,
    Chat,
    QueueSnapshot,
    QueueCalled,
    MediaQueued,
    Error,
}

impl ServerKind {
    pub const ALL: [ServerKind; 10] = [
        ServerKind::RoomSnapshot,
        ServerKind::CharacterJoined,
        ServerKind::CharacterLeft,
        ServerKind::CharacterMoved,
        ServerKind::ElementToggled,
        ServerKind::Chat,
        ServerKind::QueueSnapshot,
        ServerKind::QueueCalled,
        ServerKind::MediaQueued,
        ServerKind::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServerKind::RoomSnapshot => "room-snapshot",
            ServerKind::CharacterJoined => "character-joined",
            ServerKind::CharacterLeft => "character-left",
            ServerKind::CharacterMoved => "character-moved",
            ServerKind::ElementToggled => "element-toggled",
            ServerKind::Chat => "chat",
            ServerKind::QueueSnapshot => "queue-snapshot",
            ServerKind::QueueCalled => "queue-called",
            ServerKind::MediaQueued => "media-queued",
            ServerKind::Error => "error",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        ServerKind::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn of(msg: &ServerMessage) -> Self {
        match msg {
            ServerMessage::RoomSnapshot(_) => ServerKind::RoomSnapshot,
            ServerMessage::CharacterJoined(_) => ServerKind::CharacterJoined,
            ServerMessage::CharacterLeft(_) => ServerKind::CharacterLeft,
            ServerMessage::CharacterMoved(_) => ServerKind::CharacterMoved,
            ServerMessage::ElementToggled(_) => ServerKind::ElementToggled,
            ServerMessage::Chat(_) => ServerKind::Chat,
            ServerMessage::QueueSnapshot(_) => ServerKind::QueueSnapshot,
            ServerMessage::QueueCalled(_) => ServerKind::QueueCalled,
            ServerMessage::MediaQueued(_) => ServerKind::MediaQueued,
            ServerMessage::Error(_) => ServerKind::Error,
        }
    }
}

/// Upper bound on a single inbound frame.
///
/// Larger frames are rejected as malformed before parsing.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Upper bound on a chat message, in characters.
pub const MAX_CHAT_LEN: usize = 500;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for k in ClientKind::ALL {
            assert_eq!(ClientKind::from_name(k.as_str()), Some(k));
        }
        for k in ServerKind::ALL {
            assert_eq!(ServerKind::from_name(k.as_str()), Some(k));
        }
        assert_eq!(ClientKind::from_name("teleport"), None);
    }
}
