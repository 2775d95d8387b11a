//! Message types exchanged with clients.
//!
//! These are the logical packets:
//! - [`ClientMessage`]: what a connected client may ask for.
//! - [`ServerMessage`]: what the server pushes to clients.
//!
//! Each enum is a closed, tagged union: the `kind` field selects exactly
//! one payload struct. Adding a packet kind means adding a variant here and
//! registering its name in `playground-protocol`; every `match` over these
//! enums then fails to compile until the new kind is handled.
//!
//! The JSON codec and kind registry live in the `playground-protocol`
//! crate; this module is purely logical.

use serde::{Deserialize, Serialize};

use crate::model::{Character, RoomSnapshot, Song};

/// A request from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Enter a room, creating the character on first join.
    JoinRoom(JoinRoom),

    /// Move within the current room.
    Move(Move),

    /// Flip a toggleable element of the current room.
    ToggleElement(ToggleElement),

    /// Say something to the current room.
    Chat(ChatSend),

    /// Wait in a sponsor's queue.
    QueueJoin(QueueRef),

    /// Stop waiting in a sponsor's queue.
    QueueLeave(QueueRef),

    /// Receive snapshots of a sponsor's queue.
    QueueSubscribe(QueueRef),

    QueueUnsubscribe(QueueRef),

    /// Call the head of a sponsor's queue.
    QueueNext(QueueRef),

    /// Add an already-resolved song to the jukebox.
    QueueMedia(QueueMedia),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    pub room: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Hallway of the current room taken to get here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hallway_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Move {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleElement {
    pub element_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSend {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRef {
    pub sponsor_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMedia {
    pub song: Song,
}

/// A packet pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Full state of a room, sent only to a session that just joined it.
    RoomSnapshot(RoomSnapshot),

    CharacterJoined(CharacterJoined),

    CharacterLeft(CharacterLeft),

    CharacterMoved(CharacterMoved),

    ElementToggled(ElementToggled),

    Chat(ChatMessage),

    /// Current order of a sponsor's queue.
    QueueSnapshot(QueueSnapshot),

    /// Sent to a character that reached the head of a queue and was called.
    QueueCalled(QueueRef),

    MediaQueued(MediaQueued),

    /// Rejection of a single request. The connection stays open.
    Error(ErrorNotice),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterJoined {
    pub character: Character,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterLeft {
    pub character_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterMoved {
    pub character_id: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementToggled {
    pub element_id: String,
    pub state: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub character_id: String,
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub sponsor_id: String,

    /// Head first.
    pub characters: Vec<Character>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaQueued {
    pub song: Song,
}

/// Why a request was rejected.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// The state store failed; nothing was applied. Retry later.
    StoreUnavailable,
    /// The frame could not be decoded.
    DecodeError,
    /// The request needs a character, but the session has not joined.
    NotJoined,
    NotFound,
    /// Well-formed but not acceptable (bad coordinates, empty chat, ...).
    Invalid,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

// -----------------------------------------------------------------------------
// Convenience constructors
// -----------------------------------------------------------------------------

impl ServerMessage {
    pub fn character_joined(character: Character) -> Self {
        ServerMessage::CharacterJoined(CharacterJoined { character })
    }

    pub fn character_left(character_id: impl Into<String>) -> Self {
        ServerMessage::CharacterLeft(CharacterLeft {
            character_id: character_id.into(),
        })
    }

    pub fn character_moved(character_id: impl Into<String>, x: f64, y: f64) -> Self {
        ServerMessage::CharacterMoved(CharacterMoved {
            character_id: character_id.into(),
            x,
            y,
        })
    }

    pub fn element_toggled(element_id: impl Into<String>, state: u32) -> Self {
        ServerMessage::ElementToggled(ElementToggled {
            element_id: element_id.into(),
            state,
        })
    }

    pub fn queue_snapshot(sponsor_id: impl Into<String>, characters: Vec<Character>) -> Self {
        ServerMessage::QueueSnapshot(QueueSnapshot {
            sponsor_id: sponsor_id.into(),
            characters,
        })
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorNotice {
            code,
            message: message.into(),
            retryable: code == ErrorCode::StoreUnavailable,
        })
    }
}
