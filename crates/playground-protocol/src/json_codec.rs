//! JSON envelope encoding/decoding.
//!
//! Envelope model (one message per frame):
//!
//! ```text
//! { "kind": "<registered kind>", ...payload fields }
//!
//! move:             {"kind":"move","x":0.5,"y":0.5}
//! character-moved:  {"kind":"character-moved","characterId":"…","x":0.5,"y":0.5}
//! ```
//!
//! Decoding happens in two steps:
//! 1. parse the frame as a JSON object and read `kind`;
//! 2. look `kind` up in the registry, then deserialize the payload.
//!
//! A frame whose `kind` is not registered fails with
//! [`ProtocolError::UnknownKind`], which callers log and drop without
//! treating the peer as misbehaving. Any other failure is a decode error.

use playground_core::{ClientMessage, ServerMessage};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::wire_types::{ClientKind, ServerKind, KIND_FIELD, MAX_FRAME_LEN};

/// Errors that can arise when encoding/decoding a frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not a JSON object, or too large to consider.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The object has no string `kind` field.
    #[error("frame has no kind")]
    MissingKind,

    /// `kind` is not in the registry.
    #[error("unknown packet kind: {0}")]
    UnknownKind(String),

    /// `kind` is known but the payload does not match its schema.
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: &'static str, reason: String },

    #[error("failed to encode {kind}: {reason}")]
    Encode { kind: &'static str, reason: String },
}

impl ProtocolError {
    /// Unknown kinds are dropped quietly; everything else is a decode error.
    pub fn is_unknown_kind(&self) -> bool {
        matches!(self, ProtocolError::UnknownKind(_))
    }
}

// ============================================================================
// INPUT: client → server
// ============================================================================

/// Decode a single client message from one frame.
pub fn decode_client(buf: &[u8]) -> Result<ClientMessage, ProtocolError> {
    decode_with(buf, |k| ClientKind::from_name(k).map(ClientKind::as_str))
}

/// Encode a client message (for tools and tests acting as a client).
pub fn encode_client(msg: &ClientMessage) -> Result<String, ProtocolError> {
    encode_with(msg, ClientKind::of(msg).as_str())
}

// ============================================================================
// OUTPUT: server → client
// ============================================================================

/// Encode a server message into one text frame.
pub fn encode_server(msg: &ServerMessage) -> Result<String, ProtocolError> {
    encode_with(msg, ServerKind::of(msg).as_str())
}

/// Decode a server message (for tools and tests acting as a client).
pub fn decode_server(buf: &[u8]) -> Result<ServerMessage, ProtocolError> {
    decode_with(buf, |k| ServerKind::from_name(k).map(ServerKind::as_str))
}

// ============================================================================
// Shared
// ============================================================================

/// Read the `kind` of a frame without decoding its payload.
pub fn peek_kind(buf: &[u8]) -> Result<String, ProtocolError> {
    let value = parse_object(buf)?;
    kind_of(&value).map(str::to_string)
}

fn parse_object(buf: &[u8]) -> Result<Value, ProtocolError> {
    if buf.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::Malformed(format!(
            "frame of {} bytes exceeds {MAX_FRAME_LEN}",
            buf.len()
        )));
    }

    let value: Value =
        serde_json::from_slice(buf).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(ProtocolError::Malformed("envelope is not an object".into()));
    }
    Ok(value)
}

fn kind_of(value: &Value) -> Result<&str, ProtocolError> {
    value
        .get(KIND_FIELD)
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingKind)
}

fn decode_with<T, F>(buf: &[u8], registered: F) -> Result<T, ProtocolError>
where
    T: DeserializeOwned,
    F: Fn(&str) -> Option<&'static str>,
{
    let value = parse_object(buf)?;

    let kind = {
        let raw = kind_of(&value)?;
        registered(raw).ok_or_else(|| ProtocolError::UnknownKind(raw.to_string()))?
    };

    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload {
        kind,
        reason: e.to_string(),
    })
}

fn encode_with<T: Serialize>(msg: &T, kind: &'static str) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(|e| ProtocolError::Encode {
        kind,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use playground_core::messages::{ChatSend, Move, QueueRef};
    use playground_core::{Character, ErrorCode};

    #[test]
    fn decodes_move() {
        let msg = decode_client(br#"{"kind":"move","x":0.5,"y":0.5}"#).unwrap();
        assert_eq!(msg, ClientMessage::Move(Move { x: 0.5, y: 0.5 }));
    }

    #[test]
    fn unknown_kind_is_distinguished() {
        let err = decode_client(br#"{"kind":"teleport","to":"moon"}"#).unwrap_err();
        assert!(err.is_unknown_kind());
        assert!(matches!(err, ProtocolError::UnknownKind(ref k) if k == "teleport"));
    }

    #[test]
    fn malformed_inputs_are_decode_errors() {
        let cases: [&[u8]; 5] = [
            b"not json",
            b"[1,2,3]",
            br#"{"x":1}"#,
            br#"{"kind":7}"#,
            br#"{"kind":"move","x":"left"}"#,
        ];
        for case in cases {
            let err = decode_client(case).unwrap_err();
            assert!(!err.is_unknown_kind(), "{err}");
        }

        assert!(matches!(
            decode_client(br#"{"kind":"move","x":"left"}"#),
            Err(ProtocolError::InvalidPayload { kind: "move", .. })
        ));
    }

    #[test]
    fn oversized_frame_is_rejected_before_parsing() {
        let mut big = br#"{"kind":"chat","message":""#.to_vec();
        big.extend(std::iter::repeat(b'a').take(MAX_FRAME_LEN));
        big.extend_from_slice(br#""}"#);
        assert!(matches!(
            decode_client(&big),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn every_client_kind_matches_its_serde_tag() {
        let samples = vec![
            ClientMessage::Move(Move { x: 0.1, y: 0.2 }),
            ClientMessage::Chat(ChatSend {
                message: "hi".into(),
            }),
            ClientMessage::QueueJoin(QueueRef {
                sponsor_id: "acme".into(),
            }),
            ClientMessage::QueueNext(QueueRef {
                sponsor_id: "acme".into(),
            }),
        ];
        for msg in samples {
            let encoded = encode_client(&msg).unwrap();
            assert_eq!(peek_kind(encoded.as_bytes()).unwrap(), ClientKind::of(&msg).as_str());
            assert_eq!(decode_client(encoded.as_bytes()).unwrap(), msg);
        }
    }

    #[test]
    fn server_messages_carry_registered_kinds() {
        let character = Character {
            id: "c1".into(),
            name: "ada".into(),
            color: None,
            room: "plaza".into(),
            x: 0.5,
            y: 0.5,
            queue_id: None,
        };
        let samples = vec![
            ServerMessage::character_joined(character.clone()),
            ServerMessage::character_left("c1"),
            ServerMessage::element_toggled("lamp", 1),
            ServerMessage::queue_snapshot("acme", vec![character]),
            ServerMessage::error(ErrorCode::DecodeError, "bad frame"),
        ];
        for msg in samples {
            let encoded = encode_server(&msg).unwrap();
            let kind = peek_kind(encoded.as_bytes()).unwrap();
            assert_eq!(ServerKind::from_name(&kind), Some(ServerKind::of(&msg)));
            assert_eq!(decode_server(encoded.as_bytes()).unwrap(), msg);
        }
    }
}
