//! playground-protocol
//!
//! Wire-level encoding/decoding for the playground server.
//!
//! This crate is responsible for turning logical messages
//! (`playground_core::ClientMessage` / `ServerMessage`) into frames and
//! back again.
//!
//! - [`wire_types`] : registry of packet kinds and wire limits
//! - [`json_codec`] : the `{"kind": ..., ...}` JSON envelope

pub mod wire_types;
pub mod json_codec;

pub use wire_types::{ClientKind, ServerKind, MAX_CHAT_LEN, MAX_FRAME_LEN};

pub use json_codec::{
    ProtocolError,
    decode_client,
    encode_client,
    decode_server,
    encode_server,
    peek_kind,
};
