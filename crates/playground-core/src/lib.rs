//! playground-core
//!
//! World logic for the playground virtual space, with no networking:
//! - entity model (rooms, characters, hallways, elements, sponsors, songs)
//! - the state store contract, an in-memory store and a timeout wrapper
//! - typed graph operations over the store
//! - client/server message types

pub mod error;
pub mod model;
pub mod store;
pub mod memory_store;
pub mod world;
pub mod messages;

pub use error::{EntityKind, StoreError, WorldError};

pub use model::{
    Character,
    Element,
    Entity,
    Hallway,
    Position,
    Room,
    RoomSnapshot,
    Song,
    Sponsor,
    SPAWN_POINT,
};

pub use messages::{ClientMessage, ErrorCode, ServerMessage};

pub use store::{keys, Fields, StateStore, TimedStore};
pub use memory_store::MemoryStore;
pub use world::World;
