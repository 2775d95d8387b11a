//! playground-server
//!
//! Multi-client WebSocket server for the playground virtual space.
//!
//! Construction order: state store → [`World`](playground_core::World) →
//! [`ConnectionRegistry`] → [`Hub`]. The hub owns no durable state; it
//! mediates between the world graph and the registry.

pub mod config;
pub mod types;
pub mod error;
pub mod locks;
pub mod registry;
pub mod hub;
pub mod queue;
pub mod dispatch;
pub mod seed;
pub mod server;

// internal, driven by `server`
mod client;

pub use config::{Config, ConfigError};
pub use error::HubError;
pub use hub::{Hub, Presence};
pub use queue::QueueManager;
pub use registry::{ConnectionRegistry, Delivery, RegistryError};
pub use seed::{SeedError, WorldSeed};
pub use types::{Channel, SessionId};
