//! State store contract.
//!
//! The store is the authoritative, externally persisted copy of the world
//! graph. It is addressed by string keys following a fixed layout (see
//! [`keys`]) and offers three value shapes:
//!
//! - field maps (`room:<id>`, `character:<id>`, ...), merged per field;
//! - unordered sets (`room:<id>:characters`, `rooms`, ...);
//! - ordered sequences (`queue:<sponsor>`, `room:<id>:hallways`, ...).
//!
//! Each call on a single key is atomic. Nothing spans keys: callers that
//! touch several keys order their steps so a failure in between leaves the
//! graph recoverable.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::StoreError;

/// A partial or complete record.
pub type Fields = Map<String, Value>;

/// Key layout of the store.
pub mod keys {
    use crate::error::EntityKind;

    /// Global set of room ids.
    pub const ROOMS: &str = "rooms";

    /// Global set of sponsor ids.
    pub const SPONSORS: &str = "sponsors";

    /// Global sequence of queued songs (JSON records).
    pub const SONGS: &str = "songs";

    /// `<kind>:<id>`
    pub fn entity(kind: EntityKind, id: &str) -> String {
        format!("{}:{}", kind.prefix(), id)
    }

    pub fn room_characters(room: &str) -> String {
        format!("room:{room}:characters")
    }

    pub fn room_hallways(room: &str) -> String {
        format!("room:{room}:hallways")
    }

    pub fn room_elements(room: &str) -> String {
        format!("room:{room}:elements")
    }

    /// Visitors waiting for a sponsor, head first.
    pub fn queue(sponsor: &str) -> String {
        format!("queue:{sponsor}")
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Whole field map at `key`, or `None` if absent.
    async fn get_fields(&self, key: &str) -> Result<Option<Fields>, StoreError>;

    /// Merge `fields` into the map at `key`, creating it if needed.
    async fn set_fields(&self, key: &str, fields: Fields) -> Result<(), StoreError>;

    /// Remove `key` whatever it holds. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Returns whether the member was newly added.
    async fn add_to_set(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Returns whether the member was present.
    async fn remove_from_set(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn is_set_member(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Push to the tail. Returns the new length.
    async fn append_to_sequence(&self, key: &str, value: &str) -> Result<usize, StoreError>;

    async fn list_sequence(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Remove every occurrence of `value`. Returns how many were removed.
    async fn remove_from_sequence(&self, key: &str, value: &str) -> Result<usize, StoreError>;

    /// Remove and return the head.
    async fn pop_front(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Read many field maps in one round trip.
    async fn get_many_fields(&self, keys: &[String]) -> Result<Vec<Option<Fields>>, StoreError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get_fields(key).await?);
        }
        Ok(out)
    }
}

#[async_trait]
impl<S: StateStore + ?Sized> StateStore for Arc<S> {
    async fn get_fields(&self, key: &str) -> Result<Option<Fields>, StoreError> {
        (**self).get_fields(key).await
    }

    async fn set_fields(&self, key: &str, fields: Fields) -> Result<(), StoreError> {
        (**self).set_fields(key, fields).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        (**self).delete(key).await
    }

    async fn add_to_set(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        (**self).add_to_set(key, member).await
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        (**self).remove_from_set(key, member).await
    }

    async fn is_set_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        (**self).is_set_member(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        (**self).set_members(key).await
    }

    async fn append_to_sequence(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        (**self).append_to_sequence(key, value).await
    }

    async fn list_sequence(&self, key: &str) -> Result<Vec<String>, StoreError> {
        (**self).list_sequence(key).await
    }

    async fn remove_from_sequence(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        (**self).remove_from_sequence(key, value).await
    }

    async fn pop_front(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).pop_front(key).await
    }

    async fn get_many_fields(&self, keys: &[String]) -> Result<Vec<Option<Fields>>, StoreError> {
        (**self).get_many_fields(keys).await
    }
}

/// Bounds every call of an inner store by a timeout.
///
/// An expired call is reported as [`StoreError::Unavailable`], so a store
/// outage shows up as per-call failures instead of hung sessions.
#[derive(Debug)]
pub struct TimedStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: StateStore> TimedStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        TimedStore { inner, timeout }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, StoreError>> + Send,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => {
                warn!(op, timeout = ?self.timeout, "state store call timed out");
                Err(StoreError::unavailable(format!(
                    "{op} timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }
}

#[async_trait]
impl<S: StateStore> StateStore for TimedStore<S> {
    async fn get_fields(&self, key: &str) -> Result<Option<Fields>, StoreError> {
        self.bounded("get_fields", self.inner.get_fields(key)).await
    }

    async fn set_fields(&self, key: &str, fields: Fields) -> Result<(), StoreError> {
        self.bounded("set_fields", self.inner.set_fields(key, fields))
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.bounded("delete", self.inner.delete(key)).await
    }

    async fn add_to_set(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.bounded("add_to_set", self.inner.add_to_set(key, member))
            .await
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.bounded("remove_from_set", self.inner.remove_from_set(key, member))
            .await
    }

    async fn is_set_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.bounded("is_set_member", self.inner.is_set_member(key, member))
            .await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.bounded("set_members", self.inner.set_members(key)).await
    }

    async fn append_to_sequence(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        self.bounded(
            "append_to_sequence",
            self.inner.append_to_sequence(key, value),
        )
        .await
    }

    async fn list_sequence(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.bounded("list_sequence", self.inner.list_sequence(key))
            .await
    }

    async fn remove_from_sequence(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        self.bounded(
            "remove_from_sequence",
            self.inner.remove_from_sequence(key, value),
        )
        .await
    }

    async fn pop_front(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.bounded("pop_front", self.inner.pop_front(key)).await
    }

    async fn get_many_fields(&self, keys: &[String]) -> Result<Vec<Option<Fields>>, StoreError> {
        self.bounded("get_many_fields", self.inner.get_many_fields(keys))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;

    /// Never answers.
    struct StalledStore;

    #[async_trait]
    impl StateStore for StalledStore {
        async fn get_fields(&self, _key: &str) -> Result<Option<Fields>, StoreError> {
            std::future::pending().await
        }
        async fn set_fields(&self, _key: &str, _fields: Fields) -> Result<(), StoreError> {
            std::future::pending().await
        }
        async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
            std::future::pending().await
        }
        async fn add_to_set(&self, _key: &str, _member: &str) -> Result<bool, StoreError> {
            std::future::pending().await
        }
        async fn remove_from_set(&self, _key: &str, _member: &str) -> Result<bool, StoreError> {
            std::future::pending().await
        }
        async fn is_set_member(&self, _key: &str, _member: &str) -> Result<bool, StoreError> {
            std::future::pending().await
        }
        async fn set_members(&self, _key: &str) -> Result<Vec<String>, StoreError> {
            std::future::pending().await
        }
        async fn append_to_sequence(&self, _key: &str, _value: &str) -> Result<usize, StoreError> {
            std::future::pending().await
        }
        async fn list_sequence(&self, _key: &str) -> Result<Vec<String>, StoreError> {
            std::future::pending().await
        }
        async fn remove_from_sequence(
            &self,
            _key: &str,
            _value: &str,
        ) -> Result<usize, StoreError> {
            std::future::pending().await
        }
        async fn pop_front(&self, _key: &str) -> Result<Option<String>, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_times_out_as_unavailable() {
        let store = TimedStore::new(StalledStore, Duration::from_millis(50));

        let err = store.get_fields("room:plaza").await.unwrap_err();
        assert!(err.is_transient());

        let err = store.add_to_set("rooms", "plaza").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn healthy_store_passes_through() {
        let store = TimedStore::new(MemoryStore::new(), Duration::from_secs(1));
        assert!(store.add_to_set("rooms", "plaza").await.unwrap());
        assert_eq!(store.set_members("rooms").await.unwrap(), vec!["plaza"]);
    }

    #[test]
    fn key_layout() {
        use crate::error::EntityKind;

        assert_eq!(keys::entity(EntityKind::Room, "plaza"), "room:plaza");
        assert_eq!(keys::room_characters("plaza"), "room:plaza:characters");
        assert_eq!(keys::queue("acme"), "queue:acme");
    }
}
