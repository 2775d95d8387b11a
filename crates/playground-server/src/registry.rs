//! Connection registry.
//!
//! Tracks every live session, its bounded outbound queue, and the channels
//! it is subscribed to. This is the structure the hub uses to turn a
//! channel into a set of recipients.
//!
//! Consistency rules:
//! - A session is visible in `members_of(channel)` iff it is registered and
//!   its last call for that channel was `subscribe`.
//! - `unregister` first removes the session from the session table, which
//!   hides it from every channel at once; the per-channel sets are cleaned
//!   up afterwards.
//! - Each channel's member set has its own lock, so fan-out on one room
//!   never waits on another room.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::types::{Channel, Outbound, OutboundRx, OutboundTx, SessionId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// The session's outbound queue was full; it has been disconnected.
    #[error("session {0} evicted as a slow consumer")]
    SlowConsumer(SessionId),
}

#[derive(Debug, Default)]
struct HandleState {
    channels: HashSet<Channel>,
    closed: bool,
}

/// A registered session: its outbound queue and subscriptions.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    tx: OutboundTx,
    state: Mutex<HandleState>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,

    /// Sessions dropped during this fan-out because their queue was full.
    pub evicted: Vec<SessionId>,
}

#[derive(Debug)]
pub struct ConnectionRegistry {
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
    channels: DashMap<Channel, Arc<RwLock<HashSet<SessionId>>>>,
    next_id: AtomicU64,
    outbound_capacity: usize,
}

impl ConnectionRegistry {
    /// `outbound_capacity` bounds each session's queue of pending frames.
    pub fn new(outbound_capacity: usize) -> Self {
        ConnectionRegistry {
            sessions: DashMap::new(),
            channels: DashMap::new(),
            next_id: AtomicU64::new(1),
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    /// Register a new session and subscribe it to the ambient broadcast
    /// channel. Returns the receiving end of its outbound queue.
    pub fn register(&self) -> (SessionId, OutboundRx) {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.outbound_capacity);

        let handle = Arc::new(SessionHandle {
            id,
            tx,
            state: Mutex::new(HandleState::default()),
        });
        self.sessions.insert(id, handle);

        // Cannot fail: the session was inserted above and nobody else
        // knows its id yet.
        let _ = self.subscribe(id, Channel::broadcast());

        debug!(session = %id, "registered");
        (id, rx)
    }

    /// Remove a session from every channel.
    ///
    /// Idempotent: returns `false` if the session was already gone.
    pub fn unregister(&self, id: SessionId) -> bool {
        let Some((_, handle)) = self.sessions.remove(&id) else {
            return false;
        };

        let channels = {
            let mut state = handle.state.lock();
            state.closed = true;
            std::mem::take(&mut state.channels)
        };
        for channel in channels {
            if let Some(set) = self.existing_set(&channel) {
                set.write().remove(&id);
            }
        }

        debug!(session = %id, "unregistered");
        true
    }

    pub fn subscribe(&self, id: SessionId, channel: Channel) -> Result<(), RegistryError> {
        let handle = self.handle(id)?;
        let mut state = handle.state.lock();
        if state.closed {
            return Err(RegistryError::SessionNotFound(id));
        }
        if state.channels.insert(channel.clone()) {
            self.channel_set(&channel).write().insert(id);
        }
        Ok(())
    }

    /// Unsubscribing from a channel the session is not in is a no-op.
    pub fn unsubscribe(&self, id: SessionId, channel: &Channel) -> Result<(), RegistryError> {
        let handle = self.handle(id)?;
        let mut state = handle.state.lock();
        if state.closed {
            return Err(RegistryError::SessionNotFound(id));
        }
        if state.channels.remove(channel) {
            if let Some(set) = self.existing_set(channel) {
                set.write().remove(&id);
            }
        }
        Ok(())
    }

    pub fn members_of(&self, channel: &Channel) -> HashSet<SessionId> {
        let Some(set) = self.existing_set(channel) else {
            return HashSet::new();
        };
        let members = set.read();
        members
            .iter()
            .filter(|id| self.sessions.contains_key(*id))
            .copied()
            .collect()
    }

    pub fn channels_of(&self, id: SessionId) -> Vec<Channel> {
        match self.handle(id) {
            Ok(handle) => handle.state.lock().channels.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn is_registered(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|e| *e.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Push `frame` to every current member of `channel` except `skip`.
    ///
    /// Never blocks: a member whose queue is full is unregistered on the
    /// spot (its connection task then closes the socket), and a member that
    /// disappeared concurrently is skipped.
    pub fn deliver(&self, channel: &Channel, frame: &Outbound, skip: Option<SessionId>) -> Delivery {
        let recipients: Vec<Arc<SessionHandle>> = {
            let Some(set) = self.existing_set(channel) else {
                return Delivery::default();
            };
            let ids: Vec<SessionId> = set.read().iter().copied().collect();
            ids.into_iter()
                .filter(|id| Some(*id) != skip)
                .filter_map(|id| self.sessions.get(&id).map(|h| Arc::clone(h.value())))
                .collect()
        };

        let mut report = Delivery::default();
        for handle in recipients {
            match self.push(&handle, frame) {
                Ok(()) => report.delivered += 1,
                Err(RegistryError::SlowConsumer(id)) => report.evicted.push(id),
                Err(RegistryError::SessionNotFound(_)) => {}
            }
        }

        debug!(channel = %channel, delivered = report.delivered, evicted = report.evicted.len(), "fan-out");
        report
    }

    /// Push `frame` to one session.
    pub fn deliver_to(&self, id: SessionId, frame: &Outbound) -> Result<(), RegistryError> {
        let handle = self.handle(id)?;
        self.push(&handle, frame)
    }

    fn push(&self, handle: &SessionHandle, frame: &Outbound) -> Result<(), RegistryError> {
        match handle.tx.try_send(Arc::clone(frame)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(session = %handle.id, "outbound queue full, disconnecting slow client");
                self.unregister(handle.id);
                Err(RegistryError::SlowConsumer(handle.id))
            }
            Err(TrySendError::Closed(_)) => {
                self.unregister(handle.id);
                Err(RegistryError::SessionNotFound(handle.id))
            }
        }
    }

    fn handle(&self, id: SessionId) -> Result<Arc<SessionHandle>, RegistryError> {
        self.sessions
            .get(&id)
            .map(|h| Arc::clone(h.value()))
            .ok_or(RegistryError::SessionNotFound(id))
    }

    fn existing_set(&self, channel: &Channel) -> Option<Arc<RwLock<HashSet<SessionId>>>> {
        self.channels.get(channel).map(|s| Arc::clone(s.value()))
    }

    fn channel_set(&self, channel: &Channel) -> Arc<RwLock<HashSet<SessionId>>> {
        if let Some(set) = self.existing_set(channel) {
            return set;
        }
        Arc::clone(
            self.channels
                .entry(channel.clone())
                .or_insert_with(|| Arc::new(RwLock::new(HashSet::new())))
                .value(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(s: &str) -> Outbound {
        Arc::from(s)
    }

    #[test]
    fn register_joins_broadcast() {
        let reg = ConnectionRegistry::new(8);
        let (a, _rx) = reg.register();
        assert!(reg.members_of(&Channel::broadcast()).contains(&a));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn session_ids_are_unique() {
        let reg = ConnectionRegistry::new(8);
        let (a, _ra) = reg.register();
        let (b, _rb) = reg.register();
        assert_ne!(a, b);
    }

    #[test]
    fn subscribe_and_unsubscribe() {
        let reg = ConnectionRegistry::new(8);
        let (a, _ra) = reg.register();
        let (b, _rb) = reg.register();
        let plaza = Channel::room("plaza");

        reg.subscribe(a, plaza.clone()).unwrap();
        reg.subscribe(b, plaza.clone()).unwrap();
        assert_eq!(reg.members_of(&plaza), HashSet::from([a, b]));

        reg.unsubscribe(a, &plaza).unwrap();
        assert_eq!(reg.members_of(&plaza), HashSet::from([b]));

        // Not subscribed: no-op.
        reg.unsubscribe(a, &plaza).unwrap();
    }

    #[test]
    fn unregister_removes_from_every_channel_and_is_idempotent() {
        let reg = ConnectionRegistry::new(8);
        let (a, _ra) = reg.register();
        reg.subscribe(a, Channel::room("plaza")).unwrap();
        reg.subscribe(a, Channel::queue("acme")).unwrap();

        assert!(reg.unregister(a));
        assert!(!reg.unregister(a));

        assert!(reg.members_of(&Channel::room("plaza")).is_empty());
        assert!(reg.members_of(&Channel::queue("acme")).is_empty());
        assert!(reg.members_of(&Channel::broadcast()).is_empty());
        assert!(reg.channels_of(a).is_empty());
    }

    #[test]
    fn unknown_session_cannot_subscribe() {
        let reg = ConnectionRegistry::new(8);
        let (a, _ra) = reg.register();
        reg.unregister(a);

        assert_eq!(
            reg.subscribe(a, Channel::room("plaza")),
            Err(RegistryError::SessionNotFound(a))
        );
        assert!(reg.members_of(&Channel::room("plaza")).is_empty());
    }

    #[test]
    fn deliver_reaches_members_only() {
        let reg = ConnectionRegistry::new(8);
        let (a, mut ra) = reg.register();
        let (b, mut rb) = reg.register();
        let (_c, mut rc) = reg.register();
        let plaza = Channel::room("plaza");
        reg.subscribe(a, plaza.clone()).unwrap();
        reg.subscribe(b, plaza.clone()).unwrap();

        let report = reg.deliver(&plaza, &frame("hello"), None);
        assert_eq!(report.delivered, 2);
        assert_eq!(&*ra.try_recv().unwrap(), "hello");
        assert_eq!(&*rb.try_recv().unwrap(), "hello");
        assert!(rc.try_recv().is_err());

        let report = reg.deliver(&plaza, &frame("not you"), Some(a));
        assert_eq!(report.delivered, 1);
        assert!(ra.try_recv().is_err());
        assert_eq!(&*rb.try_recv().unwrap(), "not you");
    }

    #[test]
    fn departed_session_receives_nothing() {
        let reg = ConnectionRegistry::new(8);
        let (a, mut ra) = reg.register();
        let plaza = Channel::room("plaza");
        reg.subscribe(a, plaza.clone()).unwrap();
        reg.unregister(a);

        let report = reg.deliver(&plaza, &frame("late"), None);
        assert_eq!(report.delivered, 0);
        assert!(ra.try_recv().is_err());
        assert_eq!(
            reg.deliver_to(a, &frame("late")),
            Err(RegistryError::SessionNotFound(a))
        );
    }

    #[test]
    fn full_queue_evicts_without_blocking_others() {
        let reg = ConnectionRegistry::new(1);
        let (slow, _slow_rx) = reg.register();
        let (fast, mut fast_rx) = reg.register();
        let plaza = Channel::room("plaza");
        reg.subscribe(slow, plaza.clone()).unwrap();
        reg.subscribe(fast, plaza.clone()).unwrap();

        reg.deliver(&plaza, &frame("one"), None);
        assert_eq!(&*fast_rx.try_recv().unwrap(), "one");

        let report = reg.deliver(&plaza, &frame("two"), None);
        assert_eq!(report.evicted, vec![slow]);
        assert_eq!(report.delivered, 1);
        assert_eq!(&*fast_rx.try_recv().unwrap(), "two");

        assert!(!reg.is_registered(slow));
        assert_eq!(reg.members_of(&plaza), HashSet::from([fast]));
    }

    #[tokio::test]
    async fn eviction_closes_the_outbound_queue() {
        let reg = ConnectionRegistry::new(1);
        let (slow, mut slow_rx) = reg.register();
        reg.deliver_to(slow, &frame("one")).unwrap();
        assert_eq!(
            reg.deliver_to(slow, &frame("two")),
            Err(RegistryError::SlowConsumer(slow))
        );

        // The buffered frame drains, then the queue reports closed.
        assert_eq!(&*slow_rx.recv().await.unwrap(), "one");
        assert!(slow_rx.recv().await.is_none());
    }

    #[test]
    fn dropped_receiver_is_treated_as_gone() {
        let reg = ConnectionRegistry::new(4);
        let (a, ra) = reg.register();
        drop(ra);

        assert_eq!(
            reg.deliver_to(a, &frame("x")),
            Err(RegistryError::SessionNotFound(a))
        );
        assert!(!reg.is_registered(a));
    }
}
