//! Per-channel mutation locks.
//!
//! Every mutation of a room or queue runs while holding that channel's
//! lock, from the store write through the broadcast. Two mutations of the
//! same channel therefore reach subscribers in the order they were applied
//! to the store, while mutations of different channels never wait on each
//! other.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::Channel;

#[derive(Debug, Default)]
pub struct ChannelLocks {
    locks: DashMap<Channel, Arc<Mutex<()>>>,
}

impl ChannelLocks {
    pub fn new() -> Self {
        ChannelLocks::default()
    }

    fn handle(&self, channel: &Channel) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(channel) {
            return Arc::clone(lock.value());
        }
        Arc::clone(
            self.locks
                .entry(channel.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }

    pub async fn lock(&self, channel: &Channel) -> OwnedMutexGuard<()> {
        self.handle(channel).lock_owned().await
    }

    /// Lock two channels in a fixed order so concurrent opposite moves
    /// (A → B and B → A) cannot deadlock.
    pub async fn lock_pair(
        &self,
        a: &Channel,
        b: &Channel,
    ) -> (OwnedMutexGuard<()>, Option<OwnedMutexGuard<()>>) {
        if a == b {
            return (self.lock(a).await, None);
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let g1 = self.lock(first).await;
        let g2 = self.lock(second).await;
        (g1, Some(g2))
    }
}
