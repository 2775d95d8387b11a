//! Sponsor queues.
//!
//! Each sponsor owns a FIFO of waiting characters stored under
//! `queue:<sponsorId>`. Every mutation runs under that queue's channel lock
//! and ends with a `queue-snapshot` pushed to the queue's subscribers, so
//! subscribers see snapshots in the order the store applied them.
//!
//! A character waits in at most one queue; joining another queue takes it
//! out of the previous one.

use std::sync::Arc;

use playground_core::{Character, ServerMessage, World};
use tracing::{debug, error, warn};

use crate::error::HubError;
use crate::hub::encode_frame;
use crate::locks::ChannelLocks;
use crate::registry::ConnectionRegistry;
use crate::types::{Channel, SessionId};

#[derive(Debug, Clone)]
pub struct QueueManager {
    world: World,
    registry: Arc<ConnectionRegistry>,
    locks: Arc<ChannelLocks>,
}

impl QueueManager {
    pub fn new(world: World, registry: Arc<ConnectionRegistry>, locks: Arc<ChannelLocks>) -> Self {
        QueueManager {
            world,
            registry,
            locks,
        }
    }

    /// Append `character` to `sponsor`'s queue unless it is already there.
    ///
    /// Returns the zero-based position either way. A character waiting in
    /// another queue is added here before it is taken out of the old one,
    /// so a failure part way leaves it where it was.
    pub async fn enqueue(&self, sponsor: &str, character: &str) -> Result<usize, HubError> {
        self.world.sponsor(sponsor).await?;
        let current: Character = self.world.character(character).await?;
        let previous = current.queue_id.filter(|q| q != sponsor);

        let channel = Channel::queue(sponsor);
        let _guards = match &previous {
            Some(other) => {
                self.locks
                    .lock_pair(&channel, &Channel::queue(other))
                    .await
            }
            None => (self.locks.lock(&channel).await, None),
        };

        let ids = self.world.queue_ids(sponsor).await?;
        if let Some(pos) = ids.iter().position(|id| id == character) {
            return Ok(pos);
        }

        let len = self.world.queue_push(sponsor, character).await?;
        if let Err(e) = self.world.set_character_queue(character, Some(sponsor)).await {
            self.undo_enqueue(sponsor, character, previous.as_deref()).await;
            return Err(e.into());
        }

        if let Some(other) = previous.as_deref() {
            match self.world.queue_remove(other, character).await {
                Ok(true) => self.broadcast_snapshot(other).await,
                Ok(false) => {}
                Err(e) => {
                    self.undo_enqueue(sponsor, character, previous.as_deref()).await;
                    return Err(e.into());
                }
            }
        }

        self.broadcast_snapshot(sponsor).await;
        debug!(sponsor = %sponsor, character = %character, position = len - 1, "enqueued");
        Ok(len - 1)
    }

    /// Best effort: take `character` back out of `sponsor` and point its
    /// marker at `previous` again. Caller holds the locks.
    async fn undo_enqueue(&self, sponsor: &str, character: &str, previous: Option<&str>) {
        if let Err(e) = self.world.queue_remove(sponsor, character).await {
            error!(sponsor = %sponsor, character = %character, error = %e, "failed to undo enqueue");
        }
        if let Err(e) = self.world.set_character_queue(character, previous).await {
            error!(character = %character, error = %e, "failed to restore queue marker");
        }
    }

    /// Remove and return the head of the queue; `None` when empty.
    pub async fn dequeue(&self, sponsor: &str) -> Result<Option<String>, HubError> {
        self.world.sponsor(sponsor).await?;

        let channel = Channel::queue(sponsor);
        let _guard = self.locks.lock(&channel).await;

        let Some(head) = self.world.queue_pop(sponsor).await? else {
            return Ok(None);
        };
        if let Err(e) = self.world.set_character_queue(&head, None).await {
            warn!(character = %head, error = %e, "could not clear queue marker");
        }

        self.broadcast_snapshot(sponsor).await;
        debug!(sponsor = %sponsor, character = %head, "dequeued");
        Ok(Some(head))
    }

    /// Take `character` out of `sponsor`'s queue. Returns `false` if it was
    /// not queued there.
    pub async fn leave(&self, sponsor: &str, character: &str) -> Result<bool, HubError> {
        self.world.sponsor(sponsor).await?;

        let channel = Channel::queue(sponsor);
        let _guard = self.locks.lock(&channel).await;

        if !self.world.queue_remove(sponsor, character).await? {
            return Ok(false);
        }
        if let Err(e) = self.world.set_character_queue(character, None).await {
            warn!(character = %character, error = %e, "could not clear queue marker");
        }

        self.broadcast_snapshot(sponsor).await;
        Ok(true)
    }

    pub async fn position_of(&self, sponsor: &str, character: &str) -> Result<Option<usize>, HubError> {
        let ids = self.world.queue_ids(sponsor).await?;
        Ok(ids.iter().position(|id| id == character))
    }

    /// Queued characters, head first.
    pub async fn snapshot(&self, sponsor: &str) -> Result<Vec<Character>, HubError> {
        let ids = self.world.queue_ids(sponsor).await?;
        Ok(self.world.characters(&ids).await?)
    }

    /// Subscribe `session` to the queue and send it the current snapshot.
    pub async fn subscribe(&self, session: SessionId, sponsor: &str) -> Result<(), HubError> {
        self.world.sponsor(sponsor).await?;

        let channel = Channel::queue(sponsor);
        let _guard = self.locks.lock(&channel).await;

        self.registry.subscribe(session, channel)?;
        let characters = self.snapshot(sponsor).await?;
        let frame = encode_frame(&ServerMessage::queue_snapshot(sponsor, characters))?;
        self.registry.deliver_to(session, &frame)?;
        Ok(())
    }

    pub fn unsubscribe(&self, session: SessionId, sponsor: &str) -> Result<(), HubError> {
        self.registry.unsubscribe(session, &Channel::queue(sponsor))?;
        Ok(())
    }

    /// Caller holds the queue's lock.
    async fn broadcast_snapshot(&self, sponsor: &str) {
        let characters = match self.snapshot(sponsor).await {
            Ok(c) => c,
            Err(e) => {
                warn!(sponsor = %sponsor, error = %e, "queue changed but snapshot read failed");
                return;
            }
        };
        match encode_frame(&ServerMessage::queue_snapshot(sponsor, characters)) {
            Ok(frame) => {
                self.registry.deliver(&Channel::queue(sponsor), &frame, None);
            }
            Err(e) => error!(sponsor = %sponsor, error = %e, "failed to encode queue snapshot"),
        }
    }
}
