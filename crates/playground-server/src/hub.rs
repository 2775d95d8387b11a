//! Broadcast hub.
//!
//! The hub sits between the world graph and the connection registry:
//!
//! ```text
//! client request ─▶ Hub ─▶ World (store) ─▶ ServerMessage
//!                           │
//!                           └─▶ ConnectionRegistry::members_of(channel)
//!                                  └─▶ per-session bounded queues
//! ```
//!
//! Each mutation of a room holds that room's channel lock from the store
//! write through the fan-out, so every subscriber sees a room's packets in
//! the order the store applied them. Unrelated rooms never contend.
//!
//! Packets are encoded once per broadcast and shared by every recipient.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use playground_core::messages::{ChatMessage, JoinRoom, MediaQueued, QueueRef};
use playground_core::{Character, Position, ServerMessage, Song, World, SPAWN_POINT};
use playground_protocol::{encode_server, MAX_CHAT_LEN};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::HubError;
use crate::locks::ChannelLocks;
use crate::queue::QueueManager;
use crate::registry::{ConnectionRegistry, Delivery};
use crate::types::{Channel, Outbound, OutboundRx, SessionId};

/// Name given to characters that join without one.
pub const DEFAULT_NAME: &str = "visitor";

/// Encode a packet into a frame shared by all its recipients.
pub(crate) fn encode_frame(msg: &ServerMessage) -> Result<Outbound, HubError> {
    Ok(Arc::from(encode_server(msg)?))
}

/// The character a session controls and the room it is in.
#[derive(Debug, Clone, PartialEq)]
pub struct Presence {
    pub character_id: String,
    pub name: String,
    pub room: String,
}

#[derive(Debug)]
pub struct Hub {
    world: World,
    registry: Arc<ConnectionRegistry>,
    locks: Arc<ChannelLocks>,
    queues: QueueManager,

    presence: DashMap<SessionId, Presence>,
    /// character id → controlling session
    owners: DashMap<String, SessionId>,
}

impl Hub {
    pub fn new(world: World, registry: Arc<ConnectionRegistry>) -> Self {
        let locks = Arc::new(ChannelLocks::new());
        let queues = QueueManager::new(world.clone(), registry.clone(), locks.clone());
        Hub {
            world,
            registry,
            locks,
            queues,
            presence: DashMap::new(),
            owners: DashMap::new(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn queues(&self) -> &QueueManager {
        &self.queues
    }

    pub fn presence_of(&self, session: SessionId) -> Option<Presence> {
        self.presence.get(&session).map(|p| p.value().clone())
    }

    /// Session currently controlling `character_id`.
    pub fn owner_of(&self, character_id: &str) -> Option<SessionId> {
        self.owners.get(character_id).map(|s| *s.value())
    }

    // -------------------------------------------------------------------------
    // Delivery
    // -------------------------------------------------------------------------

    /// Deliver to the members of `channel` at the moment of the call.
    pub fn send(&self, channel: &Channel, msg: &ServerMessage) -> Result<Delivery, HubError> {
        self.send_except(channel, msg, None)
    }

    pub fn send_except(
        &self,
        channel: &Channel,
        msg: &ServerMessage,
        skip: Option<SessionId>,
    ) -> Result<Delivery, HubError> {
        let frame = encode_frame(msg)?;
        Ok(self.registry.deliver(channel, &frame, skip))
    }

    /// Deliver to one session. Fails with `SessionNotFound` if it is gone.
    pub fn send_to(&self, session: SessionId, msg: &ServerMessage) -> Result<(), HubError> {
        let frame = encode_frame(msg)?;
        self.registry.deliver_to(session, &frame)?;
        Ok(())
    }

    /// Like [`Hub::send_to`], treating a departed session as delivered.
    fn reply(&self, session: SessionId, msg: &ServerMessage) -> Result<(), HubError> {
        match self.send_to(session, msg) {
            Err(HubError::SessionNotFound(_)) => {
                debug!(session = %session, "reply to departed session dropped");
                Ok(())
            }
            other => other,
        }
    }

    // -------------------------------------------------------------------------
    // Session lifecycle
    // -------------------------------------------------------------------------

    /// Register a new session. It has no character until it joins a room.
    pub fn connect(&self) -> (SessionId, OutboundRx) {
        self.registry.register()
    }

    /// Enter `req.room`.
    ///
    /// The first join creates the session's character. Joining another room
    /// moves it (through `req.hallway_id` when given). Joining the current
    /// room re-sends its snapshot.
    pub async fn join(&self, session: SessionId, req: JoinRoom) -> Result<(), HubError> {
        match self.presence_of(session) {
            None => self.enter(session, req).await,
            Some(p) if p.room == req.room => {
                let snapshot = self.world.room_snapshot(&p.room).await?;
                self.reply(session, &ServerMessage::RoomSnapshot(snapshot))
            }
            Some(p) => {
                self.switch_room(session, &p, &req.room, req.hallway_id.as_deref())
                    .await
            }
        }
    }

    async fn enter(&self, session: SessionId, req: JoinRoom) -> Result<(), HubError> {
        if !self.registry.is_registered(session) {
            return Err(HubError::SessionNotFound(session));
        }

        let name = req
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_NAME)
            .to_string();
        let character = Character {
            id: Uuid::new_v4().to_string(),
            name: name.clone(),
            color: req.color,
            room: req.room.clone(),
            x: SPAWN_POINT.x,
            y: SPAWN_POINT.y,
            queue_id: None,
        };

        // Lock entries are only created for rooms that exist.
        self.world.room(&req.room).await?;
        let channel = Channel::room(&req.room);
        let guard = self.locks.lock(&channel).await;

        self.world.create_character(&character).await?;
        self.presence.insert(
            session,
            Presence {
                character_id: character.id.clone(),
                name,
                room: req.room.clone(),
            },
        );
        self.owners.insert(character.id.clone(), session);

        if let Err(e) = self.registry.subscribe(session, channel.clone()) {
            // Disconnected while the character was being created. Whoever
            // takes the presence entry cleans up.
            drop(guard);
            if let Some((_, p)) = self.presence.remove(&session) {
                self.depart(session, p).await;
            }
            return Err(e.into());
        }

        info!(session = %session, character = %character.id, room = %req.room, "joined");
        self.send_except(
            &channel,
            &ServerMessage::character_joined(character),
            Some(session),
        )?;

        let snapshot = self.world.room_snapshot(&req.room).await?;
        self.reply(session, &ServerMessage::RoomSnapshot(snapshot))
    }

    async fn switch_room(
        &self,
        session: SessionId,
        presence: &Presence,
        target: &str,
        hallway_id: Option<&str>,
    ) -> Result<(), HubError> {
        let arrival = match hallway_id {
            Some(h) => {
                let hallway = self.world.hallway_in(&presence.room, h).await?;
                if hallway.to != target {
                    return Err(HubError::invalid(format!(
                        "hallway {h} leads to {}, not {target}",
                        hallway.to
                    )));
                }
                Some(hallway.destination())
            }
            None => None,
        };

        self.world.room(target).await?;
        let from = Channel::room(&presence.room);
        let to = Channel::room(target);
        let _guards = self.locks.lock_pair(&from, &to).await;

        let id = &presence.character_id;
        self.world
            .move_character(id, &presence.room, target, arrival)
            .await?;

        if let Some(mut p) = self.presence.get_mut(&session) {
            p.room = target.to_string();
        }
        self.registry.unsubscribe(session, &from)?;
        self.registry.subscribe(session, to.clone())?;

        info!(session = %session, character = %id, from = %presence.room, to = %target, "changed room");
        self.send(&from, &ServerMessage::character_left(id.as_str()))?;

        let character = self.world.character(id).await?;
        self.send_except(&to, &ServerMessage::character_joined(character), Some(session))?;

        let snapshot = self.world.room_snapshot(target).await?;
        self.reply(session, &ServerMessage::RoomSnapshot(snapshot))
    }

    /// Leave the current room without closing the session.
    ///
    /// Returns `false` if the session had no character.
    pub async fn leave(&self, session: SessionId) -> bool {
        let Some((_, presence)) = self.presence.remove(&session) else {
            return false;
        };
        // Ignored: an unregistered session has no subscriptions left.
        let _ = self
            .registry
            .unsubscribe(session, &Channel::room(&presence.room));
        self.depart(session, presence).await;
        true
    }

    /// Unregister `session` and remove its character from the world.
    ///
    /// Idempotent: a second call finds nothing to do and sends nothing.
    pub async fn disconnect(&self, session: SessionId) {
        let was_registered = self.registry.unregister(session);
        let had_character = self.leave(session).await;
        if was_registered || had_character {
            info!(session = %session, "disconnected");
        }
    }

    /// Disconnect every session. Their outbound queues close, which ends
    /// each connection's writer.
    pub async fn shutdown(&self) {
        let mut sessions: HashSet<SessionId> = self.registry.session_ids().into_iter().collect();
        sessions.extend(self.presence.iter().map(|p| *p.key()));

        info!(sessions = sessions.len(), "shutting down hub");
        for session in sessions {
            self.disconnect(session).await;
        }
    }

    /// Caller has already removed `presence` from the presence map, so this
    /// runs at most once per character.
    async fn depart(&self, session: SessionId, presence: Presence) {
        let id = presence.character_id;
        self.owners.remove_if(&id, |_, owner| *owner == session);

        match self.world.character(&id).await {
            Ok(c) => {
                if let Some(sponsor) = c.queue_id {
                    if let Err(e) = self.queues.leave(&sponsor, &id).await {
                        warn!(character = %id, sponsor = %sponsor, error = %e, "failed to leave queue on departure");
                    }
                }
            }
            Err(e) => warn!(character = %id, error = %e, "could not read departing character"),
        }

        let channel = Channel::room(&presence.room);
        let _guard = self.locks.lock(&channel).await;

        let room = match self.world.remove_character(&id).await {
            Ok(Some(removed)) => removed.room,
            Ok(None) => presence.room,
            Err(e) => {
                warn!(character = %id, error = %e, "failed to remove departing character");
                presence.room
            }
        };

        let left = ServerMessage::character_left(id.as_str());
        if let Err(e) = self.send(&Channel::room(&room), &left) {
            warn!(character = %id, error = %e, "failed to announce departure");
        }
        debug!(session = %session, character = %id, room = %room, "character removed");
    }

    // -------------------------------------------------------------------------
    // In-room actions
    // -------------------------------------------------------------------------

    fn joined(&self, session: SessionId) -> Result<Presence, HubError> {
        self.presence_of(session).ok_or(HubError::NotJoined)
    }

    pub async fn move_to(&self, session: SessionId, x: f64, y: f64) -> Result<(), HubError> {
        let position = Position::new(x, y);
        if !position.is_valid() {
            return Err(HubError::invalid(format!(
                "position ({x}, {y}) is outside the room"
            )));
        }
        let p = self.joined(session)?;

        let channel = Channel::room(&p.room);
        let _guard = self.locks.lock(&channel).await;

        self.world.set_position(&p.character_id, position).await?;
        self.send(
            &channel,
            &ServerMessage::character_moved(p.character_id.as_str(), x, y),
        )?;
        Ok(())
    }

    pub async fn toggle(&self, session: SessionId, element_id: &str) -> Result<(), HubError> {
        let p = self.joined(session)?;

        let channel = Channel::room(&p.room);
        let _guard = self.locks.lock(&channel).await;

        let element = self.world.toggle_element(&p.room, element_id).await?;
        let state = element.state.unwrap_or_default();
        self.send(&channel, &ServerMessage::element_toggled(element_id, state))?;
        Ok(())
    }

    pub async fn chat(&self, session: SessionId, message: &str) -> Result<(), HubError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(HubError::invalid("chat message is empty"));
        }
        if message.chars().count() > MAX_CHAT_LEN {
            return Err(HubError::invalid(format!(
                "chat message is longer than {MAX_CHAT_LEN} characters"
            )));
        }
        let p = self.joined(session)?;

        let channel = Channel::room(&p.room);
        let _guard = self.locks.lock(&channel).await;

        self.send(
            &channel,
            &ServerMessage::Chat(ChatMessage {
                character_id: p.character_id,
                name: p.name,
                message: message.to_string(),
            }),
        )?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Queues and media
    // -------------------------------------------------------------------------

    pub async fn queue_join(&self, session: SessionId, sponsor: &str) -> Result<usize, HubError> {
        let p = self.joined(session)?;
        self.queues.enqueue(sponsor, &p.character_id).await
    }

    pub async fn queue_leave(&self, session: SessionId, sponsor: &str) -> Result<bool, HubError> {
        let p = self.joined(session)?;
        self.queues.leave(sponsor, &p.character_id).await
    }

    pub async fn queue_subscribe(&self, session: SessionId, sponsor: &str) -> Result<(), HubError> {
        self.queues.subscribe(session, sponsor).await
    }

    pub fn queue_unsubscribe(&self, session: SessionId, sponsor: &str) -> Result<(), HubError> {
        self.queues.unsubscribe(session, sponsor)
    }

    /// Call the head of `sponsor`'s queue. Returns the called character.
    pub async fn queue_next(&self, sponsor: &str) -> Result<Option<String>, HubError> {
        let Some(head) = self.queues.dequeue(sponsor).await? else {
            debug!(sponsor = %sponsor, "queue-next on empty queue");
            return Ok(None);
        };

        if let Some(owner) = self.owner_of(&head) {
            let called = ServerMessage::QueueCalled(QueueRef {
                sponsor_id: sponsor.to_string(),
            });
            self.reply(owner, &called)?;
        }
        Ok(Some(head))
    }

    /// Append an already-resolved song to the jukebox and announce it on
    /// the broadcast channel.
    pub async fn queue_media(&self, session: SessionId, mut song: Song) -> Result<(), HubError> {
        if song.vid_code.trim().is_empty() {
            return Err(HubError::invalid("song has no video code"));
        }
        if song.queued_by.is_none() {
            song.queued_by = self.presence_of(session).map(|p| p.name);
        }

        let channel = Channel::broadcast();
        let _guard = self.locks.lock(&channel).await;

        self.world.append_song(&song).await?;
        info!(session = %session, song = %song.id, "media queued");
        self.send(&channel, &ServerMessage::MediaQueued(MediaQueued { song }))?;
        Ok(())
    }
}
