//! Routing of decoded client requests to the hub.
//!
//! One arm per client packet kind. The match is exhaustive, so a new
//! `ClientMessage` variant does not compile until it is routed here.
//!
//! Reply policy:
//! - room events (`character-*`, `element-toggled`, `chat`): the room's
//!   members, via the hub.
//! - `queue-snapshot`: the queue's subscribers.
//! - `media-queued`: every session (ambient `broadcast` channel).
//! - failures: only the requesting session, as an `error` packet.

use playground_core::{ClientMessage, ServerMessage};
use tracing::debug;

use crate::error::HubError;
use crate::hub::Hub;
use crate::types::SessionId;

/// Apply one request from `session`.
pub async fn handle_message(
    hub: &Hub,
    session: SessionId,
    msg: ClientMessage,
) -> Result<(), HubError> {
    match msg {
        ClientMessage::JoinRoom(req) => hub.join(session, req).await,
        ClientMessage::Move(m) => hub.move_to(session, m.x, m.y).await,
        ClientMessage::ToggleElement(t) => hub.toggle(session, &t.element_id).await,
        ClientMessage::Chat(c) => hub.chat(session, &c.message).await,
        ClientMessage::QueueJoin(q) => {
            let position = hub.queue_join(session, &q.sponsor_id).await?;
            debug!(session = %session, sponsor = %q.sponsor_id, position, "queue position");
            Ok(())
        }
        ClientMessage::QueueLeave(q) => hub.queue_leave(session, &q.sponsor_id).await.map(|_| ()),
        ClientMessage::QueueSubscribe(q) => hub.queue_subscribe(session, &q.sponsor_id).await,
        ClientMessage::QueueUnsubscribe(q) => hub.queue_unsubscribe(session, &q.sponsor_id),
        ClientMessage::QueueNext(q) => hub.queue_next(&q.sponsor_id).await.map(|_| ()),
        ClientMessage::QueueMedia(m) => hub.queue_media(session, m.song).await,
    }
}

/// Turn a failed request into the reply the client sees.
///
/// Returns `None` for failures that stay server-side: the session is gone,
/// so there is nobody to tell.
pub fn rejection(err: &HubError) -> Option<ServerMessage> {
    match err {
        HubError::SessionNotFound(_) => None,
        other => Some(other.to_notice()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use playground_core::messages::{JoinRoom, Move, QueueRef};
    use playground_core::{ErrorCode, MemoryStore, Room, Sponsor, World};

    use crate::registry::ConnectionRegistry;

    async fn hub() -> Hub {
        let world = World::new(Arc::new(MemoryStore::new()));
        world.insert_room(&Room::new("plaza")).await.unwrap();
        world
            .insert_sponsor(&Sponsor {
                id: "acme".into(),
                name: "Acme".into(),
                zoom: None,
                color: None,
            })
            .await
            .unwrap();
        Hub::new(world, Arc::new(ConnectionRegistry::new(32)))
    }

    #[tokio::test]
    async fn requests_route_to_the_hub() {
        let hub = hub().await;
        let (s, _rx) = hub.connect();

        handle_message(
            &hub,
            s,
            ClientMessage::JoinRoom(JoinRoom {
                room: "plaza".into(),
                name: None,
                color: None,
                hallway_id: None,
            }),
        )
        .await
        .unwrap();
        handle_message(&hub, s, ClientMessage::Move(Move { x: 0.25, y: 0.75 }))
            .await
            .unwrap();
        handle_message(
            &hub,
            s,
            ClientMessage::QueueJoin(QueueRef {
                sponsor_id: "acme".into(),
            }),
        )
        .await
        .unwrap();

        let id = hub.presence_of(s).unwrap().character_id;
        assert_eq!(hub.queues().position_of("acme", &id).await.unwrap(), Some(0));

        let called = handle_message(
            &hub,
            s,
            ClientMessage::QueueNext(QueueRef {
                sponsor_id: "acme".into(),
            }),
        )
        .await;
        assert!(called.is_ok());
        assert_eq!(hub.queues().position_of("acme", &id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn actions_before_join_are_rejected() {
        let hub = hub().await;
        let (s, _rx) = hub.connect();
        let err = handle_message(&hub, s, ClientMessage::Move(Move { x: 0.5, y: 0.5 }))
            .await
            .unwrap_err();

        match rejection(&err) {
            Some(ServerMessage::Error(n)) => {
                assert_eq!(n.code, ErrorCode::NotJoined);
                assert!(!n.retryable);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn departed_sessions_get_no_reply() {
        assert!(rejection(&HubError::SessionNotFound(SessionId(9))).is_none());
    }
}
