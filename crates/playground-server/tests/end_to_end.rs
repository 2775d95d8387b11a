//! Hub-level scenarios, driven through each session's outbound queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use playground_core::messages::{JoinRoom, QueueRef};
use playground_core::{
    Element, Fields, MemoryStore, Room, ServerMessage, Sponsor, StateStore, StoreError, World,
};
use playground_protocol::decode_server;
use playground_server::types::OutboundRx;
use playground_server::{dispatch, Channel, ConnectionRegistry, Hub, HubError};

fn drain(rx: &mut OutboundRx) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        out.push(decode_server(frame.as_bytes()).expect("server frames decode"));
    }
    out
}

fn join(room: &str, name: &str) -> JoinRoom {
    JoinRoom {
        room: room.into(),
        name: Some(name.into()),
        color: None,
        hallway_id: None,
    }
}

async fn seeded(store: Arc<dyn StateStore>, buffer: usize) -> Hub {
    let world = World::new(store);
    world.insert_room(&Room::new("plaza")).await.unwrap();
    world.insert_room(&Room::new("home")).await.unwrap();
    world
        .insert_element(&Element {
            id: "lamp".into(),
            room: "plaza".into(),
            path: "street_lamp.svg,street_lamp_off.svg".into(),
            x: 0.3,
            y: 0.3,
            width: 0.02,
            changing_image_path: false,
            changing_paths: None,
            changing_interval: None,
            changing_randomly: false,
            state: Some(0),
        })
        .await
        .unwrap();
    world
        .insert_sponsor(&Sponsor {
            id: "acme".into(),
            name: "Acme".into(),
            zoom: None,
            color: None,
        })
        .await
        .unwrap();
    Hub::new(world, Arc::new(ConnectionRegistry::new(buffer)))
}

async fn hub() -> Hub {
    seeded(Arc::new(MemoryStore::new()), 64).await
}

#[tokio::test]
async fn plaza_scenario() {
    let hub = hub().await;

    // B is already in the plaza.
    let (b, mut rb) = hub.connect();
    hub.join(b, join("plaza", "bea")).await.unwrap();
    let b_id = hub.presence_of(b).unwrap().character_id;
    drain(&mut rb);

    // A joins and gets a snapshot listing B, itself and the lamp.
    let (a, mut ra) = hub.connect();
    hub.join(a, join("plaza", "ada")).await.unwrap();
    let a_id = hub.presence_of(a).unwrap().character_id;

    match drain(&mut ra).as_slice() {
        [ServerMessage::RoomSnapshot(snap)] => {
            let ids: Vec<&str> = snap.characters.iter().map(|c| c.id.as_str()).collect();
            assert!(ids.contains(&b_id.as_str()));
            assert!(ids.contains(&a_id.as_str()));
            assert_eq!(snap.elements[0].id, "lamp");
        }
        other => panic!("A expected one snapshot, got {other:?}"),
    }

    // B sees exactly one character-joined for A.
    match drain(&mut rb).as_slice() {
        [ServerMessage::CharacterJoined(j)] => assert_eq!(j.character.id, a_id),
        other => panic!("B expected one character-joined, got {other:?}"),
    }

    // A moves; B sees exactly one character-moved with the coordinate.
    hub.move_to(a, 0.5, 0.5).await.unwrap();
    match drain(&mut rb).as_slice() {
        [ServerMessage::CharacterMoved(m)] => {
            assert_eq!(m.character_id, a_id);
            assert_eq!((m.x, m.y), (0.5, 0.5));
        }
        other => panic!("B expected one character-moved, got {other:?}"),
    }
    drain(&mut ra);

    // A disconnects; B sees exactly one character-left and A is gone.
    hub.disconnect(a).await;
    match drain(&mut rb).as_slice() {
        [ServerMessage::CharacterLeft(l)] => assert_eq!(l.character_id, a_id),
        other => panic!("B expected one character-left, got {other:?}"),
    }
    assert!(!hub.registry().members_of(&Channel::room("plaza")).contains(&a));
    assert!(!hub
        .world()
        .room_character_ids("plaza")
        .await
        .unwrap()
        .contains(&a_id));
}

#[tokio::test]
async fn disconnect_twice_sends_one_departure() {
    let hub = hub().await;
    let (a, _ra) = hub.connect();
    let (b, mut rb) = hub.connect();
    hub.join(a, join("plaza", "ada")).await.unwrap();
    hub.join(b, join("plaza", "bea")).await.unwrap();
    drain(&mut rb);

    hub.disconnect(a).await;
    hub.disconnect(a).await;

    let lefts = drain(&mut rb)
        .into_iter()
        .filter(|m| matches!(m, ServerMessage::CharacterLeft(_)))
        .count();
    assert_eq!(lefts, 1);
}

#[tokio::test]
async fn departed_session_gets_nothing_and_send_to_reports_it() {
    let hub = hub().await;
    let (a, mut ra) = hub.connect();
    let (b, _rb) = hub.connect();
    hub.join(a, join("plaza", "ada")).await.unwrap();
    hub.join(b, join("plaza", "bea")).await.unwrap();
    hub.disconnect(a).await;
    drain(&mut ra);

    hub.move_to(b, 0.1, 0.1).await.unwrap();
    assert!(drain(&mut ra).is_empty());

    let err = hub
        .send_to(a, &ServerMessage::character_left("nobody"))
        .unwrap_err();
    assert!(matches!(err, HubError::SessionNotFound(s) if s == a));
}

#[tokio::test]
async fn room_change_notifies_both_rooms() {
    let hub = hub().await;
    let (a, mut ra) = hub.connect();
    let (p, mut rp) = hub.connect();
    let (h, mut rh) = hub.connect();
    hub.join(a, join("plaza", "ada")).await.unwrap();
    hub.join(p, join("plaza", "pat")).await.unwrap();
    hub.join(h, join("home", "hal")).await.unwrap();
    let a_id = hub.presence_of(a).unwrap().character_id;
    for rx in [&mut ra, &mut rp, &mut rh] {
        drain(rx);
    }

    hub.join(a, join("home", "ada")).await.unwrap();

    assert!(matches!(
        drain(&mut rp).as_slice(),
        [ServerMessage::CharacterLeft(l)] if l.character_id == a_id
    ));
    assert!(matches!(
        drain(&mut rh).as_slice(),
        [ServerMessage::CharacterJoined(j)] if j.character.id == a_id
    ));
    assert!(matches!(
        drain(&mut ra).as_slice(),
        [ServerMessage::RoomSnapshot(s)] if s.room.id == "home" && s.characters.len() == 2
    ));

    let world = hub.world();
    assert!(world.room_character_ids("home").await.unwrap().contains(&a_id));
    assert!(!world.room_character_ids("plaza").await.unwrap().contains(&a_id));
}

#[tokio::test]
async fn queue_next_calls_the_head_and_updates_subscribers() {
    let hub = hub().await;
    let (staff, mut rs) = hub.connect();
    let (v1, mut r1) = hub.connect();
    let (v2, mut r2) = hub.connect();
    hub.join(v1, join("plaza", "one")).await.unwrap();
    hub.join(v2, join("plaza", "two")).await.unwrap();
    hub.queue_subscribe(staff, "acme").await.unwrap();

    assert_eq!(hub.queue_join(v1, "acme").await.unwrap(), 0);
    assert_eq!(hub.queue_join(v2, "acme").await.unwrap(), 1);
    assert_eq!(hub.queue_join(v1, "acme").await.unwrap(), 0);
    drain(&mut r1);
    drain(&mut r2);
    drain(&mut rs);

    let v1_id = hub.presence_of(v1).unwrap().character_id;
    assert_eq!(hub.queue_next("acme").await.unwrap(), Some(v1_id));

    assert!(matches!(
        drain(&mut r1).as_slice(),
        [ServerMessage::QueueCalled(QueueRef { sponsor_id })] if sponsor_id == "acme"
    ));
    assert!(drain(&mut r2).is_empty());
    match drain(&mut rs).as_slice() {
        [ServerMessage::QueueSnapshot(s)] => assert_eq!(s.characters.len(), 1),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_leaves_the_queue() {
    let hub = hub().await;
    let (staff, mut rs) = hub.connect();
    let (v, _rv) = hub.connect();
    hub.join(v, join("plaza", "vic")).await.unwrap();
    hub.queue_subscribe(staff, "acme").await.unwrap();
    hub.queue_join(v, "acme").await.unwrap();
    drain(&mut rs);

    hub.disconnect(v).await;

    match drain(&mut rs).as_slice() {
        [ServerMessage::QueueSnapshot(s)] => assert!(s.characters.is_empty()),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(hub.queue_next("acme").await.unwrap(), None);
}

#[tokio::test]
async fn slow_consumer_is_dropped_without_stalling_others() {
    let hub = seeded(Arc::new(MemoryStore::new()), 4).await;
    let (slow, _slow_rx) = hub.connect();
    let (fast, mut fast_rx) = hub.connect();
    hub.join(slow, join("plaza", "slow")).await.unwrap();
    hub.join(fast, join("plaza", "fast")).await.unwrap();

    for i in 0..10_u32 {
        drain(&mut fast_rx);
        let x = f64::from(i) / 16.0;
        hub.move_to(fast, x, 0.5).await.unwrap();
        let got = drain(&mut fast_rx);
        assert!(
            matches!(got.as_slice(), [ServerMessage::CharacterMoved(m)] if m.x == x),
            "fast client missed move {i}: {got:?}"
        );
    }

    assert!(!hub.registry().is_registered(slow));
    assert!(!hub.registry().members_of(&Channel::room("plaza")).contains(&slow));

    // The connection task then disconnects it; the room is told once.
    hub.disconnect(slow).await;
    assert!(drain(&mut fast_rx)
        .iter()
        .any(|m| matches!(m, ServerMessage::CharacterLeft(_))));
}

#[test]
fn unknown_kinds_are_told_apart_from_malformed_frames() {
    let unknown = playground_protocol::decode_client(br#"{"kind":"teleport","to":"moon"}"#);
    assert!(unknown.unwrap_err().is_unknown_kind());

    let malformed = playground_protocol::decode_client(br#"{"kind":"move","x":"far"}"#);
    assert!(!malformed.unwrap_err().is_unknown_kind());
}

/// Fails the next set-removal once armed.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail: AtomicBool,
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn get_fields(&self, key: &str) -> Result<Option<Fields>, StoreError> {
        self.inner.get_fields(key).await
    }
    async fn set_fields(&self, key: &str, fields: Fields) -> Result<(), StoreError> {
        self.inner.set_fields(key, fields).await
    }
    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }
    async fn add_to_set(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.inner.add_to_set(key, member).await
    }
    async fn remove_from_set(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(StoreError::unavailable("injected outage"));
        }
        self.inner.remove_from_set(key, member).await
    }
    async fn is_set_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.inner.is_set_member(key, member).await
    }
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.inner.set_members(key).await
    }
    async fn append_to_sequence(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        self.inner.append_to_sequence(key, value).await
    }
    async fn list_sequence(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list_sequence(key).await
    }
    async fn remove_from_sequence(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        self.inner.remove_from_sequence(key, value).await
    }
    async fn pop_front(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.pop_front(key).await
    }
}

#[tokio::test]
async fn store_outage_mid_move_keeps_one_room_and_is_retryable() {
    let store = Arc::new(FlakyStore::default());
    let hub = seeded(store.clone(), 64).await;
    let (a, mut ra) = hub.connect();
    hub.join(a, join("plaza", "ada")).await.unwrap();
    let a_id = hub.presence_of(a).unwrap().character_id;
    drain(&mut ra);

    store.fail.store(true, Ordering::SeqCst);
    let err = dispatch::handle_message(
        &hub,
        a,
        playground_core::ClientMessage::JoinRoom(join("home", "ada")),
    )
    .await
    .unwrap_err();

    match dispatch::rejection(&err) {
        Some(ServerMessage::Error(n)) => assert!(n.retryable),
        other => panic!("unexpected {other:?}"),
    }

    let world = hub.world();
    assert!(world.room_character_ids("plaza").await.unwrap().contains(&a_id));
    assert!(!world.room_character_ids("home").await.unwrap().contains(&a_id));
    assert_eq!(world.character(&a_id).await.unwrap().room, "plaza");
    assert_eq!(hub.presence_of(a).unwrap().room, "plaza");
}
