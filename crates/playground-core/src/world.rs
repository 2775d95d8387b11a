//! Typed operations over the world graph.
//!
//! [`World`] turns the key/value [`StateStore`] into rooms, characters,
//! hallways, elements, sponsors and queues. It owns no state itself; it is
//! a cheap, cloneable handle passed to whoever needs the graph.
//!
//! Multi-key mutations are ordered so that an interrupted sequence leaves
//! every character owned by exactly one room:
//!
//! ```text
//! create:  write record ─▶ add to room set
//! remove:  remove from room set ─▶ delete record
//! move:    add to new set ─▶ set `room` field ─▶ remove from old set
//!          (any failure after the first step is compensated back)
//! ```

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{EntityKind, WorldError};
use crate::model::{
    Character, Element, Entity, Hallway, Position, Room, RoomSnapshot, Song, Sponsor,
};
use crate::store::{keys, Fields, StateStore};

#[derive(Clone)]
pub struct World {
    store: Arc<dyn StateStore>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World").finish_non_exhaustive()
    }
}

fn to_fields<T: Entity>(entity: &T) -> Result<Fields, WorldError> {
    let key = keys::entity(T::KIND, entity.id());
    match serde_json::to_value(entity) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(WorldError::Corrupt {
            key,
            reason: "entity did not serialize to a map".into(),
        }),
        Err(e) => Err(WorldError::Corrupt {
            key,
            reason: e.to_string(),
        }),
    }
}

fn from_fields<T: Entity>(key: &str, fields: Fields) -> Result<T, WorldError> {
    serde_json::from_value(Value::Object(fields)).map_err(|e| WorldError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

impl World {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        World { store }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    // -------------------------------------------------------------------------
    // Generic entity access
    // -------------------------------------------------------------------------

    pub async fn get<T: Entity>(&self, id: &str) -> Result<T, WorldError> {
        let key = keys::entity(T::KIND, id);
        match self.store.get_fields(&key).await? {
            Some(fields) => from_fields(&key, fields),
            None => Err(WorldError::not_found(T::KIND, id)),
        }
    }

    /// Like [`World::get`] but absent records are `Ok(None)`.
    pub async fn find<T: Entity>(&self, id: &str) -> Result<Option<T>, WorldError> {
        match self.get(id).await {
            Ok(v) => Ok(Some(v)),
            Err(WorldError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch many records in one pipelined read. Missing ids are skipped.
    pub async fn get_many<T: Entity>(&self, ids: &[String]) -> Result<Vec<T>, WorldError> {
        let keys: Vec<String> = ids.iter().map(|id| keys::entity(T::KIND, id)).collect();
        let rows = self.store.get_many_fields(&keys).await?;

        let mut out = Vec::with_capacity(rows.len());
        for (key, row) in keys.iter().zip(rows) {
            match row {
                Some(fields) => out.push(from_fields(key, fields)?),
                None => debug!(key = %key, "dangling reference skipped"),
            }
        }
        Ok(out)
    }

    pub async fn put<T: Entity>(&self, entity: &T) -> Result<(), WorldError> {
        let key = keys::entity(T::KIND, entity.id());
        self.store.set_fields(&key, to_fields(entity)?).await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Seeding (used by the world loader before the hub accepts connections)
    // -------------------------------------------------------------------------

    pub async fn insert_room(&self, room: &Room) -> Result<(), WorldError> {
        self.put(room).await?;
        self.store.add_to_set(keys::ROOMS, &room.id).await?;
        Ok(())
    }

    pub async fn insert_hallway(&self, hallway: &Hallway) -> Result<(), WorldError> {
        self.put(hallway).await?;
        self.store
            .append_to_sequence(&keys::room_hallways(&hallway.room), &hallway.id)
            .await?;
        Ok(())
    }

    pub async fn insert_element(&self, element: &Element) -> Result<(), WorldError> {
        self.put(element).await?;
        self.store
            .add_to_set(&keys::room_elements(&element.room), &element.id)
            .await?;
        Ok(())
    }

    pub async fn insert_sponsor(&self, sponsor: &Sponsor) -> Result<(), WorldError> {
        self.put(sponsor).await?;
        self.store.add_to_set(keys::SPONSORS, &sponsor.id).await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Rooms
    // -------------------------------------------------------------------------

    pub async fn room(&self, id: &str) -> Result<Room, WorldError> {
        self.get(id).await
    }

    pub async fn room_character_ids(&self, room: &str) -> Result<Vec<String>, WorldError> {
        Ok(self.store.set_members(&keys::room_characters(room)).await?)
    }

    /// Full state of a room: its members, hallways and elements.
    pub async fn room_snapshot(&self, room_id: &str) -> Result<RoomSnapshot, WorldError> {
        let room = self.room(room_id).await?;

        let character_ids = self.room_character_ids(room_id).await?;
        let hallway_ids = self
            .store
            .list_sequence(&keys::room_hallways(room_id))
            .await?;
        let element_ids = self.store.set_members(&keys::room_elements(room_id)).await?;

        Ok(RoomSnapshot {
            room,
            characters: self.get_many(&character_ids).await?,
            hallways: self.get_many(&hallway_ids).await?,
            elements: self.get_many(&element_ids).await?,
        })
    }

    /// A hallway of `room`, or `NotInRoom` if it belongs elsewhere.
    pub async fn hallway_in(&self, room: &str, hallway_id: &str) -> Result<Hallway, WorldError> {
        let hallway: Hallway = self.get(hallway_id).await?;
        if hallway.room != room {
            return Err(WorldError::NotInRoom {
                kind: EntityKind::Hallway,
                id: hallway_id.to_string(),
                room: room.to_string(),
            });
        }
        Ok(hallway)
    }

    // -------------------------------------------------------------------------
    // Characters
    // -------------------------------------------------------------------------

    pub async fn character(&self, id: &str) -> Result<Character, WorldError> {
        self.get(id).await
    }

    pub async fn characters(&self, ids: &[String]) -> Result<Vec<Character>, WorldError> {
        self.get_many(ids).await
    }

    /// Write a new character and place it in its room.
    ///
    /// The record is written before the room set so a failure never leaves
    /// a room referencing a missing character.
    pub async fn create_character(&self, character: &Character) -> Result<(), WorldError> {
        // Room must exist; characters are never placed in unknown rooms.
        self.room(&character.room).await?;

        self.put(character).await?;
        self.store
            .add_to_set(&keys::room_characters(&character.room), &character.id)
            .await?;
        Ok(())
    }

    /// Remove a character from its room and delete its record.
    ///
    /// Returns the removed character, or `None` if it was already gone.
    pub async fn remove_character(&self, id: &str) -> Result<Option<Character>, WorldError> {
        let Some(character) = self.find::<Character>(id).await? else {
            return Ok(None);
        };

        self.store
            .remove_from_set(&keys::room_characters(&character.room), id)
            .await?;
        self.store
            .delete(&keys::entity(EntityKind::Character, id))
            .await?;
        Ok(Some(character))
    }

    pub async fn set_position(&self, id: &str, position: Position) -> Result<(), WorldError> {
        let mut fields = Fields::new();
        fields.insert("x".into(), position.x.into());
        fields.insert("y".into(), position.y.into());
        self.store
            .set_fields(&keys::entity(EntityKind::Character, id), fields)
            .await?;
        Ok(())
    }

    /// Move a character from room `from` to room `to`.
    ///
    /// Steps: add to `to`'s set, point the record at `to` (with the arrival
    /// position, if any), remove from `from`'s set. A failure after the
    /// first step is compensated so the character stays in `from`; the
    /// original error is returned either way.
    pub async fn move_character(
        &self,
        id: &str,
        from: &str,
        to: &str,
        arrival: Option<Position>,
    ) -> Result<(), WorldError> {
        self.room(to).await?;

        let from_set = keys::room_characters(from);
        let to_set = keys::room_characters(to);
        let record = keys::entity(EntityKind::Character, id);

        self.store.add_to_set(&to_set, id).await?;

        let mut fields = Fields::new();
        fields.insert("room".into(), to.into());
        if let Some(pos) = arrival {
            fields.insert("x".into(), pos.x.into());
            fields.insert("y".into(), pos.y.into());
        }
        if let Err(e) = self.store.set_fields(&record, fields).await {
            self.undo_add(id, &to_set).await;
            return Err(e.into());
        }

        if let Err(e) = self.store.remove_from_set(&from_set, id).await {
            let mut back = Fields::new();
            back.insert("room".into(), from.into());
            if let Err(undo) = self.store.set_fields(&record, back).await {
                error!(character = %id, error = %undo, "failed to restore room field after aborted move");
            }
            self.undo_add(id, &to_set).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn undo_add(&self, id: &str, set: &str) {
        if let Err(undo) = self.store.remove_from_set(set, id).await {
            error!(character = %id, set = %set, error = %undo, "failed to compensate aborted move");
        }
    }

    // -------------------------------------------------------------------------
    // Elements
    // -------------------------------------------------------------------------

    /// Advance a toggleable element of `room` to its next state.
    pub async fn toggle_element(&self, room: &str, element_id: &str) -> Result<Element, WorldError> {
        let member = self
            .store
            .is_set_member(&keys::room_elements(room), element_id)
            .await?;
        if !member {
            return Err(WorldError::NotInRoom {
                kind: EntityKind::Element,
                id: element_id.to_string(),
                room: room.to_string(),
            });
        }

        let mut element: Element = self.get(element_id).await?;
        let next = element
            .next_state()
            .ok_or_else(|| WorldError::NotToggleable(element_id.to_string()))?;

        let mut fields = Fields::new();
        fields.insert("state".into(), next.into());
        self.store
            .set_fields(&keys::entity(EntityKind::Element, element_id), fields)
            .await?;

        element.state = Some(next);
        Ok(element)
    }

    // -------------------------------------------------------------------------
    // Sponsors and queues
    // -------------------------------------------------------------------------

    pub async fn sponsor(&self, id: &str) -> Result<Sponsor, WorldError> {
        self.get(id).await
    }

    pub async fn sponsor_ids(&self) -> Result<Vec<String>, WorldError> {
        Ok(self.store.set_members(keys::SPONSORS).await?)
    }

    pub async fn queue_ids(&self, sponsor: &str) -> Result<Vec<String>, WorldError> {
        Ok(self.store.list_sequence(&keys::queue(sponsor)).await?)
    }

    pub async fn queue_push(&self, sponsor: &str, character: &str) -> Result<usize, WorldError> {
        Ok(self
            .store
            .append_to_sequence(&keys::queue(sponsor), character)
            .await?)
    }

    pub async fn queue_remove(&self, sponsor: &str, character: &str) -> Result<bool, WorldError> {
        let removed = self
            .store
            .remove_from_sequence(&keys::queue(sponsor), character)
            .await?;
        Ok(removed > 0)
    }

    pub async fn queue_pop(&self, sponsor: &str) -> Result<Option<String>, WorldError> {
        Ok(self.store.pop_front(&keys::queue(sponsor)).await?)
    }

    /// Record which queue a character waits in (`None` clears it).
    ///
    /// A character whose record is already gone is left alone.
    pub async fn set_character_queue(
        &self,
        character: &str,
        sponsor: Option<&str>,
    ) -> Result<(), WorldError> {
        let key = keys::entity(EntityKind::Character, character);
        if self.store.get_fields(&key).await?.is_none() {
            return Ok(());
        }
        let mut fields = Fields::new();
        fields.insert(
            "queueId".into(),
            sponsor.map_or(Value::Null, |s| Value::String(s.to_string())),
        );
        self.store.set_fields(&key, fields).await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Jukebox
    // -------------------------------------------------------------------------

    /// Append an already-enriched song to the global play queue.
    pub async fn append_song(&self, song: &Song) -> Result<usize, WorldError> {
        let encoded = serde_json::to_string(song).map_err(|e| WorldError::Corrupt {
            key: keys::SONGS.to_string(),
            reason: e.to_string(),
        })?;
        Ok(self.store.append_to_sequence(keys::SONGS, &encoded).await?)
    }

    pub async fn songs(&self) -> Result<Vec<Song>, WorldError> {
        let raw = self.store.list_sequence(keys::SONGS).await?;
        let mut songs = Vec::with_capacity(raw.len());
        for entry in raw {
            match serde_json::from_str(&entry) {
                Ok(song) => songs.push(song),
                Err(e) => warn!(error = %e, "skipping unreadable song entry"),
            }
        }
        Ok(songs)
    }
}
