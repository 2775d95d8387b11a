//! Entities of the world graph.
//!
//! Every entity is stored as a field map under `<kind>:<id>` and travels
//! to clients in the same camelCase shape, so one serde representation
//! serves both the store and the wire.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::EntityKind;

/// Default spawn coordinate for a newly created character.
pub const SPAWN_POINT: Position = Position { x: 0.5, y: 0.5 };

/// A record kept under its own `<kind>:<id>` field map.
pub trait Entity: Serialize + DeserializeOwned {
    const KIND: EntityKind;

    fn id(&self) -> &str;
}

/// Continuous 2D coordinate, normalized to the room's extent.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }

    /// Finite and inside the unit square.
    pub fn is_valid(&self) -> bool {
        let in_range = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        in_range(self.x) && in_range(self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Slug, e.g. `"plaza"` or `"sponsor:acme"`.
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,

    /// Set for sponsor rooms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sponsor_id: Option<String>,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        Room {
            id: id.into(),
            background: None,
            sponsor_id: None,
        }
    }
}

impl Entity for Room {
    const KIND: EntityKind = EntityKind::Room;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A connected visitor's avatar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Current room.
    pub room: String,

    pub x: f64,
    pub y: f64,

    /// Sponsor queue this character waits in, if any.
    #[serde(default)]
    pub queue_id: Option<String>,
}

impl Character {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

impl Entity for Character {
    const KIND: EntityKind = EntityKind::Character;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A passage from one room to another. Immutable after seeding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hallway {
    pub id: String,

    /// Room the hallway sits in.
    pub room: String,

    pub x: f64,
    pub y: f64,
    pub radius: f64,

    /// Destination room (or external anchor).
    pub to: String,
    pub to_x: f64,
    pub to_y: f64,
}

impl Hallway {
    pub fn destination(&self) -> Position {
        Position::new(self.to_x, self.to_y)
    }
}

impl Entity for Hallway {
    const KIND: EntityKind = EntityKind::Hallway;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Decorative or interactive element placed in a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    pub room: String,

    /// Image path. Toggleable elements list one image per state,
    /// comma-separated.
    pub path: String,

    pub x: f64,
    pub y: f64,
    pub width: f64,

    /// Animated elements cycle through `changing_paths`.
    #[serde(default)]
    pub changing_image_path: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changing_paths: Option<String>,

    /// Milliseconds between animation frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changing_interval: Option<u64>,

    #[serde(default)]
    pub changing_randomly: bool,

    /// Present iff the element is toggleable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<u32>,
}

impl Element {
    pub fn is_toggleable(&self) -> bool {
        self.state.is_some()
    }

    /// Number of states a toggle cycles through.
    pub fn state_count(&self) -> u32 {
        let images = self.path.split(',').filter(|p| !p.trim().is_empty()).count() as u32;
        images.max(2)
    }

    /// The state a toggle moves to, or `None` for a static element.
    pub fn next_state(&self) -> Option<u32> {
        self.state.map(|s| (s + 1) % self.state_count())
    }
}

impl Entity for Element {
    const KIND: EntityKind = EntityKind::Element;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sponsor {
    pub id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Entity for Sponsor {
    const KIND: EntityKind = EntityKind::Sponsor;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A jukebox entry. Metadata (title, duration, thumbnail) arrives
/// already resolved; this crate never calls out to fetch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub vid_code: String,
    pub title: String,

    /// Seconds.
    pub duration: u32,

    pub thumbnail_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_by: Option<String>,
}

/// Everything a client needs to draw a room it just entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room: Room,
    pub characters: Vec<Character>,
    pub hallways: Vec<Hallway>,
    pub elements: Vec<Element>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(path: &str, state: Option<u32>) -> Element {
        Element {
            id: "e1".into(),
            room: "plaza".into(),
            path: path.into(),
            x: 0.1,
            y: 0.2,
            width: 0.05,
            changing_image_path: false,
            changing_paths: None,
            changing_interval: None,
            changing_randomly: false,
            state,
        }
    }

    #[test]
    fn two_image_element_flips() {
        let lamp = element("street_lamp.svg,street_lamp_off.svg", Some(0));
        assert_eq!(lamp.next_state(), Some(1));

        let lamp = element("street_lamp.svg,street_lamp_off.svg", Some(1));
        assert_eq!(lamp.next_state(), Some(0));
    }

    #[test]
    fn single_image_toggle_still_has_two_states() {
        let e = element("bar.svg", Some(1));
        assert_eq!(e.state_count(), 2);
        assert_eq!(e.next_state(), Some(0));
    }

    #[test]
    fn static_element_does_not_toggle() {
        let e = element("tree.svg", None);
        assert!(!e.is_toggleable());
        assert_eq!(e.next_state(), None);
    }

    #[test]
    fn position_validation() {
        assert!(Position::new(0.5, 0.5).is_valid());
        assert!(Position::new(0.0, 1.0).is_valid());
        assert!(!Position::new(1.5, 0.5).is_valid());
        assert!(!Position::new(f64::NAN, 0.5).is_valid());
    }

    #[test]
    fn hallway_uses_camel_case_fields() {
        let h = Hallway {
            id: "h1".into(),
            room: "home".into(),
            x: 0.9,
            y: 0.5,
            radius: 0.05,
            to: "plaza".into(),
            to_x: 0.1,
            to_y: 0.5,
        };
        let v = serde_json::to_value(&h).unwrap();
        assert_eq!(v["toX"], 0.1);
        assert_eq!(v["to"], "plaza");
    }
}
