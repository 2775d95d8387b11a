//! World seeding.
//!
//! Reads a TOML description of rooms, their elements and hallways, and
//! sponsors, and writes it into the store before the listener starts:
//!
//! ```toml
//! [[rooms]]
//! id = "plaza"
//! background = "plaza.svg"
//!
//! [[rooms.elements]]
//! path = "street_lamp.svg,street_lamp_off.svg"
//! x = 0.3
//! y = 0.4
//! width = 0.02
//! state = 0
//!
//! [[rooms.hallways]]
//! to = "home"
//! x = 0.95
//! y = 0.5
//! to_x = 0.05
//! to_y = 0.5
//!
//! [[sponsors]]
//! id = "acme"
//! name = "Acme"
//! ```
//!
//! Element and hallway ids are optional and generated when missing.

use std::path::{Path, PathBuf};

use playground_core::{Element, Hallway, Room, Sponsor, World, WorldError};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("cannot read world file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid world file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid world: {0}")]
    Invalid(String),

    #[error(transparent)]
    World(#[from] WorldError),
}

const DEFAULT_HALLWAY_RADIUS: f64 = 0.05;

fn default_radius() -> f64 {
    DEFAULT_HALLWAY_RADIUS
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorldSeed {
    #[serde(default)]
    pub rooms: Vec<RoomSeed>,

    #[serde(default)]
    pub sponsors: Vec<SponsorSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomSeed {
    pub id: String,
    pub background: Option<String>,
    pub sponsor_id: Option<String>,

    #[serde(default)]
    pub elements: Vec<ElementSeed>,

    #[serde(default)]
    pub hallways: Vec<HallwaySeed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElementSeed {
    pub id: Option<String>,
    pub path: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,

    #[serde(default)]
    pub changing_image_path: bool,
    pub changing_paths: Option<String>,
    pub changing_interval: Option<u64>,
    #[serde(default)]
    pub changing_randomly: bool,

    /// Initial state; makes the element toggleable.
    pub state: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HallwaySeed {
    pub id: Option<String>,
    pub to: String,
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_radius")]
    pub radius: f64,
    pub to_x: f64,
    pub to_y: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SponsorSeed {
    pub id: String,
    pub name: String,
    pub zoom: Option<String>,
    pub color: Option<String>,
}

/// What [`WorldSeed::apply`] wrote.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub rooms: usize,
    pub elements: usize,
    pub hallways: usize,
    pub sponsors: usize,
}

impl WorldSeed {
    pub fn from_file(path: &Path) -> Result<Self, SeedError> {
        let text = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, SeedError> {
        let seed: WorldSeed = toml::from_str(text)?;
        seed.check()?;
        Ok(seed)
    }

    fn check(&self) -> Result<(), SeedError> {
        let mut seen = std::collections::HashSet::new();
        for room in &self.rooms {
            if room.id.trim().is_empty() {
                return Err(SeedError::Invalid("room with empty id".into()));
            }
            if !seen.insert(room.id.as_str()) {
                return Err(SeedError::Invalid(format!("room {} defined twice", room.id)));
            }
            if let Some(sponsor) = &room.sponsor_id {
                if !self.sponsors.iter().any(|s| &s.id == sponsor) {
                    return Err(SeedError::Invalid(format!(
                        "room {} names unknown sponsor {sponsor}",
                        room.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Write every entity into `world`.
    pub async fn apply(&self, world: &World) -> Result<SeedSummary, SeedError> {
        let mut summary = SeedSummary::default();

        for s in &self.sponsors {
            world
                .insert_sponsor(&Sponsor {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    zoom: s.zoom.clone(),
                    color: s.color.clone(),
                })
                .await?;
            summary.sponsors += 1;
        }

        for r in &self.rooms {
            world
                .insert_room(&Room {
                    id: r.id.clone(),
                    background: r.background.clone(),
                    sponsor_id: r.sponsor_id.clone(),
                })
                .await?;
            summary.rooms += 1;

            for e in &r.elements {
                world.insert_element(&e.to_element(&r.id)).await?;
                summary.elements += 1;
            }
            for h in &r.hallways {
                world.insert_hallway(&h.to_hallway(&r.id)).await?;
                summary.hallways += 1;
            }
        }

        info!(
            rooms = summary.rooms,
            elements = summary.elements,
            hallways = summary.hallways,
            sponsors = summary.sponsors,
            "world seeded"
        );
        Ok(summary)
    }
}

impl ElementSeed {
    fn to_element(&self, room: &str) -> Element {
        Element {
            id: self.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
            room: room.to_string(),
            path: self.path.clone(),
            x: self.x,
            y: self.y,
            width: self.width,
            changing_image_path: self.changing_image_path,
            changing_paths: self.changing_paths.clone(),
            changing_interval: self.changing_interval,
            changing_randomly: self.changing_randomly,
            state: self.state,
        }
    }
}

impl HallwaySeed {
    fn to_hallway(&self, room: &str) -> Hallway {
        Hallway {
            id: self.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
            room: room.to_string(),
            x: self.x,
            y: self.y,
            radius: self.radius,
            to: self.to.clone(),
            to_x: self.to_x,
            to_y: self.to_y,
        }
    }
}
