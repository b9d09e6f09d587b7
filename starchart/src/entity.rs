//! Entity data model.
//!
//! An [`Entity`] is a spatially-located record (a star system) as received
//! from the remote catalogue. The full wire object is kept verbatim in
//! [`Entity::payload`] so display layers can read any domain field; the
//! fields the core needs (identifier, coordinates, type) are lifted out.
//!
//! # Wire Format
//!
//! ```text
//! {
//!   "symbol": "X1-DF55",
//!   "sectorSymbol": "X1",
//!   "type": "RED_STAR",
//!   "x": -4, "y": 12,
//!   "waypoints": [{ "symbol": "X1-DF55-A1", "type": "PLANET", "x": 3, "y": 1 }]
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::geometry::Point;

/// Closed set of entity type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    NeutronStar,
    RedStar,
    OrangeStar,
    BlueStar,
    YoungStar,
    WhiteDwarf,
    BlackHole,
    Hypergiant,
    Nebula,
    Unstable,
}

impl EntityKind {
    /// All kinds, in declaration order.
    pub const ALL: [EntityKind; 10] = [
        EntityKind::NeutronStar,
        EntityKind::RedStar,
        EntityKind::OrangeStar,
        EntityKind::BlueStar,
        EntityKind::YoungStar,
        EntityKind::WhiteDwarf,
        EntityKind::BlackHole,
        EntityKind::Hypergiant,
        EntityKind::Nebula,
        EntityKind::Unstable,
    ];

    /// The wire tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::NeutronStar => "NEUTRON_STAR",
            EntityKind::RedStar => "RED_STAR",
            EntityKind::OrangeStar => "ORANGE_STAR",
            EntityKind::BlueStar => "BLUE_STAR",
            EntityKind::YoungStar => "YOUNG_STAR",
            EntityKind::WhiteDwarf => "WHITE_DWARF",
            EntityKind::BlackHole => "BLACK_HOLE",
            EntityKind::Hypergiant => "HYPERGIANT",
            EntityKind::Nebula => "NEBULA",
            EntityKind::Unstable => "UNSTABLE",
        }
    }

    /// Parse a wire tag.
    pub fn from_wire(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sub-entity (waypoint) carried by its parent. Not indexed spatially.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildEntity {
    /// Child identifier, unique within the catalogue.
    pub id: String,
    /// Child fields exactly as received.
    pub payload: Map<String, Value>,
}

/// A spatially-located record held in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier.
    pub id: String,
    /// World X coordinate.
    pub x: f64,
    /// World Y coordinate.
    pub y: f64,
    /// Type tag.
    pub kind: EntityKind,
    /// Domain fields preserved verbatim for display.
    pub payload: Map<String, Value>,
    /// Sub-entities with their own identifiers.
    #[serde(default)]
    pub children: Vec<ChildEntity>,
}

/// An entity could not be decoded or lacks a required display field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedEntity {
    /// The wire value is not a JSON object.
    #[error("entity is not an object")]
    NotAnObject,

    /// A required field is absent or has the wrong type.
    #[error("entity {id:?} is missing field '{field}'")]
    MissingField { id: Option<String>, field: &'static str },

    /// The type tag is outside the closed enumeration.
    #[error("entity {id} has unknown type '{tag}'")]
    UnknownKind { id: String, tag: String },

    /// A coordinate is NaN or infinite.
    #[error("entity {id} has a non-finite coordinate")]
    NonFiniteCoordinate { id: String },
}

impl Entity {
    /// Create an entity with an empty payload.
    pub fn new(id: impl Into<String>, x: f64, y: f64, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            kind,
            payload: Map::new(),
            children: Vec::new(),
        }
    }

    /// Attach child entities.
    pub fn with_children(mut self, children: Vec<ChildEntity>) -> Self {
        self.children = children;
        self
    }

    /// Attach a verbatim payload.
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    /// World position.
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Label for display: the payload `name` if present, else the identifier.
    pub fn label(&self) -> &str {
        self.payload
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.id)
    }

    /// Check the fields a renderer requires.
    pub fn validate_display(&self) -> Result<(), MalformedEntity> {
        if self.id.is_empty() {
            return Err(MalformedEntity::MissingField {
                id: None,
                field: "symbol",
            });
        }
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(MalformedEntity::NonFiniteCoordinate {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Decode a wire object. The whole object becomes the payload.
    pub fn from_wire(value: Value) -> Result<Self, MalformedEntity> {
        let Value::Object(payload) = value else {
            return Err(MalformedEntity::NotAnObject);
        };

        let id = payload
            .get("symbol")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(MalformedEntity::MissingField {
                id: None,
                field: "symbol",
            })?
            .to_string();

        let missing = |field| MalformedEntity::MissingField {
            id: Some(id.clone()),
            field,
        };

        let tag = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| missing("type"))?;
        let kind = EntityKind::from_wire(tag).ok_or_else(|| MalformedEntity::UnknownKind {
            id: id.clone(),
            tag: tag.to_string(),
        })?;

        let x = payload
            .get("x")
            .and_then(Value::as_f64)
            .ok_or_else(|| missing("x"))?;
        let y = payload
            .get("y")
            .and_then(Value::as_f64)
            .ok_or_else(|| missing("y"))?;
        if !x.is_finite() || !y.is_finite() {
            return Err(MalformedEntity::NonFiniteCoordinate { id });
        }

        let children = match payload.get("waypoints") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| {
                    let child = item.as_object()?;
                    let child_id = child.get("symbol")?.as_str()?.to_string();
                    Some(ChildEntity {
                        id: child_id,
                        payload: child.clone(),
                    })
                })
                .collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            id,
            x,
            y,
            kind,
            payload,
            children,
        })
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} @ ({}, {})", self.id, self.kind, self.x, self.y)
    }
}
