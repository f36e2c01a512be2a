//! Entities: the discrete items that flow through blocks.

use crate::types::{BlockId, EntityId, SimTime};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Display color of an entity. Scripts recolor via `product type += ...(color)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityColor {
    #[default]
    Gray,
    Blue,
    Green,
    Red,
    Black,
    White,
}

impl EntityColor {
    /// Parse a color word from a script. Unknown words are `None` so the
    /// interpreter can warn and keep the current color.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "gray" | "grey" => Some(EntityColor::Gray),
            "blue" => Some(EntityColor::Blue),
            "green" => Some(EntityColor::Green),
            "red" => Some(EntityColor::Red),
            "black" => Some(EntityColor::Black),
            "white" => Some(EntityColor::White),
            _ => None,
        }
    }

    /// Lowercase color word, matching what scripts write.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityColor::Gray => "gray",
            EntityColor::Blue => "blue",
            EntityColor::Green => "green",
            EntityColor::Red => "red",
            EntityColor::Black => "black",
            EntityColor::White => "white",
        }
    }
}

/// Whether an entity is held by a block or mid-transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    #[default]
    Normal,
    /// Set while a routed hand-off's pre-move delay is pending.
    Transit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    /// Ordered attribute list; `product type(i)` indexes into this.
    pub attributes: Vec<String>,
    pub color: EntityColor,
    pub state: EntityState,
    pub created_at: SimTime,
    /// Blocks that have completed their script for this entity. Prevents a
    /// holding block from re-running its script for the same entity.
    pub processed_by: IndexSet<BlockId>,
}

impl Entity {
    pub fn new(id: EntityId, created_at: SimTime) -> Self {
        Entity {
            id,
            attributes: Vec::new(),
            color: EntityColor::default(),
            state: EntityState::default(),
            created_at,
            processed_by: IndexSet::new(),
        }
    }

    pub fn attr(&self, index: usize) -> Option<&str> {
        self.attributes.get(index).map(|s| s.as_str())
    }
}
