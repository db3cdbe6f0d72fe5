//! Entity factory.
//!
//! Builds typed entities with their components already attached. The
//! session layer only knows type keys; everything else lives here.

use std::fmt;

use serde_json::Value;

use crate::components::{ClampToBounds, StateIngest};
use crate::config::GameConfig;
use crate::entity::{Attributes, Entity, EntityId};

/// Type key of player-controlled entities.
pub const PLAYER: &str = "player";

/// Creates entities by type key.
pub trait EntityFactory: Send {
    fn create(&self, id: EntityId, type_key: &str) -> Result<Entity, FactoryError>;
}

/// Factory errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactoryError {
    UnknownType(String),
}

impl fmt::Display for FactoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactoryError::UnknownType(key) => write!(f, "unknown entity type `{key}`"),
        }
    }
}

impl std::error::Error for FactoryError {}

/// Factory for the built-in entity types.
#[derive(Debug, Clone)]
pub struct DefaultEntityFactory {
    pub player_width: f64,
    pub player_height: f64,
}

impl DefaultEntityFactory {
    pub fn from_config(cfg: &GameConfig) -> Self {
        Self {
            player_width: f64::from(cfg.player_width),
            player_height: f64::from(cfg.player_height),
        }
    }

    fn player(&self, id: EntityId) -> Entity {
        let mut attrs = Attributes::new();
        attrs.insert("type".to_string(), Value::from(PLAYER));
        attrs.insert("width".to_string(), Value::from(self.player_width));
        attrs.insert("height".to_string(), Value::from(self.player_height));

        let mut player = Entity::new(id, attrs);
        player.add_component(Box::new(StateIngest));
        player.add_component(Box::new(ClampToBounds));
        player
    }
}

impl Default for DefaultEntityFactory {
    fn default() -> Self {
        Self::from_config(&GameConfig::default())
    }
}

impl EntityFactory for DefaultEntityFactory {
    fn create(&self, id: EntityId, type_key: &str) -> Result<Entity, FactoryError> {
        match type_key {
            PLAYER => Ok(self.player(id)),
            other => Err(FactoryError::UnknownType(other.to_string())),
        }
    }
}
