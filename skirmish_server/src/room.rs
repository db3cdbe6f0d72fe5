//! Rooms.
//!
//! A room binds a set of sessions and entities to one map. It holds the map
//! metadata sent in the handshake, the entity registry the tick loop sweeps,
//! and the broadcast group used for room-wide messages.
//!
//! The registry is only touched from the server task, between sweeps, so no
//! locking is needed and entities are never added or removed mid-sweep.

use std::{collections::BTreeMap, fmt, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use skirmish_shared::{
    config::TilemapConfig,
    entity::{Entity, EntityId, GameContext},
    net::{ClientId, ConnectionHandle, ServerMsg},
};
use tracing::{debug, warn};

/// Room identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        RoomId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entities of a room, iterated in id order.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<EntityId, Entity>,
}

impl EntityRegistry {
    /// Registers an entity. A previous entity under the same id is returned.
    pub fn add(&mut self, id: EntityId, entity: Entity) -> Option<Entity> {
        let previous = self.entities.insert(id, entity);
        if let Some(prev) = &previous {
            warn!(entity = %prev.id(), "Replaced entity with duplicate id");
        }
        previous
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn remove(&mut self, id: &EntityId) -> Option<Entity> {
        self.entities.remove(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Entity)> {
        self.entities.iter()
    }

    /// Runs one tick for every entity. A failing entity is logged and the
    /// sweep moves on. Returns the number of failures.
    pub fn update(&mut self, game: &GameContext) -> usize {
        let mut failures = 0;
        for (id, entity) in self.entities.iter_mut() {
            if let Err(e) = entity.update(game) {
                failures += 1;
                let error = format!("{e:#}");
                warn!(entity = %id, tick = game.tick, %error, "Entity update failed");
            }
        }
        failures
    }

    /// `{entityId: attributes}` for every entity.
    pub fn snapshot(&self) -> Value {
        let entities: Map<String, Value> = self
            .entities
            .iter()
            .map(|(id, e)| (id.0.clone(), Value::Object(e.serialize())))
            .collect();
        Value::Object(entities)
    }
}

/// A game room.
pub struct Room {
    pub id: RoomId,
    pub tilemap: TilemapConfig,
    /// Parsed map data file.
    pub map_document: Value,
    pub entities: EntityRegistry,
    members: BTreeMap<ClientId, ConnectionHandle>,
}

impl Room {
    pub fn new(id: RoomId, tilemap: TilemapConfig) -> Self {
        Self {
            id,
            tilemap,
            map_document: Value::Null,
            entities: EntityRegistry::default(),
            members: BTreeMap::new(),
        }
    }

    /// Loads the tilemap's data file from `maps_dir`.
    pub fn load_map_document(&mut self, maps_dir: &Path) -> anyhow::Result<()> {
        let path = maps_dir.join(&self.tilemap.data);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("read map {}", path.display()))?;
        self.map_document =
            serde_json::from_str(&text).with_context(|| format!("parse map {}", path.display()))?;
        Ok(())
    }

    /// Map document serialized for the handshake.
    pub fn map_data(&self) -> String {
        self.map_document.to_string()
    }

    /// Adds a session to the broadcast group.
    pub fn join(&mut self, client_id: ClientId, conn: ConnectionHandle) {
        debug!(room = %self.id, client_id = ?client_id, "Joined broadcast group");
        self.members.insert(client_id, conn);
    }

    pub fn leave(&mut self, client_id: ClientId) {
        if self.members.remove(&client_id).is_some() {
            debug!(room = %self.id, client_id = ?client_id, "Left broadcast group");
        }
    }

    pub fn members(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.members.keys().copied()
    }

    pub fn is_member(&self, client_id: ClientId) -> bool {
        self.members.contains_key(&client_id)
    }

    /// Sends to every member.
    pub fn broadcast(&self, msg: &ServerMsg) {
        for conn in self.members.values() {
            conn.emit(msg.clone());
        }
    }

    /// Sends to every member except `sender`.
    pub fn broadcast_except(&self, sender: ClientId, msg: &ServerMsg) {
        for (id, conn) in &self.members {
            if *id != sender {
                conn.emit(msg.clone());
            }
        }
    }

    /// Runs one tick for the room's entities.
    pub fn update(&mut self, game: &GameContext) -> usize {
        self.entities.update(game)
    }

    pub fn snapshot(&self) -> Value {
        self.entities.snapshot()
    }
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("tilemap", &self.tilemap.key)
            .field("entities", &self.entities.len())
            .field("members", &self.members.len())
            .finish()
    }
}
