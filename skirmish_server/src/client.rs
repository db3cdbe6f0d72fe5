//! Client sessions.
//!
//! A `Client` is the server-side proxy for one connected player. It is
//! bound to a room at construction and drives the session protocol:
//!
//! ```text
//! Connected --init--> AwaitingReady --client.ready--> Spawned --disconnect--> Disconnected
//! ```
//!
//! Out-of-order or repeated events are absorbed: a second `client.ready`
//! never spawns a second player, `player.state` before spawn is dropped, and
//! a second disconnect does nothing. None of these are errors.

use std::time::Instant;

use anyhow::Context;
use rand::{Rng, RngCore};
use serde_json::Value;
use skirmish_shared::{
    config::GameConfig,
    entity::{Attributes, EntityId},
    event::{EventNode, Observable},
    factory::{EntityFactory, PLAYER},
    id::IdGenerator,
    net::{ClientId, ConnectionHandle, InitPayload, ServerMsg},
};
use tracing::{debug, info, warn};

use crate::room::{Room, RoomId};

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, handshake not sent yet.
    Connected,
    /// Handshake sent, waiting for `client.ready`.
    AwaitingReady,
    /// Player entity spawned and registered.
    Spawned,
    /// Terminal.
    Disconnected,
}

/// Services needed to spawn a player.
pub struct SpawnContext<'a> {
    pub cfg: &'a GameConfig,
    pub factory: &'a dyn EntityFactory,
    pub ids: &'a mut dyn IdGenerator,
    pub rng: &'a mut dyn RngCore,
}

/// Server-side session for one connected player.
pub struct Client {
    id: ClientId,
    connection: ConnectionHandle,
    room: RoomId,
    player: Option<EntityId>,
    state: SessionState,
    connected_at: Instant,
    events: EventNode,
}

impl Client {
    pub fn new(id: ClientId, connection: ConnectionHandle, room: &Room) -> Self {
        info!(client_id = ?id, room = %room.id, "Client created");
        Self {
            id,
            connection,
            room: room.id.clone(),
            player: None,
            state: SessionState::Connected,
            connected_at: Instant::now(),
            events: EventNode::new(),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room
    }

    pub fn player(&self) -> Option<&EntityId> {
        self.player.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Joins the room and sends the handshake.
    pub fn init(&mut self, room: &mut Room, cfg: &GameConfig) {
        debug_assert_eq!(room.id, self.room);
        if self.state != SessionState::Connected {
            debug!(client_id = ?self.id, state = ?self.state, "Ignoring repeated init");
            return;
        }

        room.join(self.id, self.connection.clone());
        self.connection.emit(ServerMsg::JoinRoom(room.id.0.clone()));
        info!(client_id = ?self.id, room = %room.id, "Client connected to room");

        self.connection.emit(ServerMsg::Init(InitPayload {
            id: self.id,
            canvas_width: cfg.canvas_width,
            canvas_height: cfg.canvas_height,
            game_width: cfg.game_width,
            game_height: cfg.game_height,
            map_key: room.tilemap.key.clone(),
            map_data: room.map_data(),
            map_type: room.tilemap.kind.clone(),
            map_image: room.tilemap.image.clone(),
            map_src: room.tilemap.src.clone(),
            map_layer: room.tilemap.layers.first().cloned(),
        }));

        self.state = SessionState::AwaitingReady;
    }

    /// Spawns this session's player. Returns the new player id, or `None`
    /// when the session is not waiting for ready.
    pub fn on_ready(
        &mut self,
        room: &mut Room,
        spawn: SpawnContext<'_>,
    ) -> anyhow::Result<Option<EntityId>> {
        debug_assert_eq!(room.id, self.room);
        if self.state != SessionState::AwaitingReady {
            debug!(client_id = ?self.id, state = ?self.state, "Ignoring ready");
            return Ok(None);
        }

        let id = spawn.ids.generate();
        let mut player = spawn
            .factory
            .create(id.clone(), PLAYER)
            .context("create player entity")?;

        let footprint = (
            player.get_f64("width").unwrap_or(0.0),
            player.get_f64("height").unwrap_or(0.0),
        );
        let area = (
            f64::from(spawn.cfg.game_width),
            f64::from(spawn.cfg.game_height),
        );
        let (x, y) = spawn_position(spawn.rng, area, footprint);

        player.set_attr("clientId", self.id.0);
        player.set_attr("x", x);
        player.set_attr("y", y);
        info!(player = %id, client_id = ?self.id, x, y, "Player created");

        self.connection.emit(ServerMsg::PlayerCreate(player.serialize()));
        room.entities.add(id.clone(), player);

        self.player = Some(id.clone());
        self.state = SessionState::Spawned;
        Ok(Some(id))
    }

    /// Queues reported state on the player for the next tick. Returns
    /// whether it was queued.
    pub fn on_player_state(&mut self, room: &mut Room, state: Attributes) -> bool {
        let player_id = match (&self.player, self.state) {
            (Some(id), SessionState::Spawned) => id,
            _ => {
                debug!(client_id = ?self.id, state = ?self.state, "Dropping state before spawn");
                return false;
            }
        };

        match room.entities.get_mut(player_id) {
            Some(player) => {
                player.push_state(state);
                true
            }
            None => {
                warn!(client_id = ?self.id, player = %player_id, "Player missing from room");
                false
            }
        }
    }

    /// Tears the session down: kills and unregisters the player, tells the
    /// rest of the room, and leaves the broadcast group.
    pub fn on_disconnect(&mut self, room: &mut Room) {
        debug_assert_eq!(room.id, self.room);
        if self.state == SessionState::Disconnected {
            debug!(client_id = ?self.id, "Ignoring repeated disconnect");
            return;
        }

        if let Some(player_id) = self.player.take() {
            if let Some(player) = room.entities.get_mut(&player_id) {
                player.die();
            }
            room.broadcast_except(self.id, &ServerMsg::PlayerLeave(player_id.clone()));
            room.entities.remove(&player_id);
        }

        room.leave(self.id);
        self.state = SessionState::Disconnected;
        info!(client_id = ?self.id, room = %room.id, "Client disconnected");

        self.events
            .trigger("client.disconnect", &[Value::from(self.id.0)]);
    }

    /// Pushes a state snapshot to this session.
    pub fn sync(&self, state: Value) {
        self.connection.emit(ServerMsg::Sync(state));
    }
}

impl Observable for Client {
    fn events(&mut self) -> &mut EventNode {
        &mut self.events
    }
}

/// Random spawn point keeping a `footprint` inside `area`.
///
/// Each coordinate lies in `[0, area - footprint]`; the range collapses to 0
/// when the area is smaller than the footprint.
pub fn spawn_position<R: Rng + ?Sized>(
    rng: &mut R,
    area: (f64, f64),
    footprint: (f64, f64),
) -> (f64, f64) {
    let mut axis = |extent: f64, size: f64| {
        let max = extent - size;
        if max > 0.0 {
            rng.gen_range(0.0..=max)
        } else {
            0.0
        }
    };
    let x = axis(area.0, footprint.0);
    let y = axis(area.1, footprint.1);
    (x, y)
}
