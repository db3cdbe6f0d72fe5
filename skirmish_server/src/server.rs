//! Server implementation.
//!
//! The `GameServer` is the single writer of all session and simulation
//! state: the room, its entity registry, and every `Client`. Network tasks
//! never touch that state directly; they forward `SessionEvent`s over a
//! channel and the server task applies them one at a time, interleaved with
//! fixed-rate ticks.
//!
//! Determinism notes:
//! - Keep simulation in a fixed timestep.
//! - Reported player state is applied on the next tick, never on receipt.
//! - Entities and clients are iterated in id order.

use std::{
    collections::BTreeMap,
    future::Future,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use rand::{rngs::StdRng, SeedableRng};
use serde_json::json;
use skirmish_shared::{
    config::GameConfig,
    entity::GameContext,
    factory::{DefaultEntityFactory, EntityFactory},
    id::{IdGenerator, ShortIdGenerator},
    net::{read_frame, write_frame, ChannelConnection, ClientId, ClientMsg, ConnectionHandle},
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    client::{Client, SessionState, SpawnContext},
    room::Room,
};

/// Pause after a failed `accept`, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Something that happened on a connection.
pub enum SessionEvent {
    Connected {
        client_id: ClientId,
        conn: ConnectionHandle,
    },
    Message {
        client_id: ClientId,
        msg: ClientMsg,
    },
    Disconnected {
        client_id: ClientId,
    },
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Connected { client_id, .. } => {
                f.debug_struct("Connected").field("client_id", client_id).finish()
            }
            SessionEvent::Message { client_id, msg } => f
                .debug_struct("Message")
                .field("client_id", client_id)
                .field("msg", msg)
                .finish(),
            SessionEvent::Disconnected { client_id } => f
                .debug_struct("Disconnected")
                .field("client_id", client_id)
                .finish(),
        }
    }
}

/// Game server.
pub struct GameServer {
    pub cfg: GameConfig,
    room: Room,
    clients: BTreeMap<ClientId, Client>,
    factory: Box<dyn EntityFactory>,
    ids: Box<dyn IdGenerator>,
    rng: StdRng,
    tick: u64,
}

impl GameServer {
    /// Creates a server with the default factory, random ids and an
    /// entropy-seeded spawn RNG.
    pub fn new(cfg: GameConfig, room: Room) -> Self {
        let factory = DefaultEntityFactory::from_config(&cfg);
        Self::with_services(
            cfg,
            room,
            Box::new(factory),
            Box::new(ShortIdGenerator::new()),
            StdRng::from_entropy(),
        )
    }

    pub fn with_services(
        cfg: GameConfig,
        room: Room,
        factory: Box<dyn EntityFactory>,
        ids: Box<dyn IdGenerator>,
        rng: StdRng,
    ) -> Self {
        Self {
            cfg,
            room,
            clients: BTreeMap::new(),
            factory,
            ids,
            rng,
            tick: 0,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn room(&self) -> &Room {
        &self.room
    }

    pub fn room_mut(&mut self) -> &mut Room {
        &mut self.room
    }

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Applies one connection event.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected { client_id, conn } => self.connect(client_id, conn),
            SessionEvent::Message { client_id, msg } => self.on_message(client_id, msg),
            SessionEvent::Disconnected { client_id } => self.disconnect(client_id),
        }
    }

    /// Creates a session for a new connection and runs its handshake.
    pub fn connect(&mut self, client_id: ClientId, conn: ConnectionHandle) {
        if self.clients.contains_key(&client_id) {
            warn!(client_id = ?client_id, "Duplicate connection id, ignoring");
            return;
        }
        let mut client = Client::new(client_id, conn, &self.room);
        client.init(&mut self.room, &self.cfg);
        self.clients.insert(client_id, client);
    }

    fn on_message(&mut self, client_id: ClientId, msg: ClientMsg) {
        let Some(client) = self.clients.get_mut(&client_id) else {
            debug!(client_id = ?client_id, ?msg, "Message for unknown client");
            return;
        };

        match msg {
            ClientMsg::Ready => {
                let spawn = SpawnContext {
                    cfg: &self.cfg,
                    factory: self.factory.as_ref(),
                    ids: self.ids.as_mut(),
                    rng: &mut self.rng,
                };
                if let Err(e) = client.on_ready(&mut self.room, spawn) {
                    let error = format!("{e:#}");
                    warn!(client_id = ?client_id, %error, "Failed to spawn player");
                }
            }
            ClientMsg::PlayerState(state) => {
                client.on_player_state(&mut self.room, state);
            }
            ClientMsg::Disconnect => self.disconnect(client_id),
        }
    }

    /// Tears down a session. Unknown ids are ignored.
    pub fn disconnect(&mut self, client_id: ClientId) {
        match self.clients.remove(&client_id) {
            Some(mut client) => client.on_disconnect(&mut self.room),
            None => debug!(client_id = ?client_id, "Disconnect for unknown client"),
        }
    }

    /// Executes one fixed simulation step and syncs spawned clients.
    /// Returns the number of entities whose update failed.
    pub fn step(&mut self, dt_sec: f32) -> usize {
        self.tick += 1;
        let game = GameContext {
            tick: self.tick,
            dt: dt_sec,
            width: f64::from(self.cfg.game_width),
            height: f64::from(self.cfg.game_height),
        };
        let failures = self.room.update(&game);

        let snapshot = json!({
            "tick": self.tick,
            "entities": self.room.snapshot(),
        });
        for client in self
            .clients
            .values()
            .filter(|c| c.state() == SessionState::Spawned)
        {
            client.sync(snapshot.clone());
        }
        failures
    }

    /// Human-readable server status.
    pub fn status(&self) -> Vec<String> {
        let mut out = Vec::new();
        out.push(format!("Tick: {}", self.tick));
        out.push(format!(
            "Room: {} (map {}, {} entities)",
            self.room.id,
            self.room.tilemap.key,
            self.room.entities.len()
        ));
        out.push(format!("Clients: {}", self.clients.len()));
        for (id, client) in &self.clients {
            out.push(format!(
                "  {:?}: state={:?} player={} up={:.1}s",
                id,
                client.state(),
                client.player().map_or("-", |p| p.as_str()),
                client.connected_at().elapsed().as_secs_f32()
            ));
        }
        out
    }
}

/// Runs the server until `shutdown` resolves, then returns it.
///
/// Each TCP connection gets a reader task (frames -> `SessionEvent`s) and a
/// writer task (outbound messages -> frames). The calling task owns the
/// `GameServer` and alternates between events and ticks.
pub async fn serve<F>(
    mut server: GameServer,
    listener: TcpListener,
    shutdown: F,
) -> anyhow::Result<GameServer>
where
    F: Future<Output = ()>,
{
    server.cfg.validate().context("invalid configuration")?;
    let local = listener.local_addr().context("listener local_addr")?;
    let (events_tx, mut events_rx) = mpsc::channel::<SessionEvent>(1024);
    let accept_task = tokio::spawn(accept_loop(listener, events_tx));

    let tick_interval = Duration::from_secs_f32(1.0 / server.cfg.tick_hz as f32);
    let mut ticker = time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(%local, tick_hz = server.cfg.tick_hz, room = %server.room.id, "Server running");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Server shutting down");
                break;
            }
            Some(event) = events_rx.recv() => server.handle_event(event),
            _ = ticker.tick() => {
                server.step(tick_interval.as_secs_f32());
            }
        }
    }

    accept_task.abort();
    Ok(server)
}

async fn accept_loop(listener: TcpListener, events: mpsc::Sender<SessionEvent>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let client_id = ClientId::new_unique();
                info!(client_id = ?client_id, %peer, "Connection accepted");
                tokio::spawn(serve_connection(stream, client_id, events.clone()));
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, client_id: ClientId, events: mpsc::Sender<SessionEvent>) {
    let (mut reader, mut writer) = stream.into_split();
    let (conn, mut outbound) = ChannelConnection::pair();

    let connected = SessionEvent::Connected {
        client_id,
        conn: Arc::new(conn),
    };
    if events.send(connected).await.is_err() {
        return;
    }

    // Ends once the server drops every handle to this connection.
    tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if let Err(e) = write_frame(&mut writer, &msg).await {
                debug!(client_id = ?client_id, error = %e, "Write failed");
                break;
            }
        }
    });

    loop {
        match read_frame::<_, ClientMsg>(&mut reader).await {
            Ok(None) | Ok(Some(ClientMsg::Disconnect)) => break,
            Ok(Some(msg)) => {
                if events.send(SessionEvent::Message { client_id, msg }).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(client_id = ?client_id, error = %e, "Read failed");
                break;
            }
        }
    }

    let _ = events.send(SessionEvent::Disconnected { client_id }).await;
}

/// Helper for tests: bind a listener to an ephemeral localhost port.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(TcpListener, GameConfig)> {
    let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    let listener = TcpListener::bind(bind).await.context("tcp bind")?;
    let cfg = GameConfig {
        server_addr: listener.local_addr()?.to_string(),
        tick_hz,
        ..Default::default()
    };
    Ok((listener, cfg))
}
