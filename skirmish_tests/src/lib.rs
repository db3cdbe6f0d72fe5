//! Test support for the session engine.
//!
//! - `start_server`: a real server on an ephemeral port, stoppable.
//! - `TestClient`: a framed TCP client speaking the session protocol.

use std::time::Duration;

use anyhow::Context;
use serde_json::json;
use skirmish_server::{
    room::{Room, RoomId},
    server::{bind_ephemeral, serve, GameServer},
};
use skirmish_shared::{
    config::TilemapConfig,
    net::{read_frame, write_frame, ClientMsg, ServerMsg},
};
use tokio::{
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::oneshot,
    task::JoinHandle,
};

/// How long a test waits for any single message.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Installs a test-friendly tracing subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// The map used by the scenario tests.
pub fn scenario_tilemap() -> TilemapConfig {
    TilemapConfig {
        key: "m1".to_string(),
        data: "d.json".to_string(),
        kind: "tmx".to_string(),
        image: "i.png".to_string(),
        src: "s".to_string(),
        layers: vec!["bg".to_string()],
    }
}

/// Room `R` with the scenario map and a small in-memory map document.
pub fn scenario_room() -> Room {
    let mut room = Room::new(RoomId::new("R"), scenario_tilemap());
    room.map_document = json!({"width": 4, "height": 4, "layers": [{"name": "bg"}]});
    room
}

/// A server running on its own task.
pub struct RunningServer {
    pub addr: String,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<anyhow::Result<GameServer>>,
}

impl RunningServer {
    /// Stops the server and hands back its final state.
    pub async fn stop(self) -> anyhow::Result<GameServer> {
        let _ = self.shutdown.send(());
        self.handle.await.context("server task panicked")?
    }
}

/// Starts a server with the scenario room on an ephemeral port.
pub async fn start_server(tick_hz: u32) -> anyhow::Result<RunningServer> {
    let (listener, cfg) = bind_ephemeral(tick_hz).await?;
    let addr = cfg.server_addr.clone();
    let server = GameServer::new(cfg, scenario_room());

    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(serve(server, listener, async move {
        let _ = rx.await;
    }));
    Ok(RunningServer {
        addr,
        shutdown: tx,
        handle,
    })
}

/// Protocol-speaking TCP client.
pub struct TestClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        let (reader, writer) = stream.into_split();
        Ok(Self { reader, writer })
    }

    pub async fn send(&mut self, msg: &ClientMsg) -> anyhow::Result<()> {
        write_frame(&mut self.writer, msg).await
    }

    /// Next message from the server.
    pub async fn recv(&mut self) -> anyhow::Result<ServerMsg> {
        let frame = tokio::time::timeout(RECV_TIMEOUT, read_frame::<_, ServerMsg>(&mut self.reader))
            .await
            .context("timed out waiting for server message")??;
        frame.context("server closed the connection")
    }

    /// Next message with the given event name, skipping everything else.
    pub async fn recv_event(&mut self, event: &str) -> anyhow::Result<ServerMsg> {
        loop {
            let msg = self.recv().await?;
            if msg.event() == event {
                return Ok(msg);
            }
        }
    }

    /// Drains messages until `quiet` passes without one.
    pub async fn drain(&mut self, quiet: Duration) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(Ok(Some(msg))) =
            tokio::time::timeout(quiet, read_frame::<_, ServerMsg>(&mut self.reader)).await
        {
            out.push(msg);
        }
        out
    }
}
