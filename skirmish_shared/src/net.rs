//! Networking primitives.
//!
//! - Session protocol messages (event name + generic JSON payload).
//! - The `Connection` seam the session layer emits through.
//! - Length-prefixed JSON framing for stream transports.
//!
//! Emitting is fire-and-forget: the session layer never waits on delivery
//! and never retries.

use std::{
    io,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
};

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc::{self, error::TrySendError},
};
use tracing::{trace, warn};

use crate::entity::{Attributes, EntityId};

/// Largest accepted frame body.
pub const MAX_FRAME_LEN: usize = 1 << 20;

static NEXT_CLIENT_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a connected client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u32);

impl ClientId {
    pub fn new_unique() -> Self {
        ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Client -> server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMsg {
    /// Client finished loading and wants a player.
    #[serde(rename = "client.ready")]
    Ready,
    /// Client-reported state for its player.
    #[serde(rename = "player.state")]
    PlayerState(Attributes),
    #[serde(rename = "disconnect")]
    Disconnect,
}

/// Server -> client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMsg {
    #[serde(rename = "client.joinRoom")]
    JoinRoom(String),
    #[serde(rename = "client.init")]
    Init(InitPayload),
    #[serde(rename = "player.create")]
    PlayerCreate(Attributes),
    #[serde(rename = "client.sync")]
    Sync(Value),
    #[serde(rename = "player.leave")]
    PlayerLeave(EntityId),
}

impl ServerMsg {
    /// Wire event name.
    pub fn event(&self) -> &'static str {
        match self {
            ServerMsg::JoinRoom(_) => "client.joinRoom",
            ServerMsg::Init(_) => "client.init",
            ServerMsg::PlayerCreate(_) => "player.create",
            ServerMsg::Sync(_) => "client.sync",
            ServerMsg::PlayerLeave(_) => "player.leave",
        }
    }
}

/// Handshake payload: client id plus game and map configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    pub id: ClientId,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub game_width: u32,
    pub game_height: u32,
    pub map_key: String,
    /// Map document, serialized to a JSON string.
    pub map_data: String,
    pub map_type: String,
    pub map_image: String,
    pub map_src: String,
    pub map_layer: Option<String>,
}

/// Outbound message channel of one session.
pub trait Connection: Send + Sync {
    fn emit(&self, msg: ServerMsg);
}

/// Shared connection handle (session + room broadcast group).
pub type ConnectionHandle = Arc<dyn Connection>;

/// Default outbound queue depth per session.
pub const OUTBOUND_QUEUE_LEN: usize = 256;

/// Connection backed by a bounded channel drained by a writer task.
///
/// When the queue is full (the peer stopped reading) new messages are
/// dropped rather than buffered.
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    tx: mpsc::Sender<ServerMsg>,
}

impl ChannelConnection {
    pub fn new(tx: mpsc::Sender<ServerMsg>) -> Self {
        Self { tx }
    }

    pub fn pair() -> (Self, mpsc::Receiver<ServerMsg>) {
        Self::with_capacity(OUTBOUND_QUEUE_LEN)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<ServerMsg>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl Connection for ChannelConnection {
    fn emit(&self, msg: ServerMsg) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(msg)) => {
                warn!(event = msg.event(), "Outbound queue full, dropping message");
            }
            Err(TrySendError::Closed(msg)) => {
                trace!(event = msg.event(), "Dropping message for closed connection");
            }
        }
    }
}

/// In-process connection that records everything emitted to it.
#[derive(Debug, Clone, Default)]
pub struct LocalConnection {
    sent: Arc<Mutex<Vec<ServerMsg>>>,
}

impl LocalConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything emitted so far.
    pub fn sent(&self) -> Vec<ServerMsg> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drains everything emitted so far.
    pub fn take(&self) -> Vec<ServerMsg> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Number of emitted messages with the given event name.
    pub fn count(&self, event: &str) -> usize {
        self.sent().iter().filter(|m| m.event() == event).count()
    }
}

impl Connection for LocalConnection {
    fn emit(&self, msg: ServerMsg) {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(msg);
    }
}

/// Encodes a message as a length-prefixed JSON frame.
pub fn encode_frame<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    anyhow::ensure!(
        payload.len() <= MAX_FRAME_LEN,
        "frame too large: {} bytes",
        payload.len()
    );
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    Ok(buf.freeze())
}

/// Writes one frame.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(msg)?;
    writer.write_all(&frame).await.context("tcp write")?;
    Ok(())
}

/// Reads one frame. `Ok(None)` means the peer closed between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> anyhow::Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("tcp read len"),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    anyhow::ensure!(len <= MAX_FRAME_LEN, "frame too large: {len} bytes");

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    let msg = serde_json::from_slice(&payload).context("deserialize msg")?;
    Ok(Some(msg))
}
