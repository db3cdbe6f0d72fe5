//! `skirmish_server`
//!
//! Server-side systems:
//! - Client sessions (handshake, spawn, state ingestion, teardown)
//! - Rooms (map metadata, entity registry, broadcast group)
//! - Fixed timestep simulation loop
//!
//! Networking model:
//! - TCP, length-prefixed JSON frames
//! - One reader and one writer task per connection
//! - A single server task owns all session and simulation state

pub mod client;
pub mod room;
pub mod server;

pub use client::{Client, SessionState};
pub use room::{Room, RoomId};
pub use server::{GameServer, SessionEvent};
