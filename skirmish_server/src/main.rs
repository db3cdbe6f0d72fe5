//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p skirmish_server -- [--config server.json] [--addr 127.0.0.1:40000] [--tick-hz 30] [--maps-dir maps]
//!
//! The server accepts client connections, runs the session protocol, steps
//! the simulation at a fixed rate and pushes snapshots to spawned players.
//! Ctrl-C shuts it down.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::Context;
use skirmish_server::{
    room::{Room, RoomId},
    server::{serve, GameServer},
};
use skirmish_shared::config::GameConfig;
use tokio::net::TcpListener;
use tracing::{info, warn};

fn parse_args() -> anyhow::Result<GameConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => GameConfig::load(Path::new(&args[i + 1]))?,
        _ => GameConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(cfg.tick_hz);
                i += 2;
            }
            "--maps-dir" if i + 1 < args.len() => {
                cfg.maps_dir = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    cfg.validate().context("invalid configuration")?;
    info!(addr = %cfg.server_addr, tick_hz = cfg.tick_hz, maps_dir = %cfg.maps_dir, "Starting server");

    let mut room = Room::new(RoomId::new(cfg.room_id.clone()), cfg.map.clone());
    room.load_map_document(&PathBuf::from(&cfg.maps_dir))
        .context("load room map")?;
    info!(room = %room.id, map = %room.tilemap.key, "Room ready");

    let listener = TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("bind {}", cfg.server_addr))?;

    let server = GameServer::new(cfg, room);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let server = serve(server, listener, shutdown).await?;
    for line in server.status() {
        info!("{line}");
    }
    Ok(())
}
