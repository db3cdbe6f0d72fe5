//! Full socket-based integration tests for the session protocol.

use std::time::Duration;

use serde_json::json;
use skirmish_shared::net::{ClientMsg, ServerMsg};
use skirmish_tests::{init_tracing, start_server, TestClient};

/// Connects, reads the handshake, sends ready and returns the player id.
async fn join_and_spawn(addr: &str) -> anyhow::Result<(TestClient, String)> {
    let mut client = TestClient::connect(addr).await?;

    assert_eq!(client.recv().await?, ServerMsg::JoinRoom("R".to_string()));
    match client.recv().await? {
        ServerMsg::Init(init) => assert_eq!(init.map_key, "m1"),
        other => anyhow::bail!("expected client.init, got {other:?}"),
    }

    client.send(&ClientMsg::Ready).await?;
    let attrs = match client.recv_event("player.create").await? {
        ServerMsg::PlayerCreate(attrs) => attrs,
        other => anyhow::bail!("expected player.create, got {other:?}"),
    };
    assert!(attrs["clientId"].is_number());
    let id = attrs["id"].as_str().unwrap_or_default().to_string();
    Ok((client, id))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handshake_spawn_state_and_leave_over_tcp() -> anyhow::Result<()> {
    init_tracing();
    let running = start_server(50).await?;

    let (mut a, a_player) = join_and_spawn(&running.addr).await?;
    let (mut b, b_player) = join_and_spawn(&running.addr).await?;
    assert_ne!(a_player, b_player);

    // Reported state shows up in a later snapshot.
    a.send(&ClientMsg::PlayerState(
        json!({"x": 64.0, "y": 48.0}).as_object().unwrap().clone(),
    ))
    .await?;
    let mut applied = false;
    for _ in 0..20 {
        if let ServerMsg::Sync(snap) = b.recv_event("client.sync").await? {
            if snap["entities"][a_player.as_str()]["x"] == json!(64.0) {
                applied = true;
                break;
            }
        }
    }
    assert!(applied, "state from A never reached B's snapshots");

    // A leaves by closing its socket.
    drop(a);
    match b.recv_event("player.leave").await? {
        ServerMsg::PlayerLeave(id) => assert_eq!(id.as_str(), a_player),
        other => anyhow::bail!("expected player.leave, got {other:?}"),
    }
    let rest = b.drain(Duration::from_millis(100)).await;
    assert!(rest.iter().all(|m| m.event() != "player.leave"));

    let server = running.stop().await?;
    assert_eq!(server.client_count(), 1);
    assert_eq!(server.room().entities.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn explicit_disconnect_message_ends_session() -> anyhow::Result<()> {
    init_tracing();
    let running = start_server(50).await?;

    let (mut a, _a_player) = join_and_spawn(&running.addr).await?;
    a.send(&ClientMsg::Disconnect).await?;
    a.send(&ClientMsg::Ready).await.ok();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let server = running.stop().await?;
    assert_eq!(server.client_count(), 0);
    assert!(server.room().entities.is_empty());
    Ok(())
}
