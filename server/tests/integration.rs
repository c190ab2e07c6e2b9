//! Integration tests for the helicopter relay.
//!
//! These tests start a real server instance and connect via WebSocket
//! to verify end-to-end behavior.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};

// Re-create minimal protocol types for testing (to avoid circular deps)
#[derive(Debug, Deserialize)]
#[serde(tag = "responseType")]
#[allow(dead_code)]
enum ServerMsg {
    Connection {
        data: String,
        #[serde(rename = "spawnIndex")]
        spawn_index: usize,
        spawns: Vec<serde_json::Value>,
    },
    Data {
        data: Vec<serde_json::Value>,
        spawns: Vec<serde_json::Value>,
    },
    Removed {
        data: String,
    },
    Projectile {
        data: String,
    },
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start a test server on a random available port and return the WebSocket URL.
async fn start_test_server() -> String {
    use heli_server::config::ServerConfig;
    use heli_server::session::{run_session, SessionBroadcast, SessionCommand};
    use heli_server::ws::AppState;

    // Find an available port
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener); // Release the port so the server can bind to it

    let config = ServerConfig {
        listen_addr: addr.to_string(),
        ..Default::default()
    };

    let (session_tx, session_rx) = mpsc::channel::<SessionCommand>(config.command_capacity);
    let (broadcast_tx, _) = broadcast::channel::<SessionBroadcast>(config.broadcast_capacity);

    let app_state = AppState {
        session_tx,
        broadcast_tx: broadcast_tx.clone(),
    };

    // Start the session task
    tokio::spawn(async move {
        run_session(session_rx, broadcast_tx).await;
    });

    // Start HTTP/WebSocket server
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(heli_server::ws::ws_handler))
        .with_state(app_state);

    tokio::spawn(async move {
        let listener = TcpListener::bind(&config.listen_addr).await.unwrap();
        axum::serve(listener, app).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("ws://{}/ws", addr)
}

/// Connect to the server under a player name and return the WebSocket stream.
async fn connect(url: &str, player_name: &str) -> WsStream {
    let (ws, _) = connect_async(format!("{}?playerName={}", url, player_name))
        .await
        .expect("Failed to connect");
    ws
}

/// Read the next text frame.
async fn recv_text(ws: &mut WsStream) -> String {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return text.to_string(),
            Some(Ok(_)) => continue, // Skip ping/pong
            Some(Err(e)) => panic!("WebSocket error: {}", e),
            None => panic!("WebSocket closed unexpectedly"),
        }
    }
}

/// Read the next text message and parse as ServerMsg.
async fn recv_msg(ws: &mut WsStream) -> ServerMsg {
    let text = recv_text(ws).await;
    serde_json::from_str(&text).expect("Failed to parse server message")
}

/// Read the next text message with a timeout.
async fn recv_msg_timeout(ws: &mut WsStream, timeout: Duration) -> Option<ServerMsg> {
    tokio::time::timeout(timeout, recv_msg(ws)).await.ok()
}

/// Join and return (assigned id, spawn index, spawns).
async fn join(ws: &mut WsStream) -> (String, usize, Vec<serde_json::Value>) {
    match recv_msg(ws).await {
        ServerMsg::Connection {
            data,
            spawn_index,
            spawns,
        } => (data, spawn_index, spawns),
        other => panic!("Expected Connection, got {:?}", other),
    }
}

fn x_pos(spawn: &serde_json::Value) -> f64 {
    spawn.get("xPos").and_then(|v| v.as_f64()).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_first_join_gets_origin_slot() {
    let url = start_test_server().await;
    let mut ws = connect(&url, "alice").await;

    let (id, spawn_index, spawns) = join(&mut ws).await;
    assert!(!id.is_empty(), "assigned id should be non-empty");
    assert_eq!(spawn_index, 0);
    assert_eq!(spawns.len(), 1);
    assert_eq!(x_pos(&spawns[0]), 2060.0);
}

#[tokio::test]
async fn test_multiple_clients_get_unique_ids_and_slots() {
    let url = start_test_server().await;

    let mut ws1 = connect(&url, "alice").await;
    let (id1, index1, _) = join(&mut ws1).await;
    let mut ws2 = connect(&url, "bob").await;
    let (id2, index2, spawns2) = join(&mut ws2).await;

    assert_ne!(id1, id2, "Each client should get a unique ID");
    assert_eq!(index1, 0);
    assert_eq!(index2, 1);
    assert_eq!(spawns2.len(), 2);
    assert!((x_pos(&spawns2[1]) - 2102.3).abs() < 1e-6);
}

#[tokio::test]
async fn test_update_broadcast_merges_partial_state() {
    let url = start_test_server().await;
    let mut ws = connect(&url, "alice").await;
    let (id, _, _) = join(&mut ws).await;

    // Position-only update
    let update = serde_json::json!({ "id": id, "xPos": 12.5, "yPos": 3.0, "zPos": -4.0 });
    ws.send(Message::Text(update.to_string().into()))
        .await
        .unwrap();

    let msg = recv_msg_timeout(&mut ws, Duration::from_secs(2))
        .await
        .expect("Expected a Data broadcast");
    let player = match msg {
        ServerMsg::Data { data, spawns } => {
            assert_eq!(data.len(), 1);
            assert_eq!(spawns.len(), 1);
            data.into_iter().next().unwrap()
        }
        other => panic!("Expected Data, got {:?}", other),
    };
    assert_eq!(player.get("xPos").and_then(|v| v.as_f64()), Some(12.5));
    // Fields absent from the update keep their stored values.
    assert_eq!(
        player.get("player_health").and_then(|v| v.as_f64()),
        Some(100.0)
    );
    assert_eq!(
        player.get("playerName").and_then(|v| v.as_str()),
        Some("alice")
    );

    // A later health-only update must not clobber the stored position.
    let update = serde_json::json!({ "id": id, "player_health": 55.5 });
    ws.send(Message::Text(update.to_string().into()))
        .await
        .unwrap();

    let msg = recv_msg_timeout(&mut ws, Duration::from_secs(2))
        .await
        .expect("Expected a Data broadcast");
    match msg {
        ServerMsg::Data { data, .. } => {
            let player = &data[0];
            assert_eq!(player.get("xPos").and_then(|v| v.as_f64()), Some(12.5));
            assert_eq!(
                player.get("player_health").and_then(|v| v.as_f64()),
                Some(55.5)
            );
        }
        other => panic!("Expected Data, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stale_update_does_not_create_a_player() {
    let url = start_test_server().await;
    let mut ws = connect(&url, "alice").await;
    let (id, _, _) = join(&mut ws).await;

    let update = serde_json::json!({ "id": "no-such-player", "xPos": 1.0 });
    ws.send(Message::Text(update.to_string().into()))
        .await
        .unwrap();

    let msg = recv_msg_timeout(&mut ws, Duration::from_secs(2))
        .await
        .expect("Expected a Data broadcast");
    match msg {
        ServerMsg::Data { data, .. } => {
            assert_eq!(data.len(), 1, "stale update must not create an entry");
            assert_eq!(data[0].get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        }
        other => panic!("Expected Data, got {:?}", other),
    }
}

#[tokio::test]
async fn test_disconnect_broadcasts_removed_then_backfills() {
    let url = start_test_server().await;

    let mut ws1 = connect(&url, "alice").await;
    let (_, _, _) = join(&mut ws1).await;
    let mut ws2 = connect(&url, "bob").await;
    let (id2, index2, spawns2) = join(&mut ws2).await;
    let mut ws3 = connect(&url, "carol").await;
    let (_, _, _) = join(&mut ws3).await;

    assert_eq!(index2, 1);
    let slot1_x = x_pos(&spawns2[1]);

    ws2.close(None).await.unwrap();

    // The departure is announced before any state change.
    let mut removed_seen = false;
    for _ in 0..10 {
        match recv_msg_timeout(&mut ws1, Duration::from_millis(500)).await {
            Some(ServerMsg::Removed { data }) => {
                assert_eq!(data, id2);
                removed_seen = true;
                break;
            }
            Some(_) => continue,
            None => break,
        }
    }
    assert!(removed_seen, "Expected a Removed broadcast for bob");

    // The next joiner backfills bob's slot with the same coordinates.
    let mut ws4 = connect(&url, "dave").await;
    let (_, index4, spawns4) = join(&mut ws4).await;
    assert_eq!(index4, 1);
    assert_eq!(spawns4.len(), 3);
    assert!((x_pos(&spawns4[1]) - slot1_x).abs() < 1e-9);
}

#[tokio::test]
async fn test_last_player_leaving_resets_to_origin() {
    let url = start_test_server().await;

    let mut ws1 = connect(&url, "alice").await;
    let (_, index1, _) = join(&mut ws1).await;
    assert_eq!(index1, 0);

    ws1.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut ws2 = connect(&url, "bob").await;
    let (_, index2, spawns2) = join(&mut ws2).await;
    assert_eq!(index2, 0);
    assert_eq!(spawns2.len(), 1);
    assert_eq!(x_pos(&spawns2[0]), 2060.0);
}

#[tokio::test]
async fn test_projectile_relay_is_passthrough() {
    let url = start_test_server().await;

    let mut ws1 = connect(&url, "alice").await;
    let (_, _, _) = join(&mut ws1).await;
    let mut ws2 = connect(&url, "bob").await;
    let (id2, _, _) = join(&mut ws2).await;

    let projectile = serde_json::json!({
        "id": "proj-1",
        "xPos": 1.0, "yPos": 2.0, "zPos": 3.0,
        "xVel": 10.0, "yVel": 0.0, "zVel": -10.0,
        "type": 1,
        "timestamp": 42.0,
        "shooter": id2,
    });
    let envelope = serde_json::json!({
        "responseType": "Projectile",
        "data": projectile.to_string(),
    });
    ws2.send(Message::Text(envelope.to_string().into()))
        .await
        .unwrap();

    // Both clients receive the relay, including the sender.
    for ws in [&mut ws1, &mut ws2] {
        let msg = recv_msg_timeout(ws, Duration::from_secs(2))
            .await
            .expect("Expected a Projectile relay");
        match msg {
            ServerMsg::Projectile { data } => {
                let relayed: serde_json::Value = serde_json::from_str(&data).unwrap();
                assert_eq!(relayed, projectile);
            }
            other => panic!("Expected Projectile, got {:?}", other),
        }
    }

    // The relay mutated nothing: the next Data broadcast still shows the
    // players' stored state.
    let update = serde_json::json!({ "id": id2, "xPos": 5.0 });
    ws2.send(Message::Text(update.to_string().into()))
        .await
        .unwrap();
    let msg = recv_msg_timeout(&mut ws2, Duration::from_secs(2))
        .await
        .expect("Expected a Data broadcast");
    match msg {
        ServerMsg::Data { data, spawns } => {
            assert_eq!(data.len(), 2);
            assert_eq!(spawns.len(), 2);
        }
        other => panic!("Expected Data, got {:?}", other),
    }
}

#[tokio::test]
async fn test_probe_connection_gets_ack_and_no_slot() {
    let url = start_test_server().await;

    // The reserved name marks a reachability probe.
    let mut probe = connect(&url, "Connection").await;
    let ack = recv_text(&mut probe).await;
    assert_eq!(ack, "\"connectionResponse\"");

    // The probe consumed no slot: the first real joiner still gets slot 0.
    let mut ws = connect(&url, "alice").await;
    let (_, spawn_index, spawns) = join(&mut ws).await;
    assert_eq!(spawn_index, 0);
    assert_eq!(spawns.len(), 1);
}

#[tokio::test]
async fn test_malformed_json_keeps_connection_alive() {
    let url = start_test_server().await;
    let mut ws = connect(&url, "alice").await;
    let (id, _, _) = join(&mut ws).await;

    ws.send(Message::Text("not valid json".into()))
        .await
        .unwrap();
    ws.send(Message::Text("{\"responseType\":\"Projectile\",\"data\":\"garbage\"}".into()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The malformed frames were dropped; the connection still works.
    let update = serde_json::json!({ "id": id, "xPos": 1.25 });
    ws.send(Message::Text(update.to_string().into()))
        .await
        .unwrap();

    let msg = recv_msg_timeout(&mut ws, Duration::from_secs(2))
        .await
        .expect("Expected a Data broadcast after malformed frames");
    match msg {
        ServerMsg::Data { data, .. } => {
            assert_eq!(data[0].get("xPos").and_then(|v| v.as_f64()), Some(1.25));
        }
        other => panic!("Expected Data, got {:?}", other),
    }
}
