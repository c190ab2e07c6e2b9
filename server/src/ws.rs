use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use heli_shared::protocol::{decode_client, ClientMsg, ServerMsg, PROBE_ACK, PROBE_NAME};

use crate::session::{ConnectAck, SessionBroadcast, SessionCommand};

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub session_tx: mpsc::Sender<SessionCommand>,
    pub broadcast_tx: broadcast::Sender<SessionBroadcast>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "playerName", default)]
    pub player_name: String,
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, params.player_name, app_state))
}

async fn handle_socket(socket: WebSocket, player_name: String, app_state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let id = Uuid::new_v4().to_string();
    let probe = player_name == PROBE_NAME;

    // Subscribe before joining so nothing broadcast between the join and the
    // first poll is missed.
    let mut broadcast_rx = app_state.broadcast_tx.subscribe();

    let (reply_tx, reply_rx) = oneshot::channel();
    if app_state
        .session_tx
        .send(SessionCommand::Connect {
            id: id.clone(),
            player_name: player_name.clone(),
            reply: reply_tx,
        })
        .await
        .is_err()
    {
        tracing::error!("Failed to send Connect command");
        return;
    }

    let ack = match reply_rx.await {
        Ok(ack) => ack,
        Err(_) => {
            // The session rejected the join and registered nothing, so there
            // is no cleanup to do.
            tracing::error!(%id, "join rejected");
            return;
        }
    };

    tracing::info!(%id, %player_name, "client connected");

    let ack_json = match &ack {
        ConnectAck::Probe => PROBE_ACK.to_string(),
        ConnectAck::Joined {
            spawn_index,
            spawns,
        } => serde_json::to_string(&ServerMsg::Connection {
            data: id.clone(),
            spawn_index: *spawn_index,
            spawns: spawns.clone(),
        })
        .unwrap(),
    };
    if sink.send(Message::Text(ack_json.into())).await.is_err() {
        let _ = app_state
            .session_tx
            .send(SessionCommand::Disconnect {
                id: id.clone(),
                probe,
            })
            .await;
        return;
    }

    loop {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match decode_client(&text) {
                            Ok(ClientMsg::PlayerUpdate(update)) => {
                                let _ = app_state.session_tx.send(SessionCommand::Update { update }).await;
                            }
                            Ok(ClientMsg::Projectile(_)) => {
                                // Shape-checked; the relay forwards the
                                // original text untouched.
                                let _ = app_state.session_tx.send(SessionCommand::Projectile {
                                    raw: text.to_string(),
                                }).await;
                            }
                            Err(e) => {
                                tracing::warn!(%id, error = %e, "dropping malformed message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {} // Ignore ping/pong/binary
                }
            }

            // Server -> Client (broadcast)
            result = broadcast_rx.recv() => {
                match result {
                    Ok(broadcast) => {
                        let json = match broadcast {
                            SessionBroadcast::Data { players, spawns } => {
                                serde_json::to_string(&ServerMsg::Data { data: players, spawns }).unwrap()
                            }
                            SessionBroadcast::Removed { id } => {
                                serde_json::to_string(&ServerMsg::Removed { data: id }).unwrap()
                            }
                            SessionBroadcast::Projectile { raw } => raw,
                        };
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(%id, lagged = n, "client lagged, dropping broadcasts");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    // Cleanup on disconnect
    let _ = app_state
        .session_tx
        .send(SessionCommand::Disconnect {
            id: id.clone(),
            probe,
        })
        .await;
    tracing::info!(%id, "client disconnected");
}
