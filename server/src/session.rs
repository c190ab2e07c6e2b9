use tokio::sync::{broadcast, mpsc, oneshot};

use heli_shared::protocol::{Player, PlayerUpdate, SpawnPoint, PROBE_NAME};

use crate::registry::{PlayerRegistry, SessionError};
use crate::spawn_line::SpawnLine;

/// Commands from client connections to the session task
pub enum SessionCommand {
    Connect {
        id: String,
        player_name: String,
        reply: oneshot::Sender<ConnectAck>,
    },
    Update {
        update: PlayerUpdate,
    },
    Projectile {
        raw: String,
    },
    Disconnect {
        id: String,
        probe: bool,
    },
}

/// Reply to a joining connection, never broadcast.
#[derive(Debug)]
pub enum ConnectAck {
    /// Reachability probe: acknowledged, no slot assigned.
    Probe,
    Joined {
        spawn_index: usize,
        spawns: Vec<SpawnPoint>,
    },
}

/// Broadcasts from the session task to all connections
#[derive(Debug, Clone)]
pub enum SessionBroadcast {
    Data {
        players: Vec<Player>,
        spawns: Vec<SpawnPoint>,
    },
    Removed {
        id: String,
    },
    /// Projectile relay; the original inbound text, untouched.
    Projectile {
        raw: String,
    },
}

/// Session state: the spawn line, the player registry, and the most recently
/// vacated slot. Every live player owns exactly one slot, so the line and the
/// registry always have the same length.
#[derive(Debug, Default)]
pub struct Session {
    spawn_line: SpawnLine,
    registry: PlayerRegistry,
    last_removed: Option<usize>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            spawn_line: SpawnLine::new(),
            registry: PlayerRegistry::new(),
            last_removed: None,
        }
    }

    /// Handle a new connection. A vacated slot is backfilled before the line
    /// grows; the pending slot is consumed whether or not it was used.
    pub fn connect(&mut self, id: &str, player_name: &str) -> Result<ConnectAck, SessionError> {
        if player_name == PROBE_NAME {
            return Ok(ConnectAck::Probe);
        }
        if self.registry.get(id).is_some() {
            return Err(SessionError::DuplicateConnection(id.to_string()));
        }

        let ordinal = self.last_removed.unwrap_or(self.registry.len());
        let point = SpawnLine::position_for_slot(ordinal);
        let spawn_index = match self.last_removed.take() {
            Some(slot) => self.spawn_line.insert(slot, point),
            None => self.spawn_line.append(point),
        };

        self.registry
            .add(Player::joining(id, player_name, spawn_index))?;

        Ok(ConnectAck::Joined {
            spawn_index,
            spawns: self.spawn_line.snapshot(),
        })
    }

    /// Merge a player update and return the snapshots to broadcast. An update
    /// for an unknown id changes nothing but still yields the current state.
    pub fn update(&mut self, update: &PlayerUpdate) -> (Vec<Player>, Vec<SpawnPoint>) {
        if !self.registry.apply_update(update) {
            tracing::debug!(id = %update.id, "update for unknown player ignored");
        }
        (self.registry.snapshot(), self.spawn_line.snapshot())
    }

    /// Remove a departed player and record its slot as the next backfill
    /// target. When the last player leaves, the next joiner starts over at
    /// the origin.
    pub fn disconnect(&mut self, id: &str) {
        let Some(removed) = self.registry.remove(id) else {
            tracing::warn!(%id, "disconnect for unknown player");
            return;
        };
        let slot = if self.registry.is_empty() {
            0
        } else {
            removed.spawn_index
        };
        self.last_removed = self.spawn_line.remove(slot);
    }

    pub fn player_count(&self) -> usize {
        self.registry.len()
    }

    pub fn spawn_count(&self) -> usize {
        self.spawn_line.len()
    }
}

/// Run the session task. Owns all session state; every connect, update and
/// disconnect is serialized through the command channel, so handlers are
/// atomic with respect to each other.
pub async fn run_session(
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    broadcast_tx: broadcast::Sender<SessionBroadcast>,
) {
    let mut session = Session::new();

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            SessionCommand::Connect {
                id,
                player_name,
                reply,
            } => match session.connect(&id, &player_name) {
                Ok(ack) => {
                    tracing::info!(%id, %player_name, "client joined");
                    let _ = reply.send(ack);
                }
                Err(e) => {
                    // Dropping the reply closes the connection without
                    // registering anything.
                    tracing::error!(%id, error = %e, "join rejected");
                }
            },
            SessionCommand::Update { update } => {
                let (players, spawns) = session.update(&update);
                let _ = broadcast_tx.send(SessionBroadcast::Data { players, spawns });
            }
            SessionCommand::Projectile { raw } => {
                let _ = broadcast_tx.send(SessionBroadcast::Projectile { raw });
            }
            SessionCommand::Disconnect { id, probe } => {
                // The removal notice goes out before any state changes, so
                // already-queued Data broadcasts stay consistent with it.
                let _ = broadcast_tx.send(SessionBroadcast::Removed { id: id.clone() });
                if !probe {
                    session.disconnect(&id);
                }
                tracing::info!(%id, probe, "client left");
            }
        }
    }

    tracing::info!("session task ended");
}
