use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Reserved display name for reachability-test connections. A client joining
/// under this name gets an acknowledgment only and never occupies a spawn slot.
pub const PROBE_NAME: &str = "Connection";

/// Exact payload sent back to a probe connection: a bare JSON string,
/// not an envelope.
pub const PROBE_ACK: &str = r#""connectionResponse""#;

// === Server -> Client ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/generated/")]
#[serde(tag = "responseType")]
pub enum ServerMsg {
    /// Sent only to the joining connection, never broadcast.
    Connection {
        data: String,
        #[serde(rename = "spawnIndex")]
        spawn_index: usize,
        spawns: Vec<SpawnPoint>,
    },
    /// Full state broadcast after every player update.
    Data {
        data: Vec<Player>,
        spawns: Vec<SpawnPoint>,
    },
    /// A connection closed; `data` is its id.
    Removed { data: String },
    /// Relayed projectile event. `data` is a JSON-encoded projectile string,
    /// exactly as the firing client sent it.
    Projectile { data: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/generated/")]
pub struct SpawnPoint {
    #[serde(rename = "xPos")]
    pub x_pos: f64,
    #[serde(rename = "xHeliPos")]
    pub x_heli_pos: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/generated/")]
pub struct Player {
    pub id: String,
    #[serde(rename = "playerName")]
    pub player_name: String,
    #[serde(rename = "spawnIndex")]
    pub spawn_index: usize,
    #[serde(rename = "xPos")]
    pub x_pos: f64,
    #[serde(rename = "yPos")]
    pub y_pos: f64,
    #[serde(rename = "zPos")]
    pub z_pos: f64,
    /// Opaque client blob, stored and forwarded unexamined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "any")]
    pub rotation: Option<serde_json::Value>,
    pub mass: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "any")]
    pub main_rotor: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "any")]
    pub tail_rotor: Option<serde_json::Value>,
    pub waypoint: i32,
    pub waypoint_time: f64,
    pub timestamp: f64,
    pub helicopter_type: i32,
    pub player_health: f64,
}

impl Player {
    /// Fresh record for a player that just joined. Simulation state starts
    /// zeroed; the client fills it in with its first update.
    pub fn joining(id: &str, player_name: &str, spawn_index: usize) -> Self {
        Self {
            id: id.to_string(),
            player_name: player_name.to_string(),
            spawn_index,
            x_pos: 0.0,
            y_pos: 0.0,
            z_pos: 0.0,
            rotation: None,
            mass: 0.0,
            main_rotor: None,
            tail_rotor: None,
            waypoint: 0,
            waypoint_time: 0.0,
            timestamp: 0.0,
            helicopter_type: 0,
            player_health: 100.0,
        }
    }

    /// Last-writer-wins merge: only the fields the update carries overwrite
    /// the stored record.
    pub fn merge(&mut self, update: &PlayerUpdate) {
        if let Some(v) = &update.player_name {
            self.player_name = v.clone();
        }
        if let Some(v) = update.spawn_index {
            self.spawn_index = v;
        }
        if let Some(v) = update.x_pos {
            self.x_pos = v;
        }
        if let Some(v) = update.y_pos {
            self.y_pos = v;
        }
        if let Some(v) = update.z_pos {
            self.z_pos = v;
        }
        if let Some(v) = &update.rotation {
            self.rotation = Some(v.clone());
        }
        if let Some(v) = update.mass {
            self.mass = v;
        }
        if let Some(v) = &update.main_rotor {
            self.main_rotor = Some(v.clone());
        }
        if let Some(v) = &update.tail_rotor {
            self.tail_rotor = Some(v.clone());
        }
        if let Some(v) = update.waypoint {
            self.waypoint = v;
        }
        if let Some(v) = update.waypoint_time {
            self.waypoint_time = v;
        }
        if let Some(v) = update.timestamp {
            self.timestamp = v;
        }
        if let Some(v) = update.helicopter_type {
            self.helicopter_type = v;
        }
        if let Some(v) = update.player_health {
            self.player_health = v;
        }
    }
}

// === Client -> Server ===

/// Partial player state. Everything except the key is optional; absent fields
/// leave the stored record untouched.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/generated/")]
pub struct PlayerUpdate {
    pub id: String,
    #[serde(
        rename = "playerName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub player_name: Option<String>,
    #[serde(
        rename = "spawnIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub spawn_index: Option<usize>,
    #[serde(rename = "xPos", default, skip_serializing_if = "Option::is_none")]
    pub x_pos: Option<f64>,
    #[serde(rename = "yPos", default, skip_serializing_if = "Option::is_none")]
    pub y_pos: Option<f64>,
    #[serde(rename = "zPos", default, skip_serializing_if = "Option::is_none")]
    pub z_pos: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "any")]
    pub rotation: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "any")]
    pub main_rotor: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "any")]
    pub tail_rotor: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waypoint: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waypoint_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helicopter_type: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_health: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/generated/")]
pub struct Projectile {
    pub id: String,
    #[serde(rename = "xPos")]
    pub x_pos: f64,
    #[serde(rename = "yPos")]
    pub y_pos: f64,
    #[serde(rename = "zPos")]
    pub z_pos: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "any")]
    pub rotation: Option<serde_json::Value>,
    #[serde(rename = "xVel")]
    pub x_vel: f64,
    #[serde(rename = "yVel")]
    pub y_vel: f64,
    #[serde(rename = "zVel")]
    pub z_vel: f64,
    #[serde(rename = "type")]
    pub kind: i32,
    pub timestamp: f64,
    pub shooter: String,
}

/// Decoded inbound message. The channel carries either a projectile envelope
/// or a bare player-state object; the `responseType` tag distinguishes them.
#[derive(Debug, Clone)]
pub enum ClientMsg {
    Projectile(Projectile),
    PlayerUpdate(PlayerUpdate),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("projectile payload is not a string")]
    ProjectileNotString,
    #[error("bad projectile payload: {0}")]
    BadProjectile(serde_json::Error),
}

/// Decode one inbound text frame. An object tagged `responseType: "Projectile"`
/// must carry a JSON-encoded projectile in `data`; anything else is treated as
/// a partial player update.
pub fn decode_client(text: &str) -> Result<ClientMsg, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if value.get("responseType").and_then(|v| v.as_str()) == Some("Projectile") {
        let data = value
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or(DecodeError::ProjectileNotString)?;
        let projectile = serde_json::from_str(data).map_err(DecodeError::BadProjectile)?;
        return Ok(ClientMsg::Projectile(projectile));
    }
    let update = serde_json::from_value(value)?;
    Ok(ClientMsg::PlayerUpdate(update))
}
