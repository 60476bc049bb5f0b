//! Message types for fleet provisioning events and reports
//!
//! Inbound events announce instance lifecycle changes; outbound messages
//! carry spawn requests and player-count reports for the scaling controller.

use serde::{Deserialize, Serialize};

/// Subject prefix shared by inbound provisioning events
pub const EVENT_SUBJECT_PREFIX: &str = "FLEET.SERVER";

/// JetStream stream holding the inbound event subjects
pub const EVENT_STREAM: &str = "FLEET_EVENTS";

/// An externally provisioned instance announcing it is up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerReadyEvent {
    /// Provider-assigned instance id
    pub server_id: String,

    /// Game type, e.g. "bedwars"
    #[serde(rename = "type")]
    pub game_type: String,

    /// Explicit address, when the provisioner knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// Explicit port, when the provisioner knows it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl ServerReadyEvent {
    pub fn subject() -> &'static str {
        "FLEET.SERVER.READY"
    }

    pub fn to_bytes(&self) -> Result<bytes::Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Into::into)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// An instance reporting that its last player left
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEmptyEvent {
    pub server_id: String,

    #[serde(rename = "type")]
    pub game_type: String,
}

impl ServerEmptyEvent {
    pub fn subject() -> &'static str {
        "FLEET.SERVER.EMPTY"
    }

    pub fn to_bytes(&self) -> Result<bytes::Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Into::into)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// Request for the controller to provision a fresh instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnRequest {
    #[serde(rename = "type")]
    pub game_type: String,

    /// Desired player capacity
    pub players: u32,

    /// Milliseconds since the epoch
    pub timestamp: i64,
}

impl SpawnRequest {
    pub fn new(game_type: impl Into<String>, players: u32) -> Self {
        Self {
            game_type: game_type.into(),
            players,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn subject() -> &'static str {
        "FLEET.SPAWN.REQUEST"
    }

    pub fn to_bytes(&self) -> Result<bytes::Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Into::into)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// Player-facing selection request, sent request/reply style by the chat
/// command front end
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectRequest {
    /// Requested game type; absent means "list what is available"
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub game_type: Option<String>,
}

impl SelectRequest {
    pub fn subject() -> &'static str {
        "FLEET.SELECT.REQUEST"
    }

    pub fn to_bytes(&self) -> Result<bytes::Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Into::into)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// Reply to a selection request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectResponse {
    /// Whether a ready instance was selected
    pub found: bool,

    /// Selected routing-table name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Game types with at least one ready instance, for listings and
    /// "nothing available" replies
    #[serde(default)]
    pub available_types: Vec<String>,
}

impl SelectResponse {
    pub fn to_bytes(&self) -> Result<bytes::Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Into::into)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// Player count observed on a managed instance, for scaling decisions.
/// Tagged with the originating proxy so a multi-proxy deployment can
/// deduplicate downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerCountReport {
    pub server_id: String,

    #[serde(rename = "type")]
    pub game_type: String,

    pub player_count: u32,

    pub proxy_id: String,
}

impl PlayerCountReport {
    /// Derive a report from a routing-table name of the form `{type}-{id}`.
    /// Names without a separator cannot be attributed and yield `None`.
    pub fn from_display_name(name: &str, player_count: u32, proxy_id: &str) -> Option<Self> {
        let (game_type, server_id) = name.split_once('-')?;
        if game_type.is_empty() || server_id.is_empty() {
            return None;
        }

        Some(Self {
            server_id: server_id.to_string(),
            game_type: game_type.to_string(),
            player_count,
            proxy_id: proxy_id.to_string(),
        })
    }

    pub fn subject() -> &'static str {
        "FLEET.PLAYER.COUNT"
    }

    pub fn to_bytes(&self) -> Result<bytes::Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Into::into)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
