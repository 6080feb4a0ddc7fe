//! Wire types shared with the Infrared proxy.
//!
//! Two directions cross this boundary: the routing documents pushed into the
//! proxy's config store, and the event callbacks the proxy posts back to us.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TOPIC_PRE_PLAYER_JOIN: &str = "PrePlayerJoin";
pub const TOPIC_PLAYER_JOIN: &str = "PlayerJoin";
pub const TOPIC_PLAYER_LEAVE: &str = "PlayerLeave";

/// Body of `PUT /configs/{id}`.
///
/// Servers are kept in a `BTreeMap` so that serializing the same document
/// twice yields identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub java: JavaConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JavaConfig {
    pub servers: BTreeMap<String, RoutingConfig>,
}

impl ConfigDocument {
    pub fn single(server_id: impl Into<String>, config: RoutingConfig) -> Self {
        let mut servers = BTreeMap::new();
        servers.insert(server_id.into(), config);
        Self {
            java: JavaConfig { servers },
        }
    }
}

/// One routable server as the proxy sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    pub domains: Vec<String>,
    pub address: String,
    pub gateways: Vec<String>,
    /// Shown to a joining client when the backend can't be dialed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dial_timeout_message: Option<String>,
    /// Shown in the server list when the backend can't be dialed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dial_timeout_status: Option<DialTimeoutStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialTimeoutStatus {
    pub version_name: String,
    pub motd: String,
}

/// Body of `POST /callback`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackMessage {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRef {
    pub server_id: String,
    #[serde(default)]
    pub server_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientRef {
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrePlayerJoinData {
    #[serde(default)]
    pub is_login_request: bool,
    pub server: ServerRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerData {
    pub server: ServerRef,
    #[serde(default)]
    pub client: Option<ClientRef>,
}
