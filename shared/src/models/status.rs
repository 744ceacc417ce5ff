//! Connection Status Model

use serde::{Deserialize, Serialize};

/// Version information reported by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVersion {
    pub service_version: String,
    pub protocol_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// Connection status snapshot for host surfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub auto_reconnect: bool,
    /// Server address, `host:port`
    pub endpoint: String,
    /// Present only when connected and the status round trip succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteVersion>,
}
