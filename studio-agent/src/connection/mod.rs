//! Connection lifecycle
//!
//! - [`ConnectionManager`]: connect / disconnect / close, status, session access
//! - [`HealthMonitor`]: one periodic loop that probes while connected and
//!   reconnects while disconnected

pub mod manager;
pub mod monitor;

pub use manager::{ConnectionManager, SessionHandle};
pub use monitor::{HealthMonitor, HealthState};

use crate::core::Config;
use crate::remote::RemoteConfig;
use shared::EventCategory;
use std::time::Duration;

/// Connection settings
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub remote: RemoteConfig,
    pub auto_reconnect: bool,
    /// Shared period of the health probe and the reconnect attempt
    pub health_check_interval: Duration,
    /// Bound for every connect, probe and status round trip
    pub request_timeout: Duration,
    /// Event categories requested when the session opens
    pub subscriptions: Vec<EventCategory>,
}

impl ConnectionConfig {
    pub fn new(remote: RemoteConfig) -> Self {
        Self {
            remote,
            auto_reconnect: true,
            health_check_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            subscriptions: vec![EventCategory::Scenes],
        }
    }
}

impl From<&Config> for ConnectionConfig {
    fn from(config: &Config) -> Self {
        Self {
            remote: config.remote.clone(),
            auto_reconnect: config.auto_reconnect,
            health_check_interval: config.health_check_interval,
            request_timeout: config.request_timeout,
            subscriptions: vec![EventCategory::Scenes],
        }
    }
}
