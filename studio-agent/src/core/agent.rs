//! CaptureAgent - 组件装配
//!
//! 持有根取消作用域，把 connection、事件转发和 capture registry 连在一起。
//!
//! ```text
//! CaptureAgent (root token)
//!   ├── ConnectionManager (child scope: HealthMonitor, EventBridge)
//!   │     └── NotificationRouter → BroadcastSink
//!   └── CaptureRegistry (child scope: CaptureWorker × N, RetentionSweeper)
//! ```

use super::config::Config;
use super::error::AgentResult;
use crate::capture::{CaptureRegistry, RegistrySettings};
use crate::connection::{ConnectionConfig, ConnectionManager};
use crate::events::{BroadcastSink, NotificationRouter};
use crate::remote::RemoteConnector;
use crate::storage::CaptureStore;
use shared::Notification;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Buffered notifications per subscriber before it starts lagging
const NOTIFICATION_CAPACITY: usize = 256;

pub struct CaptureAgent {
    config: Config,
    shutdown: CancellationToken,
    connection: ConnectionManager,
    registry: CaptureRegistry,
    notifications: BroadcastSink,
}

impl CaptureAgent {
    pub fn new(
        config: Config,
        connector: Arc<dyn RemoteConnector>,
        store: Arc<dyn CaptureStore>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let connection =
            ConnectionManager::new(connector, ConnectionConfig::from(&config), &shutdown);

        let notifications = BroadcastSink::new(NOTIFICATION_CAPACITY);
        let router = NotificationRouter::new(Arc::new(notifications.clone()));
        connection.set_observer(Some(Arc::new(router)));

        let registry = CaptureRegistry::new(
            store,
            connection.clone(),
            RegistrySettings {
                max_history_per_target: config.max_history_per_target,
                sweep_interval: config.sweep_interval,
            },
        );

        Self {
            config,
            shutdown,
            connection,
            registry,
            notifications,
        }
    }

    /// Start capture workers, the sweeper and the connection monitor
    pub fn start(&self) -> AgentResult<()> {
        self.registry.start(&self.shutdown)?;
        self.connection.start_monitor();
        tracing::info!(
            endpoint = %self.config.remote.endpoint(),
            workers = self.registry.worker_count(),
            "Capture agent started"
        );
        Ok(())
    }

    /// Bounded startup connect using the configured attempts and delay
    pub async fn connect_at_startup(&self) -> AgentResult<()> {
        self.connection
            .connect_with_retry(
                self.config.startup_connect_attempts,
                self.config.startup_retry_delay,
            )
            .await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn registry(&self) -> &CaptureRegistry {
        &self.registry
    }

    /// Graceful shutdown - stop workers, close the connection, cancel the root scope
    pub async fn shutdown(&self) {
        tracing::info!("Capture agent shutting down");
        self.registry.stop().await;
        self.connection.close().await;
        self.shutdown.cancel();
        tracing::info!("Capture agent stopped");
    }
}

impl Drop for CaptureAgent {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
