//! ConnectionManager - 远程会话生命周期
//!
//! # 状态
//!
//! 连接状态只有一个可变记录 `{auto_reconnect, session}`，由一个同步锁保护，
//! 不跨 `.await` 持有。`connected` 由 `session.is_some()` 推导，
//! 因此 "已连接 ⇔ 持有可用 session" 在任何观察点都成立。
//!
//! # 串行化
//!
//! 所有状态迁移（connect / disconnect / 健康检查掉线）都经过同一个异步
//! `gate`，保证同一时刻最多只有一个 Connect 尝试在进行。

use super::{ConnectionConfig, HealthMonitor};
use crate::core::error::{AgentError, AgentResult};
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::events::{EventBridge, ObserverSlot, SceneObserver};
use crate::remote::{RemoteConnector, RemoteError, RemoteSession, with_timeout};
use shared::ConnectionStatus;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One open session plus the scope of its event listener
#[derive(Clone)]
pub struct SessionHandle {
    id: u64,
    session: Arc<dyn RemoteSession>,
    listener: CancellationToken,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn session(&self) -> &Arc<dyn RemoteSession> {
        &self.session
    }
}

struct ConnectionState {
    auto_reconnect: bool,
    session: Option<SessionHandle>,
}

struct ConnectionInner {
    connector: Arc<dyn RemoteConnector>,
    config: ConnectionConfig,
    state: Mutex<ConnectionState>,
    gate: tokio::sync::Mutex<()>,
    observer: Arc<ObserverSlot>,
    tasks: BackgroundTasks,
    monitor_started: AtomicBool,
    next_session_id: AtomicU64,
}

/// Owner of the single remote session
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ConnectionInner>,
}

impl ConnectionManager {
    /// Create a disconnected manager whose background tasks live under `parent`
    pub fn new(
        connector: Arc<dyn RemoteConnector>,
        config: ConnectionConfig,
        parent: &CancellationToken,
    ) -> Self {
        let auto_reconnect = config.auto_reconnect;
        Self {
            inner: Arc::new(ConnectionInner {
                connector,
                config,
                state: Mutex::new(ConnectionState {
                    auto_reconnect,
                    session: None,
                }),
                gate: tokio::sync::Mutex::new(()),
                observer: Arc::new(ObserverSlot::default()),
                tasks: BackgroundTasks::with_parent(parent),
                monitor_started: AtomicBool::new(false),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========== Non-blocking reads ==========

    pub fn is_connected(&self) -> bool {
        self.state().session.is_some()
    }

    pub fn auto_reconnect(&self) -> bool {
        self.state().auto_reconnect
    }

    /// Re-enable (or disable) background reconnection
    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.state().auto_reconnect = enabled;
        tracing::info!(enabled, "Auto-reconnect updated");
    }

    pub fn set_observer(&self, observer: Option<Arc<dyn SceneObserver>>) {
        self.inner.observer.set(observer);
    }

    pub fn current_session(&self) -> Option<Arc<dyn RemoteSession>> {
        self.state().session.as_ref().map(|h| h.session.clone())
    }

    pub(crate) fn current_handle(&self) -> Option<SessionHandle> {
        self.state().session.clone()
    }

    /// Session for issuing remote commands
    pub fn session(&self) -> AgentResult<Arc<dyn RemoteSession>> {
        self.current_session().ok_or(AgentError::NotConnected)
    }

    // ========== Lifecycle ==========

    /// Connect to the remote service
    ///
    /// Idempotent: returns `Ok` without reconnecting when already connected.
    /// On failure nothing is left behind.
    pub async fn connect(&self) -> AgentResult<()> {
        if self.inner.tasks.is_shutdown() {
            return Err(AgentError::Closed);
        }

        let _gate = self.inner.gate.lock().await;
        if self.is_connected() {
            tracing::debug!("Already connected, connect is a no-op");
            return Ok(());
        }
        if self.inner.tasks.is_shutdown() {
            return Err(AgentError::Closed);
        }

        self.establish().await?;
        self.start_monitor();
        Ok(())
    }

    /// Bounded foreground retry used at startup
    ///
    /// Returns the last error after `attempts` failures so the caller can
    /// decide (reconfigure, keep running on the background loop, or abort).
    pub async fn connect_with_retry(&self, attempts: u32, delay: Duration) -> AgentResult<()> {
        let attempts = attempts.max(1);
        let shutdown = self.inner.tasks.shutdown_token();
        let mut last_error = AgentError::NotConnected;

        for attempt in 1..=attempts {
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(AgentError::Closed) => return Err(AgentError::Closed),
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        attempts,
                        endpoint = %self.inner.config.remote.endpoint(),
                        error = %e,
                        "Startup connection attempt failed"
                    );
                    last_error = e;
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = shutdown.cancelled() => return Err(AgentError::Closed),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Err(last_error)
    }

    /// Disconnect and stop background reconnection until re-enabled
    pub async fn disconnect(&self) {
        let _gate = self.inner.gate.lock().await;
        let handle = {
            let mut state = self.state();
            state.auto_reconnect = false;
            state.session.take()
        };

        match handle {
            Some(handle) => {
                let session_id = handle.id;
                Self::teardown(handle).await;
                tracing::info!(session_id, "Disconnected from remote service");
            }
            None => tracing::debug!("Disconnect requested while not connected"),
        }
    }

    /// Final shutdown: stop monitor and listeners, then disconnect
    ///
    /// No connection task outlives this call; later `connect()` calls
    /// return [`AgentError::Closed`].
    pub async fn close(&self) {
        self.inner.tasks.shutdown().await;
        self.disconnect().await;
        // 关闭前已在进行的 connect 可能刚启动了 listener
        self.inner.tasks.wait().await;
        tracing::info!("Connection manager closed");
    }

    /// Status snapshot plus one version round trip
    ///
    /// A failed round trip is reported as [`AgentError::ProbeFailed`];
    /// `connected` itself is only changed by the health monitor.
    pub async fn status(&self) -> AgentResult<ConnectionStatus> {
        let (auto_reconnect, session) = {
            let state = self.state();
            (
                state.auto_reconnect,
                state.session.as_ref().map(|h| h.session.clone()),
            )
        };

        let mut status = ConnectionStatus {
            connected: session.is_some(),
            auto_reconnect,
            endpoint: self.inner.config.remote.endpoint(),
            remote: None,
        };

        if let Some(session) = session {
            let version = with_timeout(self.inner.config.request_timeout, session.version())
                .await
                .map_err(|e| AgentError::ProbeFailed(e.to_string()))?;
            status.remote = Some(version);
        }

        Ok(status)
    }

    /// Start the health/reconnect loop if it is not running yet
    pub fn start_monitor(&self) {
        if self.inner.tasks.is_shutdown() || self.inner.monitor_started.swap(true, Ordering::SeqCst)
        {
            return;
        }

        let monitor = HealthMonitor::new(
            self.clone(),
            self.inner.config.health_check_interval,
            self.inner.tasks.child_token(),
        );
        self.inner
            .tasks
            .spawn("connection_monitor", TaskKind::Periodic, monitor.run());
    }

    /// Tear down `session_id` after a failed probe
    ///
    /// No-op when another session has been installed in the meantime.
    pub(crate) async fn drop_session(&self, session_id: u64, cause: &RemoteError) -> bool {
        let _gate = self.inner.gate.lock().await;
        let handle = {
            let mut state = self.state();
            let is_current = state
                .session
                .as_ref()
                .is_some_and(|h| h.id == session_id);
            if is_current { state.session.take() } else { None }
        };

        let Some(handle) = handle else {
            return false;
        };
        Self::teardown(handle).await;
        tracing::warn!(session_id, cause = %cause, "Session marked disconnected");
        true
    }

    async fn establish(&self) -> AgentResult<()> {
        let config = &self.inner.config;
        let connection = with_timeout(
            config.request_timeout,
            self.inner
                .connector
                .connect(&config.remote, &config.subscriptions),
        )
        .await
        .map_err(AgentError::ConnectionFailed)?;

        if self.inner.tasks.is_shutdown() {
            connection.session.close().await;
            tracing::debug!("Manager closed while connecting, dropping new session");
            return Err(AgentError::Closed);
        }

        let session_id = self.inner.next_session_id.fetch_add(1, Ordering::SeqCst);
        let listener = self.inner.tasks.child_token();
        {
            let mut state = self.state();
            state.session = Some(SessionHandle {
                id: session_id,
                session: connection.session,
                listener: listener.clone(),
            });
        }

        let bridge = EventBridge::new(session_id, self.inner.observer.clone());
        self.inner.tasks.spawn(
            "event_bridge",
            TaskKind::Listener,
            bridge.run(connection.events, listener),
        );

        tracing::info!(
            endpoint = %config.remote.endpoint(),
            session_id,
            "Connected to remote service"
        );
        Ok(())
    }

    async fn teardown(handle: SessionHandle) {
        handle.listener.cancel();
        handle.session.close().await;
    }
}
