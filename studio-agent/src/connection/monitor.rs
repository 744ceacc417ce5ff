//! HealthMonitor - 健康检查 + 自动重连
//!
//! 一个任务、一个周期：
//!
//! - 已连接：发送一次 version 探测，失败则拆除该 session
//! - 未连接且允许自动重连：尝试 `connect()`，失败等下一周期
//!
//! 重连没有退避也没有次数上限，周期固定为 `health_check_interval`。

use super::{ConnectionManager, SessionHandle};
use crate::remote::with_timeout;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Observed health of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

pub struct HealthMonitor {
    connection: ConnectionManager,
    period: Duration,
    shutdown: CancellationToken,
    state: HealthState,
    consecutive_failures: u32,
    reconnect_attempts: u32,
}

impl HealthMonitor {
    pub fn new(connection: ConnectionManager, period: Duration, shutdown: CancellationToken) -> Self {
        Self {
            connection,
            period,
            shutdown,
            state: HealthState::Healthy,
            consecutive_failures: 0,
            reconnect_attempts: 0,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    /// Probe failures since the last successful probe
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// 运行监控循环（直到取消）
    pub async fn run(mut self) {
        tracing::info!(period_ms = self.period.as_millis() as u64, "Connection monitor started");

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 跳过立即触发的第一次 tick
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Connection monitor received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!("Connection monitor stopped");
    }

    /// One probe-or-reconnect cycle
    pub async fn tick(&mut self) -> HealthState {
        match self.connection.current_handle() {
            Some(handle) => self.probe(handle).await,
            None => self.reconnect().await,
        }
        self.state
    }

    async fn probe(&mut self, handle: SessionHandle) {
        let timeout = self.connection.config().request_timeout;
        match with_timeout(timeout, handle.session().version()).await {
            Ok(_) => {
                if self.state == HealthState::Unhealthy || self.consecutive_failures > 0 {
                    tracing::info!(session_id = handle.id(), "Connection healthy again");
                }
                self.state = HealthState::Healthy;
                self.consecutive_failures = 0;
            }
            Err(e) => {
                self.consecutive_failures += 1;
                self.state = HealthState::Unhealthy;
                tracing::error!(
                    session_id = handle.id(),
                    consecutive_failures = self.consecutive_failures,
                    error = %e,
                    "Health probe failed, dropping session"
                );
                self.connection.drop_session(handle.id(), &e).await;
            }
        }
    }

    async fn reconnect(&mut self) {
        self.state = HealthState::Unhealthy;
        if !self.connection.auto_reconnect() {
            tracing::trace!("Disconnected with auto-reconnect disabled, idling");
            return;
        }

        self.reconnect_attempts += 1;
        match self.connection.connect().await {
            Ok(()) => {
                tracing::info!(attempts = self.reconnect_attempts, "Reconnected to remote service");
                self.state = HealthState::Healthy;
                self.reconnect_attempts = 0;
            }
            Err(e) => {
                tracing::warn!(
                    attempt = self.reconnect_attempts,
                    endpoint = %self.connection.config().remote.endpoint(),
                    error = %e,
                    "Reconnect attempt failed, retrying next cycle"
                );
            }
        }
    }
}
