//! Capture Registry
//!
//! 管理 capture target 的持久化和每个 target 的 worker。
//!
//! # 状态
//!
//! `{scope, workers}` 由一把 `RwLock` 保护；worker 的执行不在锁内。
//! `scope` 存在即表示 registry 正在运行，所有 worker 和 sweeper 都注册在
//! 该作用域的 [`BackgroundTasks`] 中，`stop()` 会等待它们全部退出。

use super::sweeper::{RetentionSweeper, SweepReport};
use super::worker::{CadenceCell, CaptureWorker};
use crate::connection::ConnectionManager;
use crate::core::error::{AgentError, AgentResult};
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::storage::CaptureStore;
use shared::CaptureTarget;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Registry tuning
#[derive(Debug, Clone, Copy)]
pub struct RegistrySettings {
    pub max_history_per_target: usize,
    pub sweep_interval: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            max_history_per_target: 10,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

struct WorkerHandle {
    cancel: CancellationToken,
    cadence: CadenceCell,
}

#[derive(Default)]
struct RegistryState {
    scope: Option<Arc<BackgroundTasks>>,
    workers: HashMap<String, WorkerHandle>,
}

pub struct CaptureRegistry {
    store: Arc<dyn CaptureStore>,
    connection: ConnectionManager,
    settings: RegistrySettings,
    state: RwLock<RegistryState>,
}

/// Cadence in whole milliseconds; zero and values past `u64` millis are rejected
fn validate_cadence(id: &str, cadence: Duration) -> AgentResult<u64> {
    u64::try_from(cadence.as_millis())
        .ok()
        .filter(|ms| *ms > 0)
        .ok_or_else(|| AgentError::InvalidCadence(id.to_string()))
}

impl CaptureRegistry {
    pub fn new(
        store: Arc<dyn CaptureStore>,
        connection: ConnectionManager,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            store,
            connection,
            settings,
            state: RwLock::new(RegistryState::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn store(&self) -> &Arc<dyn CaptureStore> {
        &self.store
    }

    // ========== Lifecycle ==========

    /// Spawn one worker per enabled stored target, then the retention sweeper
    pub fn start(&self, parent: &CancellationToken) -> AgentResult<()> {
        let mut state = self.write();
        if state.scope.is_some() {
            return Err(AgentError::AlreadyRunning);
        }

        let targets = self.store.list_targets()?;
        let tasks = Arc::new(BackgroundTasks::with_parent(parent));

        for target in targets.into_iter().filter(|t| t.enabled) {
            if let Err(e) = validate_cadence(&target.id, target.cadence()) {
                tracing::warn!(target_id = %target.id, error = %e, "Skipping stored target");
                continue;
            }
            let id = target.id.clone();
            let handle = self.spawn_worker(&tasks, target);
            state.workers.insert(id, handle);
        }

        let sweeper = RetentionSweeper::new(
            self.store.clone(),
            self.settings.max_history_per_target,
            self.settings.sweep_interval,
            tasks.child_token(),
        );
        tasks.spawn("retention_sweeper", TaskKind::Periodic, sweeper.run());

        tracing::info!(workers = state.workers.len(), "Capture registry started");
        state.scope = Some(tasks);
        Ok(())
    }

    /// Cancel every worker and the sweeper, waiting until all have exited
    pub async fn stop(&self) {
        let scope = {
            let mut state = self.write();
            state.workers.clear();
            state.scope.take()
        };

        match scope {
            Some(tasks) => {
                tasks.shutdown().await;
                tracing::info!("Capture registry stopped");
            }
            None => tracing::debug!("Capture registry stop requested while not running"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.read().scope.is_some()
    }

    pub fn worker_count(&self) -> usize {
        self.read().workers.len()
    }

    /// Live cadence of a running worker
    pub fn cadence_of(&self, id: &str) -> Option<Duration> {
        self.read().workers.get(id).map(|w| w.cadence.get())
    }

    // ========== Target management ==========

    pub fn targets(&self) -> AgentResult<Vec<CaptureTarget>> {
        Ok(self.store.list_targets()?)
    }

    pub fn get_target(&self, id: &str) -> AgentResult<CaptureTarget> {
        self.store
            .get_target(id)?
            .ok_or_else(|| AgentError::TargetNotFound(id.to_string()))
    }

    /// Persist a new target and start its worker when running and enabled
    pub fn add_target(&self, target: CaptureTarget) -> AgentResult<()> {
        validate_cadence(&target.id, target.cadence())?;
        self.store.create_target(&target)?;
        tracing::info!(
            target_id = %target.id,
            remote_target = %target.remote_target_name,
            cadence_ms = target.cadence_ms,
            enabled = target.enabled,
            "Capture target added"
        );

        if target.enabled {
            self.replace_worker(target);
        }
        Ok(())
    }

    /// Persist changes and restart (enabled) or stop (disabled) the worker
    pub fn update_target(&self, target: CaptureTarget) -> AgentResult<()> {
        validate_cadence(&target.id, target.cadence())?;
        self.store.update_target(&target)?;
        tracing::info!(target_id = %target.id, enabled = target.enabled, "Capture target updated");

        if target.enabled {
            self.replace_worker(target);
        } else {
            self.stop_worker(&target.id);
        }
        Ok(())
    }

    /// Stop the worker and delete the target with its history
    ///
    /// Succeeds when the target never existed.
    pub fn remove_target(&self, id: &str) -> AgentResult<()> {
        self.stop_worker(id);
        if self.store.delete_target(id)? {
            tracing::info!(target_id = %id, "Capture target removed");
        }
        Ok(())
    }

    /// Change the cadence in place; a running worker is not restarted
    pub fn update_cadence(&self, id: &str, cadence: Duration) -> AgentResult<()> {
        let cadence_ms = validate_cadence(id, cadence)?;

        let mut target = self.get_target(id)?;
        target.cadence_ms = cadence_ms;
        self.store.update_target(&target)?;

        if let Some(worker) = self.read().workers.get(id) {
            worker.cadence.set(cadence);
        }
        tracing::info!(target_id = %id, cadence_ms = target.cadence_ms, "Capture cadence updated");
        Ok(())
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> AgentResult<()> {
        let mut target = self.get_target(id)?;
        target.enabled = enabled;
        self.update_target(target)
    }

    /// Run one retention pass now, outside the periodic schedule
    pub fn sweep_now(&self) -> SweepReport {
        RetentionSweeper::new(
            self.store.clone(),
            self.settings.max_history_per_target,
            self.settings.sweep_interval,
            CancellationToken::new(),
        )
        .sweep_once()
    }

    // ========== Workers ==========

    fn spawn_worker(&self, tasks: &BackgroundTasks, target: CaptureTarget) -> WorkerHandle {
        let cancel = tasks.child_token();
        let cadence = CadenceCell::new(target.cadence());
        let worker = CaptureWorker::new(
            target,
            cadence.clone(),
            self.connection.clone(),
            self.store.clone(),
            cancel.clone(),
        );
        tasks.spawn("capture_worker", TaskKind::Worker, worker.run());
        WorkerHandle { cancel, cadence }
    }

    fn replace_worker(&self, target: CaptureTarget) {
        let mut state = self.write();
        let Some(tasks) = state.scope.clone() else {
            return;
        };

        if let Some(previous) = state.workers.remove(&target.id) {
            previous.cancel.cancel();
        }
        let id = target.id.clone();
        let handle = self.spawn_worker(&tasks, target);
        state.workers.insert(id, handle);
    }

    fn stop_worker(&self, id: &str) {
        if let Some(worker) = self.write().workers.remove(id) {
            worker.cancel.cancel();
            tracing::debug!(target_id = %id, "Capture worker cancelled");
        }
    }
}
