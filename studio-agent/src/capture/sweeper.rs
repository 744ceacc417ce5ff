//! Retention Sweeper
//!
//! 周期性地把每个 target 的历史裁剪到 `max_history_per_target` 条，
//! 按采集时间从旧到新删除。单个 target 失败不影响其他 target。

use crate::storage::CaptureStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Targets visited
    pub targets: usize,
    /// Artifacts deleted across all targets
    pub deleted: usize,
    /// Targets whose cleanup failed
    pub failed: usize,
}

/// 历史清理任务
///
/// 注册为 `TaskKind::Periodic`，随 registry 作用域启动和停止。
pub struct RetentionSweeper {
    store: Arc<dyn CaptureStore>,
    max_history_per_target: usize,
    period: Duration,
    shutdown: CancellationToken,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn CaptureStore>,
        max_history_per_target: usize,
        period: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            max_history_per_target,
            period,
            shutdown,
        }
    }

    /// 主循环（第一次 tick 跳过）
    pub async fn run(self) {
        tracing::info!(
            period_ms = self.period.as_millis() as u64,
            keep = self.max_history_per_target,
            "Retention sweeper started"
        );

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Retention sweeper received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep_once();
                }
            }
        }

        tracing::info!("Retention sweeper stopped");
    }

    /// Trim every stored target once
    pub fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let targets = match self.store.list_targets() {
            Ok(targets) => targets,
            Err(e) => {
                tracing::warn!(error = %e, "Retention sweep could not list targets");
                return report;
            }
        };

        for target in targets {
            report.targets += 1;
            match self.store.delete_oldest(&target.id, self.max_history_per_target) {
                Ok(deleted) => report.deleted += deleted,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(target_id = %target.id, error = %e, "Failed to trim capture history");
                }
            }
        }

        if report.deleted > 0 || report.failed > 0 {
            tracing::info!(
                targets = report.targets,
                deleted = report.deleted,
                failed = report.failed,
                "Retention sweep finished"
            );
        } else {
            tracing::debug!(targets = report.targets, "Retention sweep found nothing to delete");
        }

        report
    }
}
