//! Capture Worker - 单个 target 的周期采集
//!
//! 启动后立即采集一次，之后按 cadence 周期采集。
//! cadence 通过共享的 [`CadenceCell`] 原地更新，worker 在每次采集后读取，
//! 变化时把下一次 tick 重新安排到 `now + new_cadence`，不会额外触发一次采集。

use crate::connection::ConnectionManager;
use crate::core::error::{AgentError, AgentResult};
use crate::remote::{ScreenshotRequest, with_timeout};
use crate::storage::{CaptureStore, StorageError};
use base64::Engine;
use shared::{CaptureTarget, CapturedArtifact, OutputFormat};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Live cadence shared between the registry and one worker
#[derive(Debug, Clone)]
pub struct CadenceCell(Arc<Mutex<Duration>>);

impl CadenceCell {
    pub fn new(cadence: Duration) -> Self {
        Self(Arc::new(Mutex::new(cadence)))
    }

    pub fn get(&self) -> Duration {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, cadence: Duration) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = cadence;
    }
}

/// MIME type for a requested output format
pub fn mime_for(format: OutputFormat) -> String {
    mime_guess::from_ext(format.extension())
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Decode base64 image data, accepting an optional `data:<mime>;base64,` prefix
pub fn decode_image_data(data: &str) -> Result<Vec<u8>, String> {
    let encoded = match data.strip_prefix("data:") {
        Some(uri) => {
            let (header, body) = uri
                .split_once(',')
                .ok_or_else(|| "malformed data URI".to_string())?;
            if !header.ends_with(";base64") {
                return Err(format!("unsupported data URI encoding: {header}"));
            }
            body
        }
        None => data,
    };

    let payload = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| format!("invalid base64 payload: {e}"))?;
    if payload.is_empty() {
        return Err("empty screenshot payload".to_string());
    }
    Ok(payload)
}

/// Longest period a worker ticker is armed with; longer cadences wait this long
const MAX_TICK_PERIOD: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Ticker whose first tick fires `delay` after now
fn ticker_after(delay: Duration, cadence: Duration) -> Interval {
    let now = Instant::now();
    let period = cadence.min(MAX_TICK_PERIOD);
    let start = now
        .checked_add(delay.min(MAX_TICK_PERIOD))
        .unwrap_or(now);
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

pub struct CaptureWorker {
    target: CaptureTarget,
    cadence: CadenceCell,
    connection: ConnectionManager,
    store: Arc<dyn CaptureStore>,
    shutdown: CancellationToken,
}

impl CaptureWorker {
    pub fn new(
        target: CaptureTarget,
        cadence: CadenceCell,
        connection: ConnectionManager,
        store: Arc<dyn CaptureStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            target,
            cadence,
            connection,
            store,
            shutdown,
        }
    }

    /// 运行采集循环（直到取消）
    pub async fn run(self) {
        let mut cadence = self.cadence.get();
        tracing::info!(
            target_id = %self.target.id,
            remote_target = %self.target.remote_target_name,
            cadence_ms = cadence.as_millis() as u64,
            "Capture worker started"
        );

        // 第一次 tick 立即触发
        let mut ticker = ticker_after(Duration::ZERO, cadence);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.capture_cycle().await;

                    let latest = self.cadence.get();
                    if latest != cadence {
                        tracing::debug!(
                            target_id = %self.target.id,
                            from_ms = cadence.as_millis() as u64,
                            to_ms = latest.as_millis() as u64,
                            "Capture cadence changed, re-arming"
                        );
                        cadence = latest;
                        ticker = ticker_after(cadence, cadence);
                    }
                }
            }
        }

        tracing::info!(target_id = %self.target.id, "Capture worker stopped");
    }

    async fn capture_cycle(&self) {
        match self.capture_once().await {
            Ok(Some(artifact_id)) => {
                tracing::trace!(target_id = %self.target.id, artifact_id, "Artifact captured");
            }
            Ok(None) => {}
            Err(e @ AgentError::PersistFailed { .. }) => {
                tracing::error!(target_id = %self.target.id, error = %e, "Capture persisted nothing");
            }
            Err(e) => {
                tracing::warn!(target_id = %self.target.id, error = %e, "Capture cycle failed");
            }
        }
    }

    /// One capture attempt
    ///
    /// `Ok(None)` when skipped (disconnected) or discarded (stopped mid-flight).
    pub async fn capture_once(&self) -> AgentResult<Option<u64>> {
        let Some(session) = self.connection.current_session() else {
            tracing::debug!(target_id = %self.target.id, "Not connected, skipping capture");
            return Ok(None);
        };

        let request = ScreenshotRequest {
            source_name: self.target.remote_target_name.clone(),
            format: self.target.output_format,
            max_dimensions: self.target.max_dimensions,
            quality: self.target.quality,
        };
        let timeout = self.connection.config().request_timeout;

        let fetched = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(None),
            fetched = with_timeout(timeout, session.fetch_screenshot(&request)) => fetched,
        };
        let encoded = fetched.map_err(|e| self.capture_failed(e.to_string()))?;
        let payload = decode_image_data(&encoded).map_err(|reason| self.capture_failed(reason))?;

        if self.shutdown.is_cancelled() {
            tracing::debug!(target_id = %self.target.id, "Worker stopped during capture, discarding result");
            return Ok(None);
        }

        let artifact = CapturedArtifact::new(
            self.target.id.clone(),
            payload,
            mime_for(self.target.output_format),
        );
        match self.store.save_artifact(&artifact) {
            Ok(artifact_id) => Ok(Some(artifact_id)),
            Err(StorageError::TargetNotFound(_)) => {
                tracing::debug!(target_id = %self.target.id, "Target removed during capture, discarding result");
                Ok(None)
            }
            Err(source) => Err(AgentError::PersistFailed {
                target_id: self.target.id.clone(),
                source,
            }),
        }
    }

    fn capture_failed(&self, reason: String) -> AgentError {
        AgentError::CaptureFailed {
            target_id: self.target.id.clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionConfig;
    use crate::remote::{MemoryRemote, RemoteConfig};
    use crate::storage::RedbCaptureStore;
    use crate::test_support::{FlakyStore, sample_target};

    async fn connected(remote: &MemoryRemote) -> ConnectionManager {
        let mut config = ConnectionConfig::new(RemoteConfig::default());
        config.health_check_interval = Duration::from_secs(3600);
        let manager =
            ConnectionManager::new(Arc::new(remote.clone()), config, &CancellationToken::new());
        manager.connect().await.unwrap();
        manager
    }

    fn store_for(target_id: &str) -> Arc<RedbCaptureStore> {
        let store = RedbCaptureStore::open_in_memory().unwrap();
        store.create_target(&sample_target(target_id, 1000)).unwrap();
        Arc::new(store)
    }

    fn offsets(remote: &MemoryRemote, start: Instant) -> Vec<u64> {
        remote
            .fetch_times()
            .iter()
            .map(|t| t.duration_since(start).as_millis() as u64)
            .collect()
    }

    #[test]
    fn test_decode_image_data() {
        assert_eq!(decode_image_data("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(
            decode_image_data("data:image/png;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert!(decode_image_data("data:image/png,hello").is_err());
        assert!(decode_image_data("data:image/png;base64").is_err());
        assert!(decode_image_data("!!!").is_err());
        assert!(decode_image_data("").is_err());
    }

    #[test]
    fn test_mime_for_formats() {
        assert_eq!(mime_for(OutputFormat::Png), "image/png");
        assert_eq!(mime_for(OutputFormat::Jpeg), "image/jpeg");
        assert_eq!(mime_for(OutputFormat::Webp), "image/webp");
    }

    #[tokio::test]
    async fn test_capture_once_persists_decoded_payload() {
        let remote = MemoryRemote::new().with_scenes(["Main"]);
        let manager = connected(&remote).await;
        let store = store_for("t1");
        let target = sample_target("t1", 1000).with_format(OutputFormat::Jpeg);
        let worker = CaptureWorker::new(
            target.clone(),
            CadenceCell::new(target.cadence()),
            manager.clone(),
            store.clone(),
            CancellationToken::new(),
        );

        let id = worker.capture_once().await.unwrap();
        assert!(id.is_some());
        let latest = store.latest_artifact("t1").unwrap().unwrap();
        assert_eq!(latest.payload, b"Main#1@jpeg");
        assert_eq!(latest.mime_type, "image/jpeg");
        assert_eq!(latest.size_bytes, 11);

        manager.disconnect().await;
        assert_eq!(worker.capture_once().await.unwrap(), None);
        assert_eq!(remote.fetch_count(), 1);
        manager.close().await;
    }

    #[tokio::test]
    async fn test_capture_errors_are_typed() {
        let remote = MemoryRemote::new().with_scenes(["Main"]);
        let manager = connected(&remote).await;
        let inner = RedbCaptureStore::open_in_memory().unwrap();
        inner.create_target(&sample_target("t1", 1000)).unwrap();
        let store = Arc::new(FlakyStore::new(inner));
        let target = sample_target("t1", 1000);
        let worker = CaptureWorker::new(
            target.clone(),
            CadenceCell::new(target.cadence()),
            manager.clone(),
            store.clone(),
            CancellationToken::new(),
        );

        remote.fail_next_fetches(1);
        let err = worker.capture_once().await.unwrap_err();
        assert!(matches!(err, AgentError::CaptureFailed { ref target_id, .. } if target_id == "t1"));

        store.fail_next_saves(1);
        let err = worker.capture_once().await.unwrap_err();
        assert!(matches!(err, AgentError::PersistFailed { .. }));

        assert!(worker.capture_once().await.unwrap().is_some());
        assert_eq!(store.artifact_count("t1").unwrap(), 1);
        manager.close().await;
    }

    #[tokio::test]
    async fn test_result_discarded_after_cancel() {
        let remote = MemoryRemote::new().with_scenes(["Main"]);
        let manager = connected(&remote).await;
        let store = store_for("t1");
        let token = CancellationToken::new();
        let target = sample_target("t1", 1000);
        let worker = CaptureWorker::new(
            target.clone(),
            CadenceCell::new(target.cadence()),
            manager.clone(),
            store.clone(),
            token.clone(),
        );

        token.cancel();
        assert_eq!(worker.capture_once().await.unwrap(), None);
        assert_eq!(store.artifact_count("t1").unwrap(), 0);
        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadence_update_rearms_without_extra_capture() {
        let remote = MemoryRemote::new().with_scenes(["Main"]);
        let manager = connected(&remote).await;
        let store = store_for("t1");
        let token = CancellationToken::new();
        let cadence = CadenceCell::new(Duration::from_millis(1000));

        let start = Instant::now();
        let worker = CaptureWorker::new(
            sample_target("t1", 1000),
            cadence.clone(),
            manager.clone(),
            store.clone(),
            token.clone(),
        );
        let handle = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(offsets(&remote, start), vec![0, 1000, 2000]);

        cadence.set(Duration::from_millis(200));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(remote.fetch_count(), 3);

        tokio::time::sleep(Duration::from_millis(1_150)).await;
        assert_eq!(
            offsets(&remote, start),
            vec![0, 1000, 2000, 3000, 3200, 3400, 3600]
        );

        token.cancel();
        handle.await.unwrap();
        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_does_not_skip_next_tick() {
        let remote = MemoryRemote::new().with_scenes(["Main"]);
        let manager = connected(&remote).await;
        let store = store_for("t1");
        let token = CancellationToken::new();

        let start = Instant::now();
        let worker = CaptureWorker::new(
            sample_target("t1", 500),
            CadenceCell::new(Duration::from_millis(500)),
            manager.clone(),
            store.clone(),
            token.clone(),
        );
        let handle = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        remote.fail_next_fetches(1);
        tokio::time::sleep(Duration::from_millis(1_000)).await;

        // Cycle at 500ms failed, cycle at 1000ms ran on schedule
        assert_eq!(offsets(&remote, start), vec![0, 1000]);
        assert_eq!(store.artifact_count("t1").unwrap(), 2);

        token.cancel();
        handle.await.unwrap();
        manager.close().await;
    }

    #[tokio::test]
    async fn test_capture_for_removed_target_leaves_no_history() {
        let remote = MemoryRemote::new().with_scenes(["Main"]);
        let manager = connected(&remote).await;
        let store = store_for("t1");
        let target = sample_target("t1", 1000);
        let worker = CaptureWorker::new(
            target.clone(),
            CadenceCell::new(target.cadence()),
            manager.clone(),
            store.clone(),
            CancellationToken::new(),
        );

        // Target deleted while the worker is still live
        store.delete_target("t1").unwrap();
        assert_eq!(worker.capture_once().await.unwrap(), None);
        assert_eq!(remote.fetch_count(), 1);
        assert_eq!(store.artifact_count("t1").unwrap(), 0);
        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_cadence_rearms_without_overflow() {
        let remote = MemoryRemote::new().with_scenes(["Main"]);
        let manager = connected(&remote).await;
        let store = store_for("t1");
        let token = CancellationToken::new();
        let cadence = CadenceCell::new(Duration::from_millis(1000));

        let worker = CaptureWorker::new(
            sample_target("t1", 1000),
            cadence.clone(),
            manager.clone(),
            store.clone(),
            token.clone(),
        );
        let handle = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_millis(10)).await;
        cadence.set(Duration::MAX);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(remote.fetch_count(), 2);

        token.cancel();
        handle.await.unwrap();
        manager.close().await;
    }
}
