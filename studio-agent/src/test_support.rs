//! Test doubles shared by unit tests

use crate::events::{NotificationSink, SceneObserver};
use crate::storage::{CaptureStore, RedbCaptureStore, StorageError, StorageResult};
use shared::{ArtifactMeta, CaptureTarget, CapturedArtifact};
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Enabled PNG target pointing at the `Main` scene
pub fn sample_target(id: &str, cadence_ms: u64) -> CaptureTarget {
    CaptureTarget::with_id(id, format!("Target {id}"), "Main", cadence_ms)
}

fn injected() -> StorageError {
    StorageError::Storage(redb::StorageError::Io(std::io::Error::other(
        "injected failure",
    )))
}

/// Records every sink call
#[derive(Default)]
pub struct RecordingSink {
    list_changed: Mutex<usize>,
    updated: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn list_changed(&self) -> usize {
        *self.list_changed.lock().unwrap()
    }

    pub fn updated(&self) -> Vec<String> {
        self.updated.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify_list_changed(&self) {
        *self.list_changed.lock().unwrap() += 1;
    }

    fn notify_updated(&self, uri: &str) {
        self.updated.lock().unwrap().push(uri.to_string());
    }
}

/// Records observer callbacks as `kind:name`
#[derive(Default)]
pub struct RecordingObserver {
    calls: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, kind: &str, scene_name: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{kind}:{scene_name}"));
    }
}

impl SceneObserver for RecordingObserver {
    fn on_created(&self, scene_name: &str) {
        self.record("created", scene_name);
    }

    fn on_removed(&self, scene_name: &str) {
        self.record("removed", scene_name);
    }

    fn on_current_changed(&self, scene_name: &str) {
        self.record("current_changed", scene_name);
    }
}

/// redb store with injectable save and trim failures
pub struct FlakyStore {
    inner: RedbCaptureStore,
    save_failures: AtomicU32,
    trim_failures: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn new(inner: RedbCaptureStore) -> Self {
        Self {
            inner,
            save_failures: AtomicU32::new(0),
            trim_failures: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_next_saves(&self, n: u32) {
        self.save_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_trim_for(&self, target_id: &str) {
        self.trim_failures
            .lock()
            .unwrap()
            .insert(target_id.to_string());
    }
}

impl CaptureStore for FlakyStore {
    fn list_targets(&self) -> StorageResult<Vec<CaptureTarget>> {
        self.inner.list_targets()
    }

    fn get_target(&self, id: &str) -> StorageResult<Option<CaptureTarget>> {
        self.inner.get_target(id)
    }

    fn create_target(&self, target: &CaptureTarget) -> StorageResult<()> {
        self.inner.create_target(target)
    }

    fn update_target(&self, target: &CaptureTarget) -> StorageResult<()> {
        self.inner.update_target(target)
    }

    fn delete_target(&self, id: &str) -> StorageResult<bool> {
        self.inner.delete_target(id)
    }

    fn save_artifact(&self, artifact: &CapturedArtifact) -> StorageResult<u64> {
        let failing = self
            .save_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(injected());
        }
        self.inner.save_artifact(artifact)
    }

    fn list_artifacts(&self, target_id: &str) -> StorageResult<Vec<ArtifactMeta>> {
        self.inner.list_artifacts(target_id)
    }

    fn latest_artifact(&self, target_id: &str) -> StorageResult<Option<CapturedArtifact>> {
        self.inner.latest_artifact(target_id)
    }

    fn artifact_count(&self, target_id: &str) -> StorageResult<usize> {
        self.inner.artifact_count(target_id)
    }

    fn delete_oldest(&self, target_id: &str, keep: usize) -> StorageResult<usize> {
        if self.trim_failures.lock().unwrap().contains(target_id) {
            return Err(injected());
        }
        self.inner.delete_oldest(target_id, keep)
    }
}
