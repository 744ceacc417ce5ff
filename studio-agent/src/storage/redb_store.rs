//! redb-based capture store
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `targets` | `target_id` | `CaptureTarget` (JSON) | Registered capture targets |
//! | `artifact_meta` | `(target_id, captured_at, id)` | `ArtifactMeta` (JSON) | History index |
//! | `artifact_data` | `(target_id, captured_at, id)` | raw bytes | Payloads |
//! | `counters` | `"artifact_id"` | `u64` | Artifact id sequence |
//!
//! Artifact keys sort by capture time within a target, so retention walks a
//! single range from the oldest entry.

use super::{CaptureStore, StorageError, StorageResult};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use shared::{ArtifactMeta, CaptureTarget, CapturedArtifact};
use std::path::Path;
use std::sync::Arc;

const TARGETS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("targets");

/// (target_id, captured_at, id) -> JSON-serialized ArtifactMeta
const ARTIFACT_META_TABLE: TableDefinition<(&str, i64, u64), &[u8]> =
    TableDefinition::new("artifact_meta");

/// (target_id, captured_at, id) -> payload bytes
const ARTIFACT_DATA_TABLE: TableDefinition<(&str, i64, u64), &[u8]> =
    TableDefinition::new("artifact_data");

const COUNTERS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("counters");

const ARTIFACT_ID_KEY: &str = "artifact_id";

type ArtifactKey = (String, i64, u64);

/// Capture store backed by redb
#[derive(Clone)]
pub struct RedbCaptureStore {
    db: Arc<Database>,
}

impl RedbCaptureStore {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (tests, demos)
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TARGETS_TABLE)?;
            let _ = write_txn.open_table(ARTIFACT_META_TABLE)?;
            let _ = write_txn.open_table(ARTIFACT_DATA_TABLE)?;
            let mut counters = write_txn.open_table(COUNTERS_TABLE)?;
            if counters.get(ARTIFACT_ID_KEY)?.is_none() {
                counters.insert(ARTIFACT_ID_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    fn next_artifact_id(txn: &WriteTransaction) -> StorageResult<u64> {
        let mut table = txn.open_table(COUNTERS_TABLE)?;
        let current = table
            .get(ARTIFACT_ID_KEY)?
            .map(|guard| guard.value())
            .unwrap_or(0);
        let next = current + 1;
        table.insert(ARTIFACT_ID_KEY, next)?;
        Ok(next)
    }

    /// Artifact keys of one target, oldest first
    fn artifact_keys(txn: &WriteTransaction, target_id: &str) -> StorageResult<Vec<ArtifactKey>> {
        let table = txn.open_table(ARTIFACT_META_TABLE)?;
        let mut keys = Vec::new();
        for result in table.range((target_id, i64::MIN, 0u64)..=(target_id, i64::MAX, u64::MAX))? {
            let (key, _value) = result?;
            let (tid, captured_at, id) = key.value();
            keys.push((tid.to_string(), captured_at, id));
        }
        Ok(keys)
    }

    fn remove_artifacts(txn: &WriteTransaction, keys: &[ArtifactKey]) -> StorageResult<()> {
        let mut meta = txn.open_table(ARTIFACT_META_TABLE)?;
        let mut data = txn.open_table(ARTIFACT_DATA_TABLE)?;
        for (tid, captured_at, id) in keys {
            meta.remove((tid.as_str(), *captured_at, *id))?;
            data.remove((tid.as_str(), *captured_at, *id))?;
        }
        Ok(())
    }
}

impl CaptureStore for RedbCaptureStore {
    fn list_targets(&self) -> StorageResult<Vec<CaptureTarget>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TARGETS_TABLE)?;

        let mut targets = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            let target: CaptureTarget = serde_json::from_slice(value.value())?;
            targets.push(target);
        }

        targets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(targets)
    }

    fn get_target(&self, id: &str) -> StorageResult<Option<CaptureTarget>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TARGETS_TABLE)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn create_target(&self, target: &CaptureTarget) -> StorageResult<()> {
        let value = serde_json::to_vec(target)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(TARGETS_TABLE)?;
            if table.get(target.id.as_str())?.is_some() {
                return Err(StorageError::TargetExists(target.id.clone()));
            }
            table.insert(target.id.as_str(), value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn update_target(&self, target: &CaptureTarget) -> StorageResult<()> {
        let value = serde_json::to_vec(target)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(TARGETS_TABLE)?;
            if table.get(target.id.as_str())?.is_none() {
                return Err(StorageError::TargetNotFound(target.id.clone()));
            }
            table.insert(target.id.as_str(), value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn delete_target(&self, id: &str) -> StorageResult<bool> {
        let txn = self.db.begin_write()?;
        let existed = {
            let mut table = txn.open_table(TARGETS_TABLE)?;
            table.remove(id)?.is_some()
        };
        let keys = Self::artifact_keys(&txn, id)?;
        Self::remove_artifacts(&txn, &keys)?;
        txn.commit()?;

        if !keys.is_empty() {
            tracing::debug!(target_id = %id, artifacts = keys.len(), "Deleted artifacts with target");
        }
        Ok(existed)
    }

    fn save_artifact(&self, artifact: &CapturedArtifact) -> StorageResult<u64> {
        let txn = self.db.begin_write()?;
        // 与 delete_target 在同一写事务序列中检查，target 删除后不会留下孤儿记录
        {
            let targets = txn.open_table(TARGETS_TABLE)?;
            if targets.get(artifact.target_id.as_str())?.is_none() {
                return Err(StorageError::TargetNotFound(artifact.target_id.clone()));
            }
        }
        let id = Self::next_artifact_id(&txn)?;
        let meta = ArtifactMeta {
            id,
            target_id: artifact.target_id.clone(),
            mime_type: artifact.mime_type.clone(),
            size_bytes: artifact.size_bytes,
            captured_at: artifact.captured_at,
        };
        let meta_json = serde_json::to_vec(&meta)?;
        let key = (artifact.target_id.as_str(), artifact.captured_at, id);
        {
            let mut meta_table = txn.open_table(ARTIFACT_META_TABLE)?;
            meta_table.insert(key, meta_json.as_slice())?;
            let mut data_table = txn.open_table(ARTIFACT_DATA_TABLE)?;
            data_table.insert(key, artifact.payload.as_slice())?;
        }
        txn.commit()?;
        Ok(id)
    }

    fn list_artifacts(&self, target_id: &str) -> StorageResult<Vec<ArtifactMeta>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ARTIFACT_META_TABLE)?;

        let mut artifacts = Vec::new();
        for result in table.range((target_id, i64::MIN, 0u64)..=(target_id, i64::MAX, u64::MAX))? {
            let (_key, value) = result?;
            let meta: ArtifactMeta = serde_json::from_slice(value.value())?;
            artifacts.push(meta);
        }
        artifacts.reverse();
        Ok(artifacts)
    }

    fn latest_artifact(&self, target_id: &str) -> StorageResult<Option<CapturedArtifact>> {
        let read_txn = self.db.begin_read()?;
        let meta_table = read_txn.open_table(ARTIFACT_META_TABLE)?;
        let data_table = read_txn.open_table(ARTIFACT_DATA_TABLE)?;

        let mut range =
            meta_table.range((target_id, i64::MIN, 0u64)..=(target_id, i64::MAX, u64::MAX))?;
        let Some(last) = range.next_back() else {
            return Ok(None);
        };
        let (key, value) = last?;
        let meta: ArtifactMeta = serde_json::from_slice(value.value())?;
        let payload = data_table
            .get(key.value())?
            .map(|guard| guard.value().to_vec())
            .unwrap_or_default();

        Ok(Some(CapturedArtifact {
            target_id: meta.target_id,
            payload,
            mime_type: meta.mime_type,
            size_bytes: meta.size_bytes,
            captured_at: meta.captured_at,
        }))
    }

    fn artifact_count(&self, target_id: &str) -> StorageResult<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ARTIFACT_META_TABLE)?;
        let mut count = 0;
        for result in table.range((target_id, i64::MIN, 0u64)..=(target_id, i64::MAX, u64::MAX))? {
            result?;
            count += 1;
        }
        Ok(count)
    }

    fn delete_oldest(&self, target_id: &str, keep: usize) -> StorageResult<usize> {
        let txn = self.db.begin_write()?;
        let keys = Self::artifact_keys(&txn, target_id)?;
        if keys.len() <= keep {
            return Ok(0);
        }
        let excess = keys.len() - keep;
        Self::remove_artifacts(&txn, &keys[..excess])?;
        txn.commit()?;
        Ok(excess)
    }
}
