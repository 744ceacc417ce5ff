//! Capture persistence
//!
//! - [`CaptureStore`]: target CRUD plus append-only artifact history
//! - [`RedbCaptureStore`]: redb-backed implementation

pub mod redb_store;

use shared::{ArtifactMeta, CaptureTarget, CapturedArtifact};
use thiserror::Error;

pub use redb_store::RedbCaptureStore;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Target already exists: {0}")]
    TargetExists(String),

    #[error("Target not found: {0}")]
    TargetNotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence used by the capture registry, workers and sweeper
///
/// Synchronous: implementations are expected to be embedded and fast.
pub trait CaptureStore: Send + Sync {
    fn list_targets(&self) -> StorageResult<Vec<CaptureTarget>>;

    fn get_target(&self, id: &str) -> StorageResult<Option<CaptureTarget>>;

    /// Fails with [`StorageError::TargetExists`] on a duplicate id
    fn create_target(&self, target: &CaptureTarget) -> StorageResult<()>;

    /// Fails with [`StorageError::TargetNotFound`] for an unknown id
    fn update_target(&self, target: &CaptureTarget) -> StorageResult<()>;

    /// Delete a target and its artifacts; returns whether the target existed
    fn delete_target(&self, id: &str) -> StorageResult<bool>;

    /// Append an artifact, returning its store-assigned id
    ///
    /// Fails with [`StorageError::TargetNotFound`] when the target is gone.
    fn save_artifact(&self, artifact: &CapturedArtifact) -> StorageResult<u64>;

    /// Artifact metadata for one target, newest first
    fn list_artifacts(&self, target_id: &str) -> StorageResult<Vec<ArtifactMeta>>;

    fn latest_artifact(&self, target_id: &str) -> StorageResult<Option<CapturedArtifact>>;

    fn artifact_count(&self, target_id: &str) -> StorageResult<usize>;

    /// Keep the newest `keep` artifacts of a target, returning how many were deleted
    fn delete_oldest(&self, target_id: &str, keep: usize) -> StorageResult<usize>;
}
