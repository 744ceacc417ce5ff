use crate::remote::RemoteError;
use crate::storage::StorageError;
use thiserror::Error;

/// Agent error taxonomy
///
/// | 分类 | 变体 | 处理方式 |
/// |------|------|----------|
/// | 连接 | `ConnectionFailed`, `NotConnected`, `ProbeFailed`, `Closed` | 前台返回，后台记录日志 |
/// | 采集 | `CaptureFailed`, `PersistFailed` | 仅记录日志，不终止 worker |
/// | 注册 | `TargetNotFound`, `TargetExists`, `InvalidCadence`, `AlreadyRunning` | 返回给调用方 |
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] RemoteError),

    #[error("Not connected to the remote service")]
    NotConnected,

    #[error("Status probe failed, connection may be broken: {0}")]
    ProbeFailed(String),

    #[error("Capture failed for target {target_id}: {reason}")]
    CaptureFailed { target_id: String, reason: String },

    #[error("Failed to persist artifact for target {target_id}: {source}")]
    PersistFailed {
        target_id: String,
        #[source]
        source: StorageError,
    },

    #[error("Capture target not found: {0}")]
    TargetNotFound(String),

    #[error("Capture target already exists: {0}")]
    TargetExists(String),

    #[error("Invalid cadence for target {0}: must be greater than zero")]
    InvalidCadence(String),

    #[error("Capture registry is already running")]
    AlreadyRunning,

    #[error("Connection manager is closed")]
    Closed,

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for AgentError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TargetExists(id) => AgentError::TargetExists(id),
            StorageError::TargetNotFound(id) => AgentError::TargetNotFound(id),
            other => AgentError::Storage(other),
        }
    }
}

/// Agent Result 类型别名
pub type AgentResult<T> = std::result::Result<T, AgentError>;
