//! Remote service seams
//!
//! The agent never speaks the remote wire protocol directly. A
//! [`RemoteConnector`] opens sessions, a [`RemoteSession`] answers synchronous
//! request/response calls and the connection carries an unbounded stream of
//! [`RemoteEvent`]s.
//!
//! - [`memory`]: in-process implementation used by tests and the demo binary

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::{Dimensions, EventCategory, OutputFormat, RemoteEvent, RemoteVersion};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::MemoryRemote;

/// Remote errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Session closed")]
    Closed,
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Connection parameters for the remote service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

impl RemoteConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// `host:port`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 4455)
    }
}

/// Scene listing with the current selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneList {
    pub scenes: Vec<String>,
    pub current: Option<String>,
}

/// Remote outputs that can be controlled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Stream,
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputAction {
    Start,
    Stop,
    Pause,
    Resume,
}

/// Screenshot request for one scene or source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotRequest {
    pub source_name: String,
    pub format: OutputFormat,
    pub max_dimensions: Option<Dimensions>,
    pub quality: Option<u8>,
}

/// Open session to the remote service
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Version/metadata round trip; also serves as the health probe
    async fn version(&self) -> RemoteResult<RemoteVersion>;

    async fn list_scenes(&self) -> RemoteResult<SceneList>;

    async fn set_current_scene(&self, name: &str) -> RemoteResult<()>;

    async fn control_output(&self, output: OutputKind, action: OutputAction) -> RemoteResult<()>;

    /// Fetch one screenshot as base64 image data (optionally a `data:` URI)
    async fn fetch_screenshot(&self, request: &ScreenshotRequest) -> RemoteResult<String>;

    /// Release the session; its event stream ends afterwards
    async fn close(&self);
}

/// A freshly opened session plus its push-event stream
pub struct RemoteConnection {
    pub session: Arc<dyn RemoteSession>,
    pub events: mpsc::UnboundedReceiver<RemoteEvent>,
}

/// Opens sessions to the remote service
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Open a session; `subscriptions` is evaluated by the server at session start
    async fn connect(
        &self,
        config: &RemoteConfig,
        subscriptions: &[EventCategory],
    ) -> RemoteResult<RemoteConnection>;
}

/// Run a remote call under a bounded timeout
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> RemoteResult<T>
where
    F: Future<Output = RemoteResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let config = RemoteConfig::new("studio.local", 4455).with_password("secret");
        assert_eq!(config.endpoint(), "studio.local:4455");
        assert_eq!(config.password.as_deref(), Some("secret"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_maps_elapsed() {
        let result: RemoteResult<()> = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(RemoteError::Timeout(Duration::from_millis(50))));

        let ok = with_timeout(Duration::from_millis(50), async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
    }
}
