//! In-process remote service
//!
//! `MemoryRemote` behaves like a small studio server living in the same
//! process: scenes with a current selection, stream/record outputs, optional
//! password, subscription-filtered push events and fault injection. Cloning
//! shares the same server state, so a test keeps one clone as the control
//! handle and hands another to the agent as its [`RemoteConnector`].

use super::{
    OutputAction, OutputKind, RemoteConfig, RemoteConnection, RemoteConnector, RemoteError,
    RemoteResult, RemoteSession, SceneList, ScreenshotRequest,
};
use async_trait::async_trait;
use base64::Engine;
use shared::{EventCategory, RemoteEvent, RemoteVersion, SceneEvent};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Output state on the in-process server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputState {
    #[default]
    Stopped,
    Active,
    Paused,
}

/// Served screenshot requests kept for inspection
const DEFAULT_FETCH_HISTORY: usize = 256;

/// One served screenshot request
#[derive(Debug, Clone)]
pub struct FetchRecord {
    pub source_name: String,
    pub at: Instant,
}

struct SessionSlot {
    subscriptions: Vec<EventCategory>,
    events: mpsc::UnboundedSender<RemoteEvent>,
}

struct RemoteInner {
    reachable: bool,
    password: Option<String>,
    version: RemoteVersion,
    scenes: Vec<String>,
    current: Option<String>,
    outputs: HashMap<OutputKind, OutputState>,
    next_session_id: u64,
    connects: u64,
    sessions: HashMap<u64, SessionSlot>,
    probe_failures: u32,
    fetch_failures: u32,
    fetch_total: usize,
    fetch_history: usize,
    fetches: VecDeque<FetchRecord>,
}

impl RemoteInner {
    fn publish(&mut self, event: RemoteEvent) {
        let category = event.category();
        self.sessions.retain(|_, slot| {
            if !slot.subscriptions.contains(&category) {
                return true;
            }
            slot.events.send(event.clone()).is_ok()
        });
    }

    fn check_session(&self, session_id: u64) -> RemoteResult<()> {
        if !self.reachable {
            return Err(RemoteError::Connection("remote unreachable".to_string()));
        }
        if !self.sessions.contains_key(&session_id) {
            return Err(RemoteError::Closed);
        }
        Ok(())
    }

    fn switch_scene(&mut self, name: &str) -> bool {
        if !self.scenes.iter().any(|s| s == name) {
            return false;
        }
        self.current = Some(name.to_string());
        self.publish(SceneEvent::current_changed(name).into());
        true
    }
}

/// In-process studio server
#[derive(Clone)]
pub struct MemoryRemote {
    inner: Arc<Mutex<RemoteInner>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RemoteInner {
                reachable: true,
                password: None,
                version: RemoteVersion {
                    service_version: "30.2.0".to_string(),
                    protocol_version: "5.5.0".to_string(),
                    platform: Some("memory".to_string()),
                },
                scenes: Vec::new(),
                current: None,
                outputs: HashMap::new(),
                next_session_id: 1,
                connects: 0,
                sessions: HashMap::new(),
                probe_failures: 0,
                fetch_failures: 0,
                fetch_total: 0,
                fetch_history: DEFAULT_FETCH_HISTORY,
                fetches: VecDeque::new(),
            })),
        }
    }

    /// Seed scenes without emitting events; the first one becomes current
    pub fn with_scenes<I, S>(self, scenes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut inner = self.lock();
            inner.scenes = scenes.into_iter().map(Into::into).collect();
            inner.current = inner.scenes.first().cloned();
        }
        self
    }

    /// Keep only the newest `n` fetch records; the total count is unaffected
    pub fn with_fetch_history(self, n: usize) -> Self {
        self.lock().fetch_history = n.max(1);
        self
    }

    /// Require this password on connect
    pub fn with_password(self, password: impl Into<String>) -> Self {
        self.lock().password = Some(password.into());
        self
    }

    fn lock(&self) -> MutexGuard<'_, RemoteInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========== Fault injection ==========

    /// Unreachable: connects are refused and open sessions are cut
    pub fn set_reachable(&self, reachable: bool) {
        let mut inner = self.lock();
        inner.reachable = reachable;
        if !reachable {
            inner.sessions.clear();
        }
    }

    /// Server-side kick of every open session; new connects still succeed
    pub fn drop_sessions(&self) {
        self.lock().sessions.clear();
    }

    /// Fail the next `n` version probes on open sessions
    pub fn fail_next_probes(&self, n: u32) {
        self.lock().probe_failures = n;
    }

    /// Fail the next `n` screenshot requests
    pub fn fail_next_fetches(&self, n: u32) {
        self.lock().fetch_failures = n;
    }

    // ========== Server-side scene changes ==========

    pub fn create_scene(&self, name: &str) -> bool {
        let mut inner = self.lock();
        if inner.scenes.iter().any(|s| s == name) {
            return false;
        }
        inner.scenes.push(name.to_string());
        inner.publish(SceneEvent::created(name).into());
        true
    }

    pub fn remove_scene(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let before = inner.scenes.len();
        inner.scenes.retain(|s| s != name);
        if inner.scenes.len() == before {
            return false;
        }
        inner.publish(SceneEvent::removed(name).into());
        if inner.current.as_deref() == Some(name) {
            inner.current = None;
            if let Some(next) = inner.scenes.first().cloned() {
                inner.switch_scene(&next);
            }
        }
        true
    }

    pub fn switch_scene(&self, name: &str) -> bool {
        self.lock().switch_scene(name)
    }

    /// Push an arbitrary event to subscribed sessions
    pub fn emit(&self, event: RemoteEvent) {
        self.lock().publish(event);
    }

    // ========== Observation ==========

    pub fn connect_count(&self) -> u64 {
        self.lock().connects
    }

    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Screenshots served since creation
    pub fn fetch_count(&self) -> usize {
        self.lock().fetch_total
    }

    pub fn fetch_times(&self) -> Vec<Instant> {
        self.lock().fetches.iter().map(|f| f.at).collect()
    }

    /// Newest fetch records, oldest first
    pub fn fetches(&self) -> Vec<FetchRecord> {
        self.lock().fetches.iter().cloned().collect()
    }

    pub fn current_scene(&self) -> Option<String> {
        self.lock().current.clone()
    }

    pub fn output_state(&self, output: OutputKind) -> OutputState {
        self.lock().outputs.get(&output).copied().unwrap_or_default()
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteConnector for MemoryRemote {
    async fn connect(
        &self,
        config: &RemoteConfig,
        subscriptions: &[EventCategory],
    ) -> RemoteResult<RemoteConnection> {
        let mut inner = self.lock();
        if !inner.reachable {
            return Err(RemoteError::Connection(format!(
                "connection refused: {}",
                config.endpoint()
            )));
        }
        if let Some(expected) = &inner.password
            && config.password.as_ref() != Some(expected)
        {
            return Err(RemoteError::Authentication(
                "password rejected".to_string(),
            ));
        }

        let session_id = inner.next_session_id;
        inner.next_session_id += 1;
        inner.connects += 1;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        inner.sessions.insert(
            session_id,
            SessionSlot {
                subscriptions: subscriptions.to_vec(),
                events: events_tx,
            },
        );

        let session = MemorySession {
            id: session_id,
            remote: self.clone(),
        };
        Ok(RemoteConnection {
            session: Arc::new(session),
            events: events_rx,
        })
    }
}

/// Session handed out by [`MemoryRemote`]
struct MemorySession {
    id: u64,
    remote: MemoryRemote,
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn version(&self) -> RemoteResult<RemoteVersion> {
        let mut inner = self.remote.lock();
        inner.check_session(self.id)?;
        if inner.probe_failures > 0 {
            inner.probe_failures -= 1;
            return Err(RemoteError::Request("GetVersion failed".to_string()));
        }
        Ok(inner.version.clone())
    }

    async fn list_scenes(&self) -> RemoteResult<SceneList> {
        let inner = self.remote.lock();
        inner.check_session(self.id)?;
        Ok(SceneList {
            scenes: inner.scenes.clone(),
            current: inner.current.clone(),
        })
    }

    async fn set_current_scene(&self, name: &str) -> RemoteResult<()> {
        let mut inner = self.remote.lock();
        inner.check_session(self.id)?;
        if inner.switch_scene(name) {
            Ok(())
        } else {
            Err(RemoteError::Request(format!("No scene named `{name}`")))
        }
    }

    async fn control_output(&self, output: OutputKind, action: OutputAction) -> RemoteResult<()> {
        let mut inner = self.remote.lock();
        inner.check_session(self.id)?;
        let state = inner.outputs.get(&output).copied().unwrap_or_default();
        let next = match (output, action, state) {
            (_, OutputAction::Start, OutputState::Stopped) => OutputState::Active,
            (_, OutputAction::Stop, OutputState::Active | OutputState::Paused) => {
                OutputState::Stopped
            }
            (OutputKind::Record, OutputAction::Pause, OutputState::Active) => OutputState::Paused,
            (OutputKind::Record, OutputAction::Resume, OutputState::Paused) => OutputState::Active,
            _ => {
                return Err(RemoteError::Request(format!(
                    "{action:?} is not valid for {output:?} while {state:?}"
                )));
            }
        };
        inner.outputs.insert(output, next);
        Ok(())
    }

    async fn fetch_screenshot(&self, request: &ScreenshotRequest) -> RemoteResult<String> {
        let mut inner = self.remote.lock();
        inner.check_session(self.id)?;
        if inner.fetch_failures > 0 {
            inner.fetch_failures -= 1;
            return Err(RemoteError::Request("GetSourceScreenshot failed".to_string()));
        }
        if !inner.scenes.iter().any(|s| *s == request.source_name) {
            return Err(RemoteError::Request(format!(
                "No source was found by the name of `{}`",
                request.source_name
            )));
        }

        inner.fetch_total += 1;
        let sequence = inner.fetch_total;
        if inner.fetches.len() >= inner.fetch_history {
            inner.fetches.pop_front();
        }
        inner.fetches.push_back(FetchRecord {
            source_name: request.source_name.clone(),
            at: Instant::now(),
        });

        let pixels = format!("{}#{}@{}", request.source_name, sequence, request.format);
        let encoded = base64::engine::general_purpose::STANDARD.encode(pixels.as_bytes());
        Ok(format!(
            "data:image/{};base64,{}",
            request.format.as_str(),
            encoded
        ))
    }

    async fn close(&self) {
        self.remote.lock().sessions.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{OutputFormat, SceneEventKind};

    fn shot(source: &str) -> ScreenshotRequest {
        ScreenshotRequest {
            source_name: source.to_string(),
            format: OutputFormat::Png,
            max_dimensions: None,
            quality: None,
        }
    }

    #[tokio::test]
    async fn test_connect_refused_when_unreachable() {
        let remote = MemoryRemote::new();
        remote.set_reachable(false);
        let result = remote
            .connect(&RemoteConfig::default(), &[EventCategory::Scenes])
            .await;
        assert!(matches!(result, Err(RemoteError::Connection(_))));
        assert_eq!(remote.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_password_checked() {
        let remote = MemoryRemote::new().with_password("hunter2");
        let denied = remote.connect(&RemoteConfig::default(), &[]).await;
        assert!(matches!(denied, Err(RemoteError::Authentication(_))));

        let config = RemoteConfig::default().with_password("hunter2");
        assert!(remote.connect(&config, &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_events_respect_subscriptions() {
        let remote = MemoryRemote::new().with_scenes(["Main"]);
        let mut scenes = remote
            .connect(&RemoteConfig::default(), &[EventCategory::Scenes])
            .await
            .unwrap();
        let mut outputs_only = remote
            .connect(&RemoteConfig::default(), &[EventCategory::Outputs])
            .await
            .unwrap();

        assert!(remote.create_scene("Intro"));
        let event = scenes.events.recv().await.unwrap();
        assert_eq!(event, RemoteEvent::from(SceneEvent::created("Intro")));
        assert!(outputs_only.events.try_recv().is_err());

        // General events only reach sessions subscribed to them
        let mut general = remote
            .connect(&RemoteConfig::default(), &[EventCategory::General])
            .await
            .unwrap();
        let vendor = RemoteEvent::Unrecognized {
            kind: "VendorEvent".to_string(),
        };
        remote.emit(vendor.clone());
        assert_eq!(general.events.recv().await.unwrap(), vendor);
        assert!(scenes.events.try_recv().is_err());
        assert!(outputs_only.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_current_scene_moves_selection() {
        let remote = MemoryRemote::new().with_scenes(["A", "B"]);
        let mut conn = remote
            .connect(&RemoteConfig::default(), &[EventCategory::Scenes])
            .await
            .unwrap();

        assert!(remote.remove_scene("A"));
        let removed = conn.events.recv().await.unwrap();
        let switched = conn.events.recv().await.unwrap();
        assert!(matches!(removed, RemoteEvent::Scene(SceneEvent { kind: SceneEventKind::Removed, .. })));
        assert_eq!(switched, RemoteEvent::from(SceneEvent::current_changed("B")));
        assert_eq!(remote.current_scene().as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_session_calls() {
        let remote = MemoryRemote::new().with_scenes(["Main", "Break"]);
        let conn = remote.connect(&RemoteConfig::default(), &[]).await.unwrap();
        let session = conn.session;

        assert_eq!(session.version().await.unwrap().protocol_version, "5.5.0");
        session.set_current_scene("Break").await.unwrap();
        assert_eq!(session.list_scenes().await.unwrap().current.as_deref(), Some("Break"));
        assert!(session.set_current_scene("Nope").await.is_err());

        session
            .control_output(OutputKind::Record, OutputAction::Start)
            .await
            .unwrap();
        session
            .control_output(OutputKind::Record, OutputAction::Pause)
            .await
            .unwrap();
        assert_eq!(remote.output_state(OutputKind::Record), OutputState::Paused);
        assert!(
            session
                .control_output(OutputKind::Stream, OutputAction::Pause)
                .await
                .is_err()
        );

        let data = session.fetch_screenshot(&shot("Main")).await.unwrap();
        assert!(data.starts_with("data:image/png;base64,"));
        assert!(session.fetch_screenshot(&shot("Missing")).await.is_err());
        assert_eq!(remote.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let remote = MemoryRemote::new().with_scenes(["Main"]);
        let conn = remote.connect(&RemoteConfig::default(), &[]).await.unwrap();

        remote.fail_next_probes(1);
        assert!(conn.session.version().await.is_err());
        assert!(conn.session.version().await.is_ok());

        remote.fail_next_fetches(1);
        assert!(conn.session.fetch_screenshot(&shot("Main")).await.is_err());
        assert!(conn.session.fetch_screenshot(&shot("Main")).await.is_ok());

        remote.drop_sessions();
        assert_eq!(conn.session.version().await, Err(RemoteError::Closed));
        assert_eq!(remote.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_close_ends_event_stream() {
        let remote = MemoryRemote::new();
        let mut conn = remote
            .connect(&RemoteConfig::default(), &[EventCategory::Scenes])
            .await
            .unwrap();
        conn.session.close().await;
        assert!(conn.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_history_is_bounded() {
        let remote = MemoryRemote::new()
            .with_scenes(["Main", "Break"])
            .with_fetch_history(3);
        let conn = remote.connect(&RemoteConfig::default(), &[]).await.unwrap();

        for _ in 0..4 {
            conn.session.fetch_screenshot(&shot("Main")).await.unwrap();
        }
        let last = conn.session.fetch_screenshot(&shot("Break")).await.unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode("Break#5@png");
        assert_eq!(last, format!("data:image/png;base64,{encoded}"));

        assert_eq!(remote.fetch_count(), 5);
        let kept: Vec<String> = remote
            .fetches()
            .into_iter()
            .map(|f| f.source_name)
            .collect();
        assert_eq!(kept, ["Main", "Main", "Break"]);
        assert_eq!(remote.fetch_times().len(), 3);
    }
}
