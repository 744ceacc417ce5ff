//! Remote push events
//!
//! The remote service pushes many event kinds; the agent reacts to three scene
//! events and carries everything else as [`RemoteEvent::Unrecognized`] so new
//! server versions never break dispatch.

use serde::{Deserialize, Serialize};

/// Event subscription scope, requested when the session is opened.
///
/// The remote service evaluates subscriptions only at session start, so the
/// set has to be passed to the connect call itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Scene created / removed / current scene changed
    Scenes,
    /// Stream and record output state changes
    Outputs,
    /// Everything the server considers general (heartbeats, exit notices)
    General,
}

/// Scene event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneEventKind {
    Created,
    Removed,
    CurrentChanged,
}

impl SceneEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneEventKind::Created => "created",
            SceneEventKind::Removed => "removed",
            SceneEventKind::CurrentChanged => "current_changed",
        }
    }
}

impl std::fmt::Display for SceneEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scene event record (transient, consumed once)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneEvent {
    pub kind: SceneEventKind,
    pub scene_name: String,
}

impl SceneEvent {
    pub fn created(name: impl Into<String>) -> Self {
        Self {
            kind: SceneEventKind::Created,
            scene_name: name.into(),
        }
    }

    pub fn removed(name: impl Into<String>) -> Self {
        Self {
            kind: SceneEventKind::Removed,
            scene_name: name.into(),
        }
    }

    pub fn current_changed(name: impl Into<String>) -> Self {
        Self {
            kind: SceneEventKind::CurrentChanged,
            scene_name: name.into(),
        }
    }
}

/// Event pushed by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteEvent {
    Scene(SceneEvent),
    /// Any event kind this agent does not react to
    Unrecognized { kind: String },
}

impl RemoteEvent {
    /// Category the event is delivered under
    pub fn category(&self) -> EventCategory {
        match self {
            RemoteEvent::Scene(_) => EventCategory::Scenes,
            RemoteEvent::Unrecognized { .. } => EventCategory::General,
        }
    }

    pub fn kind_name(&self) -> &str {
        match self {
            RemoteEvent::Scene(event) => event.kind.as_str(),
            RemoteEvent::Unrecognized { kind } => kind,
        }
    }
}

impl From<SceneEvent> for RemoteEvent {
    fn from(event: SceneEvent) -> Self {
        RemoteEvent::Scene(event)
    }
}
