//! Shared types for the studio-link workspace
//!
//! Models, remote push events and outbound notifications used by
//! `studio-agent` and by any host surface that renders its state.

pub mod event;
pub mod models;
pub mod notification;
pub mod util;

// Re-exports
pub use event::{EventCategory, RemoteEvent, SceneEvent, SceneEventKind};
pub use models::{
    ArtifactMeta, CaptureTarget, CapturedArtifact, ConnectionStatus, Dimensions, OutputFormat,
    RemoteVersion,
};
pub use notification::{Notification, scene_uri};
pub use serde::{Deserialize, Serialize};
