//! Remote event fan-out
//!
//! ```text
//! RemoteSession events (mpsc, unbounded)
//!        │
//!        └── EventBridge ── dispatch ──► SceneObserver
//!                                          └── NotificationRouter ──► NotificationSink
//!                                                ├── ListChanged
//!                                                └── ResourceUpdated(uri)
//! ```

pub mod bridge;
pub mod router;
pub mod sink;

pub use bridge::{EventBridge, ObserverSlot, dispatch};
pub use router::{NotificationRouter, classify};
pub use sink::{BroadcastSink, NotificationSink};

/// Typed callbacks for the three scene events the agent reacts to
pub trait SceneObserver: Send + Sync {
    fn on_created(&self, scene_name: &str);
    fn on_removed(&self, scene_name: &str);
    fn on_current_changed(&self, scene_name: &str);
}
