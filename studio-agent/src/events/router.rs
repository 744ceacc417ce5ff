//! Notification Router - 场景事件分类与转发
//!
//! | 事件 | 通知 |
//! |------|------|
//! | `Created` / `Removed` | `ListChanged` (粗粒度，重新拉取列表) |
//! | `CurrentChanged` | `ResourceUpdated(uri)` (只重新拉取该资源) |

use super::{NotificationSink, SceneObserver};
use shared::{Notification, SceneEventKind, scene_uri};
use std::sync::Arc;

/// Classify a scene event into the notification subscribers receive
pub fn classify(kind: SceneEventKind, scene_name: &str) -> Notification {
    match kind {
        SceneEventKind::Created | SceneEventKind::Removed => Notification::ListChanged,
        SceneEventKind::CurrentChanged => Notification::ResourceUpdated {
            uri: scene_uri(scene_name),
        },
    }
}

/// Observer that turns scene callbacks into sink notifications
///
/// Holds nothing mutable; safe to share across tasks.
#[derive(Clone)]
pub struct NotificationRouter {
    sink: Arc<dyn NotificationSink>,
}

impl NotificationRouter {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    fn route(&self, kind: SceneEventKind, scene_name: &str) {
        match classify(kind, scene_name) {
            Notification::ListChanged => self.sink.notify_list_changed(),
            Notification::ResourceUpdated { uri } => self.sink.notify_updated(&uri),
        }
    }
}

impl SceneObserver for NotificationRouter {
    fn on_created(&self, scene_name: &str) {
        self.route(SceneEventKind::Created, scene_name);
    }

    fn on_removed(&self, scene_name: &str) {
        self.route(SceneEventKind::Removed, scene_name);
    }

    fn on_current_changed(&self, scene_name: &str) {
        self.route(SceneEventKind::CurrentChanged, scene_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingSink;

    #[test]
    fn test_classify() {
        assert_eq!(classify(SceneEventKind::Created, "A"), Notification::ListChanged);
        assert_eq!(classify(SceneEventKind::Removed, "A"), Notification::ListChanged);
        assert_eq!(
            classify(SceneEventKind::CurrentChanged, "Live Show"),
            Notification::ResourceUpdated {
                uri: "studio://scene/Live Show".to_string()
            }
        );
    }

    #[test]
    fn test_created_and_removed_yield_one_list_changed() {
        for kind in [SceneEventKind::Created, SceneEventKind::Removed] {
            let sink = Arc::new(RecordingSink::default());
            let router = NotificationRouter::new(sink.clone());

            match kind {
                SceneEventKind::Created => router.on_created("Intro"),
                _ => router.on_removed("Intro"),
            }

            assert_eq!(sink.list_changed(), 1);
            assert!(sink.updated().is_empty());
        }
    }

    #[test]
    fn test_current_changed_yields_one_resource_updated() {
        let sink = Arc::new(RecordingSink::default());
        let router = NotificationRouter::new(sink.clone());

        router.on_current_changed("Main");

        assert_eq!(sink.list_changed(), 0);
        assert_eq!(sink.updated(), vec!["studio://scene/Main".to_string()]);
    }
}
