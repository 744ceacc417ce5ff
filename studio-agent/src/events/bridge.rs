//! Event Bridge - 远程事件分发
//!
//! 每个 session 一个监听任务：消费推送事件流，按类型调用观察者回调。
//! 未识别的事件类型直接忽略；未设置观察者时事件被丢弃（不缓冲、不重放）。

use super::SceneObserver;
use shared::{RemoteEvent, SceneEventKind};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Replaceable observer registration shared by every bridge
#[derive(Default)]
pub struct ObserverSlot {
    observer: RwLock<Option<Arc<dyn SceneObserver>>>,
}

impl ObserverSlot {
    pub fn new(observer: Option<Arc<dyn SceneObserver>>) -> Self {
        Self {
            observer: RwLock::new(observer),
        }
    }

    pub fn get(&self) -> Option<Arc<dyn SceneObserver>> {
        self.observer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set(&self, observer: Option<Arc<dyn SceneObserver>>) {
        *self.observer.write().unwrap_or_else(|e| e.into_inner()) = observer;
    }
}

/// Dispatch one event to the observer
///
/// Returns `true` when an observer callback ran.
pub fn dispatch(observer: Option<&dyn SceneObserver>, event: &RemoteEvent) -> bool {
    let RemoteEvent::Scene(scene) = event else {
        tracing::trace!(kind = %event.kind_name(), "Ignoring unrecognized remote event");
        return false;
    };
    let Some(observer) = observer else {
        tracing::trace!(kind = %scene.kind, "No observer registered, event dropped");
        return false;
    };

    match scene.kind {
        SceneEventKind::Created => observer.on_created(&scene.scene_name),
        SceneEventKind::Removed => observer.on_removed(&scene.scene_name),
        SceneEventKind::CurrentChanged => observer.on_current_changed(&scene.scene_name),
    }
    true
}

/// Listener for one session's push-event stream
pub struct EventBridge {
    session_id: u64,
    observer: Arc<ObserverSlot>,
}

impl EventBridge {
    pub fn new(session_id: u64, observer: Arc<ObserverSlot>) -> Self {
        Self {
            session_id,
            observer,
        }
    }

    /// 运行监听器（直到事件流关闭或取消）
    pub async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<RemoteEvent>,
        shutdown: CancellationToken,
    ) {
        tracing::debug!(session_id = self.session_id, "Event bridge started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(session_id = self.session_id, "Event bridge cancelled");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::debug!(session_id = self.session_id, "Event stream closed, event bridge stopping");
                        break;
                    };
                    let observer = self.observer.get();
                    dispatch(observer.as_deref(), &event);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingObserver;
    use shared::SceneEvent;

    #[test]
    fn test_dispatch_routes_each_kind() {
        let observer = RecordingObserver::default();

        assert!(dispatch(Some(&observer), &SceneEvent::created("A").into()));
        assert!(dispatch(Some(&observer), &SceneEvent::removed("B").into()));
        assert!(dispatch(Some(&observer), &SceneEvent::current_changed("C").into()));

        assert_eq!(
            observer.calls(),
            vec![
                "created:A".to_string(),
                "removed:B".to_string(),
                "current_changed:C".to_string()
            ]
        );
    }

    #[test]
    fn test_dispatch_ignores_unrecognized_and_missing_observer() {
        let observer = RecordingObserver::default();
        let other = RemoteEvent::Unrecognized {
            kind: "StreamStateChanged".to_string(),
        };

        assert!(!dispatch(Some(&observer), &other));
        assert!(!dispatch(None, &SceneEvent::created("A").into()));
        assert!(observer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_bridge_stops_when_stream_closes() {
        let observer = Arc::new(RecordingObserver::default());
        let slot = Arc::new(ObserverSlot::new(Some(observer.clone())));
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(SceneEvent::created("Intro").into()).unwrap();
        tx.send(RemoteEvent::Unrecognized { kind: "Heartbeat".into() }).unwrap();
        tx.send(SceneEvent::current_changed("Intro").into()).unwrap();
        drop(tx);

        EventBridge::new(1, slot)
            .run(rx, CancellationToken::new())
            .await;

        assert_eq!(
            observer.calls(),
            vec!["created:Intro".to_string(), "current_changed:Intro".to_string()]
        );
    }

    #[tokio::test]
    async fn test_bridge_stops_on_cancel_and_sees_observer_swap() {
        let slot = Arc::new(ObserverSlot::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(EventBridge::new(7, slot.clone()).run(rx, shutdown.clone()));

        // Dropped: no observer yet
        tx.send(SceneEvent::created("Early").into()).unwrap();
        tokio::task::yield_now().await;

        let observer = Arc::new(RecordingObserver::default());
        slot.set(Some(observer.clone()));
        tx.send(SceneEvent::removed("Late").into()).unwrap();

        // Wait for delivery before cancelling
        for _ in 0..100 {
            if !observer.calls().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }

        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(observer.calls(), vec!["removed:Late".to_string()]);
    }
}
