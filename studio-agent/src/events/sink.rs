//! Notification sinks

use shared::Notification;
use tokio::sync::broadcast;

/// Outbound notification operations exposed to the host application
pub trait NotificationSink: Send + Sync {
    fn notify_list_changed(&self);
    fn notify_updated(&self, uri: &str);
}

/// Publishes notifications on a tokio broadcast channel
///
/// Slow subscribers lag (and see `RecvError::Lagged`) instead of blocking
/// the event bridge.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    fn publish(&self, notification: Notification) {
        if let Err(e) = self.tx.send(notification) {
            tracing::debug!("No subscribers for notification: {}", e);
        }
    }
}

impl NotificationSink for BroadcastSink {
    fn notify_list_changed(&self) {
        self.publish(Notification::ListChanged);
    }

    fn notify_updated(&self, uri: &str) {
        self.publish(Notification::ResourceUpdated {
            uri: uri.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_sink_delivers_to_all_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut a = sink.subscribe();
        let mut b = sink.subscribe();

        sink.notify_list_changed();
        sink.notify_updated("studio://scene/Main");

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.recv().await.unwrap(), Notification::ListChanged);
            assert_eq!(
                rx.recv().await.unwrap(),
                Notification::ResourceUpdated {
                    uri: "studio://scene/Main".to_string()
                }
            );
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let sink = BroadcastSink::new(8);
        sink.notify_list_changed();
    }
}
