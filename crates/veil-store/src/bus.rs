//! Change-notification bus.

use tokio::sync::broadcast;
use veil_core::StoreNotification;

/// Default number of notifications buffered per subscriber.
const DEFAULT_CAPACITY: usize = 256;

/// Broadcasts [`StoreNotification`]s to in-memory consumers.
///
/// Slow subscribers that fall behind by more than the capacity receive
/// `RecvError::Lagged` and should resync everything.
#[derive(Clone, Debug)]
pub struct ChangeBus {
    sender: broadcast::Sender<StoreNotification>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChangeBus {
    /// Create a bus buffering `capacity` notifications per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a notification. Having no subscribers is not an error.
    pub fn publish(&self, notification: StoreNotification) {
        let _ = self.sender.send(notification);
    }

    /// Subscribe to notifications published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreNotification> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use veil_core::StoreName;

    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published() {
        let bus = ChangeBus::default();
        let mut rx = bus.subscribe();
        bus.publish(StoreNotification::DataChanged {
            store: StoreName::Blacklist,
            key: "a.com".into(),
            value: None,
        });
        let got = rx.recv().await.unwrap();
        assert_eq!(got.key(), "a.com");
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = ChangeBus::new(0);
        bus.publish(StoreNotification::DataChanged {
            store: StoreName::Settings,
            key: "k".into(),
            value: None,
        });
    }
}
