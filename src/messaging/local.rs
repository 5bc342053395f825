use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

use super::{BroadcastError, Broadcaster, ChannelMessage};

/// In-process broadcaster with one tokio broadcast channel per group.
///
/// Groups are created on first `subscribe`; sending to a group nobody ever
/// subscribed to reaches zero listeners.
pub struct LocalBroadcaster {
    capacity: usize,
    groups: RwLock<HashMap<String, broadcast::Sender<ChannelMessage>>>,
}

impl LocalBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            groups: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, group: &str) -> broadcast::Receiver<ChannelMessage> {
        let mut groups = self.groups.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        groups
            .entry(group.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, group: &str) -> usize {
        let groups = self.groups.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        groups.get(group).map(|tx| tx.receiver_count()).unwrap_or(0)
    }
}

impl Default for LocalBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Broadcaster for LocalBroadcaster {
    async fn group_send(&self, group: &str, message: &ChannelMessage) -> Result<usize, BroadcastError> {
        let sender = {
            let groups = self.groups.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            groups.get(group).cloned()
        };

        // send only fails when there are no receivers
        let receivers = match sender {
            Some(tx) => tx.send(message.clone()).unwrap_or(0),
            None => 0,
        };

        tracing::debug!(group = %group, receivers = receivers, kind = %message.kind, "Broadcast to local group");
        Ok(receivers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_receives_message() {
        let bus = LocalBroadcaster::new(8);
        let mut first = bus.subscribe("orders");
        let mut second = bus.subscribe("orders");
        let mut other = bus.subscribe("billing");

        let message = ChannelMessage::delivery_completed(5, "UPS");
        let receivers = bus.group_send("orders", &message).await.unwrap();

        assert_eq!(receivers, 2);
        assert_eq!(first.recv().await.unwrap(), message);
        assert_eq!(second.recv().await.unwrap(), message);
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_without_listeners_succeeds() {
        let bus = LocalBroadcaster::default();

        let message = ChannelMessage::delivery_completed(1, "DHL");
        assert_eq!(bus.group_send("orders", &message).await.unwrap(), 0);

        let rx = bus.subscribe("orders");
        drop(rx);
        assert_eq!(bus.group_send("orders", &message).await.unwrap(), 0);
        assert_eq!(bus.subscriber_count("orders"), 0);
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_messages() {
        let bus = LocalBroadcaster::default();
        let _early = bus.subscribe("orders");

        bus.group_send("orders", &ChannelMessage::delivery_completed(1, "DHL")).await.unwrap();
        let mut late = bus.subscribe("orders");

        assert!(late.try_recv().is_err());
    }
}
