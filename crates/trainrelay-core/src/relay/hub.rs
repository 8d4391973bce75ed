//! Topic-filtered fan-out of relay events.

use std::collections::BTreeSet;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use trainrelay_training::{RelayEvent, Topic};

/// Broadcasts relay events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<RelayEvent>,
}

impl EventHub {
    /// `capacity` events are buffered per subscriber before it lags.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes to current subscribers. Returns how many received it.
    pub fn publish(&self, event: RelayEvent) -> usize {
        let topic = event.topic;
        let delivered = self.tx.send(event).unwrap_or(0);
        debug!(topic = %topic, subscribers = delivered, "Published relay event");
        delivered
    }

    /// Subscribes to `topics`; an empty set means every topic.
    pub fn subscribe(&self, topics: impl IntoIterator<Item = Topic>) -> Subscription {
        Subscription { rx: self.tx.subscribe(), topics: topics.into_iter().collect() }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A receiver that only yields events on its topics.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<RelayEvent>,
    topics: BTreeSet<Topic>,
}

impl Subscription {
    #[must_use]
    pub fn accepts(&self, topic: Topic) -> bool {
        self.topics.is_empty() || self.topics.contains(&topic)
    }

    /// Next matching event, in publish order. `None` once the hub is gone.
    ///
    /// A lagging subscriber skips what it missed and keeps receiving.
    pub async fn recv(&mut self) -> Option<RelayEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.accepts(event.topic) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Relay subscriber lagging; events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trainrelay_training::StatusUpdate;

    fn event(topic: Topic, n: u32) -> RelayEvent {
        RelayEvent { topic, event: json!({ "n": n }) }
    }

    #[tokio::test]
    async fn test_subscription_filters_topics() {
        let hub = EventHub::new(16);
        let mut logs = hub.subscribe([Topic::Logs]);
        let mut all = hub.subscribe([]);

        hub.publish(event(Topic::Status, 1));
        hub.publish(event(Topic::Logs, 2));

        assert_eq!(logs.recv().await.unwrap().event["n"], 2);
        assert_eq!(all.recv().await.unwrap().topic, Topic::Status);
        assert_eq!(all.recv().await.unwrap().topic, Topic::Logs);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let hub = EventHub::new(4);
        assert_eq!(hub.publish(RelayEvent::status(&StatusUpdate::connected())), 0);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_keeps_receiving() {
        let hub = EventHub::new(2);
        let mut sub = hub.subscribe([]);
        for n in 0..5 {
            hub.publish(event(Topic::Data, n));
        }

        // Only the newest two survive.
        assert_eq!(sub.recv().await.unwrap().event["n"], 3);
        assert_eq!(sub.recv().await.unwrap().event["n"], 4);
    }

    #[tokio::test]
    async fn test_recv_ends_when_hub_dropped() {
        let hub = EventHub::new(2);
        let mut sub = hub.subscribe([]);
        drop(hub);
        assert!(sub.recv().await.is_none());
    }
}
