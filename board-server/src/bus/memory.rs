//! In-process bus.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::error::BusError;
use super::message::BusMessage;
use super::topic::{TopicFilter, validate_topic};
use super::{BusPublisher, DEFAULT_CHANNEL_CAPACITY};

/// Bus backed by `tokio::sync::broadcast`.
///
/// Subscribers that fall behind lose their oldest messages; publishers are
/// never slowed down. The last retained message per topic is replayed to
/// each new subscription whose filter matches it.
pub struct InMemoryBus {
    sender: broadcast::Sender<BusMessage>,
    retained: RwLock<BTreeMap<String, BusMessage>>,
    published: AtomicU64,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            retained: RwLock::new(BTreeMap::new()),
            published: AtomicU64::new(0),
        }
    }

    /// Subscribe to topics matching `filter`.
    ///
    /// Matching retained messages are delivered first, in topic order.
    pub fn subscribe(&self, filter: TopicFilter) -> BusSubscription {
        // Attach before reading the retained set so nothing published in
        // between is missed; at worst a message arrives twice.
        let receiver = self.sender.subscribe();
        let backlog: VecDeque<BusMessage> = self
            .retained
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|m| filter.matches(&m.topic))
            .cloned()
            .collect();

        debug!(filter = %filter, retained = backlog.len(), "bus subscription created");

        BusSubscription {
            receiver,
            filter,
            backlog,
        }
    }

    /// Last retained message on `topic`.
    pub fn retained(&self, topic: &str) -> Option<BusMessage> {
        self.retained
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
    }

    /// Messages accepted since creation.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusPublisher for InMemoryBus {
    fn publish(&self, message: BusMessage) -> Result<(), BusError> {
        validate_topic(&message.topic)?;

        if message.retain {
            let mut retained = self.retained.write().unwrap_or_else(PoisonError::into_inner);
            // An empty retained payload clears the topic.
            if message.payload.is_empty() {
                retained.remove(&message.topic);
            } else {
                retained.insert(message.topic.clone(), message.clone());
            }
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        let topic = message.topic.clone();
        let receivers = self.sender.send(message).unwrap_or(0);
        trace!(topic = %topic, receivers, "bus message published");
        Ok(())
    }
}

/// A filtered view of the bus.
pub struct BusSubscription {
    receiver: broadcast::Receiver<BusMessage>,
    filter: TopicFilter,
    backlog: VecDeque<BusMessage>,
}

impl BusSubscription {
    /// Next matching message, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        if let Some(message) = self.backlog.pop_front() {
            return Some(message);
        }

        loop {
            match self.receiver.recv().await {
                Ok(message) if self.filter.matches(&message.topic) => return Some(message),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(filter = %self.filter, skipped, "bus subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn filter(&self) -> &TopicFilter {
        &self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(f: &str) -> TopicFilter {
        TopicFilter::new(f).unwrap()
    }

    #[tokio::test]
    async fn delivers_matching_messages_only() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe(filter("wien/abfahrten/+"));

        bus.publish(BusMessage::new("wien/abfahrten/boards/x/state", "3")).unwrap();
        bus.publish(BusMessage::new("wien/abfahrten/4205", "{}")).unwrap();

        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.topic, "wien/abfahrten/4205");
        assert_eq!(bus.published(), 2);
    }

    #[tokio::test]
    async fn replays_retained_to_late_subscribers() {
        let bus = InMemoryBus::new();
        bus.publish(BusMessage::new("a/1", "first").retained(true)).unwrap();
        bus.publish(BusMessage::new("a/1", "second").retained(true)).unwrap();
        bus.publish(BusMessage::new("a/2", "volatile")).unwrap();

        let mut sub = bus.subscribe(filter("a/+"));
        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.payload, "second");

        assert_eq!(bus.retained("a/1").unwrap().payload, "second");
        assert!(bus.retained("a/2").is_none());
    }

    #[tokio::test]
    async fn empty_retained_payload_clears_topic() {
        let bus = InMemoryBus::new();
        bus.publish(BusMessage::new("a", "x").retained(true)).unwrap();
        bus.publish(BusMessage::new("a", "").retained(true)).unwrap();
        assert!(bus.retained("a").is_none());
    }

    #[test]
    fn rejects_wildcard_topics() {
        let bus = InMemoryBus::new();
        assert!(matches!(
            bus.publish(BusMessage::new("a/+", "x")),
            Err(BusError::InvalidTopic { .. })
        ));
    }

    #[tokio::test]
    async fn subscription_ends_when_bus_dropped() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe(TopicFilter::all());
        drop(bus);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_to_newest() {
        let bus = InMemoryBus::with_capacity(2);
        let mut sub = bus.subscribe(TopicFilter::all());

        for i in 0..5 {
            bus.publish(BusMessage::new("t", i.to_string())).unwrap();
        }

        assert_eq!(sub.recv().await.unwrap().payload, "3");
        assert_eq!(sub.recv().await.unwrap().payload, "4");
    }
}
