//! Message bus abstraction.
//!
//! Snapshots travel from the poller to the ingestion path (and sensor
//! states to home automation) as topic-addressed messages. Publishing goes
//! through a trait with two implementations sharing the same semantics:
//! an MQTT broker client and an in-process bus. Both offer fire-and-forget
//! publish, per-topic retained messages, and `+`/`#` wildcard
//! subscriptions.

mod error;
mod memory;
mod message;
mod mqtt;
mod topic;

pub use error::BusError;
pub use memory::{BusSubscription, InMemoryBus};
pub use message::BusMessage;
pub use mqtt::{MqttBus, MqttEventLoop, MqttSettings};
pub use topic::{TopicFilter, safe_topic_fragment};

/// Default capacity of a subscriber's queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Publishing side of a bus.
///
/// Publishing never waits on subscribers, so it may be called from both
/// synchronous and asynchronous code.
pub trait BusPublisher: Send + Sync {
    fn publish(&self, message: BusMessage) -> Result<(), BusError>;
}
