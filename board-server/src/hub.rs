//! Push-stream fan-out for live clients.
//!
//! Every subscriber gets an independent bounded queue. Publishing never
//! blocks: when a subscriber's queue is full the oldest message is
//! overwritten and the subscriber is told how many it missed, which it
//! simply skips. A subscriber that goes away drops its receiver and is
//! detached without any publisher involvement.

use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::domain::Snapshot;

/// Default per-subscriber queue length.
pub const DEFAULT_STREAM_CAPACITY: usize = 100;

/// Messages sent to stream subscribers, tagged by `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Full store contents, sent once when a client connects.
    Snapshot { ts: i64, items: Vec<Snapshot> },

    /// One source's snapshot was replaced.
    Update {
        ts: i64,
        ident: String,
        item: Value,
    },
}

impl StreamEvent {
    /// Serialized form as sent on the wire.
    pub fn to_json(&self) -> String {
        // Serializing these variants cannot fail: all keys are strings.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Broadcast hub. Cheap to clone; clones publish to the same subscribers.
#[derive(Debug, Clone)]
pub struct UpdateHub {
    sender: broadcast::Sender<String>,
}

impl UpdateHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send a message to every current subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, message: impl Into<String>) -> usize {
        match self.sender.send(message.into()) {
            Ok(receivers) => {
                trace!(receivers, "stream message published");
                receivers
            }
            // No subscribers right now; nothing to deliver.
            Err(_) => 0,
        }
    }

    pub fn publish_event(&self, event: &StreamEvent) -> usize {
        self.publish(event.to_json())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        debug!(
            subscribers = self.sender.receiver_count() + 1,
            "stream subscriber attached"
        );
        self.sender.subscribe()
    }

    /// Subscribe as a stream that skips messages lost to lag.
    pub fn stream(&self) -> impl Stream<Item = String> + Send + 'static + use<> {
        lag_tolerant(self.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for UpdateHub {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_CAPACITY)
    }
}

/// Adapt a receiver into a stream that ends when the hub is dropped.
fn lag_tolerant(receiver: broadcast::Receiver<String>) -> impl Stream<Item = String> + Send + 'static {
    futures::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(message) => return Some((message, receiver)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "stream subscriber lagged; oldest messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}
