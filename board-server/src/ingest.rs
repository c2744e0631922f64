//! Bus-to-store ingestion.
//!
//! Listens on `<base>/+`, stores each snapshot under its source id and
//! pushes an `update` event to stream subscribers. Deeper topics (such as
//! `<base>/boards/...`) and payloads that are not JSON objects are ignored.

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bus::{BusError, BusMessage, BusSubscription, TopicFilter};
use crate::domain::Snapshot;
use crate::hub::{StreamEvent, UpdateHub};
use crate::store::SnapshotStore;

/// Filter for the snapshot topics under `base_topic`.
pub fn snapshot_filter(base_topic: &str) -> Result<TopicFilter, BusError> {
    TopicFilter::new(&format!("{base_topic}/+"))
}

/// A snapshot message accepted for ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    /// Key the snapshot is stored under.
    pub ident: String,
    /// The payload as received.
    pub payload: Value,
}

/// Decide whether `message` is a snapshot and under which key.
///
/// The key is the payload's `ident`, or the topic's last level when the
/// payload has none.
pub fn accept(base_topic: &str, message: &BusMessage) -> Option<Accepted> {
    let rest = message.topic.strip_prefix(base_topic)?.strip_prefix('/')?;
    if rest.contains('/') {
        return None;
    }

    let payload: Value = serde_json::from_str(message.payload.trim()).ok()?;
    if !payload.is_object() {
        return None;
    }

    let ident = match payload.get("ident") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => rest.to_string(),
    };

    Some(Accepted { ident, payload })
}

/// Applies accepted messages to the store and hub.
#[derive(Clone)]
pub struct Ingestor {
    store: SnapshotStore,
    hub: UpdateHub,
    base_topic: String,
}

impl Ingestor {
    pub fn new(store: SnapshotStore, hub: UpdateHub, base_topic: impl Into<String>) -> Self {
        Self {
            store,
            hub,
            base_topic: base_topic.into(),
        }
    }

    /// Ingest one message. Returns the source id it was stored under.
    pub async fn handle(&self, message: &BusMessage) -> Option<String> {
        let Some(Accepted { ident, payload }) = accept(&self.base_topic, message) else {
            debug!(topic = %message.topic, "bus message ignored");
            return None;
        };

        let snapshot: Snapshot = match serde_json::from_value(payload.clone()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(topic = %message.topic, error = %e, "snapshot payload rejected");
                return None;
            }
        };

        self.store.upsert(ident.clone(), snapshot).await;
        self.hub.publish_event(&StreamEvent::Update {
            ts: Utc::now().timestamp(),
            ident: ident.clone(),
            item: payload,
        });

        Some(ident)
    }

    /// Consume `subscription` until it ends or `cancel` fires.
    pub async fn run(self, mut subscription: BusSubscription, cancel: CancellationToken) {
        info!(filter = %subscription.filter(), "ingest started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                message = subscription.recv() => match message {
                    Some(message) => {
                        self.handle(&message).await;
                    }
                    None => break,
                },
            }
        }
        info!("ingest stopped");
    }
}

/// Run ingestion for snapshots under `base_topic`.
pub async fn run_ingest(
    subscription: BusSubscription,
    store: SnapshotStore,
    hub: UpdateHub,
    base_topic: impl Into<String>,
    cancel: CancellationToken,
) {
    Ingestor::new(store, hub, base_topic)
        .run(subscription, cancel)
        .await;
}
