//! MQTT broker transport.
//!
//! Publishes go straight onto the broker client's request queue. Messages
//! arriving from the broker are fanned out through an in-process bus, so
//! subscribers get the same [`BusSubscription`] either way. Subscription
//! filters are remembered and renewed on every (re)connect.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, Publish, QoS};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BusConfig;
use crate::poller::next_backoff;

use super::topic::validate_topic;
use super::{BusError, BusMessage, BusPublisher, BusSubscription, InMemoryBus, TopicFilter};

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    pub keep_alive: Duration,
    /// Reconnect delay bounds.
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    /// Request queue and subscriber queue length.
    pub capacity: usize,
}

impl MqttSettings {
    /// Settings for the configured broker, or `None` without a host.
    pub fn from_config(config: &BusConfig) -> Option<Self> {
        let host = config.host.trim();
        if host.is_empty() {
            return None;
        }

        let (backoff_min, backoff_max) = config.backoff_bounds();
        Some(Self {
            host: host.to_string(),
            port: config.port,
            client_id: config.client_id.clone(),
            credentials: config
                .credentials()
                .map(|(user, pass)| (user.to_string(), pass.to_string())),
            keep_alive: config.keepalive(),
            backoff_min,
            backoff_max,
            capacity: config.channel_capacity.max(1),
        })
    }

    fn options(&self, last_will: Option<&BusMessage>) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options.set_keep_alive(self.keep_alive);
        if let Some((user, pass)) = &self.credentials {
            options.set_credentials(user.clone(), pass.clone());
        }
        if let Some(will) = last_will {
            options.set_last_will(LastWill::new(
                will.topic.clone(),
                will.payload.clone().into_bytes(),
                QoS::AtMostOnce,
                will.retain,
            ));
        }
        options
    }
}

/// Bus backed by an MQTT broker.
pub struct MqttBus {
    client: AsyncClient,
    incoming: InMemoryBus,
    filters: Mutex<Vec<String>>,
    connected: watch::Sender<bool>,
}

impl MqttBus {
    /// Create the client. Nothing is sent until the returned event loop runs.
    ///
    /// `last_will` is published by the broker if the connection drops
    /// without a clean disconnect.
    pub fn connect(settings: &MqttSettings, last_will: Option<&BusMessage>) -> (Arc<Self>, MqttEventLoop) {
        let (client, eventloop) = AsyncClient::new(settings.options(last_will), settings.capacity);
        let (connected, _) = watch::channel(false);

        let bus = Arc::new(Self {
            client,
            incoming: InMemoryBus::with_capacity(settings.capacity),
            filters: Mutex::new(Vec::new()),
            connected,
        });

        info!(
            host = %settings.host,
            port = settings.port,
            client_id = %settings.client_id,
            "broker client created"
        );

        let driver = MqttEventLoop {
            eventloop,
            bus: bus.clone(),
            backoff_min: settings.backoff_min,
            backoff_max: settings.backoff_max,
        };
        (bus, driver)
    }

    /// Subscribe to broker topics matching `filter`.
    ///
    /// The broker subscription is sent now when connected, otherwise on
    /// the next connect.
    pub fn subscribe(&self, filter: TopicFilter) -> BusSubscription {
        let subscription = self.incoming.subscribe(filter.clone());
        let topic = filter.to_string();

        let mut filters = self.filters.lock().unwrap_or_else(PoisonError::into_inner);
        if *self.connected.borrow() {
            self.send_subscribe(&topic);
        }
        filters.push(topic);

        subscription
    }

    /// Watch the connection state; `true` after every successful connect.
    pub fn connection(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Disconnect cleanly once every queued publish has been sent.
    pub fn disconnect(&self) -> Result<(), BusError> {
        self.client.try_disconnect()?;
        Ok(())
    }

    fn send_subscribe(&self, topic: &str) {
        match self.client.try_subscribe(topic, QoS::AtMostOnce) {
            Ok(()) => debug!(filter = topic, "broker subscription requested"),
            Err(e) => warn!(filter = topic, error = %e, "broker subscription failed"),
        }
    }

    fn on_connected(&self) {
        let filters = self.filters.lock().unwrap_or_else(PoisonError::into_inner);
        for topic in filters.iter() {
            self.send_subscribe(topic);
        }
        self.connected.send_replace(true);
    }

    fn on_disconnected(&self) {
        if self.connected.send_replace(false) {
            warn!("broker connection lost");
        }
    }

    fn deliver(&self, publish: &Publish) {
        let payload = String::from_utf8_lossy(&publish.payload).into_owned();
        let message = BusMessage::new(publish.topic.clone(), payload).retained(publish.retain);
        if let Err(e) = self.incoming.publish(message) {
            debug!(topic = %publish.topic, error = %e, "broker message dropped");
        }
    }
}

impl BusPublisher for MqttBus {
    fn publish(&self, message: BusMessage) -> Result<(), BusError> {
        validate_topic(&message.topic)?;
        self.client.try_publish(
            message.topic,
            QoS::AtMostOnce,
            message.retain,
            message.payload.into_bytes(),
        )?;
        Ok(())
    }
}

/// Drives the broker connection.
pub struct MqttEventLoop {
    eventloop: EventLoop,
    bus: Arc<MqttBus>,
    backoff_min: Duration,
    backoff_max: Duration,
}

impl MqttEventLoop {
    /// Run until a requested disconnect has been sent, or until `cancel`
    /// fires while the broker is unreachable.
    ///
    /// Failed connections are retried with exponential backoff between the
    /// configured bounds.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut delay = None;
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    delay = None;
                    info!(code = ?ack.code, "broker connected");
                    self.bus.on_connected();
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => self.bus.deliver(&publish),
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("broker disconnected");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    self.bus.on_disconnected();
                    if cancel.is_cancelled() {
                        break;
                    }

                    let wait = next_backoff(delay, self.backoff_min, self.backoff_max);
                    delay = Some(wait);
                    warn!(error = %e, retry_in = ?wait, "broker connection failed");

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
        self.bus.on_disconnected();
    }
}
