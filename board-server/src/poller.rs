//! Periodic fetch-then-publish task.
//!
//! Each cycle runs every configured query concurrently and publishes one
//! snapshot per query to `<base>/<source_id>`. When every query in a cycle
//! fails to reach the endpoint, the next cycle is delayed with exponential
//! backoff instead of the regular interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{BusMessage, BusPublisher};
use crate::config::BusConfig;
use crate::discovery::Discovery;
use crate::wien::{MonitorSource, WienConfig, WienQuery};

/// Publishing and scheduling settings.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub base_topic: String,
    pub retain: bool,
    pub log_publish: bool,
    /// Delay between cycles while the endpoint is reachable.
    pub interval: Duration,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl PollerConfig {
    pub fn new(bus: &BusConfig, wien: &WienConfig) -> Self {
        let (backoff_min, backoff_max) = bus.backoff_bounds();
        Self {
            base_topic: bus.base_topic.clone(),
            retain: bus.retain,
            log_publish: bus.log_publish,
            interval: wien.interval(),
            backoff_min,
            backoff_max,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff_min = min;
        self.backoff_max = max.max(min);
        self
    }
}

/// What happened in one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub queries: usize,
    pub succeeded: usize,
    pub transport_failures: usize,
    pub published: usize,
}

impl CycleReport {
    /// Every query failed before reaching the endpoint.
    pub fn all_unreachable(&self) -> bool {
        self.queries > 0 && self.transport_failures == self.queries
    }
}

/// Next retry delay: `min` first, then doubling up to `max`.
pub fn next_backoff(current: Option<Duration>, min: Duration, max: Duration) -> Duration {
    match current {
        None => min,
        Some(delay) => delay.saturating_mul(2).clamp(min, max),
    }
}

/// Fetches all queries on a schedule and publishes the results.
pub struct Poller<S> {
    source: S,
    queries: Vec<WienQuery>,
    bus: Arc<dyn BusPublisher>,
    config: PollerConfig,
    discovery: Option<Discovery>,
}

impl<S: MonitorSource> Poller<S> {
    pub fn new(source: S, queries: Vec<WienQuery>, bus: Arc<dyn BusPublisher>, config: PollerConfig) -> Self {
        Self {
            source,
            queries,
            bus,
            config,
            discovery: None,
        }
    }

    /// Mirror board states after every cycle while discovery is enabled.
    pub fn with_discovery(mut self, discovery: Discovery) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Fetch every query once and publish the snapshots.
    pub async fn run_cycle(&self) -> CycleReport {
        let outcomes = join_all(self.queries.iter().map(|q| self.source.fetch(q))).await;
        let fetched_at = Utc::now().timestamp();

        let mut report = CycleReport {
            queries: outcomes.len(),
            ..CycleReport::default()
        };

        for outcome in outcomes {
            if outcome.is_ok() {
                report.succeeded += 1;
            } else if outcome.is_transport_failure() {
                report.transport_failures += 1;
            }

            let topic = format!("{}/{}", self.config.base_topic, outcome.source_id);
            let snapshot = outcome.into_snapshot(fetched_at);
            let published = BusMessage::json(topic.as_str(), &snapshot)
                .and_then(|msg| self.bus.publish(msg.retained(self.config.retain)));

            match published {
                Ok(()) => {
                    report.published += 1;
                    if self.config.log_publish {
                        info!(topic = %topic, ok = snapshot.ok, "snapshot published");
                    } else {
                        debug!(topic = %topic, ok = snapshot.ok, "snapshot published");
                    }
                }
                Err(e) => warn!(topic = %topic, error = %e, "snapshot publish failed"),
            }
        }

        if let Some(discovery) = self.discovery.as_ref().filter(|d| d.is_enabled()) {
            if let Err(e) = discovery.publish_all_states() {
                warn!(error = %e, "board state publish failed");
            }
        }

        report
    }

    /// Poll until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            queries = self.queries.len(),
            interval_secs = self.config.interval.as_secs(),
            "poller started"
        );

        let mut backoff = None;
        loop {
            let report = tokio::select! {
                _ = cancel.cancelled() => break,
                report = self.run_cycle() => report,
            };

            let delay = if report.all_unreachable() {
                let delay = next_backoff(backoff, self.config.backoff_min, self.config.backoff_max);
                warn!(retry_secs = delay.as_secs(), "monitor endpoint unreachable");
                backoff = Some(delay);
                delay
            } else {
                backoff = None;
                self.config.interval
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("poller stopped");
    }
}
