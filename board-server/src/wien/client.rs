//! Monitor endpoint HTTP client.

use std::future::Future;
use std::time::Duration;

use reqwest::Url;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::de;
use crate::domain::{Monitor, Snapshot};

use super::convert::convert_response;
use super::error::WienError;
use super::query::WienQuery;
use super::types::MonitorResponse;

/// Default monitor endpoint.
pub const DEFAULT_BASE_URL: &str = "http://www.wienerlinien.at/ogd_realtime/monitor";

/// Shortest allowed polling interval in seconds.
pub const MIN_INTERVAL_SECS: u64 = 15;

/// `[wien]`: what to poll and how.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WienConfig {
    pub base_url: String,
    /// Value of the `sender` query parameter.
    pub sender: String,
    /// `activateTrafficInfo` values, e.g. `stoerunglang`.
    #[serde(deserialize_with = "de::string_list")]
    pub activate_info: Vec<String>,
    /// Seconds between polls; see [`WienConfig::interval`].
    #[serde(deserialize_with = "de::number")]
    pub interval_seconds: u64,
    /// Request timeout in seconds.
    #[serde(deserialize_with = "de::number")]
    pub http_timeout: u64,
    pub user_agent: String,
    /// RBL stop ids.
    #[serde(deserialize_with = "de::id_list")]
    pub stop_ids: Vec<String>,
    /// DIVA station ids.
    #[serde(deserialize_with = "de::id_list")]
    pub diva_ids: Vec<String>,
    /// Departures kept per line and monitor; `0` keeps all.
    #[serde(deserialize_with = "de::number")]
    pub max_departures_per_line: usize,
}

impl Default for WienConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            sender: "smart-home".to_string(),
            activate_info: vec!["stoerunglang".to_string()],
            interval_seconds: 30,
            http_timeout: 10,
            user_agent: "Mozilla/5.0".to_string(),
            stop_ids: Vec::new(),
            diva_ids: Vec::new(),
            max_departures_per_line: 8,
        }
    }
}

impl WienConfig {
    /// Polling interval, never shorter than [`MIN_INTERVAL_SECS`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(MIN_INTERVAL_SECS))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout.max(1))
    }

    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_stop_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_diva_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.diva_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_activate_info<I, S>(mut self, info: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.activate_info = info.into_iter().map(Into::into).collect();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.http_timeout = secs;
        self
    }

    pub fn with_max_departures_per_line(mut self, n: usize) -> Self {
        self.max_departures_per_line = n;
        self
    }
}

/// Result of one query.
#[derive(Debug)]
pub struct FetchOutcome {
    pub source_id: String,
    /// The requested URL.
    pub query: String,
    pub result: Result<Vec<Monitor>, WienError>,
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// The endpoint could not be reached at all.
    pub fn is_transport_failure(&self) -> bool {
        matches!(&self.result, Err(e) if e.is_transport())
    }

    /// The snapshot published for this query.
    ///
    /// A status failure records `status`; any other failure records `error`.
    /// Failed snapshots carry no monitors.
    pub fn into_snapshot(self, fetched_at: i64) -> Snapshot {
        let (ok, status, error, monitors) = match self.result {
            Ok(monitors) => (true, None, None, monitors),
            Err(WienError::Status { status }) => (false, Some(status), None, Vec::new()),
            Err(e) => (false, None, Some(e.to_string()), Vec::new()),
        };

        Snapshot {
            source_id: Some(self.source_id),
            query: Some(self.query),
            ok,
            status,
            error,
            monitors,
            fetched_at,
        }
    }
}

/// Something that can answer monitor queries.
///
/// Allows the poller to be tested without network access.
pub trait MonitorSource: Send + Sync {
    fn fetch(&self, query: &WienQuery) -> impl Future<Output = FetchOutcome> + Send;
}

/// Monitor endpoint client.
#[derive(Debug, Clone)]
pub struct WienClient {
    http: reqwest::Client,
    max_departures_per_line: usize,
}

impl WienClient {
    pub fn new(config: &WienConfig) -> Result<Self, WienError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            http,
            max_departures_per_line: config.max_departures_per_line,
        })
    }

    async fn fetch_monitors(&self, url: &Url) -> Result<Vec<Monitor>, WienError> {
        let response = self.http.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WienError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let payload: MonitorResponse = serde_json::from_str(&body).map_err(|e| WienError::Json {
            message: e.to_string(),
            body: Some(body.chars().take(500).collect()),
        })?;

        Ok(convert_response(&payload, self.max_departures_per_line))
    }
}

impl MonitorSource for WienClient {
    async fn fetch(&self, query: &WienQuery) -> FetchOutcome {
        let result = self.fetch_monitors(&query.url).await;
        match &result {
            Ok(monitors) => debug!(
                source = %query.source_id,
                monitors = monitors.len(),
                "monitor query succeeded"
            ),
            Err(e) => warn!(source = %query.source_id, error = %e, "monitor query failed"),
        }

        FetchOutcome {
            source_id: query.source_id.clone(),
            query: query.url.to_string(),
            result,
        }
    }
}
