//! Normalized monitor snapshots.
//!
//! These are the shapes the fetcher publishes and the snapshot store keeps.
//! Every field is optional or defaulted: snapshots arrive as JSON over the
//! bus and a missing or mistyped field must not make the whole snapshot
//! unreadable.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::countdown::{Countdown, lenient_countdown};

/// One fetch result for one queried source (a stop id or a DIVA group).
///
/// Replaced wholesale on every fetch of the same source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Stable identifier derived from the query, e.g. `"4205"` or `"diva_60200607"`.
    #[serde(rename = "ident", default, deserialize_with = "lenient")]
    pub source_id: Option<String>,

    /// The upstream request this snapshot answers (diagnostics only).
    #[serde(default, deserialize_with = "lenient")]
    pub query: Option<String>,

    /// Whether the fetch succeeded.
    #[serde(default = "default_true", deserialize_with = "lenient_bool")]
    pub ok: bool,

    /// HTTP status of a failed fetch.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Transport or decode error of a failed fetch.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Monitors in upstream order.
    #[serde(rename = "items", alias = "monitors", default, deserialize_with = "lenient_vec")]
    pub monitors: Vec<Monitor>,

    /// Unix timestamp (seconds) of the fetch.
    #[serde(rename = "ts", default, deserialize_with = "lenient_ts")]
    pub fetched_at: i64,
}

/// One physical stop or platform and its current lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    #[serde(default, deserialize_with = "lenient_default")]
    pub stop: Stop,

    #[serde(default, deserialize_with = "lenient_vec")]
    pub lines: Vec<Line>,

    /// Passed through untouched.
    #[serde(rename = "trafficInfoCategories", default = "empty_array")]
    pub traffic_info_categories: Value,

    /// Passed through untouched.
    #[serde(rename = "trafficInfos", default = "empty_object")]
    pub traffic_infos: Value,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            stop: Stop::default(),
            lines: Vec::new(),
            traffic_info_categories: empty_array(),
            traffic_infos: empty_object(),
        }
    }
}

/// Stop metadata of a monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    #[serde(default, deserialize_with = "lenient")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub municipality: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub platform: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub rbl: Option<i64>,
}

impl Stop {
    /// Trimmed stop title, empty when absent.
    pub fn title_trimmed(&self) -> &str {
        self.title.as_deref().map(str::trim).unwrap_or_default()
    }

    /// Platform, with an empty string treated as "no platform".
    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref().filter(|p| !p.is_empty())
    }
}

/// A transit line serving a monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Line {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,

    /// Destination text.
    #[serde(default, deserialize_with = "lenient")]
    pub towards: Option<String>,

    /// Transport mode, e.g. `ptTram`.
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub kind: Option<String>,

    /// Departures as received, unsorted.
    #[serde(default, deserialize_with = "lenient_vec")]
    pub departures: Vec<Departure>,
}

impl Line {
    pub fn name_trimmed(&self) -> &str {
        self.name.as_deref().map(str::trim).unwrap_or_default()
    }

    pub fn towards_trimmed(&self) -> &str {
        self.towards.as_deref().map(str::trim).unwrap_or_default()
    }
}

/// One predicted departure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Departure {
    /// `None` when upstream sent no numeric countdown.
    #[serde(default, deserialize_with = "lenient_countdown")]
    pub countdown: Option<Countdown>,

    #[serde(rename = "timePlanned", default, deserialize_with = "lenient")]
    pub time_planned: Option<String>,

    #[serde(rename = "timeReal", default, deserialize_with = "lenient")]
    pub time_real: Option<String>,
}

impl Departure {
    /// A departure due in `minutes` with no timestamps.
    pub fn in_minutes(minutes: f64) -> Self {
        Self {
            countdown: Countdown::new(minutes),
            ..Self::default()
        }
    }
}

fn default_true() -> bool {
    true
}

fn empty_array() -> Value {
    Value::Array(Vec::new())
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Deserialize any value, keeping it only if it has the expected type.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient(deserializer)?.unwrap_or(true))
}

fn lenient_ts<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .unwrap_or_default())
}

/// Deserialize a list, dropping entries that do not fit the element type.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(entries) = value else {
        return Ok(Vec::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect())
}
