//! Application configuration.
//!
//! Loaded once at startup from a TOML file. Every string value may refer
//! to the environment as `${VAR}` or `${VAR:default}`; references are
//! resolved before the file is interpreted, so numeric and boolean settings
//! also accept interpolated strings such as `port = "${PORT:5000}"`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::boards::BoardSpec;
use crate::bus::DEFAULT_CHANNEL_CAPACITY;
use crate::hub::DEFAULT_STREAM_CAPACITY;
use crate::store::StoreConfig;
use crate::wien::WienConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "BOARD_SERVER_CONFIG";

/// Config file used when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Errors from loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config not found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("error reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bus: BusConfig,
    pub http: HttpConfig,
    pub wien: WienConfig,
    pub store: StoreSection,
    #[serde(deserialize_with = "skip_invalid_boards")]
    pub boards: BTreeMap<String, BoardSpec>,
}

/// `[bus]`: broker connection, topics and publishing behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Broker host; empty runs on the in-process bus only.
    pub host: String,
    #[serde(deserialize_with = "de::number")]
    pub port: u16,
    /// Sent only when both are non-empty.
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    #[serde(deserialize_with = "de::number")]
    pub keepalive_secs: u64,
    /// Prefix of every snapshot topic; stored without a trailing `/`.
    pub base_topic: String,
    #[serde(deserialize_with = "de::flag")]
    pub retain: bool,
    /// Log every publish at info level.
    #[serde(deserialize_with = "de::flag")]
    pub log_publish: bool,
    /// Lower retry backoff bound in seconds.
    #[serde(deserialize_with = "de::number")]
    pub reconnect_min: u64,
    /// Upper retry backoff bound in seconds.
    #[serde(deserialize_with = "de::number")]
    pub reconnect_max: u64,
    #[serde(deserialize_with = "de::number")]
    pub channel_capacity: usize,
    pub discovery: DiscoveryConfig,
}

impl BusConfig {
    pub fn backoff_bounds(&self) -> (Duration, Duration) {
        let min = self.reconnect_min.max(1);
        (
            Duration::from_secs(min),
            Duration::from_secs(self.reconnect_max.max(min)),
        )
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.max(5))
    }

    /// Username and password, when both are given.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let username = self.username.as_deref().filter(|u| !u.is_empty())?;
        let password = self.password.as_deref().filter(|p| !p.is_empty())?;
        Some((username, password))
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: "mqtt".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: "board-server".to_string(),
            keepalive_secs: 60,
            base_topic: "wien/abfahrten".to_string(),
            retain: false,
            log_publish: false,
            reconnect_min: 2,
            reconnect_max: 30,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            discovery: DiscoveryConfig::default(),
        }
    }
}

/// `[bus.discovery]`: Home Assistant sensor discovery.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    #[serde(deserialize_with = "de::flag")]
    pub enabled: bool,
    /// Discovery topic prefix; stored without a trailing `/`.
    pub prefix: String,
    /// Device block attached to every sensor.
    pub device: Map<String, Value>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: "homeassistant".to_string(),
            device: default_device(),
        }
    }
}

fn default_device() -> Map<String, Value> {
    let mut device = Map::new();
    device.insert("name".into(), json!("Vienna Lines"));
    device.insert("identifiers".into(), json!(["vienna_lines_gateway"]));
    device
}

/// `[http]`: the web server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    #[serde(deserialize_with = "de::number")]
    pub port: u16,
    /// Directory served under `/static`.
    pub static_dir: String,
    /// Send the whole store to stream clients when they connect.
    #[serde(deserialize_with = "de::flag")]
    pub snapshot_on_connect: bool,
    /// Per-client stream queue length.
    #[serde(deserialize_with = "de::number")]
    pub stream_capacity: usize,
    #[serde(deserialize_with = "de::number")]
    pub keepalive_secs: u64,
}

impl HttpConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.max(1))
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5000,
            static_dir: "web".to_string(),
            snapshot_on_connect: true,
            stream_capacity: DEFAULT_STREAM_CAPACITY,
            keepalive_secs: 30,
        }
    }
}

/// `[store]`: snapshot retention.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Forget sources not refreshed for this long; absent keeps them.
    #[serde(deserialize_with = "de::optional_number")]
    pub ttl_secs: Option<u64>,
    #[serde(deserialize_with = "de::number")]
    pub max_capacity: u64,
}

impl StoreSection {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            ttl: self.ttl_secs.map(Duration::from_secs),
            max_capacity: self.max_capacity,
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        let defaults = StoreConfig::default();
        Self {
            ttl_secs: None,
            max_capacity: defaults.max_capacity,
        }
    }
}

impl AppConfig {
    /// Parse a TOML document, resolving `${VAR}` references from the
    /// process environment.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        Self::from_toml_with(text, |name| std::env::var(name).ok())
    }

    /// Parse a TOML document with an explicit variable lookup.
    pub fn from_toml_with(
        text: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, toml::de::Error> {
        let mut table: toml::Table = text.parse()?;
        for (_, value) in table.iter_mut() {
            interpolate_value(value, &lookup);
        }
        let config: AppConfig = toml::Value::Table(table).try_into()?;
        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        trim_trailing_slashes(&mut self.bus.base_topic);
        trim_trailing_slashes(&mut self.bus.discovery.prefix);

        let device = &mut self.bus.discovery.device;
        let has_identifiers = match device.get("identifiers") {
            None | Some(Value::Null) => false,
            Some(Value::Array(ids)) => !ids.is_empty(),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        };
        if !has_identifiers {
            device.insert("identifiers".into(), json!(["vienna_lines_gateway"]));
        }
        device
            .entry("name")
            .or_insert_with(|| json!("Vienna Lines"));

        self
    }
}

fn trim_trailing_slashes(s: &mut String) {
    let trimmed = s.trim_end_matches('/').len();
    s.truncate(trimmed);
}

/// Path of the config file, from [`CONFIG_ENV`] or the default.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load and interpolate the config file at `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config = AppConfig::from_toml(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    info!(
        path = %path.display(),
        boards = config.boards.len(),
        stops = config.wien.stop_ids.len(),
        divas = config.wien.diva_ids.len(),
        "configuration loaded"
    );
    Ok(config)
}

static ENV_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)?(?::([^}]*))?\}").expect("valid env reference pattern")
});

/// Resolve `${VAR}` and `${VAR:default}` in `input`.
///
/// A set variable wins even when empty; an unset one yields the default,
/// or the empty string without one.
pub fn interpolate_env(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    ENV_REFERENCE
        .replace_all(input, |caps: &Captures<'_>| {
            let name = caps.get(1).map_or("", |m| m.as_str());
            let default = caps.get(2).map_or("", |m| m.as_str());
            lookup(name).unwrap_or_else(|| default.to_string())
        })
        .into_owned()
}

fn interpolate_value(value: &mut toml::Value, lookup: &impl Fn(&str) -> Option<String>) {
    match value {
        toml::Value::String(s) => *s = interpolate_env(s, lookup),
        toml::Value::Array(items) => {
            for item in items {
                interpolate_value(item, lookup);
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                interpolate_value(item, lookup);
            }
        }
        _ => {}
    }
}

/// Boards that fail to parse are reported and left out rather than
/// failing the whole file.
fn skip_invalid_boards<'de, D>(deserializer: D) -> Result<BTreeMap<String, BoardSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, toml::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(id, value)| match value.try_into::<BoardSpec>() {
            Ok(spec) => Some((id, spec)),
            Err(e) => {
                warn!(board = %id, error = %e, "ignoring invalid board");
                None
            }
        })
        .collect())
}

/// Forgiving field deserializers for hand-written and interpolated values.
pub(crate) mod de {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
        Float(f64),
        Str(String),
    }

    fn parse_u64<E: Error>(raw: Raw) -> Result<Option<u64>, E> {
        match raw {
            Raw::Int(n) => u64::try_from(n)
                .map(Some)
                .map_err(|_| E::custom(format!("expected a non-negative number, got {n}"))),
            Raw::Float(f) if f >= 0.0 && f.fract() == 0.0 => Ok(Some(f as u64)),
            Raw::Str(s) if s.trim().is_empty() => Ok(None),
            Raw::Str(s) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| E::custom(format!("expected a number, got {s:?}"))),
            Raw::Float(f) => Err(E::custom(format!("expected a whole number, got {f}"))),
            Raw::Bool(b) => Err(E::custom(format!("expected a number, got {b}"))),
        }
    }

    /// Integer given as a number or a numeric string.
    pub fn number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<u64>,
    {
        let value = parse_u64(Raw::deserialize(deserializer)?)?
            .ok_or_else(|| D::Error::custom("expected a number, got an empty string"))?;
        T::try_from(value).map_err(|_| D::Error::custom(format!("number {value} out of range")))
    }

    /// Like [`number`], with null or an empty string meaning "unset".
    pub fn optional_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<u64>,
    {
        let value = match Option::<Raw>::deserialize(deserializer)? {
            Some(raw) => parse_u64(raw)?,
            None => None,
        };
        value
            .map(|v| T::try_from(v).map_err(|_| D::Error::custom(format!("number {v} out of range"))))
            .transpose()
    }

    /// `true`/`false`, or one of `1`, `true`, `yes`, `on` (any case) for true.
    pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => b,
            Raw::Int(n) => n == 1,
            Raw::Float(f) => f == 1.0,
            Raw::Str(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ),
        })
    }

    /// List of ids given as strings or numbers.
    pub fn id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Vec<Raw>>::deserialize(deserializer)?.unwrap_or_default();
        raw.into_iter()
            .map(|item| match item {
                Raw::Str(s) => Ok(s.trim().to_string()),
                Raw::Int(n) => Ok(n.to_string()),
                Raw::Float(f) => Ok(f.to_string()),
                Raw::Bool(b) => Err(D::Error::custom(format!("expected an id, got {b}"))),
            })
            .filter(|id| !matches!(id, Ok(s) if s.is_empty()))
            .collect()
    }

    /// List of strings; a single string is a one-element list.
    pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
            Some(OneOrMany::One(s)) => vec![s],
            Some(OneOrMany::Many(v)) => v,
            None => Vec::new(),
        })
    }
}
