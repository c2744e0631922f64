//! Home Assistant MQTT discovery.
//!
//! Every named line of every board item becomes one sensor. The sensor's
//! state is the next countdown in whole minutes; its attributes carry the
//! full countdown list. Sensor ids are slugs of board, stop, line and
//! destination, so rebuilding a board yields the same sensors.

use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::boards::{BoardDocument, BoardService};
use crate::bus::{BusError, BusMessage, BusPublisher};
use crate::config::{BusConfig, DiscoveryConfig};

static NON_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-z0-9]+").expect("valid slug pattern"));

/// Lowercase, collapse runs of anything but `[a-z0-9]` into `_`, trim `_`.
pub fn slugify(s: &str) -> String {
    NON_SLUG
        .replace_all(&s.to_lowercase(), "_")
        .trim_matches('_')
        .to_string()
}

/// Deterministic sensor id for one line on one board.
pub fn sensor_id(board_id: &str, stop: &str, line: &str, towards: &str) -> String {
    format!(
        "vienna_{}_{}_{}_{}",
        slugify(board_id),
        slugify(stop),
        slugify(line),
        slugify(towards)
    )
}

/// Topics belonging to one sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorTopics {
    pub state: String,
    pub attributes: String,
    pub availability: String,
    pub config: String,
}

impl SensorTopics {
    pub fn new(base_topic: &str, prefix: &str, sensor_id: &str) -> Self {
        Self {
            state: format!("{base_topic}/boards/{sensor_id}/state"),
            attributes: format!("{base_topic}/boards/{sensor_id}/attributes"),
            availability: availability_topic(base_topic),
            config: format!("{prefix}/sensor/{sensor_id}/config"),
        }
    }
}

pub fn availability_topic(base_topic: &str) -> String {
    format!("{base_topic}/availability")
}

/// Retained `online`/`offline` message; the `offline` one doubles as the
/// broker last will.
pub fn availability_message(base_topic: &str, online: bool) -> BusMessage {
    let payload = if online { "online" } else { "offline" };
    BusMessage::new(availability_topic(base_topic), payload).retained(true)
}

/// One sensor derived from a board document.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardSensor {
    pub sensor_id: String,
    /// Item display title.
    pub stop: String,
    pub line: String,
    /// Destination; empty when unknown.
    pub towards: String,
    /// Countdowns in whole minutes, soonest first.
    pub countdowns: Vec<i64>,
}

impl BoardSensor {
    /// Display name, e.g. `Kagran – U1 → Leopoldau`.
    pub fn display_name(&self) -> String {
        if self.towards.is_empty() {
            format!("{} – {}", self.stop, self.line)
        } else {
            format!("{} – {} → {}", self.stop, self.line, self.towards)
        }
    }

    /// Sensor state: the next countdown, or `null`.
    pub fn state(&self) -> String {
        self.countdowns
            .first()
            .map_or_else(|| "null".to_string(), i64::to_string)
    }
}

/// Flatten a board into sensors. Lines without a name are skipped.
pub fn board_sensors(doc: &BoardDocument) -> Vec<BoardSensor> {
    doc.items
        .iter()
        .flat_map(|item| {
            let stop = match item.title.trim() {
                "" => "Unknown",
                title => title,
            };
            item.lines.iter().filter_map(move |line| {
                let name = line.name.as_deref().unwrap_or_default().trim();
                if name.is_empty() {
                    return None;
                }
                let towards = line.towards.as_deref().unwrap_or_default().trim();
                let id_towards = if towards.is_empty() { "-" } else { towards };

                Some(BoardSensor {
                    sensor_id: sensor_id(&doc.id, stop, name, id_towards),
                    stop: stop.to_string(),
                    line: name.to_string(),
                    towards: towards.to_string(),
                    countdowns: line
                        .departures
                        .iter()
                        .filter_map(|d| d.countdown)
                        .map(|cd| cd.whole_minutes())
                        .collect(),
                })
            })
        })
        .collect()
}

/// Retained discovery config payload for one sensor.
pub fn config_payload(sensor: &BoardSensor, topics: &SensorTopics, device: &Map<String, Value>) -> Value {
    json!({
        "name": sensor.display_name(),
        "unique_id": sensor.sensor_id,
        "state_topic": topics.state,
        "json_attributes_topic": topics.attributes,
        "availability": [{"topic": topics.availability}],
        "device": device,
        "icon": "mdi:train",
        "unit_of_measurement": "min",
        "state_class": "measurement",
    })
}

#[derive(Debug, Serialize)]
struct SensorAttributes<'a> {
    stop: &'a str,
    line: &'a str,
    towards: &'a str,
    countdowns: &'a [i64],
    ts: i64,
    board: &'a str,
}

/// Publishes discovery configs, sensor states and availability.
#[derive(Clone)]
pub struct Discovery {
    bus: Arc<dyn BusPublisher>,
    boards: BoardService,
    base_topic: String,
    config: DiscoveryConfig,
    log_publish: bool,
}

impl Discovery {
    pub fn new(bus: Arc<dyn BusPublisher>, boards: BoardService, bus_config: &BusConfig) -> Self {
        Self {
            bus,
            boards,
            base_topic: bus_config.base_topic.clone(),
            config: bus_config.discovery.clone(),
            log_publish: bus_config.log_publish,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn topics(&self, sensor_id: &str) -> SensorTopics {
        SensorTopics::new(&self.base_topic, &self.config.prefix, sensor_id)
    }

    /// Publish a retained config for every sensor of a board.
    ///
    /// Returns the sensor ids.
    pub fn publish_discovery_for_board(&self, board_id: &str) -> Result<Vec<String>, BusError> {
        let doc = self.boards.build(board_id);
        let mut ids = Vec::new();

        for sensor in board_sensors(&doc) {
            let topics = self.topics(&sensor.sensor_id);
            let payload = config_payload(&sensor, &topics, &self.config.device);
            self.bus
                .publish(BusMessage::json(topics.config, &payload)?.retained(true))?;
            ids.push(sensor.sensor_id);
        }

        info!(board = board_id, sensors = ids.len(), "discovery configs published");
        Ok(ids)
    }

    /// Publish retained state and attributes for every sensor of a board.
    ///
    /// Returns the number of sensors updated.
    pub fn publish_board_states(&self, board_id: &str) -> Result<usize, BusError> {
        let doc = self.boards.build(board_id);
        let ts = Utc::now().timestamp();
        let sensors = board_sensors(&doc);

        for sensor in &sensors {
            let topics = self.topics(&sensor.sensor_id);
            let attributes = SensorAttributes {
                stop: &sensor.stop,
                line: &sensor.line,
                towards: &sensor.towards,
                countdowns: &sensor.countdowns,
                ts,
                board: board_id,
            };

            self.bus
                .publish(BusMessage::new(topics.state, sensor.state()).retained(true))?;
            self.bus
                .publish(BusMessage::json(topics.attributes, &attributes)?.retained(true))?;
        }

        if self.log_publish {
            info!(board = board_id, sensors = sensors.len(), "board states published");
        } else {
            debug!(board = board_id, sensors = sensors.len(), "board states published");
        }
        Ok(sensors.len())
    }

    /// Publish discovery for every configured board; returns the board ids.
    pub fn announce_all(&self) -> Result<Vec<String>, BusError> {
        let ids = self.boards.registry().ids();
        for id in &ids {
            self.publish_discovery_for_board(id)?;
        }
        Ok(ids)
    }

    /// Publish states for every configured board.
    pub fn publish_all_states(&self) -> Result<(), BusError> {
        for id in self.boards.registry().ids() {
            self.publish_board_states(&id)?;
        }
        Ok(())
    }

    /// Retained `online`/`offline` on the shared availability topic.
    pub fn publish_availability(&self, online: bool) -> Result<(), BusError> {
        let message = availability_message(&self.base_topic, online);
        let payload = message.payload.clone();
        self.bus.publish(message)?;
        info!(availability = %payload, "availability published");
        Ok(())
    }

    /// Mark the bridge online and, when enabled, announce every board.
    ///
    /// Returns the number of boards announced.
    pub fn on_connected(&self) -> Result<usize, BusError> {
        self.publish_availability(true)?;
        if !self.is_enabled() {
            return Ok(0);
        }
        Ok(self.announce_all()?.len())
    }

    /// Call [`Discovery::on_connected`] each time `connection` turns true,
    /// until `cancel` fires or the connection owner goes away.
    pub async fn follow_connection(self, mut connection: watch::Receiver<bool>, cancel: CancellationToken) {
        loop {
            if *connection.borrow_and_update() {
                match self.on_connected() {
                    Ok(boards) => info!(boards, "discovery announced"),
                    Err(e) => warn!(error = %e, "announce after connect failed"),
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = connection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boards::{BoardItem, BoardLine, BoardRegistry, BoardSpec, Rule};
    use crate::bus::InMemoryBus;
    use crate::domain::{Departure, Line, Monitor, Snapshot, Stop};
    use crate::store::{SnapshotStore, StoreConfig};
    use std::collections::BTreeMap;

    #[test]
    fn slugs() {
        assert_eq!(slugify("Josef-Baumann-Gasse"), "josef_baumann_gasse");
        assert_eq!(slugify("  JB (Süd) "), "jb_s_d");
        assert_eq!(slugify("Floridsdorf U"), "floridsdorf_u");
        assert_eq!(slugify("-"), "");
        assert_eq!(slugify("__a__b__"), "a_b");
    }

    #[test]
    fn sensor_ids_are_deterministic() {
        let id = sensor_id("Vorzimmer", "JB (Süd)", "25", "Floridsdorf U");
        assert_eq!(id, "vienna_vorzimmer_jb_s_d_25_floridsdorf_u");
        assert_eq!(id, sensor_id("Vorzimmer", "JB (Süd)", "25", "Floridsdorf U"));
        assert_eq!(sensor_id("b", "s", "1", "-"), "vienna_b_s_1_");
    }

    #[test]
    fn topics() {
        let topics = SensorTopics::new("wien/abfahrten", "homeassistant", "vienna_x");
        assert_eq!(topics.state, "wien/abfahrten/boards/vienna_x/state");
        assert_eq!(topics.attributes, "wien/abfahrten/boards/vienna_x/attributes");
        assert_eq!(topics.availability, "wien/abfahrten/availability");
        assert_eq!(topics.config, "homeassistant/sensor/vienna_x/config");
    }

    fn board_line(name: Option<&str>, towards: Option<&str>, countdowns: &[f64]) -> BoardLine {
        BoardLine {
            name: name.map(String::from),
            kind: None,
            towards: towards.map(String::from),
            title: None,
            departures: countdowns.iter().map(|&m| Departure::in_minutes(m)).collect(),
            countdown_text: String::new(),
        }
    }

    fn doc(title: &str, lines: Vec<BoardLine>) -> BoardDocument {
        BoardDocument {
            id: "vz".into(),
            title: "Vorzimmer".into(),
            generated_at: 0,
            max_departures: 0,
            items: vec![BoardItem {
                municipality: None,
                platform: None,
                rbl: None,
                name: "Kagran".into(),
                title: title.into(),
                lines,
                traffic_info_categories: json!([]),
                traffic_infos: json!({}),
            }],
        }
    }

    #[test]
    fn flattens_named_lines() {
        let sensors = board_sensors(&doc(
            "Kagran",
            vec![
                board_line(Some(" U1 "), Some("Leopoldau"), &[2.0, 7.9]),
                board_line(None, Some("Nowhere"), &[1.0]),
                board_line(Some("26A"), None, &[]),
            ],
        ));

        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0].sensor_id, "vienna_vz_kagran_u1_leopoldau");
        assert_eq!(sensors[0].line, "U1");
        assert_eq!(sensors[0].countdowns, vec![2, 7]);
        assert_eq!(sensors[0].state(), "2");
        assert_eq!(sensors[0].display_name(), "Kagran – U1 → Leopoldau");

        assert_eq!(sensors[1].towards, "");
        assert_eq!(sensors[1].sensor_id, "vienna_vz_kagran_26a_");
        assert_eq!(sensors[1].state(), "null");
        assert_eq!(sensors[1].display_name(), "Kagran – 26A");
    }

    #[test]
    fn blank_item_title_is_unknown() {
        let sensors = board_sensors(&doc("  ", vec![board_line(Some("U1"), Some("X"), &[])]));
        assert_eq!(sensors[0].stop, "Unknown");
    }

    #[test]
    fn config_payload_shape() {
        let sensors = board_sensors(&doc("Kagran", vec![board_line(Some("U1"), Some("Oberlaa"), &[1.0])]));
        let topics = SensorTopics::new("base", "ha", &sensors[0].sensor_id);
        let mut device = Map::new();
        device.insert("name".into(), json!("Vienna Lines"));

        let payload = config_payload(&sensors[0], &topics, &device);

        assert_eq!(payload["unique_id"], "vienna_vz_kagran_u1_oberlaa");
        assert_eq!(payload["state_topic"], "base/boards/vienna_vz_kagran_u1_oberlaa/state");
        assert_eq!(payload["availability"], json!([{"topic": "base/availability"}]));
        assert_eq!(payload["device"]["name"], "Vienna Lines");
        assert_eq!(payload["icon"], "mdi:train");
        assert_eq!(payload["unit_of_measurement"], "min");
        assert_eq!(payload["state_class"], "measurement");
    }

    async fn fixture() -> (Arc<InMemoryBus>, Discovery) {
        let store = SnapshotStore::new(&StoreConfig::default());
        store
            .upsert(
                "4401",
                Snapshot {
                    ok: true,
                    monitors: vec![Monitor {
                        stop: Stop {
                            title: Some("Kagran".into()),
                            ..Stop::default()
                        },
                        lines: vec![Line {
                            name: Some("U1".into()),
                            towards: Some("Leopoldau".into()),
                            kind: None,
                            departures: vec![Departure::in_minutes(3.0), Departure::in_minutes(8.0)],
                        }],
                        ..Monitor::default()
                    }],
                    ..Snapshot::default()
                },
            )
            .await;

        let mut specs = BTreeMap::new();
        specs.insert(
            "home".to_string(),
            BoardSpec {
                rules: vec![Rule {
                    stop: Some("Kagran".into()),
                    ..Rule::default()
                }],
                ..BoardSpec::default()
            },
        );
        let boards = BoardService::new(Arc::new(BoardRegistry::new(specs)), store);

        let bus = Arc::new(InMemoryBus::new());
        let mut config = BusConfig::default();
        config.discovery.enabled = true;
        let discovery = Discovery::new(bus.clone(), boards, &config);
        (bus, discovery)
    }

    #[tokio::test]
    async fn publishes_retained_configs() {
        let (bus, discovery) = fixture().await;

        let ids = discovery.announce_all().unwrap();
        assert_eq!(ids, vec!["home"]);

        let config = bus
            .retained("homeassistant/sensor/vienna_home_kagran_u1_leopoldau/config")
            .unwrap();
        let payload: Value = serde_json::from_str(&config.payload).unwrap();
        assert_eq!(payload["name"], "Kagran – U1 → Leopoldau");
        assert_eq!(payload["device"]["identifiers"], json!(["vienna_lines_gateway"]));
    }

    #[tokio::test]
    async fn publishes_states_and_attributes() {
        let (bus, discovery) = fixture().await;

        assert_eq!(discovery.publish_board_states("home").unwrap(), 1);

        let state = bus
            .retained("wien/abfahrten/boards/vienna_home_kagran_u1_leopoldau/state")
            .unwrap();
        assert_eq!(state.payload, "3");

        let attributes = bus
            .retained("wien/abfahrten/boards/vienna_home_kagran_u1_leopoldau/attributes")
            .unwrap();
        let attributes: Value = serde_json::from_str(&attributes.payload).unwrap();
        assert_eq!(attributes["countdowns"], json!([3, 8]));
        assert_eq!(attributes["board"], "home");
        assert_eq!(attributes["stop"], "Kagran");
        assert!(attributes["ts"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn unknown_board_publishes_nothing() {
        let (bus, discovery) = fixture().await;
        assert!(discovery.publish_discovery_for_board("nope").unwrap().is_empty());
        assert_eq!(bus.published(), 0);
    }

    #[tokio::test]
    async fn availability_is_retained() {
        let (bus, discovery) = fixture().await;

        discovery.publish_availability(true).unwrap();
        assert_eq!(bus.retained("wien/abfahrten/availability").unwrap().payload, "online");

        discovery.publish_availability(false).unwrap();
        assert_eq!(bus.retained("wien/abfahrten/availability").unwrap().payload, "offline");
    }

    #[test]
    fn offline_message_is_retained() {
        let will = availability_message("wien/abfahrten", false);
        assert_eq!(will.topic, "wien/abfahrten/availability");
        assert_eq!(will.payload, "offline");
        assert!(will.retain);
    }

    #[tokio::test]
    async fn connect_marks_online_and_announces() {
        let (bus, discovery) = fixture().await;

        assert_eq!(discovery.on_connected().unwrap(), 1);
        assert_eq!(bus.retained("wien/abfahrten/availability").unwrap().payload, "online");
        assert!(
            bus.retained("homeassistant/sensor/vienna_home_kagran_u1_leopoldau/config")
                .is_some()
        );
    }

    #[tokio::test]
    async fn every_reconnect_is_announced() {
        let (bus, discovery) = fixture().await;
        let (connected, connection) = watch::channel(false);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(discovery.follow_connection(connection, cancel.clone()));

        let wait_for = |count: u64| {
            let bus = bus.clone();
            async move {
                tokio::time::timeout(std::time::Duration::from_secs(2), async {
                    while bus.published() < count {
                        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    }
                })
                .await
                .unwrap();
            }
        };

        // availability plus one sensor config per connect
        connected.send_replace(true);
        wait_for(2).await;

        bus.publish(availability_message("wien/abfahrten", false)).unwrap();
        connected.send_replace(false);
        connected.send_replace(true);
        wait_for(5).await;
        assert_eq!(bus.retained("wien/abfahrten/availability").unwrap().payload, "online");

        cancel.cancel();
        task.await.unwrap();
    }
}
