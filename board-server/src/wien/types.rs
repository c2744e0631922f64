//! Monitor endpoint response DTOs.
//!
//! These map the upstream JSON directly. Almost everything is optional:
//! the API omits fields, and sends `null` for empty lists, depending on the
//! stop and time of day.

use serde::Deserialize;
use serde_json::Value;

/// Top-level response of `GET /ogd_realtime/monitor`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorResponse {
    pub data: Option<MonitorData>,

    /// Server status block (`messageCode`, `value`, `serverTime`).
    pub message: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorData {
    pub monitors: Option<Vec<MonitorDto>>,

    /// Disruption notices; the API uses both spellings.
    pub traffic_infos: Option<Value>,
    pub traffic_info: Option<Value>,

    pub traffic_info_categories: Option<Value>,
}

/// One stop/platform.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorDto {
    pub location_stop: Option<LocationStop>,
    pub lines: Option<Vec<LineDto>>,
}

/// GeoJSON feature describing the stop.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationStop {
    pub properties: Option<StopProperties>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopProperties {
    /// Stop name, e.g. "Josef-Baumann-Gasse".
    pub title: Option<String>,
    pub municipality: Option<String>,
    pub platform: Option<String>,
    /// Used instead of `platform` by some rail stops.
    pub gate: Option<String>,
    pub attributes: Option<StopAttributes>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopAttributes {
    /// Realtime stop number; usually an integer.
    pub rbl: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LineDto {
    pub name: Option<String>,
    pub towards: Option<String>,
    /// Vehicle type, e.g. `ptTram`, `ptMetro`, `ptBusCity`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub departures: Option<DeparturesDto>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeparturesDto {
    pub departure: Option<Vec<DepartureDto>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartureDto {
    pub departure_time: Option<DepartureTime>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartureTime {
    /// Minutes until departure. Kept raw; non-numbers are dropped later.
    pub countdown: Option<Value>,
    pub time_planned: Option<String>,
    pub time_real: Option<String>,
}
