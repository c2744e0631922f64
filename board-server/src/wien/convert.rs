//! Conversion from monitor DTOs to domain monitors.

use serde_json::{Value, json};

use crate::domain::{Countdown, Departure, Line, Monitor, Stop};

use super::types::{DepartureDto, LineDto, MonitorDto, MonitorResponse, StopProperties};

/// Convert a monitor response into domain monitors.
///
/// At most `max_departures_per_line` departures are kept per line, counted
/// before invalid entries are dropped; `0` keeps all of them. Traffic info
/// is response-wide and attached to every monitor.
pub fn convert_response(response: &MonitorResponse, max_departures_per_line: usize) -> Vec<Monitor> {
    let Some(data) = &response.data else {
        return Vec::new();
    };

    let traffic_infos = first_present([&data.traffic_infos, &data.traffic_info]).unwrap_or_else(|| json!({}));
    let categories = first_present([&data.traffic_info_categories]).unwrap_or_else(|| json!([]));

    data.monitors
        .iter()
        .flatten()
        .map(|monitor| Monitor {
            stop: convert_stop(monitor),
            lines: monitor
                .lines
                .iter()
                .flatten()
                .map(|line| convert_line(line, max_departures_per_line))
                .collect(),
            traffic_info_categories: categories.clone(),
            traffic_infos: traffic_infos.clone(),
        })
        .collect()
}

/// First value that is neither null nor an empty container or string.
fn first_present<const N: usize>(candidates: [&Option<Value>; N]) -> Option<Value> {
    candidates.into_iter().flatten().find(|v| !is_blank(v)).cloned()
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}

fn convert_stop(monitor: &MonitorDto) -> Stop {
    let Some(props) = monitor.location_stop.as_ref().and_then(|l| l.properties.as_ref()) else {
        return Stop::default();
    };

    Stop {
        title: props.title.clone(),
        municipality: props.municipality.clone(),
        platform: platform_of(props),
        rbl: props
            .attributes
            .as_ref()
            .and_then(|a| a.rbl.as_ref())
            .and_then(rbl_number),
    }
}

fn platform_of(props: &StopProperties) -> Option<String> {
    [&props.platform, &props.gate]
        .into_iter()
        .flatten()
        .find(|p| !p.is_empty())
        .cloned()
}

fn rbl_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn convert_line(line: &LineDto, max_departures: usize) -> Line {
    let raw = line
        .departures
        .as_ref()
        .and_then(|d| d.departure.as_deref())
        .unwrap_or_default();
    let take = if max_departures == 0 { raw.len() } else { max_departures };

    Line {
        name: line.name.clone(),
        towards: line.towards.clone(),
        kind: line.kind.clone(),
        departures: raw.iter().take(take).map(convert_departure).collect(),
    }
}

fn convert_departure(departure: &DepartureDto) -> Departure {
    let Some(time) = &departure.departure_time else {
        return Departure::default();
    };

    Departure {
        countdown: time.countdown.as_ref().and_then(Countdown::from_json),
        time_planned: time.time_planned.clone(),
        time_real: time.time_real.clone(),
    }
}
