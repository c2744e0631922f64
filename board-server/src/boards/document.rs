//! Board documents as served to clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Departure;

/// A fully built board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardDocument {
    pub id: String,
    pub title: String,
    /// Unix timestamp (seconds) of the build.
    #[serde(rename = "generatedAt")]
    pub generated_at: i64,
    /// Board-level default limit; `0` means unlimited.
    pub max_departures: u32,
    pub items: Vec<BoardItem>,
}

impl BoardDocument {
    /// The document returned for an unknown board id.
    pub fn empty(id: &str, generated_at: i64) -> Self {
        Self {
            id: id.to_string(),
            title: id.to_string(),
            generated_at,
            max_departures: 0,
            items: Vec::new(),
        }
    }
}

/// One aggregated display unit (a rule applied to a stop).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardItem {
    pub municipality: Option<String>,
    /// The monitor's actual platform, independent of grouping.
    pub platform: Option<String>,
    pub rbl: Option<i64>,
    /// Original stop title.
    pub name: String,
    /// Display title from the rule.
    pub title: String,
    pub lines: Vec<BoardLine>,
    #[serde(rename = "trafficInfoCategories")]
    pub traffic_info_categories: Value,
    #[serde(rename = "trafficInfos")]
    pub traffic_infos: Value,
}

/// One line within a board item, merged across monitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardLine {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub towards: Option<String>,
    /// Display title from the matching line rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub departures: Vec<Departure>,
    pub countdown_text: String,
}
