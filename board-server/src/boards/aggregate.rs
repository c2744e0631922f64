//! Board aggregation.
//!
//! Turns the current set of snapshots into one [`BoardDocument`] for a
//! board specification. Every monitor of every snapshot is run through
//! every rule, in declared order. Matches are grouped into items keyed by
//! `(title, stop, platform-if-constrained)`. Within an item, lines are keyed
//! by `(name, towards, display title)`, so the same logical line observed
//! at several monitors merges into one deduplicated departure list.
//!
//! The build is a pure function of its inputs and never fails: malformed
//! input only ever makes the document emptier.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::trace;

use crate::domain::{Line, Monitor, Snapshot};

use super::departures::{countdown_text, normalize};
use super::document::{BoardDocument, BoardItem, BoardLine};
use super::matcher::LineSelection;
use super::spec::{BoardSpec, Rule};

/// Grouping identity of a board item.
///
/// `platform` is `None` when the rule does not constrain the platform, so
/// monitors of the same stop collapse into one item; otherwise it holds the
/// matched platform (itself possibly "no platform").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ItemKey {
    title: String,
    stop: String,
    platform: Option<Option<String>>,
}

/// Grouping identity of a line within an item: `(name, towards, title)`.
type LineKey = (String, String, String);

struct ItemBuilder {
    item: BoardItem,
    lines: Vec<BoardLine>,
    line_index: HashMap<LineKey, usize>,
}

impl ItemBuilder {
    fn new(monitor: &Monitor, title: &str) -> Self {
        let stop = &monitor.stop;
        Self {
            item: BoardItem {
                municipality: stop.municipality.clone(),
                platform: stop.platform().map(String::from),
                rbl: stop.rbl,
                name: stop.title_trimmed().to_string(),
                title: title.to_string(),
                lines: Vec::new(),
                traffic_info_categories: monitor.traffic_info_categories.clone(),
                traffic_infos: monitor.traffic_infos.clone(),
            },
            lines: Vec::new(),
            line_index: HashMap::new(),
        }
    }

    /// Add one observed line, merging with an earlier observation of the same key.
    fn merge_line(&mut self, line: &Line, title: Option<&str>, limit: u32) {
        let departures = normalize(line.departures.iter().cloned(), limit);
        let key = (
            line.name_trimmed().to_string(),
            line.towards_trimmed().to_string(),
            title.unwrap_or_default().to_string(),
        );

        match self.line_index.entry(key) {
            Entry::Occupied(slot) => {
                let existing = &mut self.lines[*slot.get()];
                let previous = std::mem::take(&mut existing.departures);
                let merged = normalize(previous.into_iter().chain(departures), limit);
                existing.countdown_text = countdown_text(&merged);
                existing.departures = merged;
            }
            Entry::Vacant(slot) => {
                slot.insert(self.lines.len());
                self.lines.push(BoardLine {
                    name: line.name.clone(),
                    kind: line.kind.clone(),
                    towards: line.towards.clone(),
                    title: title.map(String::from),
                    countdown_text: countdown_text(&departures),
                    departures,
                });
            }
        }
    }

    /// Traffic info is advisory; the last monitor touching the item wins.
    fn refresh_traffic(&mut self, monitor: &Monitor) {
        self.item.traffic_info_categories = monitor.traffic_info_categories.clone();
        self.item.traffic_infos = monitor.traffic_infos.clone();
    }

    fn finish(self) -> BoardItem {
        BoardItem {
            lines: self.lines,
            ..self.item
        }
    }
}

/// Accumulates items for one board build.
struct Aggregation<'a> {
    rules: &'a [Rule],
    default_limit: u32,
    items: Vec<ItemBuilder>,
    index: HashMap<ItemKey, usize>,
}

impl<'a> Aggregation<'a> {
    fn new(spec: &'a BoardSpec) -> Self {
        Self {
            rules: &spec.rules,
            default_limit: spec.max_departures,
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn add_monitor(&mut self, monitor: &Monitor) {
        let stop_name = monitor.stop.title_trimmed();

        for rule in self.rules {
            if !rule.matches_stop(&monitor.stop) {
                continue;
            }

            let title = rule
                .title
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or(stop_name);
            let limit = rule.limit(self.default_limit);
            let key = ItemKey {
                title: title.to_string(),
                stop: stop_name.to_string(),
                platform: rule
                    .platform
                    .is_declared()
                    .then(|| monitor.stop.platform().map(String::from)),
            };

            let slot = match self.index.entry(key) {
                Entry::Occupied(slot) => *slot.get(),
                Entry::Vacant(slot) => {
                    self.items.push(ItemBuilder::new(monitor, title));
                    *slot.insert(self.items.len() - 1)
                }
            };
            let builder = &mut self.items[slot];

            for line in &monitor.lines {
                match rule.select_line(line) {
                    LineSelection::Accepted { title } => builder.merge_line(line, title, limit),
                    LineSelection::Rejected => {}
                }
            }

            builder.refresh_traffic(monitor);
        }
    }

    fn finish(self) -> Vec<BoardItem> {
        self.items.into_iter().map(ItemBuilder::finish).collect()
    }
}

/// Build a board document.
///
/// * `board_id` - Id the document is reported under
/// * `spec` - The board's specification; `None` yields an empty document
/// * `snapshots` - Current snapshots, in the order they should be scanned
/// * `generated_at` - Unix timestamp stamped on the document
pub fn build_board<'s>(
    board_id: &str,
    spec: Option<&BoardSpec>,
    snapshots: impl IntoIterator<Item = &'s Snapshot>,
    generated_at: i64,
) -> BoardDocument {
    let Some(spec) = spec else {
        return BoardDocument::empty(board_id, generated_at);
    };

    let mut aggregation = Aggregation::new(spec);
    let mut monitors_seen = 0usize;
    for snapshot in snapshots {
        for monitor in &snapshot.monitors {
            aggregation.add_monitor(monitor);
            monitors_seen += 1;
        }
    }
    let items = aggregation.finish();

    trace!(
        board = board_id,
        monitors = monitors_seen,
        items = items.len(),
        "board built"
    );

    BoardDocument {
        id: board_id.to_string(),
        title: spec
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| board_id.to_string()),
        generated_at,
        max_departures: spec.max_departures,
        items,
    }
}
