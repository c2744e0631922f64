//! Curated departure boards.
//!
//! A board is a named, rule-driven view over the snapshot store. Rules pick
//! monitors by stop (and optionally platform) and lines by name and
//! destination; the aggregator groups matches into items with merged,
//! deduplicated departure lists.

mod aggregate;
mod departures;
mod document;
mod matcher;
mod registry;
mod service;
mod spec;


pub use aggregate::build_board;
pub use departures::{COUNTDOWN_SEPARATOR, countdown_text, normalize};
pub use document::{BoardDocument, BoardItem, BoardLine};
pub use matcher::{LineSelection, line_matches};
pub use registry::BoardRegistry;
pub use service::BoardService;
pub use spec::{BoardSpec, LineRule, PlatformFilter, Rule, TowardsPattern};
