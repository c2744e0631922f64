//! Wiener Linien realtime monitor client.
//!
//! Polls the OGD `monitor` endpoint for a configured set of stop (RBL) and
//! DIVA ids and normalizes the responses into [`Snapshot`]s.
//!
//! Key characteristics of the upstream API:
//! - One request per stop or DIVA id; a DIVA id covers every platform of a
//!   station and yields several monitors
//! - Countdowns are whole minutes; `timePlanned`/`timeReal` are ISO 8601
//! - Lists are frequently `null` instead of empty
//!
//! [`Snapshot`]: crate::domain::Snapshot

mod client;
mod convert;
mod error;
mod query;
mod types;

pub use client::{FetchOutcome, MonitorSource, WienClient, WienConfig};
pub use convert::convert_response;
pub use error::WienError;
pub use query::{WienQuery, build_queries};
pub use types::{
    DepartureDto, DepartureTime, DeparturesDto, LineDto, LocationStop, MonitorData, MonitorDto,
    MonitorResponse, StopAttributes, StopProperties,
};
