//! Domain types for realtime monitor data.
//!
//! A [`Snapshot`] is what one upstream query returns: a list of monitors,
//! each describing one stop or platform with its lines and predicted
//! departures.

mod countdown;
mod snapshot;

pub use countdown::Countdown;
pub use snapshot::{Departure, Line, Monitor, Snapshot, Stop};
