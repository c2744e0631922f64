//! Minutes-until-departure values.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Minutes until a predicted departure.
///
/// The upstream feed sends integers, but fractional values are accepted
/// too. Integral values serialize without a decimal point so that
/// `4` stays `4` on the way out.
#[derive(Clone, Copy, PartialEq)]
pub struct Countdown(f64);

impl Countdown {
    /// Wrap a finite minute value. Returns `None` for NaN or infinities.
    pub fn new(minutes: f64) -> Option<Self> {
        minutes.is_finite().then_some(Countdown(minutes))
    }

    /// Interpret a JSON value as a countdown.
    ///
    /// Only JSON numbers qualify; strings, booleans and nulls do not.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        value.as_f64().and_then(Self::new)
    }

    pub fn minutes(self) -> f64 {
        self.0
    }

    /// Whole minutes, truncated toward zero.
    pub fn whole_minutes(self) -> i64 {
        self.0.trunc() as i64
    }

    fn is_integral(self) -> bool {
        self.0.fract() == 0.0 && self.0.abs() < i64::MAX as f64
    }

    /// Total ordering used for sorting departures.
    pub fn cmp_minutes(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Debug for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Countdown({self})")
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_integral() {
            write!(f, "{}", self.0 as i64)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Serialize for Countdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_integral() {
            serializer.serialize_i64(self.0 as i64)
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

/// Deserialize an optional countdown, mapping anything non-numeric to `None`.
///
/// A departure without a numeric countdown is invalid, but the snapshot
/// carrying it must still load; the normalizer drops it later.
pub(crate) fn lenient_countdown<'de, D>(deserializer: D) -> Result<Option<Countdown>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Countdown::from_json))
}
