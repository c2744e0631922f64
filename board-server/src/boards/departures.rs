//! Departure deduplication, ordering and limiting.

use std::collections::HashSet;

use crate::domain::{Countdown, Departure};

/// Separator used by [`countdown_text`].
pub const COUNTDOWN_SEPARATOR: &str = " / ";

/// Identity of a departure: `(timeReal, timePlanned, countdown)`.
type DepartureKey = (String, String, String);

fn departure_key(departure: &Departure, countdown: Countdown) -> DepartureKey {
    (
        departure.time_real.clone().unwrap_or_default(),
        departure.time_planned.clone().unwrap_or_default(),
        countdown.to_string(),
    )
}

/// Canonicalize a list of departures.
///
/// 1. Entries without a numeric countdown are dropped.
/// 2. Duplicates by `(timeReal, timePlanned, countdown)` are dropped; the
///    first occurrence survives.
/// 3. The rest is stably sorted by countdown, ascending.
/// 4. If `limit > 0`, only the first `limit` entries are kept.
pub fn normalize(departures: impl IntoIterator<Item = Departure>, limit: u32) -> Vec<Departure> {
    let mut seen: HashSet<DepartureKey> = HashSet::new();

    let mut out: Vec<(Countdown, Departure)> = departures
        .into_iter()
        .filter_map(|d| d.countdown.map(|cd| (cd, d)))
        .filter(|(cd, d)| seen.insert(departure_key(d, *cd)))
        .collect();

    out.sort_by(|(a, _), (b, _)| a.cmp_minutes(b));

    if limit > 0 {
        out.truncate(limit as usize);
    }

    out.into_iter().map(|(_, d)| d).collect()
}

/// Human-readable summary such as `"4 / 9 / 12"`.
pub fn countdown_text(departures: &[Departure]) -> String {
    departures
        .iter()
        .filter_map(|d| d.countdown)
        .map(|cd| cd.to_string())
        .collect::<Vec<_>>()
        .join(COUNTDOWN_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(cd: f64) -> Departure {
        Departure::in_minutes(cd)
    }

    fn dep_at(cd: f64, planned: &str, real: Option<&str>) -> Departure {
        Departure {
            countdown: Countdown::new(cd),
            time_planned: Some(planned.to_string()),
            time_real: real.map(String::from),
        }
    }

    fn minutes(deps: &[Departure]) -> Vec<f64> {
        deps.iter().map(|d| d.countdown.unwrap().minutes()).collect()
    }

    #[test]
    fn drops_duplicates_and_sorts() {
        let out = normalize(vec![dep(9.0), dep(4.0), dep(4.0)], 0);
        assert_eq!(minutes(&out), vec![4.0, 9.0]);
    }

    #[test]
    fn drops_entries_without_countdown() {
        let out = normalize(vec![Departure::default(), dep(3.0)], 0);
        assert_eq!(minutes(&out), vec![3.0]);
    }

    #[test]
    fn equal_countdown_with_different_times_are_distinct() {
        let out = normalize(
            vec![
                dep_at(5.0, "10:00", Some("10:05")),
                dep_at(5.0, "10:01", Some("10:05")),
            ],
            0,
        );
        assert_eq!(out.len(), 2);
        // Stable: first survivor first.
        assert_eq!(out[0].time_planned.as_deref(), Some("10:00"));
    }

    #[test]
    fn null_and_empty_times_are_the_same_key() {
        let a = Departure {
            countdown: Countdown::new(2.0),
            time_planned: None,
            time_real: Some(String::new()),
        };
        let b = dep(2.0);
        assert_eq!(normalize(vec![a, b], 0).len(), 1);
    }

    #[test]
    fn first_occurrence_wins() {
        let first = Departure {
            countdown: Countdown::new(2.0),
            time_planned: Some("p".into()),
            time_real: Some("r".into()),
        };
        let mut second = first.clone();
        second.time_real = Some("r".into());
        let out = normalize(vec![first.clone(), second], 0);
        assert_eq!(out, vec![first]);
    }

    #[test]
    fn applies_limit() {
        let out = normalize((1..=6).rev().map(|m| dep(m as f64)), 3);
        assert_eq!(minutes(&out), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn zero_limit_keeps_everything() {
        let out = normalize((0..20).map(|m| dep(m as f64)), 0);
        assert_eq!(out.len(), 20);
    }

    #[test]
    fn fractional_countdowns_sort_numerically() {
        let out = normalize(vec![dep(10.0), dep(2.5), dep(9.75)], 0);
        assert_eq!(minutes(&out), vec![2.5, 9.75, 10.0]);
    }

    #[test]
    fn countdown_text_renders_integral_without_decimal() {
        let deps = vec![dep(4.0), dep(9.0), dep(12.5)];
        assert_eq!(countdown_text(&deps), "4 / 9 / 12.5");
        assert_eq!(countdown_text(&[]), "");
    }
}
