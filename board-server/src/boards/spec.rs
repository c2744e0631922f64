//! Board specifications as configured.
//!
//! A board is a titled, ordered list of rules. Config files are written by
//! hand, so deserialization is forgiving: entries that are not tables are
//! skipped, an empty rule is skipped, and a malformed `towards_regex`
//! produces a pattern that matches nothing rather than a load error.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};
use tracing::warn;

/// One board: `title`, default departure limit and ordered rules.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardSpec {
    #[serde(default)]
    pub title: Option<String>,

    /// Departures per line; `0` means unlimited.
    #[serde(
        default,
        alias = "maxDepartures",
        alias = "defaultMaxDepartures",
        deserialize_with = "crate::config::de::number"
    )]
    pub max_departures: u32,

    #[serde(default, deserialize_with = "skip_invalid_rules")]
    pub rules: Vec<Rule>,
}

/// Selects monitors (by stop and platform) and lines into one board item.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Rule {
    /// Exact stop title; empty or absent matches every stop.
    #[serde(default)]
    pub stop: Option<String>,

    #[serde(default, deserialize_with = "declared_platform")]
    pub platform: PlatformFilter,

    /// Display title of the item; defaults to the stop title.
    #[serde(default)]
    pub title: Option<String>,

    /// Overrides the board default when set and non-zero.
    #[serde(
        default,
        alias = "maxDepartures",
        deserialize_with = "crate::config::de::optional_number"
    )]
    pub max_departures: Option<u32>,

    /// Line filters in priority order; empty accepts every line.
    #[serde(default, deserialize_with = "skip_invalid_line_rules")]
    pub lines: Vec<LineRule>,
}

impl Rule {
    /// True for a rule with nothing in it (`- {}` in a config list).
    fn is_empty(&self) -> bool {
        self.stop.is_none()
            && self.platform == PlatformFilter::Any
            && self.title.is_none()
            && self.max_departures.is_none()
            && self.lines.is_empty()
    }

    /// The stop filter, trimmed; `None` when the rule accepts any stop.
    pub fn stop_filter(&self) -> Option<&str> {
        self.stop.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Effective departure limit given the board default.
    pub fn limit(&self, board_default: u32) -> u32 {
        match self.max_departures {
            Some(n) if n > 0 => n,
            _ => board_default,
        }
    }
}

/// Platform constraint of a rule.
///
/// Declaring the `platform` key at all constrains the rule, even with an
/// empty value: `platform = ""` only matches monitors without a platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PlatformFilter {
    #[default]
    Any,
    Exactly(Option<String>),
}

impl PlatformFilter {
    pub fn is_declared(&self) -> bool {
        matches!(self, PlatformFilter::Exactly(_))
    }
}

/// A line filter inside a rule.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LineRule {
    /// Exact line name, compared trimmed.
    #[serde(default)]
    pub name: Option<String>,

    /// Case-insensitive pattern searched in the line's destination.
    #[serde(default, rename = "towards_regex", alias = "towardsRegex")]
    pub towards: Option<TowardsPattern>,

    /// Display title for matched lines.
    #[serde(default)]
    pub title: Option<String>,
}

/// A compiled `towards_regex`.
///
/// Invalid patterns are kept (so they can be reported) but never match.
#[derive(Clone)]
pub struct TowardsPattern {
    source: String,
    regex: Option<Regex>,
}

impl TowardsPattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let regex = match RegexBuilder::new(&source).case_insensitive(true).build() {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(pattern = %source, error = %e, "invalid towards_regex; rule will match nothing");
                None
            }
        };
        Self { source, regex }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_valid(&self) -> bool {
        self.regex.is_some()
    }

    /// Search (not full-match) semantics.
    pub fn is_match(&self, haystack: &str) -> bool {
        self.regex.as_ref().is_some_and(|r| r.is_match(haystack))
    }

    /// An empty pattern imposes no constraint.
    pub fn is_blank(&self) -> bool {
        self.source.is_empty()
    }
}

impl fmt::Debug for TowardsPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TowardsPattern({:?})", self.source)
    }
}

impl<'de> Deserialize<'de> for TowardsPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Ok(TowardsPattern::new(source))
    }
}

/// Called only when the `platform` key is present.
fn declared_platform<'de, D>(deserializer: D) -> Result<PlatformFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(PlatformFilter::Exactly(value.filter(|p| !p.is_empty())))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Entry<T> {
    Valid(T),
    Invalid(IgnoredAny),
}

fn skip_invalid_rules<'de, D>(deserializer: D) -> Result<Vec<Rule>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Option::<Vec<Entry<Rule>>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry {
            Entry::Valid(rule) if !rule.is_empty() => Some(rule),
            _ => None,
        })
        .collect())
}

fn skip_invalid_line_rules<'de, D>(deserializer: D) -> Result<Vec<LineRule>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Option::<Vec<Entry<LineRule>>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry {
            Entry::Valid(rule) => Some(rule),
            Entry::Invalid(_) => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_board_from_toml() {
        let spec: BoardSpec = toml::from_str(
            r#"
            title = "Vorzimmer"
            max_departures = 3

            [[rules]]
            stop = "Josef-Baumann-Gasse"
            title = "JB (Süd)"
            lines = [
              { name = "25", towards_regex = "Floridsdorf\\s*U", title = "Floridsdorf" },
              { name = "26", towards_regex = "Hausfeldstraße\\s*U", title = "Hausfeldstraße" },
            ]

            [[rules]]
            stop = "Prandaugasse"
            platform = "2"
            max_departures = 5
            "#,
        )
        .unwrap();

        assert_eq!(spec.title.as_deref(), Some("Vorzimmer"));
        assert_eq!(spec.max_departures, 3);
        assert_eq!(spec.rules.len(), 2);

        let first = &spec.rules[0];
        assert_eq!(first.stop_filter(), Some("Josef-Baumann-Gasse"));
        assert_eq!(first.platform, PlatformFilter::Any);
        assert_eq!(first.lines.len(), 2);
        assert!(first.lines[0].towards.as_ref().unwrap().is_match("floridsdorf u"));
        assert_eq!(first.limit(spec.max_departures), 3);

        let second = &spec.rules[1];
        assert_eq!(second.platform, PlatformFilter::Exactly(Some("2".into())));
        assert_eq!(second.limit(spec.max_departures), 5);
    }

    #[test]
    fn empty_platform_still_constrains() {
        let rule: Rule = serde_json::from_value(json!({"stop": "A", "platform": ""})).unwrap();
        assert_eq!(rule.platform, PlatformFilter::Exactly(None));

        let rule: Rule = serde_json::from_value(json!({"stop": "A", "platform": null})).unwrap();
        assert_eq!(rule.platform, PlatformFilter::Exactly(None));

        let rule: Rule = serde_json::from_value(json!({"stop": "A"})).unwrap();
        assert_eq!(rule.platform, PlatformFilter::Any);
    }

    #[test]
    fn skips_null_and_empty_rule_entries() {
        let spec: BoardSpec = serde_json::from_value(json!({
            "rules": [null, {}, "junk", 4, {"stop": "A"}, {"lines": [null, {"name": "1"}]}]
        }))
        .unwrap();

        assert_eq!(spec.rules.len(), 2);
        assert_eq!(spec.rules[0].stop_filter(), Some("A"));
        assert_eq!(spec.rules[1].lines.len(), 1);
    }

    #[test]
    fn null_rules_list_is_empty() {
        let spec: BoardSpec = serde_json::from_value(json!({"title": "T", "rules": null})).unwrap();
        assert!(spec.rules.is_empty());
    }

    #[test]
    fn zero_rule_limit_falls_back_to_board_default() {
        let rule = Rule {
            max_departures: Some(0),
            ..Rule::default()
        };
        assert_eq!(rule.limit(4), 4);
        assert_eq!(Rule::default().limit(0), 0);
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let spec: BoardSpec = serde_json::from_value(json!({
            "maxDepartures": "4",
            "rules": [{"stop": "A", "max_departures": "2"}]
        }))
        .unwrap();
        assert_eq!(spec.max_departures, 4);
        assert_eq!(spec.rules[0].max_departures, Some(2));
    }

    #[test]
    fn invalid_pattern_matches_nothing() {
        let pattern = TowardsPattern::new("Floridsdorf(");
        assert!(!pattern.is_valid());
        assert!(!pattern.is_match("Floridsdorf("));
        assert!(!pattern.is_match(""));
    }

    #[test]
    fn pattern_uses_search_semantics() {
        let pattern = TowardsPattern::new("dorf");
        assert!(pattern.is_match("Floridsdorf U"));
        assert!(TowardsPattern::new("^U").is_match("U Floridsdorf"));
        assert!(!TowardsPattern::new("^U").is_match("Floridsdorf U"));
    }

    #[test]
    fn accepts_camel_case_keys() {
        let rule: LineRule =
            serde_json::from_value(json!({"name": "25", "towardsRegex": "x"})).unwrap();
        assert_eq!(rule.towards.unwrap().as_str(), "x");
    }
}
