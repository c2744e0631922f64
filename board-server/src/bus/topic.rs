//! Topic names and subscription filters.

use std::fmt;

use super::error::BusError;

/// Replace every character outside `[A-Za-z0-9_.-]` with `_`.
///
/// Surrounding whitespace is removed first.
pub fn safe_topic_fragment(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A concrete topic must be non-empty and free of wildcards.
pub(crate) fn validate_topic(topic: &str) -> Result<(), BusError> {
    if topic.is_empty() || topic.contains(['+', '#']) {
        return Err(BusError::InvalidTopic {
            topic: topic.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Level {
    Exact(String),
    /// `+`: exactly one level.
    Single,
    /// `#`: this level and everything below, including nothing.
    Rest,
}

/// Subscription filter with `+` and `#` wildcards.
#[derive(Clone, PartialEq, Eq)]
pub struct TopicFilter {
    source: String,
    levels: Vec<Level>,
}

impl TopicFilter {
    pub fn new(filter: &str) -> Result<Self, BusError> {
        let invalid = |reason| BusError::InvalidFilter {
            filter: filter.to_string(),
            reason,
        };

        if filter.is_empty() {
            return Err(invalid("empty filter"));
        }

        let parts: Vec<&str> = filter.split('/').collect();
        let mut levels = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let level = match *part {
                "+" => Level::Single,
                "#" if i + 1 == parts.len() => Level::Rest,
                "#" => return Err(invalid("'#' must be the last level")),
                p if p.contains(['+', '#']) => {
                    return Err(invalid("wildcards must occupy a whole level"));
                }
                p => Level::Exact(p.to_string()),
            };
            levels.push(level);
        }

        Ok(Self {
            source: filter.to_string(),
            levels,
        })
    }

    /// Filter matching every topic.
    pub fn all() -> Self {
        Self {
            source: "#".to_string(),
            levels: vec![Level::Rest],
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, topic: &str) -> bool {
        let mut parts = topic.split('/');
        for level in &self.levels {
            match level {
                Level::Rest => return true,
                Level::Single => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Level::Exact(want) => match parts.next() {
                    Some(part) if part == want => {}
                    _ => return false,
                },
            }
        }
        parts.next().is_none()
    }
}

impl fmt::Debug for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicFilter({:?})", self.source)
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
