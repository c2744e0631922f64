//! Rule matching against monitors and lines.

use crate::domain::{Line, Stop};

use super::spec::{LineRule, PlatformFilter, Rule};

/// Outcome of running a rule's line filters over one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSelection<'a> {
    /// No line rule matched.
    Rejected,
    /// Accepted, with the display title of the matching line rule (if any).
    Accepted { title: Option<&'a str> },
}

/// Whether `line` satisfies a single line rule.
///
/// Absent constraints are always satisfied. A name constraint compares
/// trimmed values exactly; a destination pattern is searched
/// case-insensitively in the trimmed destination. Invalid patterns match
/// nothing.
pub fn line_matches(line: &Line, rule: &LineRule) -> bool {
    if let Some(want) = rule.name.as_deref().map(str::trim)
        && !want.is_empty()
        && line.name_trimmed() != want
    {
        return false;
    }

    if let Some(pattern) = &rule.towards
        && !pattern.is_blank()
        && !pattern.is_match(line.towards_trimmed())
    {
        return false;
    }

    true
}

impl Rule {
    /// Stop-level filter: stop title and (if declared) platform.
    pub fn matches_stop(&self, stop: &Stop) -> bool {
        if let Some(want) = self.stop_filter()
            && want != stop.title_trimmed()
        {
            return false;
        }

        match &self.platform {
            PlatformFilter::Any => true,
            PlatformFilter::Exactly(want) => want.as_deref() == stop.platform(),
        }
    }

    /// Run the line filters in declared order; the first match wins.
    ///
    /// A rule without line filters accepts every line with no title override.
    pub fn select_line(&self, line: &Line) -> LineSelection<'_> {
        if self.lines.is_empty() {
            return LineSelection::Accepted { title: None };
        }

        self.lines
            .iter()
            .find(|lr| line_matches(line, lr))
            .map(|lr| LineSelection::Accepted {
                title: lr.title.as_deref().map(str::trim).filter(|t| !t.is_empty()),
            })
            .unwrap_or(LineSelection::Rejected)
    }
}
