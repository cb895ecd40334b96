//! Visible-subset computation for the record list.
//!
//! A record is shown when it passes both the severity selector and the
//! free-text query. The query matches any tag or the title, ignoring case.
//! Input order is kept and nothing is copied.

use std::fmt;
use std::str::FromStr;

use crate::error::JournalError;
use crate::record::{BugRecord, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeverityFilter {
  #[default]
  All,
  Only(Severity),
}

impl SeverityFilter {
  pub fn matches(&self, record: &BugRecord) -> bool {
    match self {
      SeverityFilter::All => true,
      SeverityFilter::Only(level) => record.severity.trim().eq_ignore_ascii_case(level.as_str()),
    }
  }
}

impl fmt::Display for SeverityFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SeverityFilter::All => f.write_str("All"),
      SeverityFilter::Only(level) => write!(f, "{level}"),
    }
  }
}

impl FromStr for SeverityFilter {
  type Err = JournalError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.trim().eq_ignore_ascii_case("all") {
      return Ok(SeverityFilter::All);
    }
    s.parse().map(SeverityFilter::Only)
  }
}

impl From<Severity> for SeverityFilter {
  fn from(level: Severity) -> Self {
    SeverityFilter::Only(level)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterState {
  pub severity: SeverityFilter,
  pub query: String,
}

impl FilterState {
  pub fn new(severity: SeverityFilter, query: impl Into<String>) -> Self {
    Self { severity, query: query.into() }
  }

  pub fn is_unfiltered(&self) -> bool {
    self.severity == SeverityFilter::All && self.query.trim().is_empty()
  }

  /// Both predicates must hold
  pub fn matches(&self, record: &BugRecord) -> bool {
    self.severity.matches(record) && matches_query(record, &self.query)
  }
}

fn matches_query(record: &BugRecord, query: &str) -> bool {
  if query.trim().is_empty() {
    return true;
  }
  let needle = query.to_lowercase();
  record.tags.iter().any(|tag| tag.to_lowercase().contains(&needle)) || record.title.to_lowercase().contains(&needle)
}

pub fn filter_records<'a>(records: &'a [BugRecord], state: &FilterState) -> Vec<&'a BugRecord> {
  records.iter().filter(|record| state.matches(record)).collect()
}
