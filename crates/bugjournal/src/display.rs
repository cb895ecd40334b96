use chrono::{DateTime, Local, Utc};
use colored::{ColoredString, Colorize};

use crate::record::{BugRecord, Severity};
use crate::suggestion::NO_SUGGESTION;

pub const LIST_PREVIEW_CHARS: usize = 100;
pub const DETAIL_PREVIEW_CHARS: usize = 200;

/// First `max_chars` characters followed by `...`, or the text unchanged if it fits
pub fn preview(text: &str, max_chars: usize) -> String {
  match text.char_indices().nth(max_chars) {
    Some((cut, _)) => format!("{}...", &text[..cut]),
    None => text.to_string(),
  }
}

pub fn format_timestamp(utc_time: DateTime<Utc>) -> String {
  let local_time: DateTime<Local> = utc_time.into();
  local_time.format("%b %d, %Y %H:%M").to_string()
}

fn severity_badge(record: &BugRecord) -> ColoredString {
  let label = format!("[{}]", record.severity);
  match record.severity_level() {
    Some(Severity::High) => label.red().bold(),
    Some(Severity::Medium) => label.yellow(),
    Some(Severity::Low) => label.green(),
    None => label.dimmed(),
  }
}

/// Card shown for a record in the list
pub fn render_row(record: &BugRecord) -> String {
  let mut lines = vec![format!("{} {}", record.title.bold(), severity_badge(record))];
  lines.push(format!("  {}", record.id.as_str().dimmed()));
  if !record.description.trim().is_empty() {
    lines.push(format!("  {}", preview(&record.description, LIST_PREVIEW_CHARS)));
  }
  lines.join("\n")
}

pub fn render_list(records: &[&BugRecord]) -> String {
  records.iter().map(|record| render_row(record)).collect::<Vec<_>>().join("\n\n")
}

pub fn render_empty(name: &str) -> String {
  format!("Hi {name} 👋\nLooks like you haven't reported any bugs yet!")
}

/// Full record; blank fields are left out
pub fn render_detail(record: &BugRecord) -> String {
  let tags = record.tags.join(", ");
  let description = preview(&record.description, DETAIL_PREVIEW_CHARS);
  let reported = format_timestamp(record.timestamp);
  let fields = [
    ("Title", record.title.as_str()),
    ("App", record.app_name.as_deref().unwrap_or("")),
    ("Bug", record.bug.as_str()),
    ("Severity", record.severity.as_str()),
    ("Environment", record.environment.as_str()),
    ("Tags", tags.as_str()),
    ("Steps", record.steps.as_str()),
    ("Resolution", record.resolution.as_str()),
    ("Description", description.as_str()),
    ("Reported", reported.as_str()),
  ];

  let mut out: Vec<String> = fields
    .iter()
    .filter(|(_, value)| !value.trim().is_empty())
    .map(|(label, value)| format!("{}\n  {}", label.dimmed(), value))
    .collect();

  if let Some(suggestion) = &record.ai_suggestion {
    out.push(format!("{}\n{}", "AI Suggestion".bold(), suggestion));
  }
  out.join("\n")
}

pub fn render_suggestion(text: Option<&str>) -> String {
  format!("{}\n{}", "Gemini Suggestion".bold(), text.unwrap_or(NO_SUGGESTION))
}
