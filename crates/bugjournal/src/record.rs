use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{JournalError, JournalResult};
use crate::store::{Document, Fields};

/// Schema version written with every new record
pub const SCHEMA_VERSION: u32 = 2;

/// Stored field holding the cached AI suggestion
pub const SUGGESTION_FIELD: &str = "geminiSuggestion";

/// Default cap applied to free-text fields at input time
pub const DEFAULT_WORD_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
  Low,
  Medium,
  High,
}

impl Severity {
  pub const ALL: [Severity; 3] = [Severity::Low, Severity::Medium, Severity::High];

  pub fn as_str(&self) -> &'static str {
    match self {
      Severity::Low => "Low",
      Severity::Medium => "Medium",
      Severity::High => "High",
    }
  }
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Severity {
  type Err = JournalError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let trimmed = s.trim();
    Severity::ALL
      .into_iter()
      .find(|level| level.as_str().eq_ignore_ascii_case(trimmed))
      .ok_or_else(|| {
        JournalError::validation(format!("Unknown severity '{trimmed}' (expected Low, Medium or High)"))
      })
  }
}

/// Identifier assigned by the document store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for RecordId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for RecordId {
  fn from(id: &str) -> Self {
    Self::new(id)
  }
}

impl From<String> for RecordId {
  fn from(id: String) -> Self {
    Self(id)
  }
}

/// A bug report as read back from a principal's collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BugRecord {
  pub id: RecordId,
  pub schema_version: u32,
  pub title: String,
  pub app_name: Option<String>,
  pub bug: String,
  /// Raw stored severity; see `severity_level` for the parsed form
  pub severity: String,
  pub description: String,
  pub environment: String,
  pub steps: String,
  pub resolution: String,
  pub tags: Vec<String>,
  pub timestamp: DateTime<Utc>,
  pub ai_suggestion: Option<String>,
}

impl BugRecord {
  /// Decode a stored document, defaulting anything missing or mistyped.
  ///
  /// Older rows used `appname` or `projectName` for the project, stored tags as a
  /// comma-separated string and carried no schema version; all of these decode.
  pub fn from_document(document: &Document) -> Self {
    let fields = &document.fields;
    Self {
      id: RecordId::new(document.id.clone()),
      schema_version: fields
        .get("schemaVersion")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(1),
      title: text(fields, &["title"]).unwrap_or_default(),
      app_name: text(fields, &["appName", "appname", "projectName"]).filter(|s| !s.trim().is_empty()),
      bug: text(fields, &["bug"]).unwrap_or_default(),
      severity: text(fields, &["severity"]).unwrap_or_default(),
      description: text(fields, &["description"]).unwrap_or_default(),
      environment: text(fields, &["environment"]).unwrap_or_default(),
      steps: text(fields, &["steps"]).unwrap_or_default(),
      resolution: text(fields, &["resolution"]).unwrap_or_default(),
      tags: fields.get("tags").map(tags_from_value).unwrap_or_default(),
      timestamp: fields.get("timestamp").and_then(timestamp_from_value).unwrap_or_default(),
      ai_suggestion: text(fields, &[SUGGESTION_FIELD, "aiSuggestion"]).filter(|s| !s.is_empty()),
    }
  }

  pub fn severity_level(&self) -> Option<Severity> {
    self.severity.parse().ok()
  }

  pub fn has_suggestion(&self) -> bool {
    self.ai_suggestion.is_some()
  }
}

fn text(fields: &Fields, keys: &[&str]) -> Option<String> {
  keys.iter().find_map(|key| match fields.get(*key)? {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  })
}

fn tags_from_value(value: &Value) -> Vec<String> {
  match value {
    Value::Array(items) => items
      .iter()
      .filter_map(|item| item.as_str())
      .map(|tag| tag.trim().to_string())
      .filter(|tag| !tag.is_empty())
      .collect(),
    Value::String(joined) => parse_tags(joined),
    _ => Vec::new(),
  }
}

fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
  match value {
    Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
    Value::String(s) => {
      if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
        return Some(parsed.with_timezone(&Utc));
      }
      s.trim().parse::<i64>().ok()
    }
    _ => None,
  }
  .and_then(DateTime::from_timestamp_millis)
}

/// Which fields must be non-blank before a record is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationProfile {
  Relaxed,
  #[default]
  Standard,
  Strict,
}

impl ValidationProfile {
  pub fn required_fields(&self) -> &'static [&'static str] {
    match self {
      ValidationProfile::Relaxed => &["title"],
      ValidationProfile::Standard => {
        &["title", "bug", "description", "environment", "steps", "resolution"]
      }
      ValidationProfile::Strict => {
        &["title", "app name", "bug", "description", "environment", "steps", "resolution"]
      }
    }
  }
}

/// User input for a new bug report
#[derive(Debug, Clone, PartialEq)]
pub struct BugDraft {
  pub title: String,
  pub app_name: Option<String>,
  pub bug: String,
  pub severity: Severity,
  pub description: String,
  pub environment: String,
  pub steps: String,
  pub resolution: String,
  pub tags: Vec<String>,
}

impl Default for BugDraft {
  fn default() -> Self {
    Self {
      title: String::new(),
      app_name: None,
      bug: String::new(),
      severity: Severity::Low,
      description: String::new(),
      environment: String::new(),
      steps: String::new(),
      resolution: String::new(),
      tags: Vec::new(),
    }
  }
}

impl BugDraft {
  fn field(&self, name: &str) -> &str {
    match name {
      "title" => &self.title,
      "app name" => self.app_name.as_deref().unwrap_or(""),
      "bug" => &self.bug,
      "description" => &self.description,
      "environment" => &self.environment,
      "steps" => &self.steps,
      "resolution" => &self.resolution,
      _ => "",
    }
  }

  /// Names of required fields left blank under the given profile
  pub fn missing_fields(&self, profile: ValidationProfile) -> Vec<&'static str> {
    profile.required_fields().iter().copied().filter(|name| self.field(name).trim().is_empty()).collect()
  }

  pub fn validate(&self, profile: ValidationProfile) -> JournalResult<()> {
    let missing = self.missing_fields(profile);
    if missing.is_empty() {
      Ok(())
    } else {
      Err(JournalError::validation(format!(
        "Please fill in all required fields (missing: {})",
        missing.join(", ")
      )))
    }
  }

  /// Cap the long-form fields to `max_words` words each
  pub fn apply_word_limit(&mut self, max_words: usize) {
    for field in [&mut self.description, &mut self.environment, &mut self.steps, &mut self.resolution] {
      *field = limit_words(field, max_words);
    }
  }

  pub fn to_fields(&self, timestamp: DateTime<Utc>) -> Fields {
    let mut fields = Fields::new();
    fields.insert("schemaVersion".into(), SCHEMA_VERSION.into());
    fields.insert("title".into(), self.title.trim().into());
    if let Some(app_name) = self.app_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
      fields.insert("appName".into(), app_name.into());
    }
    fields.insert("bug".into(), self.bug.clone().into());
    fields.insert("severity".into(), self.severity.as_str().into());
    fields.insert("description".into(), self.description.clone().into());
    fields.insert("environment".into(), self.environment.clone().into());
    fields.insert("steps".into(), self.steps.clone().into());
    fields.insert("resolution".into(), self.resolution.clone().into());
    fields.insert("tags".into(), self.tags.clone().into());
    fields.insert("timestamp".into(), timestamp.timestamp_millis().into());
    fields
  }
}

/// Keep at most `max_words` whitespace-separated words; shorter input is returned untouched
pub fn limit_words(input: &str, max_words: usize) -> String {
  let words: Vec<&str> = input.split_whitespace().collect();
  if words.len() <= max_words {
    input.to_string()
  } else {
    words[..max_words].join(" ")
  }
}

/// Split a comma-separated tag list, trimming entries and dropping empty ones
pub fn parse_tags(input: &str) -> Vec<String> {
  input.split(',').map(str::trim).filter(|tag| !tag.is_empty()).map(String::from).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn document(id: &str, fields: Value) -> Document {
    let Value::Object(fields) = fields else { panic!("fields must be an object") };
    Document { id: id.to_string(), fields }
  }

  fn complete_draft() -> BugDraft {
    BugDraft {
      title: "Crash on launch".into(),
      app_name: Some("Journal".into()),
      bug: "App closes".into(),
      severity: Severity::High,
      description: "Opening the app crashes it".into(),
      environment: "Pixel 7, Android 14".into(),
      steps: "Open the app".into(),
      resolution: "None yet".into(),
      tags: vec!["startup".into()],
    }
  }

  #[test]
  fn test_severity_parses_case_insensitively() {
    assert_eq!("high".parse::<Severity>().unwrap(), Severity::High);
    assert_eq!(" MEDIUM ".parse::<Severity>().unwrap(), Severity::Medium);
    assert!("critical".parse::<Severity>().unwrap_err().is_validation());
  }

  #[test]
  fn test_decode_current_schema() {
    let doc = document(
      "b1",
      json!({
        "schemaVersion": 2,
        "title": "Crash on launch",
        "appName": "Journal",
        "bug": "App closes",
        "severity": "High",
        "description": "d",
        "environment": "e",
        "steps": "s",
        "resolution": "r",
        "tags": ["startup", "android"],
        "timestamp": 1_700_000_000_000i64,
        "geminiSuggestion": "Check the manifest"
      }),
    );

    let record = BugRecord::from_document(&doc);
    assert_eq!(record.id, RecordId::from("b1"));
    assert_eq!(record.schema_version, 2);
    assert_eq!(record.app_name.as_deref(), Some("Journal"));
    assert_eq!(record.severity_level(), Some(Severity::High));
    assert_eq!(record.tags, vec!["startup", "android"]);
    assert_eq!(record.timestamp.timestamp_millis(), 1_700_000_000_000);
    assert_eq!(record.ai_suggestion.as_deref(), Some("Check the manifest"));
  }

  #[test]
  fn test_decode_legacy_rows_with_missing_and_renamed_fields() {
    let doc = document(
      "old",
      json!({
        "id": "",
        "title": "Typo",
        "appname": "Legacy App",
        "severity": "low",
        "tags": "ui, copy ,, ",
        "timestamp": "1690000000000"
      }),
    );

    let record = BugRecord::from_document(&doc);
    assert_eq!(record.id.as_str(), "old");
    assert_eq!(record.schema_version, 1);
    assert_eq!(record.app_name.as_deref(), Some("Legacy App"));
    assert_eq!(record.tags, vec!["ui", "copy"]);
    assert_eq!(record.timestamp.timestamp_millis(), 1_690_000_000_000);
    assert_eq!(record.description, "");
    assert!(record.ai_suggestion.is_none());
  }

  #[test]
  fn test_decode_tolerates_wrong_types() {
    let doc = document(
      "x",
      json!({
        "title": null,
        "projectName": "",
        "severity": 3,
        "tags": [1, "ok", null],
        "timestamp": {"seconds": 1}
      }),
    );

    let record = BugRecord::from_document(&doc);
    assert_eq!(record.title, "");
    assert!(record.app_name.is_none());
    assert_eq!(record.severity, "3");
    assert!(record.severity_level().is_none());
    assert_eq!(record.tags, vec!["ok"]);
    assert_eq!(record.timestamp.timestamp_millis(), 0);
  }

  #[test]
  fn test_standard_profile_rejects_blank_description() {
    let mut draft = complete_draft();
    draft.description = "   ".into();

    let error = draft.validate(ValidationProfile::Standard).unwrap_err();
    assert!(error.is_validation());
    assert!(error.to_string().contains("description"));
  }

  #[test]
  fn test_profiles_differ_on_app_name() {
    let mut draft = complete_draft();
    draft.app_name = None;

    assert!(draft.validate(ValidationProfile::Standard).is_ok());
    assert_eq!(draft.missing_fields(ValidationProfile::Strict), vec!["app name"]);
  }

  #[test]
  fn test_relaxed_profile_only_needs_title() {
    let draft = BugDraft { title: "Only a title".into(), ..BugDraft::default() };
    assert!(draft.validate(ValidationProfile::Relaxed).is_ok());
    assert!(draft.validate(ValidationProfile::Standard).is_err());
  }

  #[test]
  fn test_limit_words() {
    assert_eq!(limit_words("one  two three", 5), "one  two three");
    assert_eq!(limit_words("one two three four", 2), "one two");
    assert_eq!(limit_words("", 2), "");
  }

  #[test]
  fn test_apply_word_limit_leaves_title_alone() {
    let mut draft = complete_draft();
    draft.title = "a b c d".into();
    draft.steps = "a b c d".into();
    draft.apply_word_limit(2);

    assert_eq!(draft.title, "a b c d");
    assert_eq!(draft.steps, "a b");
  }

  #[test]
  fn test_to_fields_writes_versioned_schema() {
    let draft = complete_draft();
    let timestamp = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
    let fields = draft.to_fields(timestamp);

    assert_eq!(fields["schemaVersion"], json!(SCHEMA_VERSION));
    assert_eq!(fields["severity"], json!("High"));
    assert_eq!(fields["tags"], json!(["startup"]));
    assert_eq!(fields["timestamp"], json!(1_700_000_000_000i64));
    assert!(!fields.contains_key(SUGGESTION_FIELD));

    let record = BugRecord::from_document(&Document { id: "new".into(), fields });
    assert_eq!(record.title, draft.title);
    assert_eq!(record.app_name, draft.app_name);
  }
}
