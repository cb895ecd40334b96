//! AI suggestions for a bug record
//!
//! The generator is a plain text-in, text-out seam. Callers go through
//! [`suggest_for`], which never fails: any problem becomes placeholder text
//! that is shown in place of a suggestion.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GeminiConfig;
use crate::error::JournalError;
use crate::record::BugRecord;

pub const EMPTY_RESPONSE: &str = "Empty response from Gemini.";
pub const NO_SUGGESTION: &str = "No suggestion available.";

/// Text generation collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SuggestionGenerator: Send + Sync {
  /// Generate a reply to `prompt`; `None` when the model returned no text
  async fn generate(&self, prompt: &str) -> Result<Option<String>>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
  contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
  parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
  text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
  content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
  #[serde(default)]
  parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
  text: Option<String>,
}

impl GenerateResponse {
  /// Concatenated text of the first candidate
  fn text(self) -> Option<String> {
    let content = self.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|part| part.text).collect();
    Some(text).filter(|t| !t.trim().is_empty())
  }
}

/// Gemini `generateContent` over REST
pub struct GeminiClient {
  client: Client,
  config: GeminiConfig,
}

impl GeminiClient {
  pub fn new(config: GeminiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .context("Failed to create HTTP client")?;
    Ok(Self { client, config })
  }

  fn endpoint(&self) -> String {
    format!("{}/models/{}:generateContent", self.config.base_url.trim_end_matches('/'), self.config.model)
  }
}

#[async_trait]
impl SuggestionGenerator for GeminiClient {
  async fn generate(&self, prompt: &str) -> Result<Option<String>> {
    if self.config.api_key.trim().is_empty() {
      return Err(anyhow!("Gemini API key is not configured"));
    }

    let request = GenerateRequest { contents: vec![Content { parts: vec![RequestPart { text: prompt }] }] };
    tracing::debug!(model = %self.config.model, "requesting suggestion");
    let response = self
      .client
      .post(self.endpoint())
      .query(&[("key", self.config.api_key.as_str())])
      .json(&request)
      .send()
      .await
      .context("Failed to reach Gemini")?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      return Err(anyhow!("{status}: {}", api_error_message(&body).unwrap_or(body)));
    }

    let parsed: GenerateResponse = response.json().await.context("Unexpected Gemini response")?;
    Ok(parsed.text())
  }
}

fn api_error_message(body: &str) -> Option<String> {
  let value: serde_json::Value = serde_json::from_str(body).ok()?;
  value.pointer("/error/message")?.as_str().map(String::from)
}

/// Structured prompt built from every field of the record
pub fn build_prompt(record: &BugRecord) -> String {
  format!(
    "Bug Report:\n\
     Title: {title}\n\
     App: {app}\n\
     Severity: {severity}\n\
     Environment: {environment}\n\
     Steps: {steps}\n\
     Description: {description}\n\
     Tags: {tags}\n\
     Resolution: {resolution}\n\
     \n\
     Please:\n\
     - Summarize the bug.\n\
     - Describe concisely what was expected to happen.\n\
     - Suggest potential fixes or improvements.\n\
     - Include debugging steps or context relevant to fixing it.\n\
     - Suggest improvements to how the bug was written up.\n\
     - Mention debugging steps or context the report is missing.",
    title = record.title,
    app = record.app_name.as_deref().unwrap_or(""),
    severity = record.severity,
    environment = record.environment,
    steps = record.steps,
    description = record.description,
    tags = record.tags.join(", "),
    resolution = record.resolution,
  )
}

/// Ask for a suggestion, keeping the failure typed
pub async fn try_suggest(generator: &dyn SuggestionGenerator, record: &BugRecord) -> Result<String, JournalError> {
  match generator.generate(&build_prompt(record)).await {
    Ok(Some(text)) => Ok(text),
    Ok(None) => Err(JournalError::suggestion_generation(EMPTY_RESPONSE)),
    Err(error) => Err(JournalError::suggestion_generation(format!("{error:#}"))),
  }
}

/// Text shown in place of a suggestion that could not be generated
pub fn placeholder(error: &JournalError) -> String {
  match error {
    JournalError::SuggestionGeneration { message } if message == EMPTY_RESPONSE => message.clone(),
    JournalError::SuggestionGeneration { message } => format!("Gemini error: {message}"),
    other => format!("Gemini error: {other}"),
  }
}

/// Suggestion text for display; failures come back as placeholder text
pub async fn suggest_for(generator: &dyn SuggestionGenerator, record: &BugRecord) -> String {
  match try_suggest(generator, record).await {
    Ok(text) => text,
    Err(error) => {
      tracing::warn!(record = %record.id, "suggestion failed: {error}");
      placeholder(&error)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::record::{BugDraft, Severity};
  use crate::store::Document;
  use chrono::DateTime;

  fn record() -> BugRecord {
    let draft = BugDraft {
      title: "Crash on save".into(),
      app_name: Some("Notes".into()),
      bug: "Save fails".into(),
      severity: Severity::High,
      description: "Tapping save crashes".into(),
      environment: "iOS 17".into(),
      steps: "Edit, tap save".into(),
      resolution: "".into(),
      tags: vec!["storage".into(), "ios".into()],
    };
    let fields = draft.to_fields(DateTime::from_timestamp_millis(0).unwrap());
    BugRecord::from_document(&Document { id: "r1".into(), fields })
  }

  #[test]
  fn test_prompt_contains_record_fields() {
    let prompt = build_prompt(&record());
    assert!(prompt.starts_with("Bug Report:\nTitle: Crash on save\nApp: Notes\nSeverity: High\n"));
    assert!(prompt.contains("Tags: storage, ios\n"));
    assert!(prompt.contains("\n\nPlease:\n- Summarize the bug."));
  }

  #[test]
  fn test_response_text_extraction() {
    let parsed: GenerateResponse = serde_json::from_str(
      r#"{"candidates":[{"content":{"parts":[{"text":"Check "},{"text":"the save path"}],"role":"model"}}]}"#,
    )
    .unwrap();
    assert_eq!(parsed.text().as_deref(), Some("Check the save path"));

    let blocked: GenerateResponse = serde_json::from_str(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap();
    assert_eq!(blocked.text(), None);
  }

  #[tokio::test]
  async fn test_suggest_for_passes_text_through() {
    let mut generator = MockSuggestionGenerator::new();
    generator
      .expect_generate()
      .withf(|prompt| prompt.contains("Crash on save"))
      .times(1)
      .returning(|_| Ok(Some("Guard the null path".to_string())));

    assert_eq!(suggest_for(&generator, &record()).await, "Guard the null path");
  }

  #[tokio::test]
  async fn test_suggest_for_degrades_failures() {
    let mut failing = MockSuggestionGenerator::new();
    failing.expect_generate().returning(|_| Err(anyhow!("429 Too Many Requests")));
    assert_eq!(suggest_for(&failing, &record()).await, "Gemini error: 429 Too Many Requests");

    let mut empty = MockSuggestionGenerator::new();
    empty.expect_generate().returning(|_| Ok(None));
    assert_eq!(suggest_for(&empty, &record()).await, EMPTY_RESPONSE);
  }

  #[tokio::test]
  async fn test_missing_key_fails_without_request() {
    let client = GeminiClient::new(GeminiConfig::default()).unwrap();
    let error = client.generate("hi").await.unwrap_err();
    assert!(error.to_string().contains("API key"));
  }
}
