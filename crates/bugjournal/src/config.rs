//! Configuration for the journal
//!
//! Loaded from a JSON file with every key optional, then patched from the
//! environment so credentials can stay out of the file.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::record::{ValidationProfile, DEFAULT_WORD_LIMIT};

pub const HOME_ENV: &str = "BUGJOURNAL_HOME";
pub const CONFIG_ENV: &str = "BUGJOURNAL_CONFIG";
pub const PROJECT_ENV: &str = "BUGJOURNAL_FIREBASE_PROJECT";
pub const API_KEY_ENV: &str = "BUGJOURNAL_FIREBASE_API_KEY";
pub const GEMINI_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub firebase: FirebaseConfig,
  #[serde(default)]
  pub gemini: GeminiConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub records: RecordsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirebaseConfig {
  #[serde(default)]
  pub project_id: String,
  #[serde(default)]
  pub api_key: String,
  #[serde(default = "default_database")]
  pub database: String,
  #[serde(default = "default_firestore_url")]
  pub firestore_url: String,
  #[serde(default = "default_auth_url")]
  pub auth_url: String,
  #[serde(default = "default_token_url")]
  pub token_url: String,
  /// Per-request timeout in seconds
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiConfig {
  #[serde(default)]
  pub api_key: String,
  #[serde(default = "default_model")]
  pub model: String,
  #[serde(default = "default_gemini_url")]
  pub base_url: String,
  #[serde(default = "default_gemini_timeout_secs")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
  /// How often a Firestore subscription re-reads its collection
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,
  /// Snapshots buffered per subscription before the producer waits
  #[serde(default = "default_channel_capacity")]
  pub channel_capacity: usize,
  /// Wait before reopening a record subscription that failed
  #[serde(default = "default_retry_delay_ms")]
  pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordsConfig {
  #[serde(default)]
  pub validation: ValidationProfile,
  /// Words kept per free-text field
  #[serde(default = "default_word_limit")]
  pub word_limit: usize,
}

fn default_database() -> String {
  "(default)".to_string()
}
fn default_firestore_url() -> String {
  "https://firestore.googleapis.com/v1".to_string()
}
fn default_auth_url() -> String {
  "https://identitytoolkit.googleapis.com/v1".to_string()
}
fn default_token_url() -> String {
  "https://securetoken.googleapis.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
  30
}
fn default_model() -> String {
  "gemini-2.0-flash-001".to_string()
}
fn default_gemini_url() -> String {
  "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_gemini_timeout_secs() -> u64 {
  60
}
fn default_poll_interval_ms() -> u64 {
  2000
}
fn default_channel_capacity() -> usize {
  16
}
fn default_retry_delay_ms() -> u64 {
  5000
}
fn default_word_limit() -> usize {
  DEFAULT_WORD_LIMIT
}

impl Default for FirebaseConfig {
  fn default() -> Self {
    Self {
      project_id: String::new(),
      api_key: String::new(),
      database: default_database(),
      firestore_url: default_firestore_url(),
      auth_url: default_auth_url(),
      token_url: default_token_url(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

impl Default for GeminiConfig {
  fn default() -> Self {
    Self {
      api_key: String::new(),
      model: default_model(),
      base_url: default_gemini_url(),
      timeout_secs: default_gemini_timeout_secs(),
    }
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      poll_interval_ms: default_poll_interval_ms(),
      channel_capacity: default_channel_capacity(),
      retry_delay_ms: default_retry_delay_ms(),
    }
  }
}

impl Default for RecordsConfig {
  fn default() -> Self {
    Self { validation: ValidationProfile::default(), word_limit: default_word_limit() }
  }
}

impl Config {
  pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let content =
      std::fs::read_to_string(path).with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config = serde_json::from_str(&content).with_context(|| format!("Invalid config: {}", path.display()))?;
    Ok(config)
  }

  /// Resolve the config file, falling back to defaults when there is none,
  /// then apply environment overrides
  pub fn load() -> Result<Self> {
    let path = config_path()?;
    let mut config = if path.exists() {
      tracing::debug!(path = %path.display(), "loading config");
      Self::load_from_file(&path)?
    } else {
      Self::default()
    };
    config.apply_env();
    Ok(config)
  }

  pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(self)?)
      .with_context(|| format!("Failed to write config: {}", path.display()))?;
    Ok(())
  }

  pub fn apply_env(&mut self) {
    if let Some(project) = non_empty_env(PROJECT_ENV) {
      self.firebase.project_id = project;
    }
    if let Some(key) = non_empty_env(API_KEY_ENV) {
      self.firebase.api_key = key;
    }
    if let Some(key) = non_empty_env(GEMINI_KEY_ENV) {
      self.gemini.api_key = key;
    }
  }
}

fn non_empty_env(name: &str) -> Option<String> {
  std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// `$BUGJOURNAL_HOME`, else `~/.bugjournal`
pub fn home_dir() -> Result<PathBuf> {
  if let Some(home) = non_empty_env(HOME_ENV) {
    return Ok(PathBuf::from(home));
  }
  dirs::home_dir()
    .map(|home| home.join(".bugjournal"))
    .ok_or_else(|| anyhow!("Cannot determine home directory; set {HOME_ENV}"))
}

pub fn config_path() -> Result<PathBuf> {
  match non_empty_env(CONFIG_ENV) {
    Some(path) => Ok(PathBuf::from(path)),
    None => Ok(home_dir()?.join("config.json")),
  }
}
