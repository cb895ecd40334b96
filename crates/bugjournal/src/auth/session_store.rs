use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::session::Principal;

const SESSION_FILE: &str = "session.json";

/// Tokens are refreshed this long before they actually expire
const EXPIRY_MARGIN_SECS: i64 = 60;

/// A signed-in session as kept between CLI invocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
  pub principal: Principal,
  pub id_token: String,
  pub refresh_token: String,
  pub expires_at: DateTime<Utc>,
}

impl StoredSession {
  pub fn new(principal: Principal, id_token: String, refresh_token: String, expires_in_secs: i64) -> Self {
    Self { principal, id_token, refresh_token, expires_at: Utc::now() + Duration::seconds(expires_in_secs) }
  }

  pub fn needs_refresh(&self) -> bool {
    self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) <= Utc::now()
  }
}

/// Persists the session as JSON under the journal home
#[derive(Debug, Clone)]
pub struct SessionFile {
  path: PathBuf,
}

impl SessionFile {
  pub fn in_dir(dir: &Path) -> Self {
    Self { path: dir.join(SESSION_FILE) }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn exists(&self) -> bool {
    self.path.exists()
  }

  pub fn save(&self, session: &StoredSession) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create session directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(session)?;
    fs::write(&self.path, json).with_context(|| format!("Failed to write session: {}", self.path.display()))?;
    Ok(())
  }

  pub fn load(&self) -> Result<Option<StoredSession>> {
    if !self.path.exists() {
      return Ok(None);
    }
    let json =
      fs::read_to_string(&self.path).with_context(|| format!("Failed to read session: {}", self.path.display()))?;
    let session = serde_json::from_str(&json).context("Session file is corrupted; log in again")?;
    Ok(Some(session))
  }

  pub fn clear(&self) -> Result<()> {
    if self.path.exists() {
      fs::remove_file(&self.path)
        .with_context(|| format!("Failed to remove session: {}", self.path.display()))?;
    }
    Ok(())
  }
}
