use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::BugStore;
use crate::auth::{AuthService, FirebaseAuth, SessionFile};
use crate::config::{self, Config};
use crate::error::JournalError;
use crate::session::{Principal, SessionContext};
use crate::store::{DocumentStore, FirestoreStore};
use crate::suggestion::GeminiClient;

pub mod account;
pub mod bugs;
pub mod suggest;
pub mod watch;

/// Collaborators wired from configuration, shared by every command
pub struct App {
  pub config: Config,
  pub auth: Arc<FirebaseAuth>,
  pub store: Arc<dyn DocumentStore>,
}

impl App {
  pub fn load() -> Result<Self> {
    let config = Config::load()?;
    let home = config::home_dir()?;

    let auth = Arc::new(
      FirebaseAuth::new(&config.firebase, Some(SessionFile::in_dir(&home)))
        .context("Set BUGJOURNAL_FIREBASE_API_KEY or firebase.api_key in the config file")?,
    );
    let store: Arc<dyn DocumentStore> = Arc::new(
      FirestoreStore::new(&config.firebase, &config.sync, auth.clone())
        .context("Set BUGJOURNAL_FIREBASE_PROJECT or firebase.project_id in the config file")?,
    );
    Ok(Self { config, auth, store })
  }

  pub fn session(&self) -> SessionContext {
    SessionContext::new(self.auth.watch(), self.store.clone())
  }

  pub fn bugs(&self) -> BugStore {
    BugStore::new(self.session())
      .with_profile(self.config.records.validation)
      .with_word_limit(self.config.records.word_limit)
      .with_retry_delay(Duration::from_millis(self.config.sync.retry_delay_ms))
  }

  pub fn suggestions(&self) -> Result<GeminiClient> {
    GeminiClient::new(self.config.gemini.clone())
  }

  pub fn require_principal(&self) -> Result<Principal> {
    self.auth.current_principal().ok_or_else(|| JournalError::NotAuthenticated.into())
  }
}
