//! Authentication collaborator
//!
//! [`AuthService`] is the seam between the journal and whoever vouches for the
//! user. Credentials are checked locally first so obviously bad input never
//! reaches the backend.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use tokio::sync::watch;

use crate::error::{JournalError, JournalResult};
use crate::session::Principal;
use crate::store::{DocumentPath, DocumentStore, Fields};

pub mod firebase;
pub mod local;
pub mod session_store;

pub use firebase::FirebaseAuth;
pub use local::LocalAuth;
pub use session_store::{SessionFile, StoredSession};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Role {
  #[default]
  Developer,
  #[serde(rename = "QA")]
  Qa,
  Student,
  #[serde(rename = "Product Manager")]
  ProductManager,
}

impl Role {
  pub const ALL: [Role; 4] = [Role::Developer, Role::Qa, Role::Student, Role::ProductManager];

  pub fn as_str(&self) -> &'static str {
    match self {
      Role::Developer => "Developer",
      Role::Qa => "QA",
      Role::Student => "Student",
      Role::ProductManager => "Product Manager",
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Role {
  type Err = JournalError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted: String = s.chars().filter(|c| c.is_alphanumeric()).collect();
    Role::ALL
      .into_iter()
      .find(|role| {
        let name: String = role.as_str().chars().filter(|c| c.is_alphanumeric()).collect();
        name.eq_ignore_ascii_case(&wanted)
      })
      .ok_or_else(|| {
        JournalError::validation(format!(
          "Unknown role '{}' (expected Developer, QA, Student or Product Manager)",
          s.trim()
        ))
      })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
  pub email: String,
  pub password: String,
}

impl Credentials {
  pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
    Self { email: email.into().trim().to_string(), password: password.into() }
  }

  pub fn validate(&self) -> JournalResult<()> {
    if self.email.trim().is_empty() {
      return Err(JournalError::validation("Email cannot be empty"));
    }
    if !is_valid_email(&self.email) {
      return Err(JournalError::validation("Please enter a valid email"));
    }
    if self.password.is_empty() {
      return Err(JournalError::validation("Password cannot be empty"));
    }
    if self.password.chars().count() < MIN_PASSWORD_LEN {
      return Err(JournalError::validation(format!(
        "Password must be at least {MIN_PASSWORD_LEN} characters"
      )));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpRequest {
  pub name: String,
  pub credentials: Credentials,
  pub role: Role,
}

impl SignUpRequest {
  pub fn validate(&self) -> JournalResult<()> {
    if self.name.trim().is_empty() {
      return Err(JournalError::validation("Name cannot be empty"));
    }
    self.credentials.validate()
  }
}

/// Profile written to `users/{principal}` at sign-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
  pub name: String,
  pub email: String,
  pub role: Role,
}

impl UserProfile {
  pub fn to_fields(&self) -> Fields {
    let mut fields = Fields::new();
    fields.insert("name".into(), json!(self.name));
    fields.insert("email".into(), json!(self.email));
    fields.insert("role".into(), json!(self.role.as_str()));
    fields
  }
}

/// Loose shape check: one `@`, something before it, a dotted domain after it
pub fn is_valid_email(email: &str) -> bool {
  let email = email.trim();
  if email.chars().any(char::is_whitespace) {
    return false;
  }
  match email.split_once('@') {
    Some((local, domain)) => {
      !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
    }
    None => false,
  }
}

/// Authentication collaborator interface
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthService: Send + Sync {
  fn current_principal(&self) -> Option<Principal>;

  /// Auth-state feed; holds the current principal and changes on sign-in/out
  fn watch(&self) -> watch::Receiver<Option<Principal>>;

  async fn sign_in(&self, credentials: &Credentials) -> Result<Principal>;

  /// Create the account and sign it in, with `name` as its display name
  async fn sign_up(&self, name: &str, credentials: &Credentials) -> Result<Principal>;

  async fn sign_out(&self) -> Result<()>;
}

/// Source of the bearer token sent with backend requests
#[async_trait]
pub trait TokenProvider: Send + Sync {
  async fn id_token(&self) -> Result<Option<String>>;
}

pub async fn login(auth: &dyn AuthService, credentials: &Credentials) -> JournalResult<Principal> {
  credentials.validate()?;
  let principal = auth.sign_in(credentials).await.map_err(JournalError::from_backend)?;
  tracing::debug!(principal = %principal.id, "signed in");
  Ok(principal)
}

/// Create the account, then record the user's profile next to their bugs
pub async fn register(
  auth: &dyn AuthService,
  store: &dyn DocumentStore,
  request: &SignUpRequest,
) -> JournalResult<Principal> {
  request.validate()?;
  let principal =
    auth.sign_up(request.name.trim(), &request.credentials).await.map_err(JournalError::from_backend)?;

  let profile =
    UserProfile { name: request.name.trim().to_string(), email: principal.email.clone(), role: request.role };
  store
    .set(&DocumentPath::user_profile(&principal.id), profile.to_fields())
    .await
    .map_err(JournalError::from_backend)?;

  tracing::debug!(principal = %principal.id, role = %request.role, "registered");
  Ok(principal)
}
