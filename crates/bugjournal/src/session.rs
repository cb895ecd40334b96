//! Who is signed in, and which store their data lives in.
//!
//! Every component that needs the current principal or the document store
//! receives a [`SessionContext`] instead of reaching for a global.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{JournalError, JournalResult};
use crate::store::DocumentStore;

/// Opaque identifier of an authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for PrincipalId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
  pub id: PrincipalId,
  pub email: String,
  #[serde(default)]
  pub display_name: Option<String>,
}

impl Principal {
  /// Name to greet the user with, falling back to the email's local part
  pub fn greeting_name(&self) -> &str {
    match self.display_name.as_deref().map(str::trim) {
      Some(name) if !name.is_empty() => name,
      _ => self.email.split('@').next().unwrap_or(&self.email),
    }
  }
}

#[derive(Clone)]
pub struct SessionContext {
  principal: watch::Receiver<Option<Principal>>,
  store: Arc<dyn DocumentStore>,
}

impl SessionContext {
  pub fn new(principal: watch::Receiver<Option<Principal>>, store: Arc<dyn DocumentStore>) -> Self {
    Self { principal, store }
  }

  /// A context pinned to one principal, with nothing watching for changes
  pub fn fixed(principal: Option<Principal>, store: Arc<dyn DocumentStore>) -> Self {
    let (sender, receiver) = watch::channel(principal);
    // The receiver keeps the last value after the sender is gone
    drop(sender);
    Self::new(receiver, store)
  }

  pub fn principal(&self) -> Option<Principal> {
    self.principal.borrow().clone()
  }

  pub fn principal_id(&self) -> Option<PrincipalId> {
    self.principal.borrow().as_ref().map(|p| p.id.clone())
  }

  pub fn require_principal(&self) -> JournalResult<PrincipalId> {
    self.principal_id().ok_or(JournalError::NotAuthenticated)
  }

  /// A fresh receiver for following sign-in and sign-out
  pub fn principal_changes(&self) -> watch::Receiver<Option<Principal>> {
    self.principal.clone()
  }

  pub fn store(&self) -> &Arc<dyn DocumentStore> {
    &self.store
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  fn principal(id: &str) -> Principal {
    Principal { id: PrincipalId::new(id), email: format!("{id}@example.com"), display_name: None }
  }

  #[test]
  fn test_require_principal_without_sign_in() {
    let context = SessionContext::fixed(None, Arc::new(MemoryStore::new()));
    assert_eq!(context.require_principal().unwrap_err(), JournalError::NotAuthenticated);
  }

  #[test]
  fn test_context_follows_sender() {
    let (sender, receiver) = watch::channel(None);
    let context = SessionContext::new(receiver, Arc::new(MemoryStore::new()));
    assert!(context.principal_id().is_none());

    sender.send_replace(Some(principal("u1")));
    assert_eq!(context.require_principal().unwrap(), PrincipalId::new("u1"));
  }

  #[test]
  fn test_greeting_name_falls_back_to_email() {
    let mut user = principal("ada");
    assert_eq!(user.greeting_name(), "ada");

    user.display_name = Some("Ada Lovelace".into());
    assert_eq!(user.greeting_name(), "Ada Lovelace");
  }
}
