use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{watch, Mutex};

use super::{AuthService, Credentials, TokenProvider};
use crate::session::{Principal, PrincipalId};

struct Account {
  password: String,
  principal: Principal,
}

/// In-process accounts, for tests and offline embedding
pub struct LocalAuth {
  accounts: Mutex<HashMap<String, Account>>,
  publisher: watch::Sender<Option<Principal>>,
}

impl Default for LocalAuth {
  fn default() -> Self {
    Self::new()
  }
}

impl LocalAuth {
  pub fn new() -> Self {
    let (publisher, _) = watch::channel(None);
    Self { accounts: Mutex::new(HashMap::new()), publisher }
  }

  /// Switch the signed-in principal directly, bypassing credentials
  pub fn set_principal(&self, principal: Option<Principal>) {
    self.publisher.send_replace(principal);
  }
}

#[async_trait]
impl AuthService for LocalAuth {
  fn current_principal(&self) -> Option<Principal> {
    self.publisher.borrow().clone()
  }

  fn watch(&self) -> watch::Receiver<Option<Principal>> {
    self.publisher.subscribe()
  }

  async fn sign_in(&self, credentials: &Credentials) -> Result<Principal> {
    let accounts = self.accounts.lock().await;
    let Some(account) = accounts.get(&credentials.email.to_lowercase()) else {
      bail!("No account found for this email");
    };
    if account.password != credentials.password {
      bail!("Incorrect password");
    }
    self.publisher.send_replace(Some(account.principal.clone()));
    Ok(account.principal.clone())
  }

  async fn sign_up(&self, name: &str, credentials: &Credentials) -> Result<Principal> {
    let mut accounts = self.accounts.lock().await;
    let key = credentials.email.to_lowercase();
    if accounts.contains_key(&key) {
      bail!("An account already exists for this email");
    }

    let principal = Principal {
      id: PrincipalId::new(uuid::Uuid::new_v4().simple().to_string()),
      email: credentials.email.clone(),
      display_name: Some(name.to_string()).filter(|n| !n.is_empty()),
    };
    accounts.insert(key, Account { password: credentials.password.clone(), principal: principal.clone() });
    self.publisher.send_replace(Some(principal.clone()));
    Ok(principal)
  }

  async fn sign_out(&self) -> Result<()> {
    self.publisher.send_replace(None);
    Ok(())
  }
}

#[async_trait]
impl TokenProvider for LocalAuth {
  async fn id_token(&self) -> Result<Option<String>> {
    Ok(None)
  }
}
