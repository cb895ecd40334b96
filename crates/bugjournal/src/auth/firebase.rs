//! Firebase Authentication over the Identity Toolkit REST API

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{watch, Mutex};

use super::session_store::{SessionFile, StoredSession};
use super::{AuthService, Credentials, TokenProvider};
use crate::config::FirebaseConfig;
use crate::session::{Principal, PrincipalId};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
  email: &'a str,
  password: &'a str,
  return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileUpdateRequest<'a> {
  id_token: &'a str,
  display_name: &'a str,
  return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
  local_id: String,
  #[serde(default)]
  email: String,
  #[serde(default)]
  display_name: Option<String>,
  id_token: String,
  refresh_token: String,
  #[serde(default)]
  expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
  id_token: String,
  refresh_token: String,
  #[serde(default)]
  expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
  error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
  #[serde(default)]
  message: String,
}

const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

pub struct FirebaseAuth {
  client: Client,
  api_key: String,
  auth_url: String,
  token_url: String,
  session: Mutex<Option<StoredSession>>,
  publisher: watch::Sender<Option<Principal>>,
  session_file: Option<SessionFile>,
}

impl FirebaseAuth {
  /// Build the client, restoring a previously saved session if there is one
  pub fn new(config: &FirebaseConfig, session_file: Option<SessionFile>) -> Result<Self> {
    if config.api_key.trim().is_empty() {
      return Err(anyhow!("Firebase API key is not configured"));
    }

    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .context("Failed to create HTTP client")?;

    let restored = match &session_file {
      Some(file) => file.load()?,
      None => None,
    };
    if let Some(stored) = &restored {
      tracing::debug!(principal = %stored.principal.id, "restored saved session");
    }
    let (publisher, _) = watch::channel(restored.as_ref().map(|s| s.principal.clone()));

    Ok(Self {
      client,
      api_key: config.api_key.clone(),
      auth_url: config.auth_url.trim_end_matches('/').to_string(),
      token_url: config.token_url.trim_end_matches('/').to_string(),
      session: Mutex::new(restored),
      publisher,
      session_file,
    })
  }

  async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, url: &str, body: &B) -> Result<T> {
    let response = self
      .client
      .post(url)
      .query(&[("key", self.api_key.as_str())])
      .json(body)
      .send()
      .await
      .context("Failed to reach the authentication service")?;
    decode_response(response).await
  }

  async fn establish(&self, account: AccountResponse, display_name: Option<String>) -> Result<Principal> {
    let principal = Principal {
      id: PrincipalId::new(account.local_id),
      email: account.email,
      display_name: display_name.or(account.display_name).filter(|n| !n.is_empty()),
    };
    let stored = StoredSession::new(
      principal.clone(),
      account.id_token,
      account.refresh_token,
      parse_expires_in(account.expires_in.as_deref()),
    );

    if let Some(file) = &self.session_file {
      file.save(&stored)?;
    }
    *self.session.lock().await = Some(stored);
    self.publisher.send_replace(Some(principal.clone()));
    Ok(principal)
  }

  async fn refresh(&self, stored: &StoredSession) -> Result<StoredSession> {
    let url = format!("{}/token", self.token_url);
    let response = self
      .client
      .post(&url)
      .query(&[("key", self.api_key.as_str())])
      .form(&[("grant_type", "refresh_token"), ("refresh_token", stored.refresh_token.as_str())])
      .send()
      .await
      .context("Failed to refresh the session")?;
    let refreshed: RefreshResponse = decode_response(response).await?;

    tracing::debug!(principal = %stored.principal.id, "refreshed id token");
    Ok(StoredSession::new(
      stored.principal.clone(),
      refreshed.id_token,
      refreshed.refresh_token,
      parse_expires_in(refreshed.expires_in.as_deref()),
    ))
  }
}

#[async_trait]
impl AuthService for FirebaseAuth {
  fn current_principal(&self) -> Option<Principal> {
    self.publisher.borrow().clone()
  }

  fn watch(&self) -> watch::Receiver<Option<Principal>> {
    self.publisher.subscribe()
  }

  async fn sign_in(&self, credentials: &Credentials) -> Result<Principal> {
    let url = format!("{}/accounts:signInWithPassword", self.auth_url);
    let body =
      PasswordRequest { email: &credentials.email, password: &credentials.password, return_secure_token: true };
    let account: AccountResponse = self.post(&url, &body).await?;
    self.establish(account, None).await
  }

  async fn sign_up(&self, name: &str, credentials: &Credentials) -> Result<Principal> {
    let url = format!("{}/accounts:signUp", self.auth_url);
    let body =
      PasswordRequest { email: &credentials.email, password: &credentials.password, return_secure_token: true };
    let account: AccountResponse = self.post(&url, &body).await?;

    let update_url = format!("{}/accounts:update", self.auth_url);
    let update = ProfileUpdateRequest { id_token: &account.id_token, display_name: name, return_secure_token: false };
    let _: serde_json::Value = self.post(&update_url, &update).await.context("Failed to set display name")?;

    self.establish(account, Some(name.to_string())).await
  }

  async fn sign_out(&self) -> Result<()> {
    *self.session.lock().await = None;
    self.publisher.send_replace(None);
    if let Some(file) = &self.session_file {
      file.clear()?;
    }
    Ok(())
  }
}

#[async_trait]
impl TokenProvider for FirebaseAuth {
  async fn id_token(&self) -> Result<Option<String>> {
    let mut session = self.session.lock().await;
    let Some(stored) = session.as_ref() else {
      return Ok(None);
    };
    if !stored.needs_refresh() {
      return Ok(Some(stored.id_token.clone()));
    }

    let refreshed = self.refresh(stored).await?;
    if let Some(file) = &self.session_file {
      file.save(&refreshed)?;
    }
    let token = refreshed.id_token.clone();
    *session = Some(refreshed);
    Ok(Some(token))
  }
}

async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
  let status = response.status();
  let body = response.text().await.context("Failed to read authentication response")?;
  if !status.is_success() {
    let code = serde_json::from_str::<ErrorEnvelope>(&body).map(|e| e.error.message).unwrap_or_default();
    return Err(anyhow!(describe_auth_error(&code, status)));
  }
  serde_json::from_str(&body).context("Unexpected authentication response")
}

fn parse_expires_in(value: Option<&str>) -> i64 {
  value.and_then(|v| v.trim().parse().ok()).unwrap_or(DEFAULT_EXPIRES_IN_SECS)
}

/// Turn an Identity Toolkit error code into something a person can act on
pub fn describe_auth_error(code: &str, status: reqwest::StatusCode) -> String {
  // Codes may carry a detail suffix, e.g. "WEAK_PASSWORD : Password should be..."
  let key = code.split(':').next().unwrap_or_default().trim();
  match key {
    "EMAIL_NOT_FOUND" => "No account found for this email".to_string(),
    "INVALID_PASSWORD" => "Incorrect password".to_string(),
    "INVALID_LOGIN_CREDENTIALS" => "Invalid email or password".to_string(),
    "USER_DISABLED" => "This account has been disabled".to_string(),
    "EMAIL_EXISTS" => "An account already exists for this email".to_string(),
    "INVALID_EMAIL" => "Please enter a valid email".to_string(),
    "WEAK_PASSWORD" => "Password must be at least 6 characters".to_string(),
    "TOO_MANY_ATTEMPTS_TRY_LATER" => "Too many attempts, try again later".to_string(),
    "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "INVALID_ID_TOKEN" => {
      "Session expired; log in again".to_string()
    }
    "" => format!("Authentication failed ({status})"),
    other => format!("Authentication failed: {other}"),
  }
}
