//! Cloud Firestore REST client
//!
//! Talks to the v1 documents API. Firestore wraps every value in a typed
//! envelope (`stringValue`, `integerValue`, ...), which is translated to and
//! from plain JSON here so the rest of the crate only sees [`Fields`].
//! The REST surface has no push listener, so subscriptions poll the
//! collection and emit a snapshot whenever its contents change.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{CollectionPath, Document, DocumentPath, DocumentStore, Fields, Subscription};
use crate::auth::TokenProvider;
use crate::config::{FirebaseConfig, SyncConfig};

const PAGE_SIZE: usize = 300;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteDocument {
  name: String,
  #[serde(default)]
  fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
  #[serde(default)]
  documents: Vec<RemoteDocument>,
  next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
  error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
  #[serde(default)]
  status: String,
  #[serde(default)]
  message: String,
}

struct FirestoreInner {
  client: Client,
  documents_url: String,
  tokens: Arc<dyn TokenProvider>,
  poll_interval: Duration,
  channel_capacity: usize,
}

/// Firestore-backed [`DocumentStore`]
#[derive(Clone)]
pub struct FirestoreStore {
  inner: Arc<FirestoreInner>,
}

impl FirestoreStore {
  pub fn new(firebase: &FirebaseConfig, sync: &SyncConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
    if firebase.project_id.trim().is_empty() {
      return Err(anyhow!("Firebase project id is not configured"));
    }

    let client = Client::builder()
      .timeout(Duration::from_secs(firebase.timeout_secs))
      .build()
      .context("Failed to create HTTP client")?;

    let documents_url = format!(
      "{}/projects/{}/databases/{}/documents",
      firebase.firestore_url.trim_end_matches('/'),
      firebase.project_id,
      firebase.database
    );

    Ok(Self {
      inner: Arc::new(FirestoreInner {
        client,
        documents_url,
        tokens,
        poll_interval: Duration::from_millis(sync.poll_interval_ms.max(100)),
        channel_capacity: sync.channel_capacity.max(1),
      }),
    })
  }

  pub fn documents_url(&self) -> &str {
    &self.inner.documents_url
  }

  async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
    let url = format!("{}/{}", self.inner.documents_url, path);
    let mut request = self.inner.client.request(method, url);
    if let Some(token) = self.inner.tokens.id_token().await? {
      request = request.bearer_auth(token);
    }
    Ok(request)
  }

  async fn send(&self, request: RequestBuilder, action: &str) -> Result<Response> {
    let response = request.send().await.with_context(|| format!("Failed to {action}"))?;
    if response.status().is_success() {
      return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(anyhow!("Failed to {action}: {}", describe_error(status, &body)))
  }

  async fn list_page(&self, collection: &CollectionPath, page_token: Option<&str>) -> Result<ListDocumentsResponse> {
    let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
    if let Some(token) = page_token {
      query.push(("pageToken", token.to_string()));
    }

    let request = self.request(Method::GET, collection.as_str()).await?.query(&query);
    let response = self.send(request, &format!("list {collection}")).await?;
    Ok(response.json().await?)
  }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
  async fn subscribe(&self, collection: &CollectionPath) -> Result<Subscription> {
    let (sender, receiver) = mpsc::channel(self.inner.channel_capacity);
    let store = self.clone();
    let path = collection.clone();

    let task = tokio::spawn(async move {
      let mut last: Option<Vec<Document>> = None;
      let mut failing = false;
      loop {
        match store.list(&path).await {
          Ok(documents) => {
            failing = false;
            if last.as_ref() != Some(&documents) {
              last = Some(documents.clone());
              if sender.send(Ok(documents)).await.is_err() {
                break;
              }
            }
          }
          Err(error) => {
            tracing::warn!(collection = %path, "poll failed: {error:#}");
            // Report the first failure of a streak only
            if !failing && sender.send(Err(error)).await.is_err() {
              break;
            }
            failing = true;
          }
        }

        tokio::select! {
          _ = sender.closed() => break,
          _ = tokio::time::sleep(store.inner.poll_interval) => {}
        }
      }
      tracing::debug!(collection = %path, "firestore subscription closed");
    });

    Ok(Subscription::new(receiver, task))
  }

  async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
      let page = self.list_page(collection, page_token.as_deref()).await?;
      documents.extend(page.documents.into_iter().map(from_remote));
      match page.next_page_token.filter(|t| !t.is_empty()) {
        Some(token) => page_token = Some(token),
        None => break,
      }
    }
    Ok(documents)
  }

  async fn get(&self, document: &DocumentPath) -> Result<Option<Document>> {
    let request = self.request(Method::GET, &document.to_string()).await?;
    let response = request.send().await.with_context(|| format!("Failed to get {document}"))?;
    if response.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      return Err(anyhow!("Failed to get {document}: {}", describe_error(status, &body)));
    }
    let remote: RemoteDocument = response.json().await?;
    Ok(Some(from_remote(remote)))
  }

  async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<String> {
    let request = self.request(Method::POST, collection.as_str()).await?.json(&json!({ "fields": encode_fields(&fields) }));
    let response = self.send(request, &format!("add to {collection}")).await?;
    let created: RemoteDocument = response.json().await?;
    Ok(document_id(&created.name).to_string())
  }

  async fn set(&self, document: &DocumentPath, fields: Fields) -> Result<()> {
    let request =
      self.request(Method::PATCH, &document.to_string()).await?.json(&json!({ "fields": encode_fields(&fields) }));
    self.send(request, &format!("write {document}")).await?;
    Ok(())
  }

  async fn update(&self, document: &DocumentPath, fields: Fields) -> Result<()> {
    let mut query: Vec<(&str, String)> = fields.keys().map(|key| ("updateMask.fieldPaths", key.clone())).collect();
    query.push(("currentDocument.exists", "true".to_string()));

    let request = self
      .request(Method::PATCH, &document.to_string())
      .await?
      .query(&query)
      .json(&json!({ "fields": encode_fields(&fields) }));
    self.send(request, &format!("update {document}")).await?;
    Ok(())
  }

  async fn delete(&self, document: &DocumentPath) -> Result<()> {
    let request =
      self.request(Method::DELETE, &document.to_string()).await?.query(&[("currentDocument.exists", "true")]);
    self.send(request, &format!("delete {document}")).await?;
    Ok(())
  }
}

fn from_remote(remote: RemoteDocument) -> Document {
  Document { id: document_id(&remote.name).to_string(), fields: decode_fields(&remote.fields) }
}

/// Last path segment of a fully qualified document name
pub fn document_id(name: &str) -> &str {
  name.rsplit('/').next().unwrap_or(name)
}

fn describe_error(status: StatusCode, body: &str) -> String {
  match serde_json::from_str::<ErrorEnvelope>(body) {
    Ok(envelope) if !envelope.error.message.is_empty() => {
      format!("{} ({})", envelope.error.message, envelope.error.status)
    }
    _ if body.trim().is_empty() => status.to_string(),
    _ => format!("{status}: {}", body.trim()),
  }
}

pub fn encode_fields(fields: &Fields) -> Value {
  Value::Object(fields.iter().map(|(key, value)| (key.clone(), encode_value(value))).collect())
}

pub fn encode_value(value: &Value) -> Value {
  match value {
    Value::Null => json!({ "nullValue": null }),
    Value::Bool(b) => json!({ "booleanValue": b }),
    Value::Number(n) => match n.as_i64() {
      Some(i) => json!({ "integerValue": i.to_string() }),
      None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
    },
    Value::String(s) => json!({ "stringValue": s }),
    Value::Array(items) => {
      json!({ "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() } })
    }
    Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
  }
}

pub fn decode_fields(fields: &Map<String, Value>) -> Fields {
  fields.iter().map(|(key, value)| (key.clone(), decode_value(value))).collect()
}

pub fn decode_value(value: &Value) -> Value {
  let Some((kind, inner)) = value.as_object().and_then(|obj| obj.iter().next()) else {
    return Value::Null;
  };

  match kind.as_str() {
    "integerValue" => match inner {
      Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
      other => other.clone(),
    },
    "arrayValue" => Value::Array(
      inner.get("values").and_then(Value::as_array).map(|vs| vs.iter().map(decode_value).collect()).unwrap_or_default(),
    ),
    "mapValue" => {
      Value::Object(inner.get("fields").and_then(Value::as_object).map(decode_fields).unwrap_or_default())
    }
    "nullValue" => Value::Null,
    // stringValue, booleanValue, doubleValue, timestampValue, referenceValue, bytesValue, geoPointValue
    _ => inner.clone(),
  }
}
