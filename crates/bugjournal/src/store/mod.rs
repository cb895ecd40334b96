//! Document collection store abstraction
//!
//! Bug records live in a per-principal collection at `users/{principal}/bugs`.
//! The store is reached only through [`DocumentStore`], so the in-memory
//! implementation and the Cloud Firestore client can be swapped freely.

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use serde_json::{Map, Value};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::session::PrincipalId;

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

/// Loosely typed field bag as exchanged with the backend
pub type Fields = Map<String, Value>;

/// Full point-in-time view of a collection
pub type Snapshot = Vec<Document>;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
  pub id: String,
  pub fields: Fields,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
  pub fn new(path: impl Into<String>) -> Self {
    Self(path.into().trim_matches('/').to_string())
  }

  /// `users/{principal}/bugs`
  pub fn bugs(principal: &PrincipalId) -> Self {
    Self::new(format!("users/{principal}/bugs"))
  }

  pub fn users() -> Self {
    Self::new("users")
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn document(&self, id: impl Into<String>) -> DocumentPath {
    DocumentPath { collection: self.clone(), id: id.into() }
  }
}

impl fmt::Display for CollectionPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
  pub collection: CollectionPath,
  pub id: String,
}

impl DocumentPath {
  /// `users/{principal}`, where the sign-up profile is kept
  pub fn user_profile(principal: &PrincipalId) -> Self {
    CollectionPath::users().document(principal.as_str())
  }
}

impl fmt::Display for DocumentPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.collection, self.id)
  }
}

/// Live feed of collection snapshots.
///
/// Dropping the subscription stops the task feeding it, which releases the
/// listener it holds on the backend.
pub struct Subscription {
  receiver: mpsc::Receiver<Result<Snapshot>>,
  task: JoinHandle<()>,
}

impl Subscription {
  pub fn new(receiver: mpsc::Receiver<Result<Snapshot>>, task: JoinHandle<()>) -> Self {
    Self { receiver, task }
  }

  /// Wait for the next snapshot; `None` once the feed has ended
  pub async fn next_snapshot(&mut self) -> Option<Result<Snapshot>> {
    self.receiver.recv().await
  }
}

impl Stream for Subscription {
  type Item = Result<Snapshot>;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.receiver.poll_recv(cx)
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.task.abort();
  }
}

/// Document collection store interface
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
  /// Start a live feed of the collection; the current contents arrive first
  async fn subscribe(&self, collection: &CollectionPath) -> Result<Subscription>;

  /// One-shot read of the whole collection
  async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>>;

  async fn get(&self, document: &DocumentPath) -> Result<Option<Document>>;

  /// Create a document with a store-assigned id and return that id
  async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<String>;

  /// Create or replace a document at a known path
  async fn set(&self, document: &DocumentPath, fields: Fields) -> Result<()>;

  /// Merge fields into an existing document; fails if it does not exist
  async fn update(&self, document: &DocumentPath, fields: Fields) -> Result<()>;

  /// Remove an existing document; fails if it does not exist
  async fn delete(&self, document: &DocumentPath) -> Result<()>;
}
