//! In-memory document store.
//!
//! Collections keep documents in insertion order and publish every change to
//! their listeners through a `watch` channel, so subscribers always see the
//! latest full snapshot. Used by the tests and by embedders that run without a backend.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

use super::{CollectionPath, Document, DocumentPath, DocumentStore, Fields, Snapshot, Subscription};

const DEFAULT_CHANNEL_CAPACITY: usize = 16;

struct Collection {
  documents: Vec<Document>,
  publisher: watch::Sender<Snapshot>,
}

impl Collection {
  fn new() -> Self {
    let (publisher, _) = watch::channel(Vec::new());
    Self { documents: Vec::new(), publisher }
  }

  fn publish(&self) {
    self.publisher.send_replace(self.documents.clone());
  }

  fn position(&self, id: &str) -> Option<usize> {
    self.documents.iter().position(|doc| doc.id == id)
  }
}

struct MemoryStoreInner {
  collections: HashMap<CollectionPath, Collection>,
  unavailable: Option<String>,
}

impl MemoryStoreInner {
  fn check_available(&self) -> Result<()> {
    match &self.unavailable {
      Some(reason) => bail!("{reason}"),
      None => Ok(()),
    }
  }

  fn collection(&mut self, path: &CollectionPath) -> &mut Collection {
    self.collections.entry(path.clone()).or_insert_with(Collection::new)
  }

  /// Locate an existing document without creating its collection
  fn existing(&mut self, document: &DocumentPath, action: &str) -> Result<(&mut Collection, usize)> {
    let found = self
      .collections
      .get_mut(&document.collection)
      .and_then(|collection| collection.position(&document.id).map(|index| (collection, index)));
    found.ok_or_else(|| anyhow!("No document to {action}: {document}"))
  }
}

#[derive(Clone)]
pub struct MemoryStore {
  inner: Arc<Mutex<MemoryStoreInner>>,
  channel_capacity: usize,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
  }

  pub fn with_channel_capacity(channel_capacity: usize) -> Self {
    let inner = MemoryStoreInner { collections: HashMap::new(), unavailable: None };
    Self { inner: Arc::new(Mutex::new(inner)), channel_capacity: channel_capacity.max(1) }
  }

  /// Make every subsequent call fail with `reason` until cleared with `None`
  pub async fn set_unavailable(&self, reason: Option<&str>) {
    self.inner.lock().await.unavailable = reason.map(String::from);
  }

  /// Number of live subscriptions on a collection
  pub async fn listener_count(&self, collection: &CollectionPath) -> usize {
    let inner = self.inner.lock().await;
    inner.collections.get(collection).map_or(0, |c| c.publisher.receiver_count())
  }

  /// Number of collections ever written to or listened on
  pub async fn collection_count(&self) -> usize {
    self.inner.lock().await.collections.len()
  }

  pub async fn document_count(&self, collection: &CollectionPath) -> usize {
    let inner = self.inner.lock().await;
    inner.collections.get(collection).map_or(0, |c| c.documents.len())
  }
}

#[async_trait]
impl DocumentStore for MemoryStore {
  async fn subscribe(&self, collection: &CollectionPath) -> Result<Subscription> {
    let mut listener = {
      let mut inner = self.inner.lock().await;
      inner.check_available()?;
      inner.collection(collection).publisher.subscribe()
    };

    let (sender, receiver) = mpsc::channel(self.channel_capacity);
    let path = collection.clone();
    let task = tokio::spawn(async move {
      let initial = listener.borrow_and_update().clone();
      if sender.send(Ok(initial)).await.is_err() {
        return;
      }
      while listener.changed().await.is_ok() {
        let snapshot = listener.borrow_and_update().clone();
        if sender.send(Ok(snapshot)).await.is_err() {
          break;
        }
      }
      tracing::debug!(collection = %path, "memory subscription closed");
    });

    Ok(Subscription::new(receiver, task))
  }

  async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>> {
    let inner = self.inner.lock().await;
    inner.check_available()?;
    Ok(inner.collections.get(collection).map(|c| c.documents.clone()).unwrap_or_default())
  }

  async fn get(&self, document: &DocumentPath) -> Result<Option<Document>> {
    let inner = self.inner.lock().await;
    inner.check_available()?;
    Ok(
      inner
        .collections
        .get(&document.collection)
        .and_then(|c| c.documents.iter().find(|doc| doc.id == document.id).cloned()),
    )
  }

  async fn add(&self, collection: &CollectionPath, fields: Fields) -> Result<String> {
    let mut inner = self.inner.lock().await;
    inner.check_available()?;
    let id = uuid::Uuid::new_v4().simple().to_string();
    let target = inner.collection(collection);
    target.documents.push(Document { id: id.clone(), fields });
    target.publish();
    Ok(id)
  }

  async fn set(&self, document: &DocumentPath, fields: Fields) -> Result<()> {
    let mut inner = self.inner.lock().await;
    inner.check_available()?;
    let target = inner.collection(&document.collection);
    match target.position(&document.id) {
      Some(index) => target.documents[index].fields = fields,
      None => target.documents.push(Document { id: document.id.clone(), fields }),
    }
    target.publish();
    Ok(())
  }

  async fn update(&self, document: &DocumentPath, fields: Fields) -> Result<()> {
    let mut inner = self.inner.lock().await;
    inner.check_available()?;
    let (target, index) = inner.existing(document, "update")?;
    target.documents[index].fields.extend(fields);
    target.publish();
    Ok(())
  }

  async fn delete(&self, document: &DocumentPath) -> Result<()> {
    let mut inner = self.inner.lock().await;
    inner.check_available()?;
    let (target, index) = inner.existing(document, "delete")?;
    target.documents.remove(index);
    target.publish();
    Ok(())
  }
}
