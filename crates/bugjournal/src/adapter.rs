//! Bug record store adapter
//!
//! Turns the principal's document collection into typed record lists and
//! funnels every write through validation first. Snapshots replace the list
//! wholesale; nothing is patched locally after a write.

use chrono::Utc;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{JournalError, JournalResult};
use crate::record::{BugDraft, BugRecord, RecordId, ValidationProfile, DEFAULT_WORD_LIMIT, SUGGESTION_FIELD};
use crate::session::{PrincipalId, SessionContext};
use crate::store::{CollectionPath, Fields, Snapshot, Subscription};

const STREAM_CAPACITY: usize = 16;

/// Wait before reopening a subscription that failed to open
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// One full view of a principal's records
#[derive(Debug, Clone, PartialEq)]
pub struct RecordListSnapshot {
  pub principal: Option<PrincipalId>,
  pub records: Vec<BugRecord>,
}

impl RecordListSnapshot {
  pub fn empty() -> Self {
    Self { principal: None, records: Vec::new() }
  }

  fn decode(principal: &PrincipalId, snapshot: Snapshot) -> Self {
    let records: Vec<BugRecord> = snapshot.iter().map(BugRecord::from_document).collect();
    tracing::debug!(principal = %principal, count = records.len(), "record snapshot");
    Self { principal: Some(principal.clone()), records }
  }
}

/// Live record lists; dropping it stops the feed and its backend listener
pub struct RecordStream {
  receiver: mpsc::Receiver<JournalResult<RecordListSnapshot>>,
  task: Option<JoinHandle<()>>,
}

impl RecordStream {
  /// Wait for the next list; `None` once the feed has ended
  pub async fn next_snapshot(&mut self) -> Option<JournalResult<RecordListSnapshot>> {
    self.receiver.recv().await
  }
}

impl Stream for RecordStream {
  type Item = JournalResult<RecordListSnapshot>;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.receiver.poll_recv(cx)
  }
}

impl Drop for RecordStream {
  fn drop(&mut self) {
    if let Some(task) = &self.task {
      task.abort();
    }
  }
}

#[derive(Clone)]
pub struct BugStore {
  session: SessionContext,
  profile: ValidationProfile,
  word_limit: usize,
  retry_delay: Duration,
}

impl BugStore {
  pub fn new(session: SessionContext) -> Self {
    Self {
      session,
      profile: ValidationProfile::default(),
      word_limit: DEFAULT_WORD_LIMIT,
      retry_delay: DEFAULT_RETRY_DELAY,
    }
  }

  pub fn with_profile(mut self, profile: ValidationProfile) -> Self {
    self.profile = profile;
    self
  }

  pub fn with_word_limit(mut self, word_limit: usize) -> Self {
    self.word_limit = word_limit;
    self
  }

  pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
    self.retry_delay = retry_delay;
    self
  }

  pub fn session(&self) -> &SessionContext {
    &self.session
  }

  pub fn profile(&self) -> ValidationProfile {
    self.profile
  }

  /// Live feed for one principal; with none, a single empty list and no listener
  pub async fn subscribe_principal(&self, principal: Option<&PrincipalId>) -> JournalResult<RecordStream> {
    let (sender, receiver) = mpsc::channel(STREAM_CAPACITY);
    let Some(principal) = principal.cloned() else {
      // Capacity is at least one, so this cannot be full
      let _ = sender.try_send(Ok(RecordListSnapshot::empty()));
      return Ok(RecordStream { receiver, task: None });
    };

    let mut subscription = self
      .session
      .store()
      .subscribe(&CollectionPath::bugs(&principal))
      .await
      .map_err(JournalError::from_backend)?;

    let task = tokio::spawn(async move {
      while let Some(item) = subscription.next_snapshot().await {
        let item = item.map(|s| RecordListSnapshot::decode(&principal, s)).map_err(JournalError::from_backend);
        if sender.send(item).await.is_err() {
          break;
        }
      }
    });
    Ok(RecordStream { receiver, task: Some(task) })
  }

  /// Live feed that follows the session: re-subscribes when the principal
  /// changes and yields an empty list while nobody is signed in. A
  /// subscription that fails to open is reported, then retried after the
  /// retry delay.
  pub fn watch(&self) -> RecordStream {
    let (sender, receiver) = mpsc::channel(STREAM_CAPACITY);
    let mut changes = self.session.principal_changes();
    let store = self.session.store().clone();
    let retry_delay = self.retry_delay;

    let task = tokio::spawn(async move {
      let mut auth_open = true;
      let mut current: Option<PrincipalId> = None;
      let mut subscription: Option<Subscription> = None;
      let mut resubscribe = true;
      let mut retrying = false;

      loop {
        let principal = changes.borrow_and_update().as_ref().map(|p| p.id.clone());
        if resubscribe || principal != current {
          resubscribe = false;
          retrying = false;
          // Release the old listener before opening the next one
          subscription = None;
          current = principal;
          match &current {
            Some(id) => match store.subscribe(&CollectionPath::bugs(id)).await {
              Ok(opened) => {
                tracing::debug!(principal = %id, "record subscription opened");
                subscription = Some(opened);
              }
              Err(error) => {
                tracing::warn!(principal = %id, "record subscription failed, retrying in {retry_delay:?}: {error:#}");
                if sender.send(Err(JournalError::from_backend(error))).await.is_err() {
                  return;
                }
                retrying = true;
              }
            },
            None => {
              tracing::debug!("no principal; record subscription halted");
              if sender.send(Ok(RecordListSnapshot::empty())).await.is_err() {
                return;
              }
            }
          }
        }

        if !auth_open && subscription.is_none() && !retrying {
          return;
        }

        tokio::select! {
          changed = changes.changed(), if auth_open => {
            if changed.is_err() {
              auth_open = false;
            }
          }
          item = next_from(&mut subscription) => match item {
            Some(item) => {
              if let Some(id) = current.as_ref() {
                let item = item.map(|s| RecordListSnapshot::decode(id, s)).map_err(JournalError::from_backend);
                if sender.send(item).await.is_err() {
                  return;
                }
              }
            }
            None => subscription = None,
          },
          _ = tokio::time::sleep(retry_delay), if retrying => resubscribe = true,
          _ = sender.closed() => return,
        }
      }
    });

    RecordStream { receiver, task: Some(task) }
  }

  /// One-shot read of the signed-in principal's records
  pub async fn list(&self) -> JournalResult<Vec<BugRecord>> {
    let principal = self.session.require_principal()?;
    let documents =
      self.session.store().list(&CollectionPath::bugs(&principal)).await.map_err(JournalError::from_backend)?;
    Ok(documents.iter().map(BugRecord::from_document).collect())
  }

  /// Validate and write a new record; the store assigns the id
  pub async fn create(&self, mut draft: BugDraft) -> JournalResult<RecordId> {
    let principal = self.session.require_principal()?;
    draft.apply_word_limit(self.word_limit);
    draft.validate(self.profile)?;

    let fields = draft.to_fields(Utc::now());
    let id = self
      .session
      .store()
      .add(&CollectionPath::bugs(&principal), fields)
      .await
      .map_err(JournalError::from_backend)?;

    tracing::debug!(principal = %principal, record = %id, "record created");
    Ok(RecordId::new(id))
  }

  pub async fn delete(&self, id: &RecordId) -> JournalResult<()> {
    let principal = self.session.require_principal()?;
    self
      .session
      .store()
      .delete(&CollectionPath::bugs(&principal).document(id.as_str()))
      .await
      .map_err(JournalError::from_backend)?;

    tracing::debug!(principal = %principal, record = %id, "record deleted");
    Ok(())
  }

  pub async fn attach_suggestion(&self, id: &RecordId, text: &str) -> JournalResult<()> {
    let principal = self.session.require_principal()?;
    let mut fields = Fields::new();
    fields.insert(SUGGESTION_FIELD.into(), text.into());
    self
      .session
      .store()
      .update(&CollectionPath::bugs(&principal).document(id.as_str()), fields)
      .await
      .map_err(JournalError::from_backend)
  }

  /// Detail lookup by id
  pub async fn fetch(&self, id: &RecordId) -> JournalResult<Option<BugRecord>> {
    let principal = self.session.require_principal()?;
    let document = self
      .session
      .store()
      .get(&CollectionPath::bugs(&principal).document(id.as_str()))
      .await
      .map_err(JournalError::from_backend)?;
    Ok(document.as_ref().map(BugRecord::from_document))
  }
}

async fn next_from(subscription: &mut Option<Subscription>) -> Option<anyhow::Result<Snapshot>> {
  match subscription {
    Some(subscription) => subscription.next_snapshot().await,
    None => std::future::pending().await,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::record::Severity;
  use crate::session::Principal;
  use crate::store::{DocumentStore, MemoryStore, MockDocumentStore};
  use std::sync::Arc;

  fn principal(id: &str) -> Principal {
    Principal { id: PrincipalId::new(id), email: format!("{id}@example.com"), display_name: None }
  }

  fn draft(title: &str) -> BugDraft {
    BugDraft {
      title: title.into(),
      app_name: None,
      bug: "b".into(),
      severity: Severity::Medium,
      description: "d".into(),
      environment: "e".into(),
      steps: "s".into(),
      resolution: "r".into(),
      tags: vec![],
    }
  }

  #[tokio::test]
  async fn test_create_rejects_before_touching_store() {
    let mut store = MockDocumentStore::new();
    store.expect_add().never();
    let store: Arc<dyn DocumentStore> = Arc::new(store);

    let signed_out = BugStore::new(SessionContext::fixed(None, store.clone()));
    assert_eq!(signed_out.create(draft("x")).await.unwrap_err(), JournalError::NotAuthenticated);

    let signed_in = BugStore::new(SessionContext::fixed(Some(principal("u")), store));
    let mut blank = draft("x");
    blank.description = String::new();
    assert!(signed_in.create(blank).await.unwrap_err().is_validation());
  }

  #[tokio::test]
  async fn test_create_trims_long_fields() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let bugs = BugStore::new(SessionContext::fixed(Some(principal("u")), store)).with_word_limit(3);

    let mut long = draft("wordy");
    long.steps = "one two three four five".into();
    let id = bugs.create(long).await?;

    let record = bugs.fetch(&id).await?.unwrap();
    assert_eq!(record.steps, "one two three");
    assert_eq!(record.severity_level(), Some(Severity::Medium));
    Ok(())
  }

  #[tokio::test]
  async fn test_subscribe_without_principal_yields_one_empty_list() {
    let store = Arc::new(MemoryStore::new());
    let bugs = BugStore::new(SessionContext::fixed(None, store));

    let mut stream = bugs.subscribe_principal(None).await.unwrap();
    assert_eq!(stream.next_snapshot().await.unwrap().unwrap(), RecordListSnapshot::empty());
    assert!(stream.next_snapshot().await.is_none());
  }

  #[tokio::test]
  async fn test_subscription_failure_is_backend_error() {
    let store = MemoryStore::new();
    store.set_unavailable(Some("quota exceeded")).await;
    let bugs = BugStore::new(SessionContext::fixed(Some(principal("u")), Arc::new(store)));

    let error = bugs.subscribe_principal(Some(&PrincipalId::new("u"))).await.err().unwrap();
    assert_eq!(error, JournalError::backend("quota exceeded"));
  }

  #[tokio::test]
  async fn test_attach_suggestion_to_missing_record() {
    let store = Arc::new(MemoryStore::new());
    let bugs = BugStore::new(SessionContext::fixed(Some(principal("u")), store));

    let error = bugs.attach_suggestion(&RecordId::from("gone"), "text").await.unwrap_err();
    assert!(error.is_backend());
  }
}
