//! View-owned journal state
//!
//! [`JournalView`] holds everything a screen renders: the latest record list,
//! the filter, a loading flag and one in-flight flag per kind of operation.
//! Operations run on spawned tasks and report back through a channel the view
//! owns, so all state changes happen inside [`JournalView::next_event`].

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::adapter::{BugStore, RecordListSnapshot, RecordStream};
use crate::error::{JournalError, JournalResult};
use crate::filter::{filter_records, FilterState, SeverityFilter};
use crate::record::{BugDraft, BugRecord, RecordId};
use crate::session::{Principal, PrincipalId};
use crate::suggestion::{suggest_for, SuggestionGenerator};

const COMPLETION_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InFlight {
  Adding,
  Deleting,
  FetchingSuggestion,
  SavingSuggestion,
}

impl InFlight {
  pub fn label(&self) -> &'static str {
    match self {
      InFlight::Adding => "Adding a bug",
      InFlight::Deleting => "Deleting a bug",
      InFlight::FetchingSuggestion => "Fetching a suggestion",
      InFlight::SavingSuggestion => "Saving a suggestion",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
  Info,
  Success,
  Error,
}

/// Short-lived message for the user, like a toast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
  pub level: NoticeLevel,
  pub message: String,
}

impl Notice {
  fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
    Self { level, message: message.into() }
  }
}

/// Suggestion text waiting to be saved onto its record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSuggestion {
  pub record: RecordId,
  pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEvent {
  /// A new record list replaced the old one
  Records,
  /// An operation finished and its flag was cleared
  Completed(InFlight),
  /// A different user signed in or out; the old list is gone and the view
  /// is loading again
  PrincipalChanged,
}

enum Completion {
  Added(JournalResult<RecordId>),
  Deleted(RecordId, JournalResult<()>),
  Suggested(Option<PrincipalId>, RecordId, String),
  SuggestionSaved(RecordId, JournalResult<()>),
}

pub struct JournalView {
  bugs: BugStore,
  generator: Option<Arc<dyn SuggestionGenerator>>,
  session: watch::Receiver<Option<Principal>>,
  session_open: bool,
  /// Whose records are currently held
  principal: Option<PrincipalId>,
  records: Vec<BugRecord>,
  filter: FilterState,
  loading: bool,
  in_flight: HashSet<InFlight>,
  notices: VecDeque<Notice>,
  pending_suggestion: Option<PendingSuggestion>,
  stream: Option<RecordStream>,
  completion_tx: mpsc::Sender<Completion>,
  completion_rx: mpsc::Receiver<Completion>,
}

impl JournalView {
  /// Start following the session's records; must run inside a tokio runtime
  pub fn new(bugs: BugStore) -> Self {
    let stream = bugs.watch();
    let mut session = bugs.session().principal_changes();
    session.borrow_and_update();
    let (completion_tx, completion_rx) = mpsc::channel(COMPLETION_CAPACITY);
    Self {
      bugs,
      generator: None,
      session,
      session_open: true,
      principal: None,
      records: Vec::new(),
      filter: FilterState::default(),
      loading: true,
      in_flight: HashSet::new(),
      notices: VecDeque::new(),
      pending_suggestion: None,
      stream: Some(stream),
      completion_tx,
      completion_rx,
    }
  }

  pub fn with_generator(mut self, generator: Arc<dyn SuggestionGenerator>) -> Self {
    self.generator = Some(generator);
    self
  }

  pub fn records(&self) -> &[BugRecord] {
    &self.records
  }

  pub fn visible(&self) -> Vec<&BugRecord> {
    filter_records(&self.records, &self.filter)
  }

  pub fn record(&self, id: &RecordId) -> Option<&BugRecord> {
    self.records.iter().find(|record| &record.id == id)
  }

  pub fn filter(&self) -> &FilterState {
    &self.filter
  }

  pub fn set_severity(&mut self, severity: SeverityFilter) {
    self.filter.severity = severity;
  }

  pub fn set_query(&mut self, query: impl Into<String>) {
    self.filter.query = query.into();
  }

  /// True until the first list (or list failure) arrives, and again after
  /// the signed-in user changes until their list arrives
  pub fn is_loading(&self) -> bool {
    self.loading
  }

  pub fn is_in_flight(&self, operation: InFlight) -> bool {
    self.in_flight.contains(&operation)
  }

  pub fn pending_suggestion(&self) -> Option<&PendingSuggestion> {
    self.pending_suggestion.as_ref()
  }

  pub fn take_notices(&mut self) -> Vec<Notice> {
    self.notices.drain(..).collect()
  }

  fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
    self.notices.push_back(Notice::new(level, message));
  }

  /// Claim the flag for `operation`, or leave a notice if it is already held
  fn begin(&mut self, operation: InFlight) -> bool {
    if !self.in_flight.insert(operation) {
      self.notify(NoticeLevel::Info, format!("{} is already in progress", operation.label()));
      return false;
    }
    true
  }

  pub fn spawn_add(&mut self, draft: BugDraft) -> bool {
    if !self.begin(InFlight::Adding) {
      return false;
    }
    let bugs = self.bugs.clone();
    let done = self.completion_tx.clone();
    tokio::spawn(async move {
      let result = bugs.create(draft).await;
      let _ = done.send(Completion::Added(result)).await;
    });
    true
  }

  pub fn spawn_delete(&mut self, id: RecordId) -> bool {
    if !self.begin(InFlight::Deleting) {
      return false;
    }
    let bugs = self.bugs.clone();
    let done = self.completion_tx.clone();
    tokio::spawn(async move {
      let result = bugs.delete(&id).await;
      let _ = done.send(Completion::Deleted(id, result)).await;
    });
    true
  }

  /// Request a suggestion for a listed record. A record that already carries
  /// one has it staged directly without calling the generator.
  pub fn spawn_suggestion(&mut self, id: &RecordId) -> bool {
    let Some(record) = self.record(id).cloned() else {
      self.notify(NoticeLevel::Error, "Bug not found");
      return false;
    };
    if let Some(text) = record.ai_suggestion.clone() {
      self.pending_suggestion = Some(PendingSuggestion { record: record.id, text });
      return false;
    }
    let Some(generator) = self.generator.clone() else {
      self.notify(NoticeLevel::Error, "Suggestions are not configured");
      return false;
    };
    if !self.begin(InFlight::FetchingSuggestion) {
      return false;
    }

    let owner = self.principal.clone();
    let done = self.completion_tx.clone();
    tokio::spawn(async move {
      let text = suggest_for(generator.as_ref(), &record).await;
      let _ = done.send(Completion::Suggested(owner, record.id, text)).await;
    });
    true
  }

  /// Persist the staged suggestion onto its record
  pub fn spawn_save_suggestion(&mut self) -> bool {
    let Some(pending) = self.pending_suggestion.clone() else {
      self.notify(NoticeLevel::Info, "No suggestion to save");
      return false;
    };
    if !self.begin(InFlight::SavingSuggestion) {
      return false;
    }
    let bugs = self.bugs.clone();
    let done = self.completion_tx.clone();
    tokio::spawn(async move {
      let result = bugs.attach_suggestion(&pending.record, &pending.text).await;
      let _ = done.send(Completion::SuggestionSaved(pending.record, result)).await;
    });
    true
  }

  /// Wait for the next list or operation outcome and apply it.
  ///
  /// Returns `None` once the list feed has ended and nothing is in flight.
  pub async fn next_event(&mut self) -> Option<ViewEvent> {
    loop {
      if self.stream.is_none() && self.in_flight.is_empty() {
        return None;
      }
      tokio::select! {
        item = next_list(&mut self.stream) => match item {
          Some(item) => {
            if self.apply_snapshot(item) {
              return Some(ViewEvent::Records);
            }
          }
          None => self.stream = None,
        },
        Some(completion) = self.completion_rx.recv() => {
          return Some(ViewEvent::Completed(self.apply_completion(completion)));
        }
        changed = self.session.changed(), if self.session_open => {
          if changed.is_err() {
            self.session_open = false;
          } else {
            let signed_in = self.session.borrow_and_update().as_ref().map(|p| p.id.clone());
            if signed_in != self.principal {
              self.switch_principal(signed_in);
              return Some(ViewEvent::PrincipalChanged);
            }
          }
        }
      }
    }
  }

  /// Forget everything that belonged to the previous user
  fn switch_principal(&mut self, principal: Option<PrincipalId>) {
    tracing::debug!(principal = ?principal, "view principal changed");
    self.principal = principal;
    self.records.clear();
    self.pending_suggestion = None;
    self.loading = true;
  }

  /// Apply a list update; returns false for a list that belongs to someone
  /// other than the signed-in user
  fn apply_snapshot(&mut self, item: JournalResult<RecordListSnapshot>) -> bool {
    match item {
      Ok(snapshot) => {
        let signed_in = self.session.borrow().as_ref().map(|p| p.id.clone());
        if snapshot.principal != signed_in {
          tracing::debug!(principal = ?snapshot.principal, "dropping list for a previous user");
          return false;
        }
        if snapshot.principal != self.principal {
          self.switch_principal(snapshot.principal.clone());
        }
        self.loading = false;
        self.records = snapshot.records;
      }
      Err(error) => {
        self.loading = false;
        self.notify(NoticeLevel::Error, error.to_string());
      }
    }
    true
  }

  fn apply_completion(&mut self, completion: Completion) -> InFlight {
    let operation = match completion {
      Completion::Added(result) => {
        match result {
          Ok(_) => self.notify(NoticeLevel::Success, "Bug added"),
          Err(error) => self.notify(NoticeLevel::Error, failure_message(&error, "Failed to add bug")),
        }
        InFlight::Adding
      }
      Completion::Deleted(id, result) => {
        match result {
          Ok(()) => {
            if self.pending_suggestion.as_ref().is_some_and(|p| p.record == id) {
              self.pending_suggestion = None;
            }
            self.notify(NoticeLevel::Success, "Bug deleted");
          }
          Err(error) => self.notify(NoticeLevel::Error, failure_message(&error, "Failed to delete bug")),
        }
        InFlight::Deleting
      }
      Completion::Suggested(owner, id, text) => {
        // Drop results for a user who has since signed out or a record that is gone
        if owner == self.principal && self.record(&id).is_some() {
          self.pending_suggestion = Some(PendingSuggestion { record: id, text });
        }
        InFlight::FetchingSuggestion
      }
      Completion::SuggestionSaved(id, result) => {
        match result {
          Ok(()) => {
            if self.pending_suggestion.as_ref().is_some_and(|p| p.record == id) {
              self.pending_suggestion = None;
            }
            self.notify(NoticeLevel::Success, "Saved");
          }
          Err(error) => self.notify(NoticeLevel::Error, failure_message(&error, "Failed to save")),
        }
        InFlight::SavingSuggestion
      }
    };
    self.in_flight.remove(&operation);
    operation
  }
}

/// Validation and sign-in problems are shown as-is; backend failures get a
/// generic headline with the cause attached
fn failure_message(error: &JournalError, headline: &str) -> String {
  match error {
    JournalError::Validation { .. } | JournalError::NotAuthenticated => error.to_string(),
    other => {
      tracing::warn!("{headline}: {other}");
      format!("{headline}: {other}")
    }
  }
}

async fn next_list(stream: &mut Option<RecordStream>) -> Option<JournalResult<RecordListSnapshot>> {
  match stream {
    Some(stream) => stream.next_snapshot().await,
    None => std::future::pending().await,
  }
}
