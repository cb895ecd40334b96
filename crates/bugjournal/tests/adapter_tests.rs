use anyhow::Result;
use bugjournal::auth::{AuthService, LocalAuth};
use bugjournal::store::{CollectionPath, DocumentStore, MemoryStore};
use bugjournal::{
  BugDraft, BugStore, JournalError, Principal, PrincipalId, RecordId, RecordListSnapshot, RecordStream,
  SessionContext, Severity, ValidationProfile,
};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn principal(id: &str) -> Principal {
  Principal { id: PrincipalId::new(id), email: format!("{id}@example.com"), display_name: Some(id.to_uppercase()) }
}

fn draft(title: &str) -> BugDraft {
  BugDraft {
    title: title.into(),
    app_name: Some("Journal".into()),
    bug: "Something broke".into(),
    severity: Severity::High,
    description: "It crashes".into(),
    environment: "Pixel 7".into(),
    steps: "Open it".into(),
    resolution: "None yet".into(),
    tags: vec!["startup".into()],
  }
}

async fn next(stream: &mut RecordStream) -> RecordListSnapshot {
  tokio::time::timeout(WAIT, stream.next_snapshot())
    .await
    .expect("timed out waiting for a snapshot")
    .expect("stream ended")
    .expect("snapshot failed")
}

/// Skip ahead until a snapshot satisfies `accept`
async fn next_matching(stream: &mut RecordStream, accept: impl Fn(&RecordListSnapshot) -> bool) -> RecordListSnapshot {
  loop {
    let snapshot = next(stream).await;
    if accept(&snapshot) {
      return snapshot;
    }
  }
}

async fn wait_for_listeners(store: &MemoryStore, path: &CollectionPath, expected: usize) -> usize {
  for _ in 0..100 {
    let count = store.listener_count(path).await;
    if count == expected {
      return count;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  store.listener_count(path).await
}

fn titles(snapshot: &RecordListSnapshot) -> Vec<&str> {
  snapshot.records.iter().map(|r| r.title.as_str()).collect()
}

#[tokio::test]
async fn test_delete_of_missing_record_is_backend_error_and_list_is_unchanged() -> Result<()> {
  let store = Arc::new(MemoryStore::new());
  let bugs = BugStore::new(SessionContext::fixed(Some(principal("u1")), store.clone()));
  bugs.create(draft("Crash on launch")).await?;

  let mut stream = bugs.subscribe_principal(Some(&PrincipalId::new("u1"))).await?;
  let before = next(&mut stream).await;
  assert_eq!(titles(&before), vec!["Crash on launch"]);

  let error = bugs.delete(&RecordId::from("does-not-exist")).await.unwrap_err();
  assert!(error.is_backend(), "unexpected error: {error:?}");

  // No snapshot follows a failed delete
  let quiet = tokio::time::timeout(Duration::from_millis(100), stream.next_snapshot()).await;
  assert!(quiet.is_err());
  Ok(())
}

#[tokio::test]
async fn test_blank_description_is_rejected_before_the_store() -> Result<()> {
  let store = Arc::new(MemoryStore::new());
  // Any store call would now fail with a backend error
  store.set_unavailable(Some("network down")).await;
  let bugs = BugStore::new(SessionContext::fixed(Some(principal("u1")), store.clone()));

  let mut blank = draft("No description");
  blank.description = "  \n ".into();
  let error = bugs.create(blank).await.unwrap_err();
  assert!(error.is_validation(), "unexpected error: {error:?}");
  assert!(error.to_string().contains("description"));

  store.set_unavailable(None).await;
  assert_eq!(store.document_count(&CollectionPath::bugs(&PrincipalId::new("u1"))).await, 0);
  Ok(())
}

#[tokio::test]
async fn test_create_without_principal() {
  let bugs = BugStore::new(SessionContext::fixed(None, Arc::new(MemoryStore::new())));
  assert_eq!(bugs.create(draft("x")).await.unwrap_err(), JournalError::NotAuthenticated);
  assert_eq!(bugs.delete(&RecordId::from("x")).await.unwrap_err(), JournalError::NotAuthenticated);
}

#[tokio::test]
async fn test_strict_profile_needs_app_name() -> Result<()> {
  let bugs = BugStore::new(SessionContext::fixed(Some(principal("u1")), Arc::new(MemoryStore::new())))
    .with_profile(ValidationProfile::Strict);

  let mut nameless = draft("Nameless");
  nameless.app_name = Some("   ".into());
  assert!(bugs.create(nameless).await.unwrap_err().is_validation());

  bugs.create(draft("Named")).await?;
  Ok(())
}

#[tokio::test]
async fn test_created_record_arrives_through_subscription() -> Result<()> {
  let store = Arc::new(MemoryStore::new());
  let bugs = BugStore::new(SessionContext::fixed(Some(principal("u1")), store));
  let mut stream = bugs.subscribe_principal(Some(&PrincipalId::new("u1"))).await?;
  assert!(next(&mut stream).await.records.is_empty());

  let id = bugs.create(draft("Crash on launch")).await?;
  let snapshot = next(&mut stream).await;
  assert_eq!(snapshot.principal, Some(PrincipalId::new("u1")));
  assert_eq!(snapshot.records.len(), 1);
  assert_eq!(snapshot.records[0].id, id);
  assert_eq!(snapshot.records[0].severity, "High");
  assert!(snapshot.records[0].timestamp.timestamp_millis() > 0);

  bugs.attach_suggestion(&id, "Check the launcher intent").await?;
  let updated = next(&mut stream).await;
  assert_eq!(updated.records[0].ai_suggestion.as_deref(), Some("Check the launcher intent"));

  bugs.delete(&id).await?;
  assert!(next(&mut stream).await.records.is_empty());
  Ok(())
}

#[tokio::test]
async fn test_records_are_scoped_per_principal() -> Result<()> {
  let store = Arc::new(MemoryStore::new());
  let alice = BugStore::new(SessionContext::fixed(Some(principal("alice")), store.clone()));
  let bob = BugStore::new(SessionContext::fixed(Some(principal("bob")), store.clone()));

  let id = alice.create(draft("Alice's bug")).await?;
  assert!(bob.list().await?.is_empty());
  assert!(bob.fetch(&id).await?.is_none());
  assert!(bob.delete(&id).await.unwrap_err().is_backend());
  assert_eq!(alice.list().await?.len(), 1);
  Ok(())
}

#[tokio::test]
async fn test_dropping_stream_releases_listener() -> Result<()> {
  let store = Arc::new(MemoryStore::new());
  let bugs = BugStore::new(SessionContext::fixed(Some(principal("u1")), store.clone()));
  let path = CollectionPath::bugs(&PrincipalId::new("u1"));

  let mut stream = bugs.subscribe_principal(Some(&PrincipalId::new("u1"))).await?;
  next(&mut stream).await;
  assert_eq!(store.listener_count(&path).await, 1);

  drop(stream);
  assert_eq!(wait_for_listeners(&store, &path, 0).await, 0);
  Ok(())
}

#[tokio::test]
async fn test_watch_follows_sign_in_switch_and_sign_out() -> Result<()> {
  let store = Arc::new(MemoryStore::new());
  let auth = LocalAuth::new();
  let alice_path = CollectionPath::bugs(&PrincipalId::new("alice"));
  let bob_path = CollectionPath::bugs(&PrincipalId::new("bob"));

  BugStore::new(SessionContext::fixed(Some(principal("alice")), store.clone())).create(draft("Alice 1")).await?;
  BugStore::new(SessionContext::fixed(Some(principal("bob")), store.clone())).create(draft("Bob 1")).await?;

  let bugs = BugStore::new(SessionContext::new(auth.watch(), store.clone()));
  let mut stream = bugs.watch();

  // Nobody signed in: one empty list and no listener
  assert_eq!(next(&mut stream).await, RecordListSnapshot::empty());
  assert_eq!(store.listener_count(&alice_path).await, 0);

  auth.set_principal(Some(principal("alice")));
  let alice = next_matching(&mut stream, |s| s.principal.is_some()).await;
  assert_eq!(titles(&alice), vec!["Alice 1"]);

  auth.set_principal(Some(principal("bob")));
  let bob = next_matching(&mut stream, |s| s.principal == Some(PrincipalId::new("bob"))).await;
  assert_eq!(titles(&bob), vec!["Bob 1"]);
  assert_eq!(wait_for_listeners(&store, &alice_path, 0).await, 0);
  assert_eq!(store.listener_count(&bob_path).await, 1);

  auth.set_principal(None);
  let signed_out = next_matching(&mut stream, |s| s.principal.is_none()).await;
  assert!(signed_out.records.is_empty());
  assert_eq!(wait_for_listeners(&store, &bob_path, 0).await, 0);

  // Writes for a signed-out principal produce nothing on the stream
  BugStore::new(SessionContext::fixed(Some(principal("bob")), store.clone())).create(draft("Bob 2")).await?;
  let quiet = tokio::time::timeout(Duration::from_millis(100), stream.next_snapshot()).await;
  assert!(quiet.is_err());
  Ok(())
}

#[tokio::test]
async fn test_watch_with_fixed_session_keeps_streaming() -> Result<()> {
  let store = Arc::new(MemoryStore::new());
  let bugs = BugStore::new(SessionContext::fixed(Some(principal("u1")), store.clone()));
  let mut stream = bugs.watch();
  assert!(next(&mut stream).await.records.is_empty());

  bugs.create(draft("Later")).await?;
  assert_eq!(titles(&next(&mut stream).await), vec!["Later"]);
  Ok(())
}

#[tokio::test]
async fn test_watch_reports_subscription_failure() {
  let store = Arc::new(MemoryStore::new());
  store.set_unavailable(Some("permission denied")).await;
  let bugs = BugStore::new(SessionContext::fixed(Some(principal("u1")), store.clone()));

  let mut stream = bugs.watch();
  let item = tokio::time::timeout(WAIT, stream.next_snapshot()).await.unwrap().unwrap();
  assert_eq!(item.unwrap_err(), JournalError::backend("permission denied"));
}

#[tokio::test]
async fn test_watch_recovers_once_the_store_is_back() -> Result<()> {
  let store = Arc::new(MemoryStore::new());
  store.set_unavailable(Some("unavailable")).await;
  let bugs = BugStore::new(SessionContext::fixed(Some(principal("u1")), store.clone()))
    .with_retry_delay(Duration::from_millis(20));

  let mut stream = bugs.watch();
  let first = tokio::time::timeout(WAIT, stream.next_snapshot()).await?.expect("stream ended");
  assert!(first.unwrap_err().is_backend());

  store.set_unavailable(None).await;
  let recovered = loop {
    match tokio::time::timeout(WAIT, stream.next_snapshot()).await?.expect("stream ended") {
      Ok(snapshot) => break snapshot,
      Err(error) => assert!(error.is_backend()),
    }
  };
  assert_eq!(recovered.principal, Some(PrincipalId::new("u1")));
  assert!(recovered.records.is_empty());

  bugs.create(draft("After recovery")).await?;
  assert_eq!(titles(&next(&mut stream).await), vec!["After recovery"]);
  Ok(())
}

#[tokio::test]
async fn test_store_documents_decode_with_legacy_fields() -> Result<()> {
  let store = Arc::new(MemoryStore::new());
  let path = CollectionPath::bugs(&PrincipalId::new("u1"));
  let legacy = serde_json::json!({ "title": "Old", "appname": "v1 app", "severity": "medium", "tags": "a,b" });
  let serde_json::Value::Object(fields) = legacy else { unreachable!() };
  store.add(&path, fields).await?;

  let bugs = BugStore::new(SessionContext::fixed(Some(principal("u1")), store));
  let records = bugs.list().await?;
  assert_eq!(records[0].app_name.as_deref(), Some("v1 app"));
  assert_eq!(records[0].severity_level(), Some(Severity::Medium));
  assert_eq!(records[0].tags, vec!["a", "b"]);
  Ok(())
}
