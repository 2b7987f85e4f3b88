//! Tests for store module

use super::traits::MockEventStoreTrait;
use super::*;
use crate::error::Error;
use crate::event::{to_replay, EventType, NewEvent};
use crate::session::{PermissionMode, Session, SessionMode};
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

async fn store_with_session(id: &str, user: &str) -> EventStore {
    let store = EventStore::in_memory().await.unwrap();
    store
        .create_session(&Session::new(id, user, "Terminal 10:00:00", SessionMode::Local))
        .await
        .unwrap();
    store
}

#[test]
fn test_default_data_dir() {
    let dir = default_data_dir();
    assert!(dir.to_string_lossy().contains("termcast"));
    assert!(default_db_path().ends_with("sessions.db"));
}

#[tokio::test]
async fn test_in_memory_store() {
    let store = store_with_session("abc123", "alice").await;
    assert_eq!(store.name(), "sqlite");

    let session = store.get_session("abc123").await.unwrap();
    assert_eq!(session.user, "alice");
    assert_eq!(session.mode, SessionMode::Local);
    assert_eq!(session.permission_mode, PermissionMode::ViewOnly);
    assert!(!session.is_live);
    assert!(session.ended_at.is_none());
}

#[tokio::test]
async fn test_from_path_creates_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("sessions.db");
    let store = assert_ok!(EventStore::from_path(&path).await);
    assert!(path.exists());
    assert!(store.list_sessions("nobody").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_missing_session() {
    let store = EventStore::in_memory().await.unwrap();
    let err = assert_err!(store.get_session("missing").await);
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_list_newest_first() {
    let store = EventStore::in_memory().await.unwrap();
    let mut older = Session::new("old", "alice", "first", SessionMode::Local);
    older.created_at = Utc::now() - Duration::minutes(5);
    store.create_session(&older).await.unwrap();
    store
        .create_session(&Session::new("new", "alice", "second", SessionMode::Isolated))
        .await
        .unwrap();
    store
        .create_session(&Session::new("other", "bob", "third", SessionMode::Local))
        .await
        .unwrap();

    let sessions = store.list_sessions("alice").await.unwrap();
    let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["new", "old"]);

    let latest = store.latest_session("alice").await.unwrap().unwrap();
    assert_eq!(latest.id, "new");
    assert!(store.latest_session("carol").await.unwrap().is_none());
}

#[tokio::test]
async fn test_rename_requires_owner() {
    let store = store_with_session("s1", "alice").await;

    let err = store.rename_session("s1", "mallory", "pwned").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    store.rename_session("s1", "alice", "work").await.unwrap();
    assert_eq!(store.get_session("s1").await.unwrap().name, "work");
}

#[tokio::test]
async fn test_delete_cascades_events() {
    let store = store_with_session("s1", "alice").await;
    append_event(&store, &NewEvent::new("s1", EventType::Output, "hi"))
        .await
        .unwrap();

    assert!(store.delete_session("s1", "bob").await.is_err());
    assert!(store.get_session("s1").await.is_ok());

    store.delete_session("s1", "alice").await.unwrap();
    assert!(store.get_session("s1").await.is_err());
    assert_eq!(count_session_events(&store, "s1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_share_token_lookup_and_uniqueness() {
    let store = store_with_session("s1", "alice").await;
    store
        .create_session(&Session::new("s2", "alice", "b", SessionMode::Local))
        .await
        .unwrap();

    assert!(store
        .start_live("s1", "tok", PermissionMode::Instructor)
        .await
        .unwrap());
    let session = store.get_session_by_share_token("tok").await.unwrap();
    assert_eq!(session.id, "s1");
    assert!(session.is_live);
    assert_eq!(session.permission_mode, PermissionMode::Instructor);

    // The unique index rejects a reused token
    assert!(store
        .start_live("s2", "tok", PermissionMode::ViewOnly)
        .await
        .is_err());

    store.stop_live("s1").await.unwrap();
    assert!(!store.get_session("s1").await.unwrap().is_live);
}

#[tokio::test]
async fn test_start_live_refused_after_end() {
    let store = store_with_session("s1", "alice").await;
    store.end_session("s1", Utc::now(), 10).await.unwrap();
    assert!(!store
        .start_live("s1", "tok", PermissionMode::ViewOnly)
        .await
        .unwrap());
    assert!(store.start_live("nope", "tok2", PermissionMode::ViewOnly).await.is_err());
}

#[tokio::test]
async fn test_end_session_accumulates_duration() {
    let store = store_with_session("s1", "alice").await;
    store
        .start_live("s1", "tok", PermissionMode::ViewOnly)
        .await
        .unwrap();

    store.end_session("s1", Utc::now(), 1_500).await.unwrap();
    let session = store.get_session("s1").await.unwrap();
    assert!(session.is_ended());
    assert!(!session.is_live);
    assert_eq!(session.duration_ms, 1_500);

    store.reopen_session("s1").await.unwrap();
    assert!(store.get_session("s1").await.unwrap().ended_at.is_none());
    store.end_session("s1", Utc::now(), 500).await.unwrap();
    assert_eq!(store.get_session("s1").await.unwrap().duration_ms, 2_000);
}

#[tokio::test]
async fn test_events_ordered_by_time_then_insertion() {
    let store = store_with_session("s1", "alice").await;
    append_event(&store, &NewEvent::new("s1", EventType::Output, "b").at(200))
        .await
        .unwrap();
    append_event(&store, &NewEvent::new("s1", EventType::Output, "a").at(100))
        .await
        .unwrap();
    append_event(&store, &NewEvent::new("s1", EventType::Input, "c").at(200))
        .await
        .unwrap();

    let events = get_session_events(&store, "s1").await.unwrap();
    let data: Vec<Vec<u8>> = events.iter().map(|e| e.data.clone()).collect();
    assert_eq!(data, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

    let replay = to_replay(&events);
    assert_eq!(replay[0].timestamp, 0);
    assert_eq!(replay[2].timestamp, 100);
}

#[tokio::test]
async fn test_binary_payload_survives() {
    let store = store_with_session("s1", "alice").await;
    let payload = vec![0x1b, b'[', b'2', b'J', 0xff, 0x00];
    append_event(&store, &NewEvent::new("s1", EventType::Output, payload.clone()))
        .await
        .unwrap();
    let events = store.get_events("s1").await.unwrap();
    assert_eq!(events[0].data, payload);
}

#[tokio::test]
async fn test_sweep_closes_stale_sessions() {
    let store = store_with_session("stale", "alice").await;
    store
        .start_live("stale", "tok", PermissionMode::ViewOnly)
        .await
        .unwrap();
    store
        .create_session(&Session::new("running", "alice", "b", SessionMode::Local))
        .await
        .unwrap();
    store
        .create_session(&Session::new("done", "alice", "c", SessionMode::Local))
        .await
        .unwrap();
    store.end_session("done", Utc::now(), 1).await.unwrap();

    let attached: HashSet<String> = ["running".to_string()].into_iter().collect();
    let report = store.sweep_stale(&attached).await.unwrap();
    assert_eq!(report.closed, 1);

    let stale = store.get_session("stale").await.unwrap();
    assert!(!stale.is_live);
    assert!(stale.is_ended());
    assert!(store.get_session("running").await.unwrap().ended_at.is_none());
}

#[tokio::test]
async fn test_recorder_writes_in_order() {
    let store = store_with_session("s1", "alice").await;
    let recorder = EventRecorder::spawn(Arc::new(store.clone()), 8);

    for chunk in ["$ ", "ls\n", "file.txt\n"] {
        recorder
            .record("s1", EventType::Output, chunk.as_bytes())
            .await
            .unwrap();
    }
    recorder.flush().await.unwrap();

    let events = get_session_events(&store, "s1").await.unwrap();
    let joined: Vec<u8> = events.iter().flat_map(|e| e.data.clone()).collect();
    assert_eq!(joined, b"$ ls\nfile.txt\n");
    assert_eq!(recorder.written(), 3);
}

#[tokio::test]
async fn test_recorder_swallows_backend_errors() {
    let mut mock = MockEventStoreTrait::new();
    mock.expect_name().return_const("mock");
    mock.expect_append()
        .returning(|_| Err(Error::Database("disk full".to_string())));

    let recorder = EventRecorder::spawn(Arc::new(mock), 4);
    recorder
        .record("s1", EventType::Input, b"x")
        .await
        .unwrap();
    recorder.flush().await.unwrap();
    assert_eq!(recorder.failed(), 1);
    assert_eq!(recorder.written(), 0);
}

#[tokio::test]
async fn test_recorder_rejects_after_shutdown() {
    let store = store_with_session("s1", "alice").await;
    let recorder = EventRecorder::spawn(Arc::new(store), 4);
    recorder.shutdown().await;
    let err = recorder
        .record("s1", EventType::Output, b"late")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::QueueClosed));
}
