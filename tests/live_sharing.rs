//! Integration tests for live sharing
//!
//! Share tokens issued through the hub are resolved through the registry the
//! way the `/ws/live` endpoint does, then members interact through the hub.

use std::sync::Arc;

use serde_json::json;
use termcast_core::live::{Frame, MessageKind};
use termcast_core::{ClientMessage, LiveConfig, LiveHub, LiveMessage, SessionRegistry};
use termcast_replay::{PermissionMode, Session, SessionMode};
use tokio::sync::mpsc;

async fn shared(mode: PermissionMode) -> (Arc<SessionRegistry>, LiveHub, Session, String) {
    let registry = Arc::new(SessionRegistry::in_memory().await.unwrap());
    let hub = LiveHub::new(registry.clone(), LiveConfig::default());
    let session = registry
        .create("alice", "workshop", SessionMode::Local)
        .await
        .unwrap();
    let token = hub.start_sharing(&session.id, mode).await.unwrap();
    (registry, hub, session, token)
}

fn drain(rx: &mut mpsc::Receiver<Frame>) -> Vec<LiveMessage> {
    let mut messages = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        messages.push(LiveMessage::from_frame(&frame).unwrap());
    }
    messages
}

fn count(messages: &[LiveMessage], kind: MessageKind) -> usize {
    messages.iter().filter(|m| m.kind == kind).count()
}

#[tokio::test]
async fn test_view_only_link_never_forwards_input() {
    let (registry, hub, session, token) = shared(PermissionMode::ViewOnly).await;

    let joined = registry.get_by_share_token(&token).await.unwrap();
    assert_eq!(joined.id, session.id);
    assert!(joined.is_live);

    let (_owner, mut owner_rx) = hub.join(&session.id, "alice", true).await.unwrap();
    let (viewer, _viewer_rx) = hub.join(&session.id, "guest_1a2b3c", false).await.unwrap();
    drain(&mut owner_rx);

    for data in ["ls\n", "rm -rf ~\n"] {
        let text = json!({"type": "input", "data": data}).to_string();
        let message = ClientMessage::parse(&text).unwrap();
        hub.handle_client_message(&viewer, message).await;
    }
    // A viewer cannot grant itself access either
    let text = json!({"type": "permission_grant", "data": {"username": "guest_1a2b3c"}}).to_string();
    hub.handle_client_message(&viewer, ClientMessage::parse(&text).unwrap())
        .await;

    assert_eq!(count(&drain(&mut owner_rx), MessageKind::Input), 0);
    assert_eq!(hub.can_write(&viewer), Some(false));
}

#[tokio::test]
async fn test_shared_control_viewers_type_without_grant() {
    let (_registry, hub, session, _token) = shared(PermissionMode::SharedControl).await;
    let (_owner, mut owner_rx) = hub.join(&session.id, "alice", true).await.unwrap();
    let (bob, _bob_rx) = hub.join(&session.id, "bob", false).await.unwrap();
    let (carol, _carol_rx) = hub.join(&session.id, "carol", false).await.unwrap();
    drain(&mut owner_rx);

    assert_eq!(hub.can_write(&bob), Some(true));
    assert_eq!(hub.can_write(&carol), Some(true));
    assert!(hub.forward_input(&bob, json!("whoami\n")));
    assert!(hub.forward_input(&carol, json!("date\n")));

    let inputs: Vec<(Option<String>, serde_json::Value)> = drain(&mut owner_rx)
        .into_iter()
        .filter(|m| m.kind == MessageKind::Input)
        .map(|m| (m.sender, m.data))
        .collect();
    assert_eq!(
        inputs,
        vec![
            (Some("bob".to_string()), json!("whoami\n")),
            (Some("carol".to_string()), json!("date\n")),
        ]
    );
}

#[tokio::test]
async fn test_instructor_grant_and_revoke_by_owner() {
    let (_registry, hub, session, _token) = shared(PermissionMode::Instructor).await;
    let (owner, mut owner_rx) = hub.join(&session.id, "alice", true).await.unwrap();
    let (student, mut student_rx) = hub.join(&session.id, "student", false).await.unwrap();
    drain(&mut owner_rx);
    drain(&mut student_rx);

    hub.handle_client_message(&student, ClientMessage::PermissionRequest)
        .await;
    assert_eq!(count(&drain(&mut owner_rx), MessageKind::PermissionRequest), 1);

    let grant = json!({"type": "permission_grant", "data": {"username": "student"}}).to_string();
    hub.handle_client_message(&owner, ClientMessage::parse(&grant).unwrap())
        .await;
    assert_eq!(hub.can_write(&student), Some(true));
    assert_eq!(count(&drain(&mut student_rx), MessageKind::PermissionGrant), 1);

    let deny = json!({"type": "permission_deny", "data": {"username": "student"}}).to_string();
    hub.handle_client_message(&owner, ClientMessage::parse(&deny).unwrap())
        .await;
    assert_eq!(hub.can_write(&student), Some(false));
    assert!(!hub.forward_input(&student, json!("ls\n")));
}

#[tokio::test]
async fn test_room_recreated_with_persisted_mode() {
    let (registry, hub, session, _token) = shared(PermissionMode::ViewOnly).await;

    let (viewer, _rx) = hub.join(&session.id, "bob", false).await.unwrap();
    assert!(hub.has_room(&session.id));
    hub.leave(&viewer).await;
    assert!(!hub.has_room(&session.id));
    assert!(hub.viewers(&session.id).is_none());

    // Mode changes while nobody watches are persisted, not cached
    hub.set_permission_mode(&session.id, PermissionMode::SharedControl)
        .await
        .unwrap();
    assert!(!hub.has_room(&session.id));
    assert_eq!(
        registry.get(&session.id).await.unwrap().permission_mode,
        PermissionMode::SharedControl
    );

    let (viewer, _rx) = hub.join(&session.id, "bob", false).await.unwrap();
    assert_eq!(hub.room_mode(&session.id), Some(PermissionMode::SharedControl));
    assert_eq!(hub.can_write(&viewer), Some(true));
}

#[tokio::test]
async fn test_replay_buffer_keeps_latest_bytes() {
    let (_registry, hub, session, _token) = shared(PermissionMode::ViewOnly).await;
    let (_viewer, _rx) = hub.join(&session.id, "bob", false).await.unwrap();

    let payload: Vec<u8> = (0..60_000u32).map(|i| b'a' + (i % 26) as u8).collect();
    for byte in &payload {
        hub.broadcast_output(&session.id, std::slice::from_ref(byte));
    }

    let buffer = hub.replay_buffer(&session.id).unwrap();
    assert_eq!(buffer.len(), 50_000);
    assert_eq!(buffer.as_slice(), &payload[10_000..]);
}

#[tokio::test]
async fn test_late_joiner_receives_replay() {
    let (_registry, hub, session, _token) = shared(PermissionMode::ViewOnly).await;
    let (_owner, _owner_rx) = hub.join(&session.id, "alice", true).await.unwrap();
    hub.broadcast_output(&session.id, b"$ make\r\n");
    hub.broadcast_output(&session.id, b"ok\r\n");

    let (_late, mut late_rx) = hub.join(&session.id, "bob", false).await.unwrap();
    let messages = drain(&mut late_rx);
    let output: Vec<_> = messages
        .iter()
        .filter(|m| m.kind == MessageKind::Output)
        .collect();
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].data, json!("$ make\r\nok\r\n"));
}
