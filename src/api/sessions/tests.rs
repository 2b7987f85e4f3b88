use super::*;
use crate::server::state::testing::app_state;
use axum::http::StatusCode;

fn alice() -> RequireIdentity {
    RequireIdentity("alice".to_string())
}

fn bob() -> RequireIdentity {
    RequireIdentity("bob".to_string())
}

async fn create(state: &AppState, name: &str) -> Session {
    create_session(
        alice(),
        State(state.clone()),
        Json(CreateSessionRequest {
            name: Some(name.to_string()),
            mode: None,
        }),
    )
    .await
    .unwrap()
    .0
    .data
    .unwrap()
}

async fn share(state: &AppState, id: &str, mode: &str) -> ShareResponse {
    share_session(
        alice(),
        State(state.clone()),
        Path(id.to_string()),
        Json(ShareRequest {
            enable: true,
            mode: Some(mode.to_string()),
        }),
    )
    .await
    .unwrap()
    .0
    .data
    .unwrap()
}

#[tokio::test]
async fn test_create_and_list_sessions() {
    let (state, _dir) = app_state().await;

    let session = create(&state, "Test Session").await;
    assert_eq!(session.user, "alice");
    assert_eq!(session.mode, SessionMode::Local);

    let response = list_sessions(alice(), State(state.clone())).await.unwrap();
    assert!(response.0.success);
    let sessions = response.0.data.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session.name, "Test Session");
    assert!(sessions[0].viewer_count.is_none());

    let response = list_sessions(bob(), State(state)).await.unwrap();
    assert!(response.0.data.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_with_blank_name_and_invalid_mode() {
    let (state, _dir) = app_state().await;

    let session = create(&state, "").await;
    assert_eq!(session.name, format!("Session {}", &session.id[..6]));

    let err = create_session(
        alice(),
        State(state),
        Json(CreateSessionRequest {
            name: None,
            mode: Some("vm".to_string()),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_session_ownership() {
    let (state, _dir) = app_state().await;
    let session = create(&state, "mine").await;

    let response = get_session(alice(), State(state.clone()), Path(session.id.clone()))
        .await
        .unwrap();
    assert_eq!(response.0.data.unwrap().session.id, session.id);

    let err = get_session(bob(), State(state.clone()), Path(session.id))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);

    let err = get_session(alice(), State(state), Path("missing".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_last_session_is_null_without_sessions() {
    let (state, _dir) = app_state().await;

    let response = last_session(alice(), State(state.clone())).await.unwrap();
    assert!(response.0.success);
    assert!(response.0.data.unwrap().is_none());

    let session = create(&state, "latest").await;
    let response = last_session(alice(), State(state)).await.unwrap();
    assert_eq!(response.0.data.unwrap().unwrap().session.id, session.id);
}

#[tokio::test]
async fn test_rename_requires_name() {
    let (state, _dir) = app_state().await;
    let session = create(&state, "old").await;

    let err = rename_session(
        alice(),
        State(state.clone()),
        Path(session.id.clone()),
        Json(RenameRequest {
            name: Some("  ".to_string()),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);

    let err = rename_session(
        bob(),
        State(state.clone()),
        Path(session.id.clone()),
        Json(RenameRequest {
            name: Some("hijack".to_string()),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);

    let response = rename_session(
        alice(),
        State(state.clone()),
        Path(session.id.clone()),
        Json(RenameRequest {
            name: Some("new".to_string()),
        }),
    )
    .await
    .unwrap();
    let data = response.0.data.unwrap();
    assert_eq!(data.status, "renamed");
    assert_eq!(data.name, "new");
    assert_eq!(state.registry.get(&session.id).await.unwrap().name, "new");
}

#[tokio::test]
async fn test_delete_session() {
    let (state, _dir) = app_state().await;
    let session = create(&state, "doomed").await;

    let err = delete_session(bob(), State(state.clone()), Path(session.id.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);

    let response = delete_session(alice(), State(state.clone()), Path(session.id.clone()))
        .await
        .unwrap();
    assert_eq!(response.0.data.unwrap().status, "deleted");
    assert!(state.registry.get(&session.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_share_and_stop() {
    let (state, _dir) = app_state().await;
    let session = create(&state, "demo").await;

    let shared = share(&state, &session.id, "instructor").await;
    assert_eq!(shared.status, "live");
    let token = shared.share_token.unwrap();
    assert_eq!(shared.share_url.unwrap(), format!("/live/{token}"));
    assert_eq!(shared.mode, Some(PermissionMode::Instructor));

    let stored = state.registry.get_by_share_token(&token).await.unwrap();
    assert!(stored.is_live);
    assert_eq!(stored.permission_mode, PermissionMode::Instructor);

    let response = share_session(
        alice(),
        State(state.clone()),
        Path(session.id.clone()),
        Json(ShareRequest {
            enable: false,
            mode: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(response.0.data.unwrap().status, "stopped");
    assert!(!state.registry.get(&session.id).await.unwrap().is_live);
}

#[tokio::test]
async fn test_share_rejects_unknown_mode_and_non_owner() {
    let (state, _dir) = app_state().await;
    let session = create(&state, "demo").await;

    let err = share_session(
        alice(),
        State(state.clone()),
        Path(session.id.clone()),
        Json(ShareRequest {
            enable: true,
            mode: Some("everyone".to_string()),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);

    let err = share_session(
        bob(),
        State(state),
        Path(session.id),
        Json(ShareRequest {
            enable: true,
            mode: None,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_share_ended_session_conflicts() {
    let (state, _dir) = app_state().await;
    let session = create(&state, "demo").await;

    let response = end_session(alice(), State(state.clone()), Path(session.id.clone()))
        .await
        .unwrap();
    assert_eq!(response.0.data.unwrap().status, "ended");

    let err = end_session(alice(), State(state.clone()), Path(session.id.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::CONFLICT);

    let err = share_session(
        alice(),
        State(state),
        Path(session.id),
        Json(ShareRequest {
            enable: true,
            mode: None,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_end_refused_while_terminal_attached() {
    let (state, _dir) = app_state().await;
    let session = create(&state, "demo").await;
    let attachment = state.registry.attach(&session.id).await.unwrap();

    let err = end_session(alice(), State(state.clone()), Path(session.id.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::CONFLICT);

    let err = state.registry.attach(&session.id).await.unwrap_err();
    assert!(matches!(err, termcast_core::Error::Conflict(_)));
    assert!(state.registry.is_active(&session.id).await);

    state
        .registry
        .release(&session.id, attachment.claim)
        .await
        .unwrap();
    assert!(state.registry.get(&session.id).await.unwrap().is_ended());
}

#[tokio::test]
async fn test_session_data_visibility() {
    let (state, _dir) = app_state().await;
    let session = create(&state, "demo").await;
    state
        .registry
        .add_event(&session.id, termcast_replay::EventType::Output, b"hello")
        .await;

    let response = session_data(
        MaybeIdentity(Some("alice".to_string())),
        State(state.clone()),
        Path(session.id.clone()),
    )
    .await
    .unwrap();
    let events = response.0.data.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data, "hello");

    let err = session_data(MaybeIdentity(None), State(state.clone()), Path(session.id.clone()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);

    share(&state, &session.id, "view_only").await;
    let response = session_data(MaybeIdentity(None), State(state), Path(session.id))
        .await
        .unwrap();
    assert_eq!(response.0.data.unwrap().len(), 1);
}

#[tokio::test]
async fn test_permission_actions() {
    let (state, _dir) = app_state().await;
    let session = create(&state, "class").await;
    share(&state, &session.id, "instructor").await;

    let (viewer, _rx) = state.hub.join(&session.id, "student", false).await.unwrap();
    assert_eq!(state.hub.can_write(&viewer), Some(false));

    let response = update_permission(
        alice(),
        State(state.clone()),
        Path(session.id.clone()),
        Json(PermissionRequest {
            action: "grant".to_string(),
            mode: None,
            username: Some("student".to_string()),
        }),
    )
    .await
    .unwrap();
    let data = response.0.data.unwrap();
    assert_eq!(data.status, "granted");
    assert_eq!(data.applied, Some(true));
    assert_eq!(state.hub.can_write(&viewer), Some(true));

    let response = update_permission(
        alice(),
        State(state.clone()),
        Path(session.id.clone()),
        Json(PermissionRequest {
            action: "revoke".to_string(),
            mode: None,
            username: Some("student".to_string()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(response.0.data.unwrap().status, "revoked");
    assert_eq!(state.hub.can_write(&viewer), Some(false));

    let response = update_permission(
        alice(),
        State(state.clone()),
        Path(session.id.clone()),
        Json(PermissionRequest {
            action: "set_mode".to_string(),
            mode: Some("shared_control".to_string()),
            username: None,
        }),
    )
    .await
    .unwrap();
    let data = response.0.data.unwrap();
    assert_eq!(data.status, "updated");
    assert_eq!(data.mode, Some(PermissionMode::SharedControl));
    assert_eq!(state.hub.room_mode(&session.id), Some(PermissionMode::SharedControl));
    assert_eq!(
        state.registry.get(&session.id).await.unwrap().permission_mode,
        PermissionMode::SharedControl
    );
}

#[tokio::test]
async fn test_permission_bad_requests() {
    let (state, _dir) = app_state().await;
    let session = create(&state, "class").await;

    let requests = [
        ("set_mode", Some("root"), None),
        ("set_mode", None, None),
        ("grant", None, None),
        ("revoke", None, Some("")),
        ("promote", None, Some("student")),
    ];
    for (action, mode, username) in requests {
        let err = update_permission(
            alice(),
            State(state.clone()),
            Path(session.id.clone()),
            Json(PermissionRequest {
                action: action.to_string(),
                mode: mode.map(str::to_string),
                username: username.map(str::to_string),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST, "action {action}");
    }
}

#[tokio::test]
async fn test_viewers_owner_only() {
    let (state, _dir) = app_state().await;
    let session = create(&state, "demo").await;

    let response = list_viewers(alice(), State(state.clone()), Path(session.id.clone()))
        .await
        .unwrap();
    assert!(response.0.data.unwrap().is_empty());

    share(&state, &session.id, "view_only").await;
    let (_owner, _owner_rx) = state.hub.join(&session.id, "alice", true).await.unwrap();
    let (_viewer, _viewer_rx) = state.hub.join(&session.id, "guest_ab12cd", false).await.unwrap();

    let response = list_viewers(alice(), State(state.clone()), Path(session.id.clone()))
        .await
        .unwrap();
    let viewers = response.0.data.unwrap();
    assert_eq!(viewers.len(), 2);
    assert!(viewers.iter().any(|v| v.is_owner && v.username == "alice"));

    let listed = list_sessions(alice(), State(state.clone())).await.unwrap();
    assert_eq!(listed.0.data.unwrap()[0].viewer_count, Some(2));

    let err = list_viewers(bob(), State(state), Path(session.id))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::FORBIDDEN);
}
