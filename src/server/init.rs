//! Server initialization
//!
//! Opens the session database, builds the shared services and the router,
//! and runs the HTTP server until a shutdown signal.

use super::config::AppConfig;
use super::state::AppState;
use anyhow::{Context, Result};
use axum::{routing::get, Extension, Router};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use termcast_core::shutdown::shutdown_signal_with_controller;
use termcast_core::{
    CommandHistory, CookieIdentity, DockerRuntime, Identity, LiveHub, SessionRegistry,
    ShutdownController, TerminalBridge,
};
use termcast_replay::{EventRecorder, EventStore};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

/// Open the session database and its event writer
pub async fn open_registry(config: &AppConfig) -> Result<Arc<SessionRegistry>> {
    let db_path = config.storage.database_path();
    let store = EventStore::from_path(&db_path)
        .await
        .context("Failed to initialize SQLite event store")?;
    let recorder = EventRecorder::spawn(
        Arc::new(store.clone()),
        config.storage.write_queue_capacity,
    );
    info!(
        "Event writer started (queue capacity: {})",
        config.storage.write_queue_capacity
    );
    Ok(Arc::new(SessionRegistry::new(store, Arc::new(recorder))))
}

/// Build the services handlers share
pub async fn build_state(config: &AppConfig, registry: Arc<SessionRegistry>) -> Result<AppState> {
    let hub = Arc::new(LiveHub::new(registry.clone(), config.live.to_live_config()));
    info!(
        "Live hub initialized (replay buffer: {} bytes)",
        config.live.replay_buffer_bytes
    );

    let container = &config.container;
    let runtime = DockerRuntime::new(&container.docker_binary, &container.image, &container.hostname);
    if container.enabled {
        runtime.detect().await;
    } else {
        info!("Isolated mode disabled by configuration");
    }

    let bridge = Arc::new(TerminalBridge::new(
        registry.clone(),
        hub.clone(),
        Arc::new(runtime),
        config.terminal.to_terminal_config(),
    ));

    let identity = Arc::new(CookieIdentity::new(
        &config.auth.users,
        config.auth.token_ttl_hours,
    ));
    if identity.user_count() == 0 {
        warn!("No accounts configured; terminals run as the guest user");
    } else {
        info!("Identity initialized with {} accounts", identity.user_count());
    }

    let history_path = config.history.path();
    let history = Arc::new(
        CommandHistory::open(&history_path, config.history.max_items)
            .await
            .with_context(|| format!("Failed to open command history {}", history_path.display()))?,
    );

    let shutdown = ShutdownController::new(Duration::from_secs(config.server.shutdown_timeout_secs));
    info!(
        "Shutdown controller initialized (timeout: {}s)",
        config.server.shutdown_timeout_secs
    );

    Ok(AppState {
        registry,
        hub,
        bridge,
        identity,
        history,
        shutdown,
        ping_interval: config.live.ping_interval(),
    })
}

/// Build the main router with all endpoints
pub fn build_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let identity: Arc<dyn Identity> = state.identity.clone();

    let app = Router::new()
        // Health endpoints
        .merge(crate::api::health_routes(state.clone()))
        // API routes (identity checked per-handler via extractors)
        .merge(crate::api::api_router(state.clone()))
        // WebSocket routes
        .merge(crate::websocket::websocket_router(state))
        .layer(Extension(identity))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    match static_dir {
        Some(dir) if dir.exists() => {
            info!("Web UI enabled: serving from {}", dir.display());
            let serve_dir = ServeDir::new(dir)
                .append_index_html_on_directories(true)
                .fallback(tower_http::services::ServeFile::new(dir.join("index.html")));
            app.fallback_service(serve_dir)
        }
        other => {
            if let Some(dir) = other {
                warn!("Static directory {} not found", dir.display());
            }
            app.route("/", get(|| async { "Termcast" }))
        }
    }
}

/// Run the server until SIGINT/SIGTERM, then drain
pub async fn run(config: AppConfig) -> Result<()> {
    info!("Starting Termcast v{}", env!("CARGO_PKG_VERSION"));

    let registry = open_registry(&config).await?;
    let report = registry
        .sweep_stale()
        .await
        .context("Failed to close stale sessions")?;
    if report.closed > 0 {
        info!("Closed {} sessions left open by a previous run", report.closed);
    }

    let state = build_state(&config, registry.clone()).await?;
    let shutdown = state.shutdown.clone();
    let app = build_router(state, config.server.static_dir.as_deref());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_controller(shutdown.clone()))
        .await
        .context("HTTP server error")?;

    let remaining = shutdown.shutdown().await;
    if remaining > 0 {
        warn!("{} connections did not close in time", remaining);
    }
    let ended = registry.end_all().await;
    info!("Ended {} remaining sessions", ended);
    registry.recorder().shutdown().await;

    info!("Termcast shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_registry_and_build_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.database_path = Some(dir.path().join("db").join("sessions.db"));
        config.history.path = Some(dir.path().join("history.json"));
        config.container.enabled = false;

        let registry = open_registry(&config).await.unwrap();
        assert!(dir.path().join("db").join("sessions.db").exists());

        let state = build_state(&config, registry.clone()).await.unwrap();
        assert!(!state.bridge.runtime().is_ready());
        assert_eq!(state.ping_interval, Duration::from_secs(30));
        assert_eq!(state.identity.user_count(), 0);

        let _router = build_router(state, None);
        registry.recorder().shutdown().await;
    }

    #[tokio::test]
    async fn test_router_checks_identity() {
        use axum::body::Body;
        use axum::http::{header, Request, StatusCode};
        use tower::ServiceExt;

        let (state, _dir) = crate::server::state::testing::app_state().await;
        let token = state.identity.login("alice", "alice-pw").unwrap();
        let app = build_router(state, None);

        let health = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let anonymous = app
            .clone()
            .oneshot(Request::get("/api/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let signed_in = app
            .oneshot(
                Request::get("/api/sessions")
                    .header(header::COOKIE, format!("termcast_session={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(signed_in.status(), StatusCode::OK);
    }
}
