//! Shared handler state

use std::sync::Arc;
use std::time::Duration;
use termcast_core::{
    CommandHistory, CookieIdentity, LiveHub, SessionRegistry, ShutdownController, TerminalBridge,
};

/// Services every HTTP and WebSocket handler can reach
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub hub: Arc<LiveHub>,
    pub bridge: Arc<TerminalBridge>,
    pub identity: Arc<CookieIdentity>,
    pub history: Arc<CommandHistory>,
    pub shutdown: ShutdownController,
    /// Keepalive period of live viewer sockets
    pub ping_interval: Duration,
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use termcast_core::{DockerRuntime, LiveConfig, TerminalConfig, UserAccount};

    /// State over an in-memory database, an undetected (not ready) runtime and
    /// two accounts: `alice`/`alice-pw` and `bob`/`bob-pw`
    pub async fn app_state() -> (AppState, tempfile::TempDir) {
        let registry = Arc::new(SessionRegistry::in_memory().await.unwrap());
        let hub = Arc::new(LiveHub::new(registry.clone(), LiveConfig::default()));

        let runtime = DockerRuntime::new("docker", "termcast-terminal", "termcast");
        let bridge = Arc::new(TerminalBridge::new(
            registry.clone(),
            hub.clone(),
            Arc::new(runtime),
            TerminalConfig::default(),
        ));

        let accounts: Vec<UserAccount> = ["alice", "bob"]
            .iter()
            .map(|name| UserAccount {
                username: (*name).to_string(),
                password: format!("{name}-pw"),
            })
            .collect();
        let identity = Arc::new(CookieIdentity::new(&accounts, 1));

        let dir = tempfile::tempdir().unwrap();
        let history = Arc::new(
            CommandHistory::open(dir.path().join("history.json"), 500)
                .await
                .unwrap(),
        );

        let state = AppState {
            registry,
            hub,
            bridge,
            identity,
            history,
            shutdown: ShutdownController::default(),
            ping_interval: Duration::from_secs(30),
        };
        (state, dir)
    }
}
