//! Live viewer WebSocket session

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use termcast_core::ClientMessage;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::server::AppState;

/// Handle a live WebSocket connection
pub async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    session_id: String,
    username: String,
    is_owner: bool,
) {
    let guard = state.shutdown.track();
    let (mut sender, mut receiver) = socket.split();

    let (conn, mut frames) = match state.hub.join(&session_id, &username, is_owner).await {
        Ok(joined) => joined,
        Err(e) => {
            warn!(session_id = %session_id, "Failed to join live room: {}", e);
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    info!(session_id = %session_id, username = %username, is_owner, "Live connection established");

    let mut ping = tokio::time::interval(state.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately
    ping.tick().await;

    loop {
        tokio::select! {
            frame = frames.recv() => {
                // Closed when the hub drops this member
                let Some(frame) = frame else { break };
                if sender.send(Message::Text(frame.to_string())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match ClientMessage::parse(&text) {
                        Some(message) => state.hub.handle_client_message(&conn, message).await,
                        None => debug!(username = %username, "Ignored live message: {}", text),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(username = %username, "Live socket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
            () = guard.cancelled() => break,
        }
    }

    state.hub.leave(&conn).await;
    let _ = sender.send(Message::Close(None)).await;
    info!(session_id = %session_id, username = %username, "Live connection ended");
}
