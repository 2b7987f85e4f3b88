//! Terminal WebSocket session

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use termcast_core::{classify_text, BridgeRequest, BridgeSession, InboundText};
use tracing::{debug, error, info, warn};

use super::protocol::ServerMessage;
use crate::server::AppState;

type Sender = SplitSink<WebSocket, Message>;

/// How long a finished shell's remaining output may take to flush
const OUTPUT_DRAIN: Duration = Duration::from_millis(500);

async fn fail(mut sender: Sender, message: String) {
    let _ = sender
        .send(Message::Text(ServerMessage::Error(message).to_text()))
        .await;
    let _ = sender.send(Message::Close(None)).await;
}

/// Shell output → recording, live room and socket, in read order
async fn pump_output(bridge: Arc<BridgeSession>, mut sender: Sender) {
    while let Some(chunk) = bridge.read_output().await {
        bridge.record_output(&chunk).await;
        if sender.send(Message::Binary(chunk)).await.is_err() {
            debug!(session_id = %bridge.session.id, "Terminal socket gone");
            break;
        }
    }
    let _ = sender.send(Message::Close(None)).await;
}

/// Handle a terminal WebSocket connection
pub async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    username: String,
    request: BridgeRequest,
) {
    let guard = state.shutdown.track();
    let (mut sender, mut receiver) = socket.split();

    let resolved = match state.bridge.resolve(&username, &request).await {
        Ok(resolved) => resolved,
        Err(e) => {
            error!(username = %username, "Failed to open session: {}", e);
            fail(sender, e.to_string()).await;
            return;
        }
    };

    let session_id = resolved.session.id.clone();
    if sender
        .send(Message::Text(ServerMessage::SessionId(session_id.clone()).to_text()))
        .await
        .is_err()
    {
        // Nobody to talk to: release the claim
        if let Err(e) = state.registry.release(&session_id, resolved.claim).await {
            warn!(session_id = %session_id, "Failed to release session: {}", e);
        }
        return;
    }

    let bridge = match state.bridge.spawn(&username, resolved, &request).await {
        Ok(bridge) => Arc::new(bridge),
        Err(e) => {
            error!(session_id = %session_id, "Failed to start terminal: {}", e);
            fail(sender, e.to_string()).await;
            return;
        }
    };
    info!(session_id = %session_id, username = %username, "Terminal connection established");

    let cleanup = bridge.cleanup();
    let closed = bridge.closed();
    let mut output = tokio::spawn(pump_output(bridge.clone(), sender));

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let input = match msg {
                    Some(Ok(Message::Text(text))) => match classify_text(&text) {
                        InboundText::Resize(Some(size)) => {
                            if let Err(e) = bridge.resize(size, &text).await {
                                warn!(session_id = %session_id, "Resize failed: {}", e);
                            }
                            continue;
                        }
                        InboundText::Resize(None) => {
                            debug!(session_id = %session_id, "Ignored invalid resize");
                            continue;
                        }
                        InboundText::Input => text.into_bytes(),
                    },
                    Some(Ok(Message::Binary(data))) => data,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(session_id = %session_id, "Terminal socket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => continue,
                };
                if let Err(e) = bridge.write_input(input).await {
                    warn!(session_id = %session_id, "Write to shell failed: {}", e);
                    break;
                }
            }
            _ = &mut output => break,
            () = bridge.wait_exit() => {
                debug!(session_id = %session_id, "Shell exited");
                // Let the last output reach the client
                let _ = tokio::time::timeout(OUTPUT_DRAIN, &mut output).await;
                break;
            }
            () = closed.cancelled() => break,
            () = guard.cancelled() => {
                info!(session_id = %session_id, "Closing terminal for shutdown");
                break;
            }
        }
    }

    cleanup.run().await;
    output.abort();
    info!(session_id = %session_id, "Terminal connection ended");
}
