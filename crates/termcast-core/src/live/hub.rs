//! The live hub actor
//!
//! Room membership and permission changes are serialized through one command
//! loop. Output fan-out, input forwarding and chat only take the lock of the
//! room they touch.

use super::message::{ClientMessage, Frame, LiveMessage, MessageKind};
use super::room::{Member, RoomState, ViewerInfo, DEFAULT_REPLAY_BYTES};
use crate::error::{Error, Result};
use crate::registry::SessionRegistry;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use termcast_replay::PermissionMode;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Hub tuning
#[derive(Debug, Clone, Copy)]
pub struct LiveConfig {
    /// Replay buffer cap per room, in bytes
    pub replay_buffer_bytes: usize,
    /// Outbound queue depth per member
    pub viewer_queue_capacity: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            replay_buffer_bytes: DEFAULT_REPLAY_BYTES,
            viewer_queue_capacity: 2048,
        }
    }
}

/// One registered connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveConnection {
    /// Unique per connection
    pub id: Uuid,
    /// Room it belongs to
    pub session_id: String,
    /// Display name
    pub username: String,
    /// Whether it belongs to the session owner
    pub is_owner: bool,
}

type Room = Mutex<RoomState>;
type Rooms = Arc<RwLock<HashMap<String, Arc<Room>>>>;

enum HubCommand {
    Register {
        conn: LiveConnection,
        tx: mpsc::Sender<Frame>,
        reply: oneshot::Sender<Result<()>>,
    },
    Unregister {
        conn: LiveConnection,
        reply: oneshot::Sender<()>,
    },
    ApplyMode {
        session_id: String,
        mode: PermissionMode,
        reply: oneshot::Sender<()>,
    },
    SetWrite {
        session_id: String,
        username: String,
        can_write: bool,
        reply: oneshot::Sender<bool>,
    },
}

fn lock(room: &Room) -> MutexGuard<'_, RoomState> {
    room.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of live rooms
pub struct LiveHub {
    registry: Arc<SessionRegistry>,
    rooms: Rooms,
    commands: mpsc::Sender<HubCommand>,
    config: LiveConfig,
}

impl LiveHub {
    /// Create a hub and start its command loop
    pub fn new(registry: Arc<SessionRegistry>, config: LiveConfig) -> Self {
        let rooms: Rooms = Arc::default();
        let (commands, rx) = mpsc::channel(256);

        let actor = HubActor {
            registry: registry.clone(),
            rooms: rooms.clone(),
            config,
        };
        tokio::spawn(actor.run(rx));

        Self {
            registry,
            rooms,
            commands,
            config,
        }
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> HubCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| Error::HubStopped)?;
        rx.await.map_err(|_| Error::HubStopped)
    }

    fn room(&self, session_id: &str) -> Option<Arc<Room>> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    /// Join the room of `session_id`, creating it if needed
    ///
    /// The receiver yields the permission notice (if writable), the replay
    /// buffer, then live traffic. It closes once the connection leaves.
    pub async fn join(
        &self,
        session_id: &str,
        username: &str,
        is_owner: bool,
    ) -> Result<(LiveConnection, mpsc::Receiver<Frame>)> {
        let conn = LiveConnection {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            username: username.to_string(),
            is_owner,
        };
        let (tx, rx) = mpsc::channel(self.config.viewer_queue_capacity.max(1));

        let registered = conn.clone();
        self.call(|reply| HubCommand::Register {
            conn: registered,
            tx,
            reply,
        })
        .await??;
        Ok((conn, rx))
    }

    /// Leave a room; the last one out destroys it
    pub async fn leave(&self, conn: &LiveConnection) {
        let conn = conn.clone();
        if self
            .call(|reply| HubCommand::Unregister { conn, reply })
            .await
            .is_err()
        {
            warn!("Live hub stopped before unregister");
        }
    }

    /// Append terminal output to the room buffer and fan it out
    ///
    /// Never blocks on members: a full member queue misses the chunk.
    /// Returns how many members accepted it; `0` without a room.
    pub fn broadcast_output(&self, session_id: &str, bytes: &[u8]) -> usize {
        if bytes.is_empty() {
            return 0;
        }
        match self.room(session_id) {
            Some(room) => lock(&room).push_output(bytes),
            None => 0,
        }
    }

    /// Relay viewer input to the owner; dropped unless `conn` may write
    pub fn forward_input(&self, conn: &LiveConnection, data: Value) -> bool {
        let Some(room) = self.room(&conn.session_id) else {
            return false;
        };
        let state = lock(&room);

        let allowed = state.member(conn.id).is_some_and(|m| m.can_write);
        if !allowed {
            debug!(session_id = %conn.session_id, username = %conn.username, "Dropped input without write access");
            return false;
        }
        let Some(owner) = state.owner_member() else {
            return false;
        };

        let message = LiveMessage::new(MessageKind::Input, &conn.session_id, data)
            .from_sender(&conn.username);
        state.send_to(owner, &message)
    }

    /// Tell the owner that `conn` wants write access
    pub fn request_permission(&self, conn: &LiveConnection) -> bool {
        let Some(room) = self.room(&conn.session_id) else {
            return false;
        };
        let state = lock(&room);
        let Some(owner) = state.owner_member() else {
            return false;
        };

        let message = LiveMessage::new(
            MessageKind::PermissionRequest,
            &conn.session_id,
            json!({ "username": conn.username }),
        )
        .from_sender(&conn.username);
        state.send_to(owner, &message)
    }

    /// Broadcast a chat line from `conn`
    pub fn chat(&self, conn: &LiveConnection, data: Value) -> usize {
        let Some(room) = self.room(&conn.session_id) else {
            return 0;
        };
        let message =
            LiveMessage::new(MessageKind::Chat, &conn.session_id, data).from_sender(&conn.username);
        let state = lock(&room);
        state.broadcast(&message)
    }

    /// Grant write access to the viewer(s) named `username`
    ///
    /// Refused under `view_only`; a no-op under `shared_control`.
    pub async fn grant(&self, session_id: &str, username: &str) -> Result<bool> {
        self.set_write(session_id, username, true).await
    }

    /// Revoke write access from the viewer(s) named `username`
    pub async fn revoke(&self, session_id: &str, username: &str) -> Result<bool> {
        self.set_write(session_id, username, false).await
    }

    async fn set_write(&self, session_id: &str, username: &str, can_write: bool) -> Result<bool> {
        let session_id = session_id.to_string();
        let username = username.to_string();
        self.call(|reply| HubCommand::SetWrite {
            session_id,
            username,
            can_write,
            reply,
        })
        .await
    }

    /// Change the permission mode of a session and its open room
    pub async fn set_permission_mode(&self, session_id: &str, mode: PermissionMode) -> Result<()> {
        self.registry.update_permission_mode(session_id, mode).await?;
        self.apply_mode(session_id, mode).await
    }

    async fn apply_mode(&self, session_id: &str, mode: PermissionMode) -> Result<()> {
        let session_id = session_id.to_string();
        self.call(|reply| HubCommand::ApplyMode {
            session_id,
            mode,
            reply,
        })
        .await
    }

    /// Switch live sharing on; returns the share token
    pub async fn start_sharing(&self, session_id: &str, mode: PermissionMode) -> Result<String> {
        let token = self.registry.start_live(session_id, mode).await?;
        self.apply_mode(session_id, mode).await?;
        Ok(token)
    }

    /// Switch live sharing off; connected members stay until they leave
    pub async fn stop_sharing(&self, session_id: &str) -> Result<()> {
        self.registry.stop_live(session_id).await
    }

    /// Dispatch a decoded client message from `conn`
    pub async fn handle_client_message(&self, conn: &LiveConnection, message: ClientMessage) {
        match message {
            ClientMessage::Input { data } => {
                self.forward_input(conn, data);
            }
            ClientMessage::PermissionRequest => {
                self.request_permission(conn);
            }
            ClientMessage::PermissionGrant { data } if conn.is_owner => {
                if let Err(e) = self.grant(&conn.session_id, &data.username).await {
                    warn!("Grant failed: {}", e);
                }
            }
            ClientMessage::PermissionDeny { data } if conn.is_owner => {
                if let Err(e) = self.revoke(&conn.session_id, &data.username).await {
                    warn!("Revoke failed: {}", e);
                }
            }
            ClientMessage::PermissionGrant { .. } | ClientMessage::PermissionDeny { .. } => {
                debug!(username = %conn.username, "Ignored permission change from non-owner");
            }
            ClientMessage::Chat { data } => {
                self.chat(conn, data);
            }
        }
    }

    /// Whether a room exists for `session_id`
    #[must_use]
    pub fn has_room(&self, session_id: &str) -> bool {
        self.room(session_id).is_some()
    }

    /// Members of a room, `None` without a room
    #[must_use]
    pub fn viewers(&self, session_id: &str) -> Option<Vec<ViewerInfo>> {
        self.room(session_id).map(|room| lock(&room).viewers())
    }

    /// Member count, `0` without a room
    #[must_use]
    pub fn viewer_count(&self, session_id: &str) -> usize {
        self.room(session_id)
            .map_or(0, |room| lock(&room).members.len())
    }

    /// Current mode of an open room
    #[must_use]
    pub fn room_mode(&self, session_id: &str) -> Option<PermissionMode> {
        self.room(session_id).map(|room| lock(&room).mode)
    }

    /// Current write access of a connection
    #[must_use]
    pub fn can_write(&self, conn: &LiveConnection) -> Option<bool> {
        let room = self.room(&conn.session_id)?;
        let state = lock(&room);
        state.member(conn.id).map(|m| m.can_write)
    }

    /// Snapshot of a room's replay buffer
    #[must_use]
    pub fn replay_buffer(&self, session_id: &str) -> Option<Vec<u8>> {
        self.room(session_id).map(|room| lock(&room).buffer.contents())
    }
}

struct HubActor {
    registry: Arc<SessionRegistry>,
    rooms: Rooms,
    config: LiveConfig,
}

impl HubActor {
    async fn run(self, mut rx: mpsc::Receiver<HubCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                HubCommand::Register { conn, tx, reply } => {
                    let _ = reply.send(self.register(conn, tx).await);
                }
                HubCommand::Unregister { conn, reply } => {
                    self.unregister(&conn);
                    let _ = reply.send(());
                }
                HubCommand::ApplyMode {
                    session_id,
                    mode,
                    reply,
                } => {
                    self.apply_mode(&session_id, mode);
                    let _ = reply.send(());
                }
                HubCommand::SetWrite {
                    session_id,
                    username,
                    can_write,
                    reply,
                } => {
                    let _ = reply.send(self.set_write(&session_id, &username, can_write));
                }
            }
        }
        debug!("Live hub stopped");
    }

    fn room(&self, session_id: &str) -> Option<Arc<Room>> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    async fn register(&self, conn: LiveConnection, tx: mpsc::Sender<Frame>) -> Result<()> {
        let room = match self.room(&conn.session_id) {
            Some(room) => room,
            None => {
                let session = self.registry.get(&conn.session_id).await?;
                let room = Arc::new(Mutex::new(RoomState::new(
                    &session.id,
                    session.permission_mode,
                    self.config.replay_buffer_bytes,
                )));
                self.rooms
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(session.id.clone(), room.clone());
                info!(session_id = %session.id, mode = %session.permission_mode, "Room opened");
                room
            }
        };

        let mut state = lock(&room);
        let can_write = conn.is_owner || state.mode.viewer_can_write();
        if conn.is_owner {
            state.owner = Some(conn.id);
        }
        let member = Member {
            id: conn.id,
            username: conn.username.clone(),
            is_owner: conn.is_owner,
            can_write,
            tx,
        };

        if can_write {
            state.send_to(
                &member,
                &LiveMessage::permission(MessageKind::PermissionGrant, &conn.session_id, &conn.username),
            );
        }
        if !state.buffer.is_empty() {
            let replay = LiveMessage::output(&conn.session_id, &state.buffer.contents());
            state.send_to(&member, &replay);
        }
        state.members.push(member);

        let count = state.members.len();
        state.broadcast(&LiveMessage::membership(
            MessageKind::ViewerJoin,
            &conn.session_id,
            &conn.username,
            count,
        ));
        info!(
            session_id = %conn.session_id,
            username = %conn.username,
            is_owner = conn.is_owner,
            can_write,
            count,
            "Viewer joined"
        );
        Ok(())
    }

    fn unregister(&self, conn: &LiveConnection) {
        let Some(room) = self.room(&conn.session_id) else {
            return;
        };

        let mut state = lock(&room);
        state.members.retain(|m| m.id != conn.id);
        if state.owner == Some(conn.id) {
            state.owner = None;
        }
        let count = state.members.len();

        if count == 0 {
            drop(state);
            self.rooms
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&conn.session_id);
            info!(session_id = %conn.session_id, "Room closed");
            return;
        }

        state.broadcast(&LiveMessage::membership(
            MessageKind::ViewerLeave,
            &conn.session_id,
            &conn.username,
            count,
        ));
        info!(session_id = %conn.session_id, username = %conn.username, count, "Viewer left");
    }

    fn apply_mode(&self, session_id: &str, mode: PermissionMode) {
        // Rooms only exist with members; a later join reads the stored mode
        if let Some(room) = self.room(session_id) {
            lock(&room).apply_mode(mode);
            debug!(session_id = %session_id, mode = %mode, "Room mode applied");
        }
    }

    fn set_write(&self, session_id: &str, username: &str, can_write: bool) -> bool {
        let Some(room) = self.room(session_id) else {
            return false;
        };
        let mut state = lock(&room);
        match (can_write, state.mode) {
            (true, PermissionMode::ViewOnly) => {
                debug!(session_id = %session_id, username = %username, "Grant refused in view_only");
                false
            }
            _ => state.set_write(username, can_write),
        }
    }
}
