//! Session Registry
//!
//! Owns session records (through the event store) and the in-memory table of
//! active handles. A handle exists while a session is usable for recording;
//! at most one terminal bridge may be attached to a handle at a time.

use crate::error::{Error, Result};
use crate::ids;
use crate::runtime::session_container_name;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use termcast_replay::{
    get_session_events, to_replay, EventRecorder, EventStore, EventType, PermissionMode,
    ReplayEvent, Session, SessionMode, SweepReport,
};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// In-memory bookkeeping for a session that is currently usable
#[derive(Debug, Clone)]
pub struct ActiveSessionHandle {
    /// Snapshot of the record, kept current for rename
    pub session: Session,
    /// When the handle was registered or last attached
    pub started_at: Instant,
    /// Last recorded event
    pub last_activity: Instant,
    /// Claim of the terminal bridge that owns this handle
    pub claim: Option<u64>,
}

impl ActiveSessionHandle {
    fn new(session: Session) -> Self {
        let now = Instant::now();
        Self {
            session,
            started_at: now,
            last_activity: now,
            claim: None,
        }
    }

    /// Whether a terminal bridge owns this handle
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.claim.is_some()
    }
}

/// A session claimed by one terminal bridge
#[derive(Debug, Clone)]
pub struct Attachment {
    /// The record
    pub session: Session,
    /// Proof of ownership passed back to [`SessionRegistry::release`]
    pub claim: u64,
}

/// Which handles a close may remove
#[derive(Debug, Clone, Copy)]
enum CloseBy {
    /// Only a handle no bridge owns
    Detached,
    /// Only the handle claimed with this value
    Claim(u64),
    /// Any handle (shutdown)
    Force,
}

/// Registry of session records and active handles
pub struct SessionRegistry {
    store: EventStore,
    recorder: Arc<EventRecorder>,
    active: RwLock<HashMap<String, ActiveSessionHandle>>,
    next_claim: AtomicU64,
}

impl SessionRegistry {
    /// Create a registry over `store`, recording events through `recorder`
    pub fn new(store: EventStore, recorder: Arc<EventRecorder>) -> Self {
        Self {
            store,
            recorder,
            active: RwLock::new(HashMap::new()),
            next_claim: AtomicU64::new(1),
        }
    }

    /// Registry over an in-memory store (for testing)
    pub async fn in_memory() -> Result<Self> {
        let store = EventStore::in_memory().await?;
        let recorder = EventRecorder::spawn(
            Arc::new(store.clone()),
            termcast_replay::store::DEFAULT_QUEUE_CAPACITY,
        );
        Ok(Self::new(store, Arc::new(recorder)))
    }

    /// Underlying store
    #[must_use]
    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Event writer
    #[must_use]
    pub fn recorder(&self) -> &Arc<EventRecorder> {
        &self.recorder
    }

    /// Create and persist a session, registering an active handle
    ///
    /// A blank name becomes `Session <first six id chars>`.
    #[instrument(skip(self))]
    pub async fn create(&self, owner: &str, name: &str, mode: SessionMode) -> Result<Session> {
        let id = ids::session_id();
        let name = match name.trim() {
            "" => format!("Session {}", &id[..6]),
            trimmed => trimmed.to_string(),
        };
        let mut session = Session::new(id.clone(), owner, name, mode);
        if mode == SessionMode::Isolated {
            session = session.with_container(session_container_name(owner, &id));
        }

        self.store.create_session(&session).await?;
        self.active
            .write()
            .await
            .insert(id.clone(), ActiveSessionHandle::new(session.clone()));

        info!(session_id = %id, owner = %owner, mode = %mode, "Session created");
        Ok(session)
    }

    /// Get a session by ID
    pub async fn get(&self, id: &str) -> Result<Session> {
        Ok(self.store.get_session(id).await?)
    }

    /// Get a session by share token
    pub async fn get_by_share_token(&self, token: &str) -> Result<Session> {
        Ok(self.store.get_session_by_share_token(token).await?)
    }

    /// Sessions owned by `owner`, newest first
    pub async fn list(&self, owner: &str) -> Result<Vec<Session>> {
        Ok(self.store.list_sessions(owner).await?)
    }

    /// Newest session owned by `owner`, ended or not
    pub async fn most_recent(&self, owner: &str) -> Result<Session> {
        self.store
            .latest_session(owner)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no sessions for {owner}")))
    }

    /// Rename a session owned by `owner`
    #[instrument(skip(self))]
    pub async fn rename(&self, id: &str, owner: &str, name: &str) -> Result<()> {
        self.store.rename_session(id, owner, name).await?;
        if let Some(handle) = self.active.write().await.get_mut(id) {
            handle.session.name = name.to_string();
        }
        Ok(())
    }

    /// Delete a session owned by `owner`, with its event log
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str, owner: &str) -> Result<()> {
        let session = self.get(id).await?;
        if session.user != owner {
            return Err(Error::Forbidden(format!("session {id} belongs to another user")));
        }

        self.active.write().await.remove(id);
        self.store.delete_session(id, owner).await?;
        Ok(())
    }

    /// Persist the container handle of a session
    pub async fn set_container_name(&self, id: &str, container_name: &str) -> Result<()> {
        self.store.set_container_name(id, container_name).await?;
        if let Some(handle) = self.active.write().await.get_mut(id) {
            handle.session.container_name = Some(container_name.to_string());
        }
        Ok(())
    }

    /// Switch live sharing on with a fresh token
    ///
    /// Mode changes should go through `LiveHub` so open rooms follow; this
    /// only touches the record.
    #[instrument(skip(self))]
    pub async fn start_live(&self, id: &str, mode: PermissionMode) -> Result<String> {
        let token = ids::share_token();
        if !self.store.start_live(id, &token, mode).await? {
            return Err(Error::Conflict(format!("session {id} has ended")));
        }
        info!(session_id = %id, mode = %mode, "Live sharing started");
        Ok(token)
    }

    /// Switch live sharing off
    pub async fn stop_live(&self, id: &str) -> Result<()> {
        self.store.stop_live(id).await?;
        info!(session_id = %id, "Live sharing stopped");
        Ok(())
    }

    /// Persist a permission mode (see `LiveHub::set_permission_mode`)
    pub async fn update_permission_mode(&self, id: &str, mode: PermissionMode) -> Result<()> {
        self.store.update_permission_mode(id, mode).await?;
        if let Some(handle) = self.active.write().await.get_mut(id) {
            handle.session.permission_mode = mode;
        }
        Ok(())
    }

    /// Record an event; failures are logged, never returned
    pub async fn add_event(&self, id: &str, event_type: EventType, data: &[u8]) {
        if let Some(handle) = self.active.write().await.get_mut(id) {
            handle.last_activity = Instant::now();
        }
        if let Err(e) = self.recorder.record(id, event_type, data).await {
            warn!(session_id = %id, event_type = %event_type, "Dropped event: {}", e);
        }
    }

    /// Claim a session for a terminal bridge
    ///
    /// Registers a handle if the session had none (resuming an ended
    /// session) and clears its end marker. Fails with `Conflict` while
    /// another bridge holds the handle.
    #[instrument(skip(self))]
    pub async fn attach(&self, id: &str) -> Result<Attachment> {
        let mut session = self.get(id).await?;
        let mut active = self.active.write().await;
        let claim = self.next_claim.fetch_add(1, Ordering::Relaxed);

        if let Some(handle) = active.get_mut(id) {
            if handle.is_attached() {
                return Err(Error::Conflict(format!("session {id} is already attached")));
            }
            handle.claim = Some(claim);
            handle.started_at = Instant::now();
            return Ok(Attachment {
                session: handle.session.clone(),
                claim,
            });
        }

        if session.ended_at.is_some() {
            self.store.reopen_session(id).await?;
            session.ended_at = None;
        }
        let mut handle = ActiveSessionHandle::new(session.clone());
        handle.claim = Some(claim);
        active.insert(id.to_string(), handle);
        debug!(session_id = %id, claim, "Session attached");
        Ok(Attachment { session, claim })
    }

    /// End a session: requires an active handle, records elapsed time
    ///
    /// Fails with `Conflict` while a terminal bridge is attached; the bridge
    /// ends the session itself through [`release`](Self::release).
    #[instrument(skip(self))]
    pub async fn end_session(&self, id: &str) -> Result<()> {
        self.close(id, CloseBy::Detached).await
    }

    /// End a session claimed by `attach`
    ///
    /// A stale claim (the handle was closed or claimed again since) leaves
    /// the current handle alone and reports `NotFound`.
    #[instrument(skip(self))]
    pub async fn release(&self, id: &str, claim: u64) -> Result<()> {
        self.close(id, CloseBy::Claim(claim)).await
    }

    async fn close(&self, id: &str, by: CloseBy) -> Result<()> {
        let handle = {
            let mut active = self.active.write().await;
            let handle = active
                .get(id)
                .ok_or_else(|| Error::NotFound(format!("no active handle for session {id}")))?;
            match (by, handle.claim) {
                (CloseBy::Force, _) | (CloseBy::Detached, None) => {}
                (CloseBy::Claim(claim), Some(current)) if claim == current => {}
                (CloseBy::Detached, Some(_)) => {
                    return Err(Error::Conflict(format!(
                        "session {id} has a terminal attached"
                    )));
                }
                (CloseBy::Claim(_), _) => {
                    return Err(Error::NotFound(format!("session {id} was claimed again")));
                }
            }
            active.remove(id)
        };
        let Some(handle) = handle else {
            return Err(Error::NotFound(format!("no active handle for session {id}")));
        };

        let elapsed_ms = i64::try_from(handle.started_at.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.store.end_session(id, Utc::now(), elapsed_ms).await?;
        self.flush_events(id).await;

        info!(session_id = %id, elapsed_ms, "Session ended");
        Ok(())
    }

    async fn flush_events(&self, id: &str) {
        if let Err(e) = self.recorder.flush().await {
            warn!(session_id = %id, "Failed to flush recorded events: {}", e);
        }
    }

    /// Events of a session with offsets relative to the first event
    ///
    /// Waits for events still queued for writing.
    pub async fn session_data(&self, id: &str) -> Result<Vec<ReplayEvent>> {
        self.flush_events(id).await;
        let events = get_session_events(&self.store, id).await?;
        Ok(to_replay(&events))
    }

    /// Whether a session has an active handle
    pub async fn is_active(&self, id: &str) -> bool {
        self.active.read().await.contains_key(id)
    }

    /// Snapshot of an active handle
    pub async fn active_handle(&self, id: &str) -> Option<ActiveSessionHandle> {
        self.active.read().await.get(id).cloned()
    }

    /// IDs of every session with an active handle
    pub async fn active_ids(&self) -> HashSet<String> {
        self.active.read().await.keys().cloned().collect()
    }

    /// Close records left open by a previous process
    pub async fn sweep_stale(&self) -> Result<SweepReport> {
        let active = self.active_ids().await;
        Ok(self.store.sweep_stale(&active).await?)
    }

    /// End every active session (shutdown path); returns how many ended
    pub async fn end_all(&self) -> usize {
        let mut ended = 0;
        for id in self.active_ids().await {
            match self.close(&id, CloseBy::Force).await {
                Ok(()) => ended += 1,
                // A bridge finished its own cleanup in the meantime
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(session_id = %id, "Failed to end session: {}", e),
            }
        }
        ended
    }
}
