//! Rooms and their replay buffer

use super::message::{Frame, LiveMessage, MessageKind};
use serde::Serialize;
use std::collections::VecDeque;
use termcast_replay::PermissionMode;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Default replay buffer capacity in bytes
pub const DEFAULT_REPLAY_BYTES: usize = 50_000;

/// Trailing window of room output, oldest bytes dropped past the cap
#[derive(Debug)]
pub struct ReplayBuffer {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl ReplayBuffer {
    /// Empty buffer holding at most `capacity` bytes
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity.min(DEFAULT_REPLAY_BYTES)),
            capacity,
        }
    }

    /// Append `chunk`, evicting from the front to stay within capacity
    pub fn push(&mut self, chunk: &[u8]) {
        let chunk = if chunk.len() > self.capacity {
            &chunk[chunk.len() - self.capacity..]
        } else {
            chunk
        };
        let overflow = (self.bytes.len() + chunk.len()).saturating_sub(self.capacity);
        self.bytes.drain(..overflow);
        self.bytes.extend(chunk);
    }

    /// Buffered bytes, oldest first
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.bytes.iter().copied().collect()
    }

    /// Buffered length
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing is buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Public view of a room member
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewerInfo {
    /// Display name
    pub username: String,
    /// Whether this is the session owner
    pub is_owner: bool,
    /// Whether input from this member reaches the owner
    pub can_write: bool,
}

pub(crate) struct Member {
    pub id: Uuid,
    pub username: String,
    pub is_owner: bool,
    pub can_write: bool,
    pub tx: mpsc::Sender<Frame>,
}

impl Member {
    /// Non-blocking enqueue; a full queue misses this frame
    pub fn offer(&self, frame: &Frame) -> bool {
        self.tx.try_send(frame.clone()).is_ok()
    }
}

pub(crate) struct RoomState {
    pub session_id: String,
    pub owner: Option<Uuid>,
    pub members: Vec<Member>,
    pub mode: PermissionMode,
    pub buffer: ReplayBuffer,
}

impl RoomState {
    pub fn new(session_id: &str, mode: PermissionMode, replay_bytes: usize) -> Self {
        Self {
            session_id: session_id.to_string(),
            owner: None,
            members: Vec::new(),
            mode,
            buffer: ReplayBuffer::new(replay_bytes),
        }
    }

    pub fn member(&self, id: Uuid) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn owner_member(&self) -> Option<&Member> {
        self.owner.and_then(|id| self.member(id))
    }

    pub fn broadcast(&self, message: &LiveMessage) -> usize {
        let frame = message.to_frame();
        self.members.iter().filter(|m| m.offer(&frame)).count()
    }

    pub fn send_to(&self, member: &Member, message: &LiveMessage) -> bool {
        member.offer(&message.to_frame())
    }

    /// Append output and fan it out
    pub fn push_output(&mut self, bytes: &[u8]) -> usize {
        self.buffer.push(bytes);
        self.broadcast(&LiveMessage::output(&self.session_id, bytes))
    }

    /// Re-derive non-owner write access from `mode`
    pub fn apply_mode(&mut self, mode: PermissionMode) {
        self.mode = mode;
        for member in self.members.iter_mut().filter(|m| !m.is_owner) {
            member.can_write = mode.viewer_can_write();
        }
        self.broadcast(&LiveMessage::mode_change(&self.session_id, mode));
    }

    /// Flip write access of non-owner members named `username`
    pub fn set_write(&mut self, username: &str, can_write: bool) -> bool {
        let kind = if can_write {
            MessageKind::PermissionGrant
        } else {
            MessageKind::PermissionDeny
        };
        let message = LiveMessage::permission(kind, &self.session_id, username);

        let mut changed = false;
        for member in self
            .members
            .iter_mut()
            .filter(|m| !m.is_owner && m.username == username)
        {
            member.can_write = can_write;
            member.offer(&message.to_frame());
            changed = true;
        }
        changed
    }

    pub fn viewers(&self) -> Vec<ViewerInfo> {
        self.members
            .iter()
            .map(|m| ViewerInfo {
                username: m.username.clone(),
                is_owner: m.is_owner,
                can_write: m.can_write,
            })
            .collect()
    }
}
