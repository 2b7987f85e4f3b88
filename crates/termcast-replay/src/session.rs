//! Session records
//!
//! A session is one recording unit: a terminal owned by a user, optionally
//! shared live with viewers. Records are never removed when a terminal
//! closes; they are only marked ended.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Where the shell of a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Login shell in the server's own environment
    Local,
    /// Shell inside an isolated container environment
    Isolated,
}

impl SessionMode {
    /// Returns the string representation of the mode
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Isolated => "isolated",
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            // "docker" is what older clients send
            "isolated" | "docker" => Ok(Self::Isolated),
            _ => Err(format!("unknown session mode: {s}")),
        }
    }
}

/// Write access policy for non-owner connections of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    /// Viewers watch only
    #[default]
    ViewOnly,
    /// Every viewer may type
    SharedControl,
    /// Viewers watch until the owner grants them write access
    Instructor,
}

impl PermissionMode {
    /// Returns the string representation of the mode
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewOnly => "view_only",
            Self::SharedControl => "shared_control",
            Self::Instructor => "instructor",
        }
    }

    /// Write access a non-owner gets when joining under this mode
    #[must_use]
    pub fn viewer_can_write(&self) -> bool {
        matches!(self, Self::SharedControl)
    }
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view_only" => Ok(Self::ViewOnly),
            "shared_control" => Ok(Self::SharedControl),
            "instructor" => Ok(Self::Instructor),
            _ => Err(format!("unknown permission mode: {s}")),
        }
    }
}

/// A persisted session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Random hex identifier
    pub id: String,
    /// Owning username (or the guest placeholder)
    pub user: String,
    /// Display name
    pub name: String,
    /// Execution mode
    pub mode: SessionMode,
    /// Container handle, only for isolated sessions
    pub container_name: Option<String>,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the last attached terminal closed
    pub ended_at: Option<DateTime<Utc>>,
    /// Accumulated attached time in milliseconds
    pub duration_ms: i64,
    /// Whether live sharing is switched on
    pub is_live: bool,
    /// Token viewers use to join the live room
    pub share_token: Option<String>,
    /// Viewer write policy
    pub permission_mode: PermissionMode,
}

impl Session {
    /// Create a fresh record owned by `user`
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        user: impl Into<String>,
        name: impl Into<String>,
        mode: SessionMode,
    ) -> Self {
        Self {
            id: id.into(),
            user: user.into(),
            name: name.into(),
            mode,
            container_name: None,
            // storage keeps microseconds
            created_at: Utc::now().trunc_subsecs(6),
            ended_at: None,
            duration_ms: 0,
            is_live: false,
            share_token: None,
            permission_mode: PermissionMode::default(),
        }
    }

    /// Set the container handle
    #[must_use]
    pub fn with_container(mut self, container_name: impl Into<String>) -> Self {
        self.container_name = Some(container_name.into());
        self
    }

    /// Whether the record has been closed
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}
