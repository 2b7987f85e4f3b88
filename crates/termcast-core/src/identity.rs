//! Request identity
//!
//! Provides:
//! - The `Identity` capability used by HTTP and WebSocket handlers
//! - `CookieIdentity`: configured accounts with expiring login tokens
//! - Constant-time password and token comparison

use crate::error::{Error, Result};
use crate::ids;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

/// Upper bound on token lifetime (ten years)
const MAX_TTL_HOURS: u64 = 24 * 365 * 10;

/// Name of the cookie carrying the login token
pub const SESSION_COOKIE: &str = "termcast_session";

/// Username of unauthenticated terminal clients
pub const GUEST_USER: &str = "guest";

/// Resolves a credential to a username
pub trait Identity: Send + Sync {
    /// Username for `credential`, `None` if unknown or expired
    fn resolve(&self, credential: &str) -> Option<String>;
}

/// A configured account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    /// Login name
    pub username: String,
    /// Plain-text password from configuration
    pub password: String,
}

struct LoginToken {
    token_hash: [u8; 32],
    username: String,
    expires_at: DateTime<Utc>,
}

fn digest(value: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    hash
}

/// Cookie-token identity over a fixed account list
pub struct CookieIdentity {
    /// username → password digest
    users: HashMap<String, [u8; 32]>,
    /// token digest hex → login
    tokens: RwLock<HashMap<String, LoginToken>>,
    ttl: Duration,
}

impl CookieIdentity {
    /// Create from accounts; tokens live for `ttl_hours`
    pub fn new(accounts: &[UserAccount], ttl_hours: u64) -> Self {
        let users = accounts
            .iter()
            .map(|a| (a.username.clone(), digest(&a.password)))
            .collect();
        Self {
            users,
            tokens: RwLock::new(HashMap::new()),
            ttl: Duration::hours(i64::try_from(ttl_hours.min(MAX_TTL_HOURS)).unwrap_or(0)),
        }
    }

    /// Lifetime of issued tokens
    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of configured accounts
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Check a password and issue a token
    pub fn login(&self, username: &str, password: &str) -> Result<String> {
        let given = digest(password);
        // Unknown users still pay for a comparison
        let stored = self.users.get(username).copied().unwrap_or([0u8; 32]);
        let matches: bool = stored.ct_eq(&given).into();
        if !matches || !self.users.contains_key(username) {
            warn!(username = %username, "Rejected login");
            return Err(Error::Forbidden("invalid username or password".to_string()));
        }

        let token = ids::random_hex(32);
        let token_hash = digest(&token);
        let login = LoginToken {
            token_hash,
            username: username.to_string(),
            expires_at: Utc::now() + self.ttl,
        };

        let mut tokens = self.tokens.write().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        tokens.retain(|_, t| t.expires_at > now);
        tokens.insert(hex::encode(token_hash), login);

        info!(username = %username, "User logged in");
        Ok(token)
    }

    /// Forget a token
    pub fn logout(&self, token: &str) {
        if let Ok(mut tokens) = self.tokens.write() {
            if let Some(login) = tokens.remove(&hex::encode(digest(token))) {
                debug!(username = %login.username, "User logged out");
            }
        }
    }
}

impl Identity for CookieIdentity {
    fn resolve(&self, credential: &str) -> Option<String> {
        if credential.is_empty() {
            return None;
        }
        let token_hash = digest(credential);
        let key = hex::encode(token_hash);

        let tokens = self.tokens.read().ok()?;
        let login = tokens.get(&key)?;
        let matches: bool = login.token_hash.ct_eq(&token_hash).into();
        if !matches {
            return None;
        }
        if login.expires_at <= Utc::now() {
            drop(tokens);
            if let Ok(mut tokens) = self.tokens.write() {
                tokens.remove(&key);
            }
            return None;
        }
        Some(login.username.clone())
    }
}
