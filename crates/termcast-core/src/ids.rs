//! Random identifiers
//!
//! Session IDs, share tokens and login tokens are hex strings drawn from the
//! operating system's CSPRNG.

use rand::rngs::OsRng;
use rand::RngCore;

/// Entropy of a session ID in bytes
pub const SESSION_ID_BYTES: usize = 16;

/// Entropy of a share token in bytes
pub const SHARE_TOKEN_BYTES: usize = 16;

/// Hex-encode `len` random bytes
#[must_use]
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// New session identifier
#[must_use]
pub fn session_id() -> String {
    random_hex(SESSION_ID_BYTES)
}

/// New share token
#[must_use]
pub fn share_token() -> String {
    random_hex(SHARE_TOKEN_BYTES)
}
