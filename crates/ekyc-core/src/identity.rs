//! Identity-key derivation.
//!
//! Raw document identifiers are hashed with SHA-256 as soon as they leave
//! field normalization. Only the derived key is stored, logged or displayed.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Raw document identifier as read from the card, with surrounding
/// whitespace removed.
///
/// No `Display`, `Serialize` or `Clone`. Consumed by [`IdentityKey::derive`].
pub struct RawIdentifier(String);

impl RawIdentifier {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        match value.trim() {
            trimmed if trimmed.len() == value.len() => Self(value),
            trimmed => Self(trimmed.to_string()),
        }
    }
}

impl fmt::Debug for RawIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawIdentifier(<redacted>)")
    }
}

impl PartialEq for RawIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

/// Lowercase hex SHA-256 digest of a raw identifier (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Derive the key for `raw`, consuming it.
    pub fn derive(raw: RawIdentifier) -> Self {
        Self(derive(&raw.0))
    }

    /// Wrap a key read back from storage.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 of the UTF-8 bytes of `raw_id`, as lowercase hex.
pub fn derive(raw_id: &str) -> String {
    format!("{:x}", Sha256::digest(raw_id.as_bytes()))
}
