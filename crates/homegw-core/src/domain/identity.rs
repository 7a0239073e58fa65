//! Authenticated identity bound to a connection.
//!
//! A [`Principal`] is produced by the authenticator when an HTTP request
//! carries valid credentials.  When a connection is upgraded to a channel the
//! principal moves into the channel session and is never mutated again.

use serde::{Deserialize, Serialize};

/// Coarse access level granted to a principal.
///
/// Levels are ordered: `Guest < Control < Admin`, so permission checks can be
/// written as `principal.level >= AccessLevel::Control`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// Read-only access to device state.
    Guest,
    /// May change device state.
    Control,
    /// Full access.
    Admin,
}

impl AccessLevel {
    /// Returns the lowercase wire name of the level.
    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Guest => "guest",
            AccessLevel::Control => "control",
            AccessLevel::Admin => "admin",
        }
    }
}

/// The authenticated identity of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Account name the credentials resolved to.
    pub name: String,
    /// Access level granted to the account.
    pub level: AccessLevel,
}

impl Principal {
    /// Creates a principal for `name` with the given access level.
    pub fn new(name: impl Into<String>, level: AccessLevel) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }

    /// Returns `true` if the principal holds at least `required`.
    pub fn allows(&self, required: AccessLevel) -> bool {
        self.level >= required
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
