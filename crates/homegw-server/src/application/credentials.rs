//! In-memory credential store backing the [`Authenticator`] trait.
//!
//! Accounts come from the `[[users]]` configuration table.  Tokens are opaque
//! UUIDv4 strings bound to the principal that requested them.  A token
//! expires [`token_ttl`](CredentialStore::with_token_ttl) after it was
//! issued, and each account keeps at most [`MAX_TOKENS_PER_ACCOUNT`] live
//! tokens; issuing one more evicts that account's oldest.  Expired entries
//! are pruned whenever a token is issued or looked up.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use homegw_core::{AccessLevel, Principal};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use super::auth::{AuthError, Authenticator};
use crate::domain::UserEntry;

/// Token lifetime used when none is configured.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Live tokens one account may hold at once.
pub const MAX_TOKENS_PER_ACCOUNT: usize = 16;

#[derive(Debug, Clone)]
struct Account {
    password: String,
    level: AccessLevel,
}

#[derive(Debug, Clone)]
struct IssuedToken {
    principal: Principal,
    issued_at: Instant,
}

/// Config-backed accounts plus the table of issued tokens.
#[derive(Debug)]
pub struct CredentialStore {
    accounts: HashMap<String, Account>,
    tokens: RwLock<HashMap<String, IssuedToken>>,
    token_ttl: Duration,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::from_users(&[])
    }
}

impl CredentialStore {
    /// Builds a store from configured users.  Later duplicates win.
    pub fn from_users(users: &[UserEntry]) -> Self {
        let accounts = users
            .iter()
            .map(|u| {
                (
                    u.name.clone(),
                    Account {
                        password: u.password.clone(),
                        level: u.level,
                    },
                )
            })
            .collect();
        Self {
            accounts,
            tokens: RwLock::new(HashMap::new()),
            token_ttl: DEFAULT_TOKEN_TTL,
        }
    }

    /// Sets how long an issued token stays valid (builder style).
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Number of tokens currently held, expired ones not yet pruned included.
    pub fn issued_tokens(&self) -> usize {
        self.tokens
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn is_live(&self, token: &IssuedToken, now: Instant) -> bool {
        now.duration_since(token.issued_at) < self.token_ttl
    }
}

#[async_trait]
impl Authenticator for CredentialStore {
    async fn verify_token(&self, token: &str) -> Result<Principal, AuthError> {
        let now = Instant::now();
        {
            let tokens = self
                .tokens
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match tokens.get(token) {
                None => return Err(AuthError::UnknownToken),
                Some(entry) if self.is_live(entry, now) => return Ok(entry.principal.clone()),
                Some(_) => {}
            }
        }
        // Expired: take the write lock once to sweep everything stale.
        let mut tokens = self
            .tokens
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tokens.retain(|_, entry| self.is_live(entry, now));
        Err(AuthError::UnknownToken)
    }

    async fn verify_password(&self, name: &str, password: &str) -> Result<Principal, AuthError> {
        match self.accounts.get(name) {
            Some(account) if account.password == password => {
                Ok(Principal::new(name, account.level))
            }
            _ => Err(AuthError::BadCredentials),
        }
    }

    async fn issue_token(&self, principal: &Principal) -> Result<String, AuthError> {
        let now = Instant::now();
        let token = Uuid::new_v4().simple().to_string();
        let mut tokens = self
            .tokens
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tokens.retain(|_, entry| self.is_live(entry, now));

        let mut held: Vec<(Instant, String)> = tokens
            .iter()
            .filter(|(_, entry)| entry.principal.name == principal.name)
            .map(|(key, entry)| (entry.issued_at, key.clone()))
            .collect();
        if held.len() >= MAX_TOKENS_PER_ACCOUNT {
            held.sort();
            let excess = held.len() + 1 - MAX_TOKENS_PER_ACCOUNT;
            for (_, oldest) in held.into_iter().take(excess) {
                tokens.remove(&oldest);
            }
            debug!("evicted {excess} token(s) of {}", principal.name);
        }

        tokens.insert(
            token.clone(),
            IssuedToken {
                principal: principal.clone(),
                issued_at: now,
            },
        );
        Ok(token)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
