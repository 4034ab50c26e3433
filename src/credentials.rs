//! Accounts used to attempt logins
//!
//! Credentials live for the whole run. Their token state is only touched
//! through a [`TokenRefresher`], and each account serializes its own
//! refreshes so two probes never refresh the same account at once.

use crate::utils::address_table::RECORD_SIZE;
use crate::ScanError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Login identity from the configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Credential {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Cached token bookkeeping for one account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenState {
    pub refreshed_at: Option<DateTime<Utc>>,
    pub refresh_count: u32,
}

/// Token refresh service. Must be idempotent.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, credential: &Credential) -> crate::Result<()>;
}

/// Refresher for offline-mode usernames: no network, only validates the
/// name the server will see
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineRefresher;

#[async_trait]
impl TokenRefresher for OfflineRefresher {
    async fn refresh(&self, credential: &Credential) -> crate::Result<()> {
        let name = &credential.username;
        let valid = (3..=16).contains(&name.len())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid {
            Ok(())
        } else {
            Err(ScanError::Auth(format!("'{}' is not a valid offline username", name)))
        }
    }
}

/// A credential plus its serialized token state
#[derive(Debug)]
pub struct Account {
    credential: Credential,
    token: Mutex<TokenState>,
}

impl Account {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            token: Mutex::new(TokenState::default()),
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn username(&self) -> &str {
        &self.credential.username
    }

    /// Refresh this account's token. Concurrent callers queue on the
    /// account's lock; other accounts are unaffected.
    pub async fn refresh(&self, refresher: &dyn TokenRefresher) -> crate::Result<()> {
        let mut token = self.token.lock().await;
        refresher.refresh(&self.credential).await?;
        token.refreshed_at = Some(Utc::now());
        token.refresh_count += 1;
        Ok(())
    }

    pub async fn token_state(&self) -> TokenState {
        self.token.lock().await.clone()
    }
}

/// Fixed set of accounts, assigned to table records round-robin
#[derive(Debug, Clone, Default)]
pub struct CredentialPool {
    accounts: Vec<Arc<Account>>,
}

impl CredentialPool {
    pub fn new(credentials: impl IntoIterator<Item = Credential>) -> Self {
        Self {
            accounts: credentials
                .into_iter()
                .map(|c| Arc::new(Account::new(c)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Account>> {
        self.accounts.iter()
    }

    /// Account for the record at `byte_index` of the unrotated table
    pub fn for_record(&self, byte_index: usize) -> Option<Arc<Account>> {
        if self.accounts.is_empty() {
            return None;
        }
        let slot = (byte_index / RECORD_SIZE) % self.accounts.len();
        Some(Arc::clone(&self.accounts[slot]))
    }

    /// Refresh every account once, one after another. Returns the number
    /// of accounts whose refresh failed or panicked.
    pub async fn refresh_all(&self, refresher: &dyn TokenRefresher) -> usize {
        let mut failed = 0;
        for account in &self.accounts {
            match AssertUnwindSafe(account.refresh(refresher)).catch_unwind().await {
                Ok(Ok(())) => log::debug!("refreshed token for {}", account.username()),
                Ok(Err(e)) => {
                    failed += 1;
                    log::warn!("token refresh failed for {}: {}", account.username(), e);
                }
                Err(_) => {
                    failed += 1;
                    log::warn!("token refresh panicked for {}", account.username());
                }
            }
        }
        failed
    }
}
