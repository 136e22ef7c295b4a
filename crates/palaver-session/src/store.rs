//! An in-memory [`AuthProvider`] with optional JSON persistence.
//!
//! All identities are kept in memory behind one async `RwLock`. When a
//! file path is configured, every mutation rewrites the file while still
//! holding the write lock, so the file always matches memory and
//! concurrent mutations are persisted in order.
//!
//! The file is a JSON array of [`Identity`] records:
//!
//! ```json
//! [
//!   { "login": "root", "password": "hunter2", "nickname": "admin", "role": "administrator" },
//!   { "login": "bob", "password": "pw", "nickname": "Bob" }
//! ]
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{AuthProvider, SessionError, StoreError};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// What an identity is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    #[default]
    User,
}

/// A ban interval. Permanent bans end at the latest representable instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanWindow {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub end: DateTime<Utc>,
}

impl BanWindow {
    /// A ban of `minutes` starting at `start`; `0` means permanent.
    pub fn starting_at(start: DateTime<Utc>, minutes: u64) -> Self {
        let end = if minutes == 0 {
            DateTime::<Utc>::MAX_UTC
        } else {
            i64::try_from(minutes)
                .ok()
                .and_then(TimeDelta::try_minutes)
                .and_then(|len| start.checked_add_signed(len))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        };
        Self { start, end }
    }

    /// Whole minutes left at `now`, rounded up: any time remaining at all
    /// counts as at least one minute. Zero or negative once the ban is over.
    pub fn minutes_remaining(&self, now: DateTime<Utc>) -> i64 {
        let secs = self.end.signed_duration_since(now).num_seconds();
        if secs > 0 {
            (secs + 59) / 60
        } else {
            secs / 60
        }
    }
}

/// One stored identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub login: String,
    pub password: String,
    pub nickname: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ban: Option<BanWindow>,
}

impl Identity {
    pub fn new(
        login: impl Into<String>,
        password: impl Into<String>,
        nickname: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            nickname: nickname.into(),
            role,
            ban: None,
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryAuthProvider
// ---------------------------------------------------------------------------

/// Identity directory held in memory, optionally mirrored to a JSON file.
#[derive(Debug, Default)]
pub struct MemoryAuthProvider {
    identities: RwLock<Vec<Identity>>,
    path: Option<PathBuf>,
}

impl MemoryAuthProvider {
    /// An empty, memory-only directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an identity up front. Meant for bootstrapping and tests; no
    /// uniqueness check is made.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identities.get_mut().push(identity);
        self
    }

    /// Loads identities from `path` and persists every later change there.
    /// A missing file is treated as an empty directory.
    ///
    /// # Errors
    /// [`SessionError::Store`] if the file can't be read or isn't a JSON
    /// array of identities.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let identities = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<Identity>>(&bytes)
                .map_err(StoreError::from)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "identity file not found, starting empty");
                Vec::new()
            }
            Err(e) => return Err(StoreError::from(e).into()),
        };

        tracing::info!(
            path = %path.display(),
            count = identities.len(),
            "loaded identities"
        );
        Ok(Self {
            identities: RwLock::new(identities),
            path: Some(path),
        })
    }

    /// Adds `identity` unless its login or nickname is already taken.
    /// Returns whether it was added.
    pub async fn ensure_identity(
        &self,
        identity: Identity,
    ) -> Result<bool, SessionError> {
        let mut identities = self.identities.write().await;
        if identities.iter().any(|i| {
            i.login == identity.login || i.nickname == identity.nickname
        }) {
            return Ok(false);
        }
        identities.push(identity);
        self.persist(&identities).await?;
        Ok(true)
    }

    /// A copy of every stored identity.
    pub async fn identities(&self) -> Vec<Identity> {
        self.identities.read().await.clone()
    }

    /// Rewrites the backing file, if any. Writes to a sibling temp file
    /// first so a crash never leaves a truncated store behind.
    async fn persist(&self, identities: &[Identity]) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(identities)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

impl AuthProvider for MemoryAuthProvider {
    async fn resolve_identity(
        &self,
        login: &str,
        password: &str,
    ) -> Option<String> {
        self.identities
            .read()
            .await
            .iter()
            .find(|i| i.login == login && i.password == password)
            .map(|i| i.nickname.clone())
    }

    async fn register(
        &self,
        login: &str,
        password: &str,
        nickname: &str,
    ) -> bool {
        let mut identities = self.identities.write().await;
        if identities
            .iter()
            .any(|i| i.login == login || i.nickname == nickname)
        {
            return false;
        }

        identities.push(Identity::new(login, password, nickname, Role::User));
        if let Err(e) = self.persist(&identities).await {
            tracing::warn!(%login, error = %e, "failed to persist registration");
            identities.pop();
            return false;
        }

        tracing::info!(%login, %nickname, "identity registered");
        true
    }

    async fn is_administrator(&self, nickname: &str) -> bool {
        self.identities
            .read()
            .await
            .iter()
            .any(|i| i.nickname == nickname && i.role == Role::Administrator)
    }

    async fn set_ban(&self, nickname: &str, minutes: u64) {
        let mut identities = self.identities.write().await;
        let Some(identity) =
            identities.iter_mut().find(|i| i.nickname == nickname)
        else {
            tracing::debug!(%nickname, "ban target not found");
            return;
        };

        identity.ban = Some(BanWindow::starting_at(Utc::now(), minutes));
        tracing::info!(%nickname, minutes, "identity banned");

        if let Err(e) = self.persist(&identities).await {
            tracing::warn!(%nickname, error = %e, "failed to persist ban");
        }
    }

    async fn minutes_until_ban_ends(&self, nickname: &str) -> i64 {
        self.identities
            .read()
            .await
            .iter()
            .find(|i| i.nickname == nickname)
            .and_then(|i| i.ban)
            .map_or(0, |ban| ban.minutes_remaining(Utc::now()))
    }

    async fn rename_identity(&self, old: &str, new: &str) -> bool {
        let mut identities = self.identities.write().await;
        if identities.iter().any(|i| i.nickname == new) {
            return false;
        }
        let Some(index) = identities.iter().position(|i| i.nickname == old)
        else {
            return false;
        };

        identities[index].nickname = new.to_string();
        if let Err(e) = self.persist(&identities).await {
            tracing::warn!(%old, %new, error = %e, "failed to persist rename");
            identities[index].nickname = old.to_string();
            return false;
        }
        true
    }
}
