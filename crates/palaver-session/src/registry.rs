//! The session registry: every authenticated session, keyed by nickname.
//!
//! All mutations take the write lock for their whole duration, so each
//! one is atomic with respect to the others. Deliveries never happen
//! under the lock: the recipients are copied out first and written to one
//! after another on the caller's task.
//!
//! ```text
//! subscribe ──→ [registered] ──→ unsubscribe / disconnect
//!                    │
//!                    ├── change_nickname (key moves atomically)
//!                    └── shutdown (drained, force-closed)
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use palaver_protocol::notice;
use palaver_transport::{Connection, TransportError};
use tokio::sync::RwLock;

use crate::{AuthProvider, Session, SessionError};

/// Nickname of the built-in administrative account. Its arrival is not
/// announced.
pub const ADMIN_NICKNAME: &str = "admin";

struct Inner<C: Connection> {
    sessions: BTreeMap<String, Arc<Session<C>>>,
    closing: bool,
}

/// Registry of online sessions. Shared as `Arc<SessionRegistry<C>>`.
pub struct SessionRegistry<C: Connection> {
    inner: RwLock<Inner<C>>,
}

impl<C: Connection> Default for SessionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connection> SessionRegistry<C> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                sessions: BTreeMap::new(),
                closing: false,
            }),
        }
    }

    /// Registers `session` under its nickname and tells everyone else.
    ///
    /// # Errors
    /// - [`SessionError::Unauthenticated`] if the session has no nickname
    /// - [`SessionError::AlreadyConnected`] if the nickname is online
    /// - [`SessionError::ShuttingDown`] once [`shutdown`](Self::shutdown) ran
    pub async fn subscribe(
        &self,
        session: &Arc<Session<C>>,
    ) -> Result<(), SessionError> {
        let nickname = session.nickname().ok_or(SessionError::Unauthenticated)?;

        let others = {
            let mut inner = self.inner.write().await;
            if inner.closing {
                return Err(SessionError::ShuttingDown);
            }
            if inner.sessions.contains_key(&nickname) {
                return Err(SessionError::AlreadyConnected(nickname));
            }
            inner.sessions.insert(nickname.clone(), Arc::clone(session));
            snapshot_except(&inner.sessions, session)
        };

        tracing::info!(id = %session.id(), %nickname, "joined");
        if nickname != ADMIN_NICKNAME {
            deliver(&others, &notice::joined(&nickname)).await;
        }
        Ok(())
    }

    /// Removes `session` if it is still the one registered under its
    /// nickname, then announces the departure. Returns whether anything
    /// was removed; repeated calls are no-ops.
    pub async fn unsubscribe(&self, session: &Arc<Session<C>>) -> bool {
        let Some(nickname) = session.nickname() else {
            return false;
        };

        let remaining = {
            let mut inner = self.inner.write().await;
            if !is_entry(&inner.sessions, &nickname, session) {
                return false;
            }
            inner.sessions.remove(&nickname);
            inner.sessions.values().cloned().collect::<Vec<_>>()
        };

        tracing::info!(id = %session.id(), %nickname, "left");
        deliver(&remaining, &notice::left(&nickname)).await;
        true
    }

    /// Sends `text` to every registered session.
    pub async fn broadcast(&self, text: &str) {
        let recipients: Vec<_> =
            self.inner.read().await.sessions.values().cloned().collect();
        deliver(&recipients, text).await;
    }

    /// Sends `text` to each registered session named in `nicknames`. A
    /// nickname listed twice still gets one copy; unknown names are skipped.
    pub async fn send_to_users(&self, nicknames: &[&str], text: &str) {
        let recipients: Vec<_> = {
            let inner = self.inner.read().await;
            let mut seen = HashSet::new();
            nicknames
                .iter()
                .filter(|nick| seen.insert(**nick))
                .filter_map(|nick| inner.sessions.get(*nick).cloned())
                .collect()
        };
        deliver(&recipients, text).await;
    }

    /// Registered nicknames in sorted order.
    pub async fn list_users(&self) -> Vec<String> {
        self.inner.read().await.sessions.keys().cloned().collect()
    }

    /// Whether `nickname` is online.
    pub async fn contains(&self, nickname: &str) -> bool {
        self.inner.read().await.sessions.contains_key(nickname)
    }

    /// Tells the session under `nickname` it has been kicked and
    /// disconnects it. Returns the kicked session, or `None` if nobody by
    /// that name is online.
    pub async fn get_session_for_kick(
        &self,
        nickname: &str,
    ) -> Option<Arc<Session<C>>> {
        let target = self.inner.read().await.sessions.get(nickname).cloned()?;

        if let Err(e) = target.send(notice::KICKED).await {
            tracing::debug!(id = %target.id(), error = %e, "kick notice not delivered");
        }
        self.disconnect(&target).await;
        tracing::info!(%nickname, "kicked");
        Some(target)
    }

    /// Renames `session` to `new` in both the registry and the provider.
    ///
    /// Runs entirely under the write lock: `new` must not be online, the
    /// provider must accept the rename, and only then does the key move and
    /// the session pick up its new nickname. On any failure nothing
    /// changes. Returns whether the rename happened.
    pub async fn change_nickname<A: AuthProvider>(
        &self,
        session: &Arc<Session<C>>,
        new: &str,
        auth: &A,
    ) -> bool {
        let Some(old) = session.nickname() else {
            return false;
        };

        let mut inner = self.inner.write().await;
        if !is_entry(&inner.sessions, &old, session) || inner.sessions.contains_key(new) {
            return false;
        }
        if !auth.rename_identity(&old, new).await {
            return false;
        }

        if let Some(entry) = inner.sessions.remove(&old) {
            inner.sessions.insert(new.to_string(), entry);
        }
        session.set_nickname(Some(new.to_string()));
        tracing::info!(id = %session.id(), %old, %new, "nickname changed");
        true
    }

    /// Stops accepting subscriptions, drains every entry and closes each
    /// drained session. Returns how many sessions were closed.
    pub async fn shutdown(&self) -> usize {
        let drained = {
            let mut inner = self.inner.write().await;
            inner.closing = true;
            std::mem::take(&mut inner.sessions)
        };

        let mut closed = 0;
        for session in drained.into_values() {
            if session.close().await {
                closed += 1;
            }
        }
        tracing::info!(closed, "registry shut down");
        closed
    }

    /// Unsubscribes and closes `session`. Safe to call any number of times
    /// from any task.
    pub async fn disconnect(&self, session: &Arc<Session<C>>) {
        self.unsubscribe(session).await;
        if session.close().await {
            tracing::debug!(id = %session.id(), "session closed");
        }
    }
}

/// Whether `session` itself is what's registered under `nickname`.
fn is_entry<C: Connection>(
    sessions: &BTreeMap<String, Arc<Session<C>>>,
    nickname: &str,
    session: &Arc<Session<C>>,
) -> bool {
    sessions
        .get(nickname)
        .is_some_and(|entry| Arc::ptr_eq(entry, session))
}

fn snapshot_except<C: Connection>(
    sessions: &BTreeMap<String, Arc<Session<C>>>,
    skip: &Arc<Session<C>>,
) -> Vec<Arc<Session<C>>> {
    sessions
        .values()
        .filter(|s| !Arc::ptr_eq(s, skip))
        .cloned()
        .collect()
}

/// Writes `text` to each recipient in turn. A recipient whose connection
/// failed is closed and its own handler tears it down. A line the codec
/// refuses says nothing about the recipient, so it only gets logged.
async fn deliver<C: Connection>(recipients: &[Arc<Session<C>>], text: &str) {
    for session in recipients {
        match session.send(text).await {
            Ok(()) => {}
            Err(TransportError::Frame(e)) => {
                tracing::debug!(id = %session.id(), error = %e, "line not deliverable");
            }
            Err(e) => {
                tracing::debug!(id = %session.id(), error = %e, "delivery failed, closing recipient");
                session.close().await;
            }
        }
    }
}
