//! Session types: the server's record of one connected client.
//!
//! A session tracks:
//! - WHERE the client is (its [`Connection`])
//! - WHO the client is (a nickname, once authenticated)
//! - WHAT state it's in ([`SessionState`])
//! - WHEN it last did something (for idle eviction)

use std::sync::Arc;
use std::time::Duration;

use palaver_transport::{Connection, ConnectionId, TransportError};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
///
/// Controls the activity watchdog. Sensible defaults are provided; override
/// just the fields you care about with struct update syntax.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long (in seconds) a non-administrator session may stay idle
    /// before it is disconnected.
    ///
    /// Default: 1200 seconds (20 minutes).
    pub idle_timeout_secs: u64,

    /// How often (in milliseconds) the watchdog checks for idleness.
    /// Eviction can overshoot the timeout by up to one poll interval.
    ///
    /// Default: 10 seconds.
    pub watchdog_poll_ms: u64,

    /// Upper bound (in milliseconds) of a random delay added to the first
    /// poll, so sessions that log in together don't poll in lockstep.
    /// `0` disables the jitter.
    pub watchdog_jitter_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 20 * 60,
            watchdog_poll_ms: 10_000,
            watchdog_jitter_ms: 1_000,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn watchdog_poll(&self) -> Duration {
        Duration::from_millis(self.watchdog_poll_ms.max(1))
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The lifecycle state of a session.
///
/// Transitions are strictly ordered, no skipping states:
///
/// ```text
/// Connecting → Unauthenticated → Authenticated → Closed
///      │               │                            ↑
///      └───────────────┴────────────────────────────┘
/// ```
///
/// Any state may close. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, handler not yet reading.
    Connecting,
    /// Reading lines; only `/auth` and `/register` are accepted.
    Unauthenticated,
    /// Nickname bound and subscribed to the registry.
    Authenticated,
    /// Connection released. Nothing happens after this.
    Closed,
}

impl SessionState {
    /// Whether moving from `self` to `next` is allowed.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Unauthenticated)
                | (Unauthenticated, Authenticated)
                | (Connecting | Unauthenticated | Authenticated, Closed)
        )
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single client's session on the server.
///
/// Always handled as `Arc<Session<C>>`: the connection handler owns the
/// reading side, while the registry and the watchdog hold clones to
/// deliver messages and to force a disconnect. Interior state uses
/// `parking_lot` locks that are never held across an `.await`.
pub struct Session<C: Connection> {
    conn: C,
    nickname: RwLock<Option<String>>,
    state: Mutex<SessionState>,
    last_activity: Mutex<Instant>,
    closed: CancellationToken,
}

impl<C: Connection> Session<C> {
    /// Wraps a freshly accepted connection. The session starts in
    /// [`SessionState::Connecting`].
    pub fn new(conn: C) -> Arc<Self> {
        Arc::new(Self {
            conn,
            nickname: RwLock::new(None),
            state: Mutex::new(SessionState::Connecting),
            last_activity: Mutex::new(Instant::now()),
            closed: CancellationToken::new(),
        })
    }

    /// The underlying connection's identifier, for logging.
    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    /// The bound nickname, if authenticated.
    pub fn nickname(&self) -> Option<String> {
        self.nickname.read().clone()
    }

    /// Binds (or clears) the nickname.
    ///
    /// Once the session is registered, only the registry may call this,
    /// since the nickname is the registry key.
    pub fn set_nickname(&self, nickname: Option<String>) {
        *self.nickname.write() = nickname;
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Moves to `next` if the transition is allowed.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidTransition`] for skipped states or
    /// any move out of `Closed`.
    pub fn advance(&self, next: SessionState) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        if !state.can_advance_to(next) {
            return Err(SessionError::InvalidTransition {
                from: *state,
                to: next,
            });
        }
        *state = next;
        Ok(())
    }

    /// Records activity now.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last recorded activity.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Sends one line to the client.
    pub async fn send(&self, line: &str) -> Result<(), TransportError> {
        self.conn.send(line).await
    }

    /// Receives the next line from the client.
    ///
    /// Returns `Ok(None)` on end-of-stream and as soon as the session is
    /// closed from anywhere else.
    pub async fn recv(&self) -> Result<Option<String>, TransportError> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Ok(None),
            line = self.conn.recv() => line,
        }
    }

    /// Closes the session.
    ///
    /// Returns `true` for the call that actually closed it and `false` for
    /// every later call, so concurrent closers (read loop, watchdog, kick,
    /// shutdown) can race safely.
    pub async fn close(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Closed {
                return false;
            }
            *state = SessionState::Closed;
        }

        self.closed.cancel();
        if let Err(e) = self.conn.close().await {
            tracing::debug!(id = %self.conn.id(), error = %e, "error while closing connection");
        }
        true
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the session is closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock_session;

    #[test]
    fn test_state_transitions_follow_lifecycle() {
        use SessionState::*;
        assert!(Connecting.can_advance_to(Unauthenticated));
        assert!(Unauthenticated.can_advance_to(Authenticated));
        assert!(Authenticated.can_advance_to(Closed));
        assert!(Connecting.can_advance_to(Closed));

        // No skipping, no going back, nothing after Closed.
        assert!(!Connecting.can_advance_to(Authenticated));
        assert!(!Authenticated.can_advance_to(Unauthenticated));
        assert!(!Closed.can_advance_to(Unauthenticated));
        assert!(!Closed.can_advance_to(Closed));
    }

    #[test]
    fn test_default_config_is_twenty_minutes() {
        let config = SessionConfig::default();
        assert_eq!(config.idle_timeout(), Duration::from_secs(1200));
        assert_eq!(config.watchdog_poll(), Duration::from_secs(10));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "idle_timeout_secs": 60 }"#).unwrap();
        assert_eq!(config.idle_timeout_secs, 60);
        assert_eq!(config.watchdog_poll_ms, 10_000);
    }

    #[tokio::test]
    async fn test_advance_rejects_skipping_authentication() {
        let (session, _outbox) = mock_session(1);

        let result = session.advance(SessionState::Authenticated);

        assert!(matches!(
            result,
            Err(SessionError::InvalidTransition {
                from: SessionState::Connecting,
                to: SessionState::Authenticated,
            })
        ));
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (session, _outbox) = mock_session(1);

        assert!(session.close().await, "first close wins");
        assert!(!session.close().await, "second close is a no-op");
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.is_closed());
        assert!(session.advance(SessionState::Unauthenticated).is_err());
    }

    #[tokio::test]
    async fn test_close_wakes_pending_recv() {
        let (session, _outbox) = mock_session(1);
        let reader = Arc::clone(&session);
        let pending = tokio::spawn(async move { reader.recv().await });
        tokio::task::yield_now().await;

        session.close().await;

        let line = pending.await.unwrap().unwrap();
        assert!(line.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_resets_idle_time() {
        let (session, _outbox) = mock_session(1);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(session.idle_for() >= Duration::from_secs(30));

        session.touch();
        assert!(session.idle_for() < Duration::from_secs(1));
    }
}
