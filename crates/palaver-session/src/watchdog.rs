//! Idle eviction for authenticated, non-administrator sessions.

use std::sync::Arc;
use std::time::Duration;

use palaver_protocol::notice;
use palaver_transport::Connection;
use rand::Rng;
use tokio::time::Instant;

use crate::{Session, SessionConfig, SessionRegistry};

/// Polls `session` until it closes, disconnecting it once it has been idle
/// for `config.idle_timeout()`.
///
/// The first poll is delayed by a random jitter so sessions that
/// authenticate together don't poll together. The watchdog returns as soon
/// as the session closes for any reason.
pub async fn watch_activity<C: Connection>(
    session: Arc<Session<C>>,
    registry: Arc<SessionRegistry<C>>,
    config: SessionConfig,
) {
    let timeout = config.idle_timeout();
    let poll = config.watchdog_poll();
    let jitter = if config.watchdog_jitter_ms > 0 {
        Duration::from_millis(rand::rng().random_range(0..config.watchdog_jitter_ms))
    } else {
        Duration::ZERO
    };
    let mut next_poll = Instant::now() + poll + jitter;

    loop {
        tokio::select! {
            biased;
            _ = session.closed() => return,
            _ = tokio::time::sleep_until(next_poll) => {}
        }

        let idle = session.idle_for();
        tracing::trace!(id = %session.id(), ?idle, "watchdog poll");
        if idle >= timeout {
            break;
        }
        next_poll += poll;
    }

    tracing::warn!(
        id = %session.id(),
        nickname = ?session.nickname(),
        idle_secs = timeout.as_secs(),
        "disconnecting idle session"
    );
    if let Err(e) = session.send(notice::IDLE_TIMEOUT).await {
        tracing::debug!(id = %session.id(), error = %e, "idle notice not delivered");
    }
    registry.disconnect(&session).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{drain, named_session};

    fn config() -> SessionConfig {
        SessionConfig {
            idle_timeout_secs: 60,
            watchdog_poll_ms: 1_000,
            watchdog_jitter_ms: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_evicts_idle_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, mut rx) = named_session(1, "A");
        registry.subscribe(&session).await.unwrap();

        let watchdog = tokio::spawn(watch_activity(
            Arc::clone(&session),
            Arc::clone(&registry),
            config(),
        ));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(!session.is_closed(), "not idle long enough yet");

        tokio::time::sleep(Duration::from_secs(2)).await;
        watchdog.await.unwrap();

        assert!(session.is_closed());
        assert_eq!(drain(&mut rx), vec!["Disconnected due to inactivity"]);
        assert!(registry.list_users().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_activity_postpones_eviction() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, _rx) = named_session(1, "A");
        registry.subscribe(&session).await.unwrap();

        tokio::spawn(watch_activity(
            Arc::clone(&session),
            Arc::clone(&registry),
            config(),
        ));

        tokio::time::sleep(Duration::from_secs(45)).await;
        session.touch();
        tokio::time::sleep(Duration::from_secs(45)).await;

        assert!(!session.is_closed(), "touch reset the idle clock");

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(session.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_exits_when_session_closes() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, mut rx) = named_session(1, "A");
        registry.subscribe(&session).await.unwrap();

        let watchdog = tokio::spawn(watch_activity(
            Arc::clone(&session),
            Arc::clone(&registry),
            config(),
        ));

        registry.disconnect(&session).await;
        tokio::time::timeout(Duration::from_secs(1), watchdog)
            .await
            .expect("watchdog should stop promptly")
            .unwrap();

        assert!(drain(&mut rx).is_empty(), "no idle notice after a normal close");
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_tolerates_very_long_idle_periods() {
        let registry = Arc::new(SessionRegistry::new());
        let (session, _rx) = named_session(1, "A");
        registry.subscribe(&session).await.unwrap();

        tokio::spawn(watch_activity(
            Arc::clone(&session),
            Arc::clone(&registry),
            SessionConfig {
                idle_timeout_secs: u64::MAX,
                watchdog_poll_ms: 3_600_000,
                watchdog_jitter_ms: 0,
            },
        ));

        // Sixty days idle is more milliseconds than fit in 32 bits.
        tokio::time::sleep(Duration::from_secs(60 * 24 * 3_600)).await;

        assert!(!session.is_closed());
        assert_eq!(registry.list_users().await, vec!["A"]);
    }
}
