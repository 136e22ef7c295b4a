//! Per-connection handler: authentication and command dispatch.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Read lines until `/auth` or `/register` succeeds
//!   2. Subscribe to the registry, start the idle watchdog
//!   3. Loop: parse lines into commands and dispatch them

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use palaver_protocol::{
    Command, MAX_FRAME_LEN, ProtocolError, encoded_len, keyword, notice,
};
use palaver_session::{
    AuthProvider, Session, SessionError, SessionRegistry, SessionState,
    watch_activity,
};
use palaver_transport::TcpConnection;

use crate::PalaverError;
use crate::server::ServerState;

type ChatSession = Session<TcpConnection>;

/// Disconnects the session when the handler exits.
///
/// The normal exit path calls [`release`](Self::release). If the handler
/// bails out early with `?` or panics, `Drop` spawns the disconnect
/// instead, since it can't await.
struct SessionGuard {
    session: Option<Arc<ChatSession>>,
    registry: Arc<SessionRegistry<TcpConnection>>,
}

impl SessionGuard {
    async fn release(mut self) {
        if let Some(session) = self.session.take() {
            self.registry.disconnect(&session).await;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let registry = Arc::clone(&self.registry);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                registry.disconnect(&session).await;
            });
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A: AuthProvider>(
    conn: TcpConnection,
    state: Arc<ServerState<A>>,
) -> Result<(), PalaverError> {
    let peer = conn.peer_addr();
    let session = Session::new(conn);
    let conn_id = session.id();
    tracing::debug!(%conn_id, %peer, "handling new connection");

    let guard = SessionGuard {
        session: Some(Arc::clone(&session)),
        registry: Arc::clone(&state.registry),
    };
    session.advance(SessionState::Unauthenticated)?;

    // --- Step 1: Authentication ---
    let Some(nickname) = authenticate(&session, &state).await? else {
        guard.release().await;
        return Ok(());
    };

    // --- Step 2: Watchdog ---
    if !state.auth.is_administrator(&nickname).await {
        state.tracker.spawn(watch_activity(
            Arc::clone(&session),
            Arc::clone(&state.registry),
            state.config.clone(),
        ));
    }

    // --- Step 3: Command loop ---
    loop {
        let line = match session.recv().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::debug!(%conn_id, "connection closed");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(ProtocolError::Empty) => continue,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "ignoring malformed command");
                continue;
            }
        };

        if handle_command(&session, &state, command).await? {
            break;
        }
    }

    guard.release().await;
    Ok(())
}

/// Reads lines until the client authenticates. Returns the bound nickname,
/// or `None` if the connection ends (or the server shuts down) first.
async fn authenticate<A: AuthProvider>(
    session: &Arc<ChatSession>,
    state: &ServerState<A>,
) -> Result<Option<String>, PalaverError> {
    let conn_id = session.id();

    loop {
        let received = tokio::select! {
            biased;
            _ = state.shutdown.cancelled() => return Ok(None),
            received = session.recv() => received,
        };
        let line = match received {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error before authentication");
                return Ok(None);
            }
        };

        let nickname = match Command::parse(&line) {
            Ok(Command::Auth { login, password }) => {
                match state.auth.resolve_identity(&login, &password).await {
                    Some(nickname) => nickname,
                    None => {
                        tracing::debug!(%conn_id, %login, "invalid credentials");
                        session.send(notice::INVALID_CREDENTIALS).await?;
                        continue;
                    }
                }
            }
            Ok(Command::Register {
                login,
                nickname,
                password,
            }) => {
                if !state.auth.register(&login, &password, &nickname).await {
                    session.send(notice::IDENTITY_TAKEN).await?;
                    continue;
                }
                nickname
            }
            Err(ProtocolError::MissingArgument { command, .. })
                if command == keyword::AUTH || command == keyword::REGISTER =>
            {
                continue;
            }
            _ => {
                session.send(notice::AUTHENTICATE_FIRST).await?;
                continue;
            }
        };

        session.set_nickname(Some(nickname.clone()));
        match state.registry.subscribe(session).await {
            Ok(()) => {}
            Err(SessionError::AlreadyConnected(nickname)) => {
                session.set_nickname(None);
                session.send(&notice::already_online(&nickname)).await?;
                continue;
            }
            Err(SessionError::ShuttingDown) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        session.advance(SessionState::Authenticated)?;
        session.touch();
        session.send(&notice::welcome(&nickname)).await?;
        tracing::info!(%conn_id, %nickname, "authenticated");
        return Ok(Some(nickname));
    }
}

/// Dispatches one command from an authenticated session. Returns `true`
/// when the session should end.
async fn handle_command<A: AuthProvider>(
    session: &Arc<ChatSession>,
    state: &ServerState<A>,
    command: Command,
) -> Result<bool, PalaverError> {
    let Some(nickname) = session.nickname() else {
        return Ok(true);
    };

    if command.is_ban_gated() {
        let minutes_left = state.auth.minutes_until_ban_ends(&nickname).await;
        if minutes_left > 0 {
            state
                .registry
                .send_to_users(&[nickname.as_str()], &notice::banned(minutes_left))
                .await;
            return Ok(false);
        }
    }

    if command.requires_admin() && !state.auth.is_administrator(&nickname).await {
        tracing::debug!(%nickname, ?command, "privileged command refused");
        return Ok(false);
    }

    match command {
        Command::Auth { .. } | Command::Register { .. } => {
            tracing::debug!(%nickname, "already authenticated");
        }
        Command::List => {
            let users = state.registry.list_users().await.join(", ");
            session.send(&users).await?;
            session.touch();
        }
        Command::Whisper { recipient, text } => {
            let line = notice::chat_line(now(), &nickname, &text);
            if !fits_in_frame(&line) {
                tracing::debug!(%nickname, "dropping oversized direct message");
                return Ok(false);
            }
            state
                .registry
                .send_to_users(&[recipient.as_str(), nickname.as_str()], &line)
                .await;
            session.touch();
        }
        Command::ChangeNick { nickname: new } => {
            if state.registry.change_nickname(session, &new, &state.auth).await {
                state.registry.broadcast(&notice::renamed(&nickname, &new)).await;
                session.touch();
            } else {
                session.send(&notice::nickname_unavailable(&new)).await?;
            }
        }
        Command::Kick { nickname: target } => {
            if state.registry.get_session_for_kick(&target).await.is_none() {
                tracing::debug!(%nickname, %target, "kick target not online");
            }
            session.touch();
        }
        Command::Ban {
            nickname: target,
            minutes,
        } => {
            state.auth.set_ban(&target, minutes).await;
            state
                .registry
                .send_to_users(&[target.as_str()], &notice::ban_imposed(minutes))
                .await;
            tracing::info!(%nickname, %target, minutes, "banned");
            session.touch();
        }
        Command::Shutdown => {
            tracing::info!(%nickname, "shutdown requested");
            state.shutdown.cancel();
        }
        Command::Exit => return Ok(true),
        Command::Broadcast(text) => {
            let line = notice::chat_line(now(), &nickname, &text);
            if !fits_in_frame(&line) {
                tracing::debug!(%nickname, "dropping oversized chat line");
                return Ok(false);
            }
            state.registry.broadcast(&line).await;
            session.touch();
        }
    }

    Ok(false)
}

/// A client can send a line that fits a frame only until the timestamp
/// and nickname are prepended.
fn fits_in_frame(line: &str) -> bool {
    encoded_len(line) <= MAX_FRAME_LEN
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}
