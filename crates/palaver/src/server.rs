//! `PalaverServer` builder and server loop.
//!
//! This is the entry point for running a Palaver chat server. It ties
//! together all the layers: transport → protocol → session.

use std::sync::Arc;

use palaver_session::{AuthProvider, SessionConfig, SessionRegistry};
use palaver_transport::{TcpConnection, TcpTransport, Transport};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::PalaverError;
use crate::handler::handle_connection;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<A: AuthProvider> {
    pub(crate) registry: Arc<SessionRegistry<TcpConnection>>,
    pub(crate) auth: A,
    pub(crate) config: SessionConfig,
    /// Cancelled once to stop the server.
    pub(crate) shutdown: CancellationToken,
    /// Every connection handler and watchdog runs on this tracker, so
    /// shutdown can wait for all of them.
    pub(crate) tracker: TaskTracker,
}

/// Builder for configuring and starting a Palaver server.
///
/// # Example
///
/// ```rust,ignore
/// use palaver::prelude::*;
///
/// let server = PalaverServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .session_config(SessionConfig { idle_timeout_secs: 300, ..Default::default() })
///     .build(MemoryAuthProvider::new())
///     .await?;
/// server.run().await
/// ```
pub struct PalaverServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
}

impl PalaverServerBuilder {
    /// Creates a new builder listening on `0.0.0.0:8080` with default
    /// session settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            session_config: SessionConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Binds the listener and returns a server ready to [`run`](PalaverServer::run).
    ///
    /// # Errors
    /// [`PalaverError::Transport`] if the address can't be bound.
    pub async fn build<A: AuthProvider>(
        self,
        auth: A,
    ) -> Result<PalaverServer<A>, PalaverError> {
        let transport = TcpTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry: Arc::new(SessionRegistry::new()),
            auth,
            config: self.session_config,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        });

        Ok(PalaverServer { transport, state })
    }
}

impl Default for PalaverServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Palaver server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct PalaverServer<A: AuthProvider> {
    transport: TcpTransport,
    state: Arc<ServerState<A>>,
}

impl<A: AuthProvider> PalaverServer<A> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A token that stops the server when cancelled, exactly like an
    /// administrator's `/shutdown`.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Runs the accept loop until shutdown.
    ///
    /// Spawns a handler task per accepted connection. Once shutdown is
    /// requested it stops accepting, disconnects every session, waits for
    /// all handler and watchdog tasks to finish, and only then releases the
    /// listener and returns.
    pub async fn run(mut self) -> Result<(), PalaverError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "palaver server running");

        loop {
            tokio::select! {
                biased;
                _ = self.state.shutdown.cancelled() => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        self.state.tracker.spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("shutting down");
        let closed = self.state.registry.shutdown().await;

        self.state.tracker.close();
        self.state.tracker.wait().await;
        drop(self.transport);

        tracing::info!(closed, "palaver server stopped");
        Ok(())
    }
}
