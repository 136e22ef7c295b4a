//! Error types for the session layer.

/// Errors that can occur during session management.
///
/// These cover the lifecycle of a client session: state transitions,
/// registration in the registry, and the identity store behind
/// [`MemoryAuthProvider`](crate::MemoryAuthProvider).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The nickname already has a live session in the registry.
    /// A nickname can only be online once.
    #[error("{0} already has an active session")]
    AlreadyConnected(String),

    /// The session has no nickname yet, so it can't be registered.
    #[error("session is not authenticated")]
    Unauthenticated,

    /// The registry is shutting down and refuses new subscriptions.
    #[error("registry is shutting down")]
    ShuttingDown,

    /// A lifecycle transition that would skip a state or leave `Closed`.
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: crate::SessionState,
        to: crate::SessionState,
    },

    /// The identity store could not be loaded or saved.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures reading or writing the identity file.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("identity store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("identity store is malformed: {0}")]
    Json(#[from] serde_json::Error),
}
