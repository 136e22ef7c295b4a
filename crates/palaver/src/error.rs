//! Unified error type for Palaver.

use palaver_protocol::ProtocolError;
use palaver_session::SessionError;
use palaver_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls, so
/// `?` converts layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum PalaverError {
    /// Binding, accepting, sending or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A line couldn't be parsed as a command.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Session lifecycle or identity store failure.
    #[error(transparent)]
    Session(#[from] SessionError),
}
