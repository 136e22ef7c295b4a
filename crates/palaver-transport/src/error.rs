use palaver_protocol::FrameError;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed (locally or by the peer).
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding the listening socket failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Accepting a connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Frame(FrameError),
}

impl From<FrameError> for TransportError {
    /// Routes codec I/O failures to the receive variant; everything else
    /// is a framing problem.
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => Self::ReceiveFailed(e),
            other => Self::Frame(other),
        }
    }
}
