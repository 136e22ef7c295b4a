//! Error types for the protocol layer.
//!
//! Each crate in Palaver defines its own error enum. When you see a
//! `ProtocolError`, the problem is in the *content* of a line; a
//! `FrameError` means the byte stream itself could not be split into lines.

/// Errors produced while parsing a command line.
///
/// None of these are fatal to a session. The connection handler treats
/// them as "ignore this line"; malformed input is tolerated silently.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The line contained nothing but whitespace.
    #[error("empty line")]
    Empty,

    /// A command was sent without one of its required arguments,
    /// e.g. `/kick` with no nickname.
    #[error("{command}: missing argument `{argument}`")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    /// An argument was present but could not be interpreted,
    /// e.g. `/ban bob soon`.
    #[error("{command}: invalid argument `{value}`")]
    InvalidArgument {
        command: &'static str,
        value: String,
    },
}

/// Errors produced by [`FrameCodec`](crate::FrameCodec).
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The underlying stream failed. `tokio_util`'s codec traits require
    /// the error type to be constructible from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An outbound line does not fit into a 16-bit length prefix.
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    /// An inbound frame was not valid UTF-8.
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}
