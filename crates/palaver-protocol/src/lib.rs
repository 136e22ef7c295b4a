//! Wire protocol for Palaver.
//!
//! This crate defines the "language" that chat clients and the server speak:
//!
//! - **Framing** ([`FrameCodec`]): how one line of text is delimited on a
//!   byte stream (a 2-byte length prefix followed by UTF-8).
//! - **Commands** ([`Command`]): the typed form of a line the client sent,
//!   produced by a single parser.
//! - **Notices** ([`notice`]): every fixed text the server sends back, plus
//!   the timestamped chat line format.
//! - **Errors** ([`ProtocolError`], [`FrameError`]): what can go wrong while
//!   framing or parsing.
//!
//! # Architecture
//!
//! The protocol layer doesn't know about sockets, sessions, or the registry.
//! It only turns bytes into lines and lines into commands.
//!
//! ```text
//! Transport (bytes) → FrameCodec (line) → Command → Session layer
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod command;
mod error;
pub mod notice;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{FrameCodec, MAX_FRAME_LEN, encoded_len};
pub use command::{keyword, Command};
pub use error::{FrameError, ProtocolError};
