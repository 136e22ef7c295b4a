//! Client sessions for Palaver.
//!
//! This crate handles everything that happens between a connection being
//! accepted and it going away:
//!
//! 1. **Authentication**: who a client is ([`AuthProvider`] trait, with
//!    [`MemoryAuthProvider`] as the bundled implementation)
//! 2. **Session tracking**: who's online ([`SessionRegistry`])
//! 3. **Idle eviction**: disconnecting quiet clients ([`watch_activity`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)  ← runs one handler per connection, drives sessions
//!     ↕
//! Session Layer (this crate)  ← identity, presence, delivery
//!     ↕
//! Transport + Protocol (below)  ← framed lines, commands, notices
//! ```

mod auth;
mod error;
mod registry;
mod session;
mod store;
mod watchdog;

#[cfg(test)]
mod testing;

pub use auth::AuthProvider;
pub use error::{SessionError, StoreError};
pub use registry::{ADMIN_NICKNAME, SessionRegistry};
pub use session::{Session, SessionConfig, SessionState};
pub use store::{BanWindow, Identity, MemoryAuthProvider, Role};
pub use watchdog::watch_activity;
