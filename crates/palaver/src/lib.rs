//! # Palaver
//!
//! A multi-user chat server speaking a small line-based command protocol
//! over TCP.
//!
//! Clients authenticate (or register), then talk in one shared room:
//! plain lines are broadcast to everyone, `/w` sends a direct message,
//! `/list` shows who's online. Administrators can `/kick`, `/ban` and
//! `/shutdown`. Quiet non-administrator sessions are disconnected after
//! an idle timeout.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use palaver::prelude::*;
//!
//! # async fn start() -> Result<(), PalaverError> {
//! let auth = MemoryAuthProvider::new()
//!     .with_identity(Identity::new("root", "secret", "admin", Role::Administrator));
//!
//! let server = PalaverServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(auth)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::PalaverError;
pub use server::{PalaverServer, PalaverServerBuilder};

/// Everything needed to configure and run a server.
pub mod prelude {
    pub use crate::{PalaverError, PalaverServer, PalaverServerBuilder};
    pub use palaver_session::{
        ADMIN_NICKNAME, AuthProvider, Identity, MemoryAuthProvider, Role,
        SessionConfig,
    };
}
