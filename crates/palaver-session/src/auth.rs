//! The authentication provider: who a client is and what they may do.
//!
//! Palaver doesn't care where credentials live: a database, a file or an
//! external service. The session layer only talks to the
//! [`AuthProvider`] trait, and the server is generic over it. The crate
//! ships one implementation, [`MemoryAuthProvider`](crate::MemoryAuthProvider),
//! good enough for a single process and for tests.
//!
//! # Why async?
//!
//! Real providers do I/O. Declaring every method as returning a `Send`
//! future lets the server call them from any Tokio worker thread without
//! knowing the concrete provider type.

use std::future::Future;

/// Resolves credentials to identities and manages roles and bans.
///
/// # Trait bounds
///
/// - `Send + Sync` → one provider is shared by every connection task.
/// - `'static` → it lives as long as the server.
///
/// # Example
///
/// ```rust
/// use palaver_session::AuthProvider;
///
/// /// Lets everyone in under their login; nobody is an administrator.
/// struct OpenDoor;
///
/// impl AuthProvider for OpenDoor {
///     async fn resolve_identity(&self, login: &str, _password: &str) -> Option<String> {
///         Some(login.to_string())
///     }
///     async fn register(&self, _login: &str, _password: &str, _nickname: &str) -> bool {
///         false
///     }
///     async fn is_administrator(&self, _nickname: &str) -> bool {
///         false
///     }
///     async fn set_ban(&self, _nickname: &str, _minutes: u64) {}
///     async fn minutes_until_ban_ends(&self, _nickname: &str) -> i64 {
///         0
///     }
///     async fn rename_identity(&self, _old: &str, _new: &str) -> bool {
///         false
///     }
/// }
/// ```
pub trait AuthProvider: Send + Sync + 'static {
    /// Returns the nickname for a login/password pair, or `None` if the
    /// credentials don't match.
    fn resolve_identity(
        &self,
        login: &str,
        password: &str,
    ) -> impl Future<Output = Option<String>> + Send;

    /// Creates a new identity. Returns `false` if the login or the
    /// nickname already exists (or the identity couldn't be stored).
    fn register(
        &self,
        login: &str,
        password: &str,
        nickname: &str,
    ) -> impl Future<Output = bool> + Send;

    /// Whether the identity holds the administrator role. Called on every
    /// privileged command; callers must not cache the answer.
    fn is_administrator(
        &self,
        nickname: &str,
    ) -> impl Future<Output = bool> + Send;

    /// Bans the identity for `minutes` starting now. `0` means permanently.
    fn set_ban(
        &self,
        nickname: &str,
        minutes: u64,
    ) -> impl Future<Output = ()> + Send;

    /// Minutes left on the identity's ban. Zero or negative means not
    /// banned.
    fn minutes_until_ban_ends(
        &self,
        nickname: &str,
    ) -> impl Future<Output = i64> + Send;

    /// Renames an identity. Returns `false` if `old` is unknown, `new` is
    /// taken, or the change couldn't be stored.
    fn rename_identity(
        &self,
        old: &str,
        new: &str,
    ) -> impl Future<Output = bool> + Send;
}
