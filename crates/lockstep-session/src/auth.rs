//! Login credential check.
//!
//! The server doesn't store passwords. It asks an [`Authenticator`] whether
//! an `(account, password)` pair may log in, then allocates or reuses a
//! player id itself. [`AcceptAll`] is the default.

use crate::SessionError;

/// Validates lobby login credentials.
///
/// Called from the lobby's packet callback, so it must return promptly.
/// Implementations that need I/O should cache or precompute.
///
/// ```rust
/// use lockstep_session::{Authenticator, SessionError};
///
/// struct Allowlist(Vec<String>);
///
/// impl Authenticator for Allowlist {
///     fn authenticate(&self, account: &str, _password: &str) -> Result<(), SessionError> {
///         if self.0.iter().any(|a| a == account) {
///             Ok(())
///         } else {
///             Err(SessionError::AuthFailed(format!("{account} not allowed")))
///         }
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// # Errors
    /// [`SessionError::AuthFailed`] when the login must be refused.
    fn authenticate(&self, account: &str, password: &str) -> Result<(), SessionError>;
}

/// Accepts every login. For development and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Authenticator for AcceptAll {
    fn authenticate(&self, _account: &str, _password: &str) -> Result<(), SessionError> {
        Ok(())
    }
}
