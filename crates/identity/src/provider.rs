//! The identity-provider contract.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::IdentityError;

/// An externally-authenticated subject.
///
/// Carries only what the provider knows: a stable subject ID and the
/// email it authenticated with. Everything else (role, company, unit)
/// lives on the synchronized user profile the session binder resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub email: String,
}

/// External authentication service.
///
/// The auth-state stream is the source of truth for who is signed in;
/// `sign_in`/`sign_out` report success or failure but consumers react to
/// the stream, so provider-initiated changes (expiry, revocation) flow
/// through the same path.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authenticate with email and password.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, IdentityError>;

    /// Register a new identity. Fails with
    /// [`IdentityError::AlreadyExists`] when the email is taken.
    async fn create_identity(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Principal, IdentityError>;

    /// End the current session.
    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Live auth-state stream: `Some(principal)` while signed in.
    fn watch_auth(&self) -> watch::Receiver<Option<Principal>>;
}
