/// Errors from the external identity provider.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The email/password pair did not match a known identity.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// An identity already exists for this email.
    #[error("An identity already exists for {0}")]
    AlreadyExists(String),

    /// The provider itself failed (network, internal error).
    #[error("Identity provider error: {0}")]
    Provider(String),
}
