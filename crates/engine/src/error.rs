use deskline_core::CoreError;
use deskline_identity::IdentityError;
use deskline_store::StoreError;

/// Errors surfaced by the synchronization engine and its mutation API.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// An optimistic write was rejected durably and rolled back locally.
    #[error("Change could not be saved: {0}")]
    NotSaved(String),

    /// First-run provisioning failed before any durable write landed.
    #[error("System setup failed: {0}")]
    Setup(String),

    /// A mutation or view was requested before a session was started.
    #[error("Engine is not attached to a store")]
    NotStarted,
}
