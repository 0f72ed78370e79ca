/// Errors surfaced by the store boundary.
///
/// Every adapter method fails closed — typed error or empty result —
/// rather than panicking; callers decide whether an error is
/// user-visible.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store unreachable at open time or during a durable write.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The store rejected a write (permission, malformed path).
    #[error("Write rejected: {0}")]
    Rejected(String),

    /// A value could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An inline asset exceeded the hard size ceiling.
    #[error("Asset of {size} bytes exceeds the {max}-byte inline limit")]
    AssetTooLarge { size: usize, max: usize },

    /// The asset upload endpoint failed.
    #[error("Asset upload failed: {0}")]
    Upload(String),
}
