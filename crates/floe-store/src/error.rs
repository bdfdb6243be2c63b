//! Error types for the persistence layer.

/// Errors returned by [`SchedStore`](crate::SchedStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Fjall database error.
    #[error("fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    /// I/O error (e.g. from Fjall guard operations).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Codec(#[from] postcard::Error),

    /// A stored record is unreadable or carries an unknown version tag.
    #[error("corrupt record: {0}")]
    CorruptData(String),
}
