//! Error types for the collection sync engine.

use thiserror::Error;

/// Result type alias using spindle's [`SyncError`]
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can abort a scan, a merge or a collection write.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network failure talking to the remote service
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Remote service answered with a non-success status
    #[error("Remote API error: {status} {body}")]
    Remote { status: u16, body: String },

    /// Remote service no longer knows the requested entity
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uri whose type segment the client does not understand
    #[error("Unsupported entity kind: {0}")]
    UnsupportedEntityKind(String),

    /// A uri or gid that cannot be decoded into a stable id
    #[error("Invalid id: {0}")]
    InvalidId(String),

    /// Local mirror storage error
    #[error("Storage error: {0}")]
    Storage(#[from] redb::Error),

    /// Serialization error for stored rows or wire payloads
    #[error("Serialization error: {0}")]
    Codec(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A queued collection write was submitted and the flush failed
    #[error("Collection write rejected: {0}")]
    WriteRejected(String),

    /// The write queue worker has stopped
    #[error("Write queue closed")]
    QueueClosed,
}

impl SyncError {
    /// True for failures of the network or the remote API. A missing
    /// entity is an answer, not a failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Remote { .. })
    }
}

macro_rules! redb_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for SyncError {
                fn from(e: $ty) -> Self {
                    Self::Storage(redb::Error::from(e))
                }
            }
        )*
    };
}

redb_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);
