//! Error types for backup operations.

use kvgraph_store::StoreError;
use thiserror::Error;

/// Errors that can occur while restoring from or updating the durable copy.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The durable copy holds another structure under this key.
    #[error("backup holds a {found} at {key}, expected a {expected}")]
    WrongKind {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Writing the restored copy into the live store failed.
    #[error("restore into live store failed: {0}")]
    Store(#[from] StoreError),

    /// Snapshot serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The blocking facade could not start its runtime.
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Convenience type alias for backup operations.
pub type BackupResult<T> = std::result::Result<T, BackupError>;
