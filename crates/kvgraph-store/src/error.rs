/// Errors from key-value store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The key holds a value of another structure (e.g. a list where a hash
    /// was expected).
    #[error("wrong type for key {key}: expected {expected}, found {found}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// An increment hit a value that is not an integer.
    #[error("value at {key} is not an integer")]
    NotAnInteger { key: String },

    /// The operation was abandoned because its cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The backend could not be reached or failed internally.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
