//! Object store error types.

use thiserror::Error;

/// Result type for object store operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors that can occur talking to the object store.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("S3 operation failed: {0}")]
    S3(String),

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("local file not found: {0}")]
    FileMissing(String),

    #[error("file too large: {size} bytes exceeds the {limit} byte upload limit")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] r2offload_crypto::CryptoError),
}
