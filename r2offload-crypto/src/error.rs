//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur while sealing a secret.
///
/// Opening a secret never errors: failures there yield an empty string.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("secure random generator unavailable: {0}")]
    Rng(String),

    #[error("encryption failed: {0}")]
    Encryption(String),
}
