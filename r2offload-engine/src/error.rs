//! Engine error types.
//!
//! Per-item transfer failures are not errors: they become Failed queue rows.
//! An `EngineError` means the engine's own infrastructure failed.

use r2offload_storage::StorageError;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
