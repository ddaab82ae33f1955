//! The object store seam the transfer engine depends on.

use crate::error::CloudResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Result of a connection test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub success: bool,
    pub message: String,
}

impl ConnectionStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// An object written to the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedObject {
    pub key: String,
    pub url: String,
    pub size: u64,
    pub content_type: String,
}

/// Remote object storage keyed by string paths.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Checks that the configured bucket is reachable with the credentials.
    async fn test_connection(&self) -> ConnectionStatus;

    /// Uploads `local_path` to `remote_key`.
    async fn upload(&self, local_path: &Path, remote_key: &str) -> CloudResult<UploadedObject>;

    /// Downloads `remote_key` into `local_path`. Nothing is left at
    /// `local_path` when the download fails.
    async fn download(&self, remote_key: &str, local_path: &Path) -> CloudResult<()>;

    /// Deletes `remote_key`. Deleting a missing key succeeds.
    async fn delete(&self, remote_key: &str) -> CloudResult<()>;

    /// Whether `remote_key` exists. Errors count as absent.
    async fn exists(&self, remote_key: &str) -> bool;

    /// Public URL of `remote_key`.
    fn public_url_for(&self, remote_key: &str) -> String;
}
