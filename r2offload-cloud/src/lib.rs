//! Object store client for Cloudflare R2.
//!
//! R2 speaks the S3 API, so the client is a thin layer over `aws-sdk-s3`
//! with the behaviors the offload engine relies on:
//! - a hard upload size ceiling checked before any network call
//! - idempotent deletes and a boolean `exists`
//! - atomic downloads (temporary sibling file, then rename)
//! - bounded connect and operation timeouts
//!
//! The engine depends on the [`ObjectStore`] trait, not on [`R2Client`].

pub mod config;
pub mod credentials;
pub mod error;
pub mod object_store;
pub mod r2_client;

pub use config::CloudConfig;
pub use credentials::{R2Credentials, StoredCredentials};
pub use error::{CloudError, CloudResult};
pub use object_store::{ConnectionStatus, ObjectStore, UploadedObject};
pub use r2_client::{
    check_uploadable, detect_content_type, guess_content_type, R2Client, MAX_UPLOAD_BYTES,
};
