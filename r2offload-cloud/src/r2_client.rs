//! `aws-sdk-s3` backed client for one R2 bucket.

use crate::config::CloudConfig;
use crate::credentials::R2Credentials;
use crate::error::{CloudError, CloudResult};
use crate::object_store::{ConnectionStatus, ObjectStore, UploadedObject};
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Largest file accepted for upload: 70 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 70 * 1024 * 1024;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Client for one bucket. The SDK client is built on first use and reused;
/// changing credentials means building a new `R2Client`.
pub struct R2Client {
    credentials: R2Credentials,
    config: CloudConfig,
    endpoint: String,
    client: OnceLock<S3Client>,
}

impl fmt::Debug for R2Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("R2Client")
            .field("bucket", &self.credentials.bucket)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl R2Client {
    /// Validates credentials and config. Makes no network call.
    pub fn new(credentials: R2Credentials, config: CloudConfig) -> CloudResult<Self> {
        credentials.validate()?;
        config.validate()?;
        let endpoint = config.endpoint_for(&credentials.account_id);
        Ok(Self {
            credentials,
            config,
            endpoint,
            client: OnceLock::new(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.credentials.bucket
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn client(&self) -> &S3Client {
        self.client.get_or_init(|| self.build_client())
    }

    fn build_client(&self) -> S3Client {
        let credentials = aws_credential_types::Credentials::new(
            &self.credentials.access_key_id,
            &self.credentials.secret_access_key,
            None,
            None,
            "r2offload",
        );

        let timeouts = TimeoutConfig::builder()
            .connect_timeout(Duration::from_secs(self.config.connect_timeout_secs))
            .operation_timeout(Duration::from_secs(self.config.operation_timeout_secs))
            .build();

        let config = aws_sdk_s3::Config::builder()
            .region(aws_types::region::Region::new(self.config.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(&self.endpoint)
            .force_path_style(true)
            .timeout_config(timeouts)
            .retry_config(RetryConfig::standard().with_max_attempts(self.config.max_attempts))
            .behavior_version_latest()
            .build();

        debug!(endpoint = %self.endpoint, bucket = %self.credentials.bucket, "built S3 client");
        S3Client::from_conf(config)
    }

    async fn download_to(&self, remote_key: &str, tmp: &Path) -> CloudResult<u64> {
        let resp = self
            .client()
            .get_object()
            .bucket(self.bucket())
            .key(remote_key)
            .send()
            .await
            .map_err(|e| {
                warn!(key = remote_key, error = %DisplayErrorContext(&e), "get object failed");
                CloudError::S3(format!(
                    "download failed for {remote_key}: {}",
                    provider_message(&e)
                ))
            })?;

        let mut reader = std::pin::pin!(resp.body.into_async_read());
        let mut file = tokio::fs::File::create(tmp).await?;
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

#[async_trait]
impl ObjectStore for R2Client {
    async fn test_connection(&self) -> ConnectionStatus {
        let bucket = self.bucket();
        match self.client().head_bucket().bucket(bucket).send().await {
            Ok(_) => {
                info!(bucket, "connection test succeeded");
                ConnectionStatus::ok(format!("Connected to bucket {bucket}"))
            }
            Err(e) => {
                warn!(bucket, error = %DisplayErrorContext(&e), "connection test failed");
                let not_found = e.as_service_error().is_some_and(|se| se.is_not_found());
                if not_found {
                    ConnectionStatus::failed(format!("Bucket {bucket} does not exist"))
                } else {
                    ConnectionStatus::failed(provider_message(&e))
                }
            }
        }
    }

    async fn upload(&self, local_path: &Path, remote_key: &str) -> CloudResult<UploadedObject> {
        let size = check_uploadable(local_path).await?;
        let content_type = detect_content_type(local_path).await;

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| CloudError::Io(std::io::Error::other(e)))?;

        self.client()
            .put_object()
            .bucket(self.bucket())
            .key(remote_key)
            .content_type(&content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                warn!(key = remote_key, error = %DisplayErrorContext(&e), "put object failed");
                CloudError::S3(format!("upload failed for {remote_key}: {}", provider_message(&e)))
            })?;

        debug!(key = remote_key, size, "uploaded to s3://{}", self.bucket());
        Ok(UploadedObject {
            key: remote_key.to_string(),
            url: self.public_url_for(remote_key),
            size,
            content_type,
        })
    }

    async fn download(&self, remote_key: &str, local_path: &Path) -> CloudResult<()> {
        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = temp_sibling(local_path);
        let result = match self.download_to(remote_key, &tmp).await {
            Ok(written) => tokio::fs::rename(&tmp, local_path)
                .await
                .map(|()| written)
                .map_err(CloudError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(written) => {
                debug!(key = remote_key, bytes = written, path = %local_path.display(), "downloaded");
                Ok(())
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&tmp).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %tmp.display(), error = %rm, "failed to remove partial download");
                    }
                }
                Err(e)
            }
        }
    }

    async fn delete(&self, remote_key: &str) -> CloudResult<()> {
        match self
            .client()
            .delete_object()
            .bucket(self.bucket())
            .key(remote_key)
            .send()
            .await
        {
            Ok(_) => {
                debug!(key = remote_key, "deleted");
                Ok(())
            }
            Err(e) if e.as_service_error().and_then(|se| se.code()) == Some("NoSuchKey") => Ok(()),
            Err(e) => {
                warn!(key = remote_key, error = %DisplayErrorContext(&e), "delete object failed");
                Err(CloudError::S3(format!(
                    "delete failed for {remote_key}: {}",
                    provider_message(&e)
                )))
            }
        }
    }

    async fn exists(&self, remote_key: &str) -> bool {
        match self
            .client()
            .head_object()
            .bucket(self.bucket())
            .key(remote_key)
            .send()
            .await
        {
            Ok(_) => true,
            Err(e) => {
                let not_found = e.as_service_error().is_some_and(|se| se.is_not_found());
                if !not_found {
                    debug!(key = remote_key, error = %DisplayErrorContext(&e), "head object failed");
                }
                false
            }
        }
    }

    fn public_url_for(&self, remote_key: &str) -> String {
        let key = remote_key.trim_start_matches('/');
        match &self.config.public_base_url {
            Some(base) => format!("{}/{key}", base.trim_end_matches('/')),
            None => format!("{}/{}/{key}", self.endpoint, self.bucket()),
        }
    }
}

/// Checks that `path` is an existing regular file within
/// [`MAX_UPLOAD_BYTES`] and returns its size.
pub async fn check_uploadable(path: &Path) -> CloudResult<u64> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta,
        _ => return Err(CloudError::FileMissing(path.display().to_string())),
    };
    let size = meta.len();
    if size > MAX_UPLOAD_BYTES {
        return Err(CloudError::FileTooLarge {
            size,
            limit: MAX_UPLOAD_BYTES,
        });
    }
    Ok(size)
}

/// MIME type from the file extension alone. Unknown extensions give
/// `application/octet-stream`.
pub fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string()
}

/// MIME type from the file extension, or from the file's leading bytes when
/// the extension is missing or unknown.
pub async fn detect_content_type(path: &Path) -> String {
    if let Some(mime) = mime_guess::from_path(path).first_raw() {
        return mime.to_string();
    }
    let mut head = [0u8; 16];
    let read = match tokio::fs::File::open(path).await {
        Ok(mut file) => file.read(&mut head).await.unwrap_or(0),
        Err(_) => 0,
    };
    sniff(&head[..read]).unwrap_or(FALLBACK_CONTENT_TYPE).to_string()
}

fn sniff(head: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\xFF\xD8\xFF", "image/jpeg"),
        (b"\x89PNG\r\n\x1A\n", "image/png"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"ID3", "audio/mpeg"),
        (b"OggS", "audio/ogg"),
    ];
    if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| head.starts_with(magic)) {
        return Some(*mime);
    }
    match head {
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Some("audio/wav"),
        [_, _, _, _, b'f', b't', b'y', b'p', b'q', b't', ..] => Some("video/quicktime"),
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => Some("video/mp4"),
        _ => None,
    }
}

/// Provider message when the service sent one, else a generic description.
fn provider_message<E, R>(err: &SdkError<E, R>) -> String
where
    E: ProvideErrorMetadata,
{
    if let Some(service) = err.as_service_error() {
        if let Some(message) = service.message() {
            return message.to_string();
        }
        if let Some(code) = service.code() {
            return code.to_string();
        }
    }
    match err {
        SdkError::TimeoutError(_) => "request timed out".to_string(),
        SdkError::DispatchFailure(_) => "could not reach the object store".to_string(),
        _ => "object store request failed".to_string(),
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.part", Uuid::new_v4().simple()))
}
