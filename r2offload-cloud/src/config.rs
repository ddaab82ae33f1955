//! Object store client configuration.

use crate::error::{CloudError, CloudResult};
use serde::{Deserialize, Serialize};

/// Configuration for [`R2Client`](crate::R2Client).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Signing region. R2 accepts "auto".
    pub region: String,

    /// Public base URL (custom domain or r2.dev URL) used to build object URLs.
    pub public_base_url: Option<String>,

    /// Endpoint override (for a local S3-compatible server in testing).
    pub endpoint_override: Option<String>,

    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Timeout for a whole operation, retries included, in seconds.
    pub operation_timeout_secs: u64,

    /// Attempts per request, first try included.
    pub max_attempts: u32,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            region: "auto".to_string(),
            public_base_url: None,
            endpoint_override: None,
            connect_timeout_secs: 10,
            operation_timeout_secs: 30,
            max_attempts: 3,
        }
    }
}

impl CloudConfig {
    /// S3 endpoint for `account_id`, honoring the override.
    pub fn endpoint_for(&self, account_id: &str) -> String {
        match &self.endpoint_override {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{account_id}.r2.cloudflarestorage.com"),
        }
    }

    /// Rejects settings that would leave requests unbounded.
    pub fn validate(&self) -> CloudResult<()> {
        if self.region.trim().is_empty() {
            return Err(CloudError::Config("region must not be empty".into()));
        }
        if self.connect_timeout_secs == 0 || self.operation_timeout_secs == 0 {
            return Err(CloudError::Config("timeouts must be at least one second".into()));
        }
        if self.max_attempts == 0 {
            return Err(CloudError::Config("max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}
