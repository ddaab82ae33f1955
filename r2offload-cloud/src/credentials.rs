//! R2 credentials, in memory and at rest.
//!
//! The secret access key is only ever persisted sealed by a
//! [`SecretBox`]. [`StoredCredentials::open`] yields a transient
//! [`R2Credentials`] whose memory is wiped on drop.

use crate::error::{CloudError, CloudResult};
use r2offload_crypto::SecretBox;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Plaintext credentials for one R2 bucket.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct R2Credentials {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
}

impl R2Credentials {
    pub fn new(
        account_id: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            bucket: bucket.into(),
        }
    }

    /// Fails with the first blank field.
    pub fn validate(&self) -> CloudResult<()> {
        let fields = [
            ("account_id", &self.account_id),
            ("access_key_id", &self.access_key_id),
            ("secret_access_key", &self.secret_access_key),
            ("bucket", &self.bucket),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(CloudError::MissingCredential(name));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for R2Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("R2Credentials")
            .field("account_id", &self.account_id)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Credentials as persisted: the secret is sealed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub account_id: String,
    pub access_key_id: String,
    pub encrypted_secret: String,
    pub bucket: String,
}

impl StoredCredentials {
    pub fn seal(credentials: &R2Credentials, secret_box: &SecretBox) -> CloudResult<Self> {
        credentials.validate()?;
        Ok(Self {
            account_id: credentials.account_id.clone(),
            access_key_id: credentials.access_key_id.clone(),
            encrypted_secret: secret_box.encrypt(&credentials.secret_access_key)?,
            bucket: credentials.bucket.clone(),
        })
    }

    /// Decrypts the secret. A secret that fails to decrypt (tampered, or
    /// sealed under another key) is reported as a configuration error.
    pub fn open(&self, secret_box: &SecretBox) -> CloudResult<R2Credentials> {
        let secret = secret_box.decrypt(&self.encrypted_secret);
        if secret.is_empty() {
            return Err(CloudError::Config(
                "stored secret access key could not be decrypted; re-enter the credentials".into(),
            ));
        }
        let credentials = R2Credentials::new(
            self.account_id.clone(),
            self.access_key_id.clone(),
            secret,
            self.bucket.clone(),
        );
        credentials.validate()?;
        Ok(credentials)
    }
}
