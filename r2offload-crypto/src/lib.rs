//! Encryption of secrets at rest for R2 offload.
//!
//! Credentials such as the R2 secret access key are stored encrypted and
//! decrypted only transiently, right before an object store client is built.
//!
//! # Format
//!
//! A sealed secret is `base64(IV || HMAC || ciphertext)`:
//!
//! - **IV**: 16 random bytes from the OS CSPRNG, fresh per call
//! - **HMAC**: HMAC-SHA256 over IV and ciphertext (encrypt-then-MAC)
//! - **ciphertext**: AES-256-CBC with PKCS#7 padding
//!
//! The encryption and MAC keys are derived independently from a single
//! master key loaded once at startup (see [`MasterKey`]).
//!
//! # Degraded mode
//!
//! When no usable master key is configured, [`SecretBox`] falls back to plain
//! base64. This is **not encryption**. It only exists so that a first-run
//! install with a misconfigured key keeps working; [`SecretBox::is_secure`]
//! reports it and a warning is logged when the box is constructed.

mod error;
mod key;
mod secret_box;

pub use error::{CryptoError, CryptoResult};
pub use key::{MasterKey, MIN_MASTER_KEY_LEN};
pub use secret_box::{SecretBox, IV_SIZE, MAC_SIZE};
