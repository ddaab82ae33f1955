//! Master key handling and sub-key derivation.

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Minimum length (bytes) of a master key before it is considered usable.
pub const MIN_MASTER_KEY_LEN: usize = 32;

/// Default phrase shipped in sample configuration files.
const PLACEHOLDER_PHRASE: &str = "put your unique phrase here";

const ENC_CONTEXT: &[u8] = b"r2offload:enc\0";
const MAC_CONTEXT: &[u8] = b"r2offload:mac\0";

/// Independent encryption and MAC keys derived from the master key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct SubKeys {
    pub(crate) enc: [u8; 32],
    pub(crate) mac: [u8; 32],
}

/// Process-wide master key, loaded once at startup and injected into
/// [`SecretBox`](crate::SecretBox).
///
/// A key that is missing, still the placeholder phrase, or shorter than
/// [`MIN_MASTER_KEY_LEN`] produces a *degraded* key with no key material.
#[derive(Clone)]
pub struct MasterKey {
    keys: Option<SubKeys>,
}

impl MasterKey {
    /// Builds a master key from a configured value (e.g. an environment
    /// variable or config file entry).
    pub fn from_config(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(value) if is_usable(value) => Self::derive(value.as_bytes()),
            _ => Self::degraded(),
        }
    }

    /// Builds a master key from raw bytes. Short input yields a degraded key.
    pub fn from_bytes(material: &[u8]) -> Self {
        if material.len() < MIN_MASTER_KEY_LEN {
            return Self::degraded();
        }
        Self::derive(material)
    }

    /// A key with no material. Secrets are only base64-encoded.
    pub fn degraded() -> Self {
        Self { keys: None }
    }

    /// Returns true if real encryption is available.
    pub fn is_secure(&self) -> bool {
        self.keys.is_some()
    }

    pub(crate) fn sub_keys(&self) -> Option<&SubKeys> {
        self.keys.as_ref()
    }

    fn derive(material: &[u8]) -> Self {
        Self {
            keys: Some(SubKeys {
                enc: domain_hash(ENC_CONTEXT, material),
                mac: domain_hash(MAC_CONTEXT, material),
            }),
        }
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("secure", &self.is_secure())
            .finish_non_exhaustive()
    }
}

fn is_usable(value: &str) -> bool {
    value.len() >= MIN_MASTER_KEY_LEN && !value.eq_ignore_ascii_case(PLACEHOLDER_PHRASE)
}

fn domain_hash(context: &[u8], material: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(context);
    hasher.update(material);
    hasher.finalize().into()
}
