//! AES-256-CBC + HMAC-SHA256 sealing of short secrets.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{MasterKey, SubKeys};
use aes::Aes256;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::TryRngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use tracing::{debug, warn};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Size of the CBC initialization vector in bytes.
pub const IV_SIZE: usize = 16;

/// Size of the HMAC-SHA256 tag in bytes.
pub const MAC_SIZE: usize = 32;

/// Seals and opens secrets with the process master key.
///
/// Construct once at startup and pass it to whoever needs to store or read
/// credentials.
#[derive(Debug, Clone)]
pub struct SecretBox {
    key: MasterKey,
}

impl SecretBox {
    pub fn new(key: MasterKey) -> Self {
        if !key.is_secure() {
            warn!(
                "no valid master key configured; stored secrets are only base64-encoded and NOT encrypted"
            );
        }
        Self { key }
    }

    /// Returns false when running in degraded (base64-only) mode.
    pub fn is_secure(&self) -> bool {
        self.key.is_secure()
    }

    /// Seals `plaintext` into `base64(IV || HMAC || ciphertext)`.
    ///
    /// Fails only if the OS random generator cannot produce an IV.
    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let Some(keys) = self.key.sub_keys() else {
            return Ok(STANDARD.encode(plaintext.as_bytes()));
        };

        let mut iv = [0u8; IV_SIZE];
        OsRng
            .try_fill_bytes(&mut iv)
            .map_err(|e| CryptoError::Rng(e.to_string()))?;

        let ciphertext = Aes256CbcEnc::new_from_slices(&keys.enc, &iv)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let tag = compute_mac(keys, &iv, &ciphertext)?;

        let mut blob = Vec::with_capacity(IV_SIZE + MAC_SIZE + ciphertext.len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&tag);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    /// Opens a sealed secret.
    ///
    /// Returns an empty string when the blob is malformed or fails
    /// authentication. An empty result means "no usable secret", never a
    /// valid empty secret.
    pub fn decrypt(&self, blob: &str) -> String {
        let opened = match self.key.sub_keys() {
            Some(keys) => open_sealed(keys, blob),
            None => open_base64(blob),
        };
        opened.unwrap_or_default()
    }
}

/// The tag covers the IV as well, so a flipped IV byte is caught too.
fn compute_mac(keys: &SubKeys, iv: &[u8], ciphertext: &[u8]) -> CryptoResult<[u8; MAC_SIZE]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(&keys.mac)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    mac.update(iv);
    mac.update(ciphertext);
    Ok(mac.finalize().into_bytes().into())
}

fn open_sealed(keys: &SubKeys, blob: &str) -> Option<String> {
    let raw = STANDARD.decode(blob.trim()).ok()?;
    if raw.len() <= IV_SIZE + MAC_SIZE {
        debug!("sealed secret too short ({} bytes)", raw.len());
        return None;
    }

    let (iv, rest) = raw.split_at(IV_SIZE);
    let (tag, ciphertext) = rest.split_at(MAC_SIZE);

    let mut mac = <HmacSha256 as Mac>::new_from_slice(&keys.mac).ok()?;
    mac.update(iv);
    mac.update(ciphertext);
    // verify_slice compares in constant time
    if mac.verify_slice(tag).is_err() {
        warn!("sealed secret failed authentication; treating as unusable");
        return None;
    }

    let plaintext = Aes256CbcDec::new_from_slices(&keys.enc, iv)
        .ok()?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .ok()?;
    String::from_utf8(plaintext).ok()
}

fn open_base64(blob: &str) -> Option<String> {
    let raw = STANDARD.decode(blob.trim()).ok()?;
    String::from_utf8(raw).ok()
}
