use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use proptest::prelude::*;
use r2offload_crypto::{IV_SIZE, MAC_SIZE, MasterKey, SecretBox};

const TEST_KEY: &str = "integration-test-master-key-with-enough-entropy";

fn secure_box() -> SecretBox {
    SecretBox::new(MasterKey::from_config(Some(TEST_KEY)))
}

// ── Round trip ──

#[test]
fn roundtrip_ascii_secret() {
    let sb = secure_box();
    let sealed = sb.encrypt("r2-secret-access-key-0001").unwrap();
    assert_ne!(sealed, "r2-secret-access-key-0001");
    assert_eq!(sb.decrypt(&sealed), "r2-secret-access-key-0001");
}

#[test]
fn roundtrip_utf8_secret() {
    let sb = secure_box();
    let secret = "clé secrète – 秘密鍵 🔑";
    let sealed = sb.encrypt(secret).unwrap();
    assert_eq!(sb.decrypt(&sealed), secret);
}

#[test]
fn fresh_iv_per_call() {
    let sb = secure_box();
    let a = sb.encrypt("same input").unwrap();
    let b = sb.encrypt("same input").unwrap();
    assert_ne!(a, b, "two seals of the same secret must differ");
    assert_eq!(sb.decrypt(&a), sb.decrypt(&b));
}

#[test]
fn different_master_key_cannot_open() {
    let sealed = secure_box().encrypt("secret").unwrap();
    let other = SecretBox::new(MasterKey::from_config(Some(
        "a-completely-different-master-key-value-xyz",
    )));
    assert_eq!(other.decrypt(&sealed), "");
}

// ── Tampering ──

#[test]
fn flipping_any_byte_yields_empty() {
    let sb = secure_box();
    let sealed = sb.encrypt("do-not-touch-this-secret").unwrap();
    let raw = STANDARD.decode(&sealed).unwrap();

    for i in 0..raw.len() {
        let mut tampered = raw.clone();
        tampered[i] ^= 0x01;
        let blob = STANDARD.encode(&tampered);
        assert_eq!(sb.decrypt(&blob), "", "byte {i} flip was not detected");
    }
}

#[test]
fn truncated_blob_yields_empty() {
    let sb = secure_box();
    let sealed = sb.encrypt("truncate me").unwrap();
    let raw = STANDARD.decode(&sealed).unwrap();

    let truncated = STANDARD.encode(&raw[..raw.len() - 1]);
    assert_eq!(sb.decrypt(&truncated), "");

    let header_only = STANDARD.encode(&raw[..IV_SIZE + MAC_SIZE]);
    assert_eq!(sb.decrypt(&header_only), "");
}

#[test]
fn garbage_input_yields_empty() {
    let sb = secure_box();
    assert_eq!(sb.decrypt(""), "");
    assert_eq!(sb.decrypt("not base64 at all!!"), "");
    assert_eq!(sb.decrypt("AAAA"), "");
}

// ── Degraded mode (NOT secure) ──

#[test]
fn missing_key_is_degraded() {
    let sb = SecretBox::new(MasterKey::from_config(None));
    assert!(!sb.is_secure());
}

#[test]
fn placeholder_key_is_degraded() {
    let sb = SecretBox::new(MasterKey::from_config(Some("put your unique phrase here")));
    assert!(!sb.is_secure());
}

#[test]
fn short_key_is_degraded() {
    let sb = SecretBox::new(MasterKey::from_config(Some("too-short")));
    assert!(!sb.is_secure());
    assert!(secure_box().is_secure());
}

#[test]
fn degraded_mode_is_plain_base64_and_insecure() {
    let sb = SecretBox::new(MasterKey::degraded());
    let sealed = sb.encrypt("visible-secret").unwrap();

    // Anyone can read it back: this mode provides no confidentiality.
    assert_eq!(sealed, STANDARD.encode("visible-secret"));
    assert_eq!(sb.decrypt(&sealed), "visible-secret");
}

#[test]
fn degraded_mode_rejects_non_base64() {
    let sb = SecretBox::new(MasterKey::degraded());
    assert_eq!(sb.decrypt("%%%"), "");
}

#[test]
fn secure_box_cannot_open_degraded_blob() {
    let degraded = SecretBox::new(MasterKey::degraded()).encrypt("legacy").unwrap();
    assert_eq!(secure_box().decrypt(&degraded), "");
}

// ── Properties ──

proptest! {
    #[test]
    fn prop_roundtrip_non_empty(secret in "\\PC{1,64}") {
        let sb = secure_box();
        let sealed = sb.encrypt(&secret).unwrap();
        prop_assert_eq!(sb.decrypt(&sealed), secret);
    }

    #[test]
    fn prop_tamper_detected(secret in "[ -~]{1,48}", index in any::<prop::sample::Index>()) {
        let sb = secure_box();
        let sealed = sb.encrypt(&secret).unwrap();
        let mut raw = STANDARD.decode(&sealed).unwrap();
        let i = index.index(raw.len());
        raw[i] ^= 0x80;
        prop_assert_eq!(sb.decrypt(&STANDARD.encode(&raw)), "");
    }
}
