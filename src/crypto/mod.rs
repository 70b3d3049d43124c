//! Cryptographic primitives.
//!
//! HMAC-SHA256 signing with constant-time verification, API key hashing,
//! and random identifier generation. Webhook signature headers live in
//! [`signature`].

pub mod signature;

pub use signature::{parse_signature_header, sign_payload, verify_signature, SIGNATURE_TOLERANCE};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `payload` under `secret`, rendered as lowercase hex.
pub fn sign_hmac_sha256(payload: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Recompute and compare in constant time.
///
/// Length differences are absorbed by comparing the hex renderings, so the
/// comparison cost does not reveal how much of the signature matched.
pub fn verify_hmac_sha256(payload: &[u8], signature: &str, secret: &str) -> bool {
    let expected = sign_hmac_sha256(payload, secret);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

/// Hash an API key for storage: `"sha256:" + hex(SHA256(key))`.
///
/// The algorithm prefix lets a future rotation introduce a second scheme
/// without a schema change.
pub fn hash_api_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("sha256:{}", hex::encode(digest))
}

/// Generate a new API key: `"sk_live_" + base64url(24 random bytes)`.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("sk_live_{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a short opaque identifier: hex of 16 random bytes.
pub fn generate_short_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a 128-bit entity identifier with canonical rendering.
pub fn generate_entity_id() -> Uuid {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_is_lowercase_hex() {
        let sig = sign_hmac_sha256(b"payload", "secret");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_verify_round_trip() {
        let sig = sign_hmac_sha256(b"payload", "secret");
        assert!(verify_hmac_sha256(b"payload", &sig, "secret"));
        assert!(!verify_hmac_sha256(b"tampered", &sig, "secret"));
        assert!(!verify_hmac_sha256(b"payload", &sig, "other-secret"));
    }

    #[test]
    fn test_verify_tolerates_length_mismatch() {
        assert!(!verify_hmac_sha256(b"payload", "abc", "secret"));
        assert!(!verify_hmac_sha256(b"payload", "", "secret"));
    }

    #[test]
    fn test_hash_api_key_prefix() {
        let hash = hash_api_key("sk_live_test");
        assert!(hash.starts_with("sha256:"));
        assert_eq!(hash.len(), "sha256:".len() + 64);
        assert_eq!(hash, hash_api_key("sk_live_test"));
    }

    #[test]
    fn test_generate_api_key_format() {
        let key = generate_api_key();
        assert!(key.starts_with("sk_live_"));
        assert_ne!(key, generate_api_key());
    }

    #[test]
    fn test_generate_short_id() {
        let id = generate_short_id();
        assert_eq!(id.len(), 32);
        assert_ne!(id, generate_short_id());
    }
}
