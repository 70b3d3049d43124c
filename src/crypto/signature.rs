//! Webhook signature headers.
//!
//! Outbound merchant webhooks are signed `t=<unix-seconds>,v1=<hex>` where
//! the hex value is HMAC-SHA256 over `"<unix-seconds>.<payload>"`.
//! Verification rejects headers older than [`SIGNATURE_TOLERANCE`] to limit
//! replay.

use std::time::Duration;

use chrono::Utc;

use super::{sign_hmac_sha256, verify_hmac_sha256};

/// Maximum accepted age of a signature header.
pub const SIGNATURE_TOLERANCE: Duration = Duration::from_secs(300);

/// Result type for signature operations.
pub type Result<T> = std::result::Result<T, SignatureError>;

/// Errors raised while parsing or verifying signature headers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Malformed signature header")]
    Malformed,

    #[error("Signature timestamp outside tolerance window")]
    Expired,

    #[error("Signature mismatch")]
    Mismatch,
}

/// Sign a payload for delivery at timestamp `ts` (unix seconds).
///
/// Returns the full header value, `t=<ts>,v1=<hex>`.
pub fn sign_payload(payload: &[u8], secret: &str, ts: i64) -> String {
    let mut signed = ts.to_string().into_bytes();
    signed.push(b'.');
    signed.extend_from_slice(payload);
    format!("t={},v1={}", ts, sign_hmac_sha256(&signed, secret))
}

/// Parse a `t=...,v1=...` header into (timestamp, signature).
pub fn parse_signature_header(header: &str) -> Result<(i64, String)> {
    let mut timestamp = None;
    let mut v1 = None;

    for part in header.split(',') {
        match part.split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => v1 = Some(value.to_string()),
            _ => {}
        }
    }

    match (timestamp, v1) {
        (Some(ts), Some(sig)) if !sig.is_empty() => Ok((ts, sig)),
        _ => Err(SignatureError::Malformed),
    }
}

/// Verify a signature header against the payload.
///
/// Headers older than the tolerance window (or from the future beyond it)
/// are rejected before any HMAC work.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str) -> Result<()> {
    let (ts, sig) = parse_signature_header(header)?;

    let now = Utc::now().timestamp();
    if (now - ts).unsigned_abs() > SIGNATURE_TOLERANCE.as_secs() {
        return Err(SignatureError::Expired);
    }

    let mut signed = ts.to_string().into_bytes();
    signed.push(b'.');
    signed.extend_from_slice(payload);

    if verify_hmac_sha256(&signed, &sig, secret) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let ts = Utc::now().timestamp();
        let header = sign_payload(b"{\"event\":1}", "whsec", ts);
        assert!(header.starts_with(&format!("t={ts},v1=")));
        assert_eq!(verify_signature(b"{\"event\":1}", &header, "whsec"), Ok(()));
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let ts = Utc::now().timestamp();
        let header = sign_payload(b"a", "whsec", ts);
        assert_eq!(
            verify_signature(b"b", &header, "whsec"),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let ts = Utc::now().timestamp();
        let header = sign_payload(b"a", "whsec", ts);
        assert_eq!(
            verify_signature(b"a", &header, "other"),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_verify_rejects_stale_timestamp() {
        let ts = Utc::now().timestamp() - 301;
        let header = sign_payload(b"a", "whsec", ts);
        assert_eq!(
            verify_signature(b"a", &header, "whsec"),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(
            parse_signature_header("nonsense"),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            parse_signature_header("t=abc,v1=00"),
            Err(SignatureError::Malformed)
        );
        assert_eq!(parse_signature_header("t=12,v1="), Err(SignatureError::Malformed));
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let (ts, sig) = parse_signature_header("t=12,v0=zz,v1=aabb").unwrap();
        assert_eq!(ts, 12);
        assert_eq!(sig, "aabb");
    }
}
