use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::*;

#[test]
fn test_sign_event_payload_stamps_fields() {
    let now = Utc::now();
    let (payload, _) = sign_event_payload(
        "payment.completed",
        json!({"payment_id": "abc", "amount": "100.0000"}),
        "whsec",
        now,
    );

    assert_eq!(
        payload.get("event_type").and_then(|v| v.as_str()),
        Some("payment.completed")
    );
    assert!(payload.get("timestamp").is_some());
    assert_eq!(payload.get("amount").and_then(|v| v.as_str()), Some("100.0000"));
}

#[test]
fn test_signature_verifies_against_canonical_body() {
    let now = Utc::now();
    let (payload, signature) =
        sign_event_payload("payment.completed", json!({"b": 1, "a": 2}), "whsec", now);

    let body = canonical_json(&payload);
    assert!(crypto::verify_signature(body.as_bytes(), &signature, "whsec").is_ok());
    assert!(crypto::verify_signature(b"other", &signature, "whsec").is_err());
}

#[test]
fn test_signature_is_stable_for_reserialized_payload() {
    // The payload goes through JSONB persistence between signing and
    // sending; canonical serialization must survive the round trip.
    let now = Utc::now();
    let (payload, signature) =
        sign_event_payload("refund.completed", json!({"z": "1", "a": "2"}), "whsec", now);

    let reloaded: serde_json::Value =
        serde_json::from_str(&serde_json::to_string(&payload).unwrap()).unwrap();
    let body = canonical_json(&reloaded);
    assert!(crypto::verify_signature(body.as_bytes(), &signature, "whsec").is_ok());
}

#[test]
fn test_job_wire_format() {
    let id = Uuid::new_v4();
    let encoded = serde_json::to_string(&WebhookJob { webhook_id: id }).unwrap();
    assert_eq!(encoded, format!("{{\"webhook_id\":\"{id}\"}}"));

    let decoded: WebhookJob = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded.webhook_id, id);
}
