//! Stripe webhook signature verification.
//!
//! Header format: `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]`.
//! The signed payload is `"{t}." + raw_body`, HMAC-SHA256 under the endpoint secret.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age (and clock skew) accepted for a signed event.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing or unparseable Stripe-Signature header")]
    MalformedHeader,
    #[error("no v1 signature matches the payload")]
    SignatureMismatch,
    #[error("timestamp outside the tolerance window")]
    Stale,
    #[error("webhook secret is not usable")]
    Secret,
}

/// Minimal view of a Stripe event: only what the handler logs.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<SignatureHeader, WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for item in header.split(',') {
        let Some((key, value)) = item.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            // Other schemes (v0) and undecodable values are ignored.
            "v1" => {
                if let Ok(sig) = hex::decode(value) {
                    signatures.push(sig);
                }
            }
            _ => {}
        }
    }

    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Ok(SignatureHeader {
            timestamp,
            signatures,
        }),
        _ => Err(WebhookError::MalformedHeader),
    }
}

/// Verifies `payload` against the `Stripe-Signature` header value.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), WebhookError> {
    let parsed = parse_header(header)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::Secret)?;
    mac.update(parsed.timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    // verify_slice compares in constant time; any v1 entry may match.
    let matched = parsed
        .signatures
        .iter()
        .any(|sig| mac.clone().verify_slice(sig).is_ok());
    if !matched {
        return Err(WebhookError::SignatureMismatch);
    }

    if (now - parsed.timestamp).abs() > tolerance_secs {
        return Err(WebhookError::Stale);
    }

    Ok(())
}

#[cfg(test)]
pub fn sign_for_tests(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_750_000_000;
    const SECRET: &str = "whsec_test";
    const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#;

    #[test]
    fn test_valid_signature_passes() {
        let header = sign_for_tests(PAYLOAD, SECRET, NOW);
        assert_eq!(
            verify_signature(PAYLOAD, &header, SECRET, NOW + 10, DEFAULT_TOLERANCE_SECS),
            Ok(())
        );
    }

    #[test]
    fn test_any_v1_may_match() {
        let good = sign_for_tests(PAYLOAD, SECRET, NOW);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1={},v0=abc,v1={good_sig}", "00".repeat(32));
        assert!(verify_signature(PAYLOAD, &header, SECRET, NOW, DEFAULT_TOLERANCE_SECS).is_ok());
    }

    #[test]
    fn test_tampered_payload_fails() {
        let header = sign_for_tests(PAYLOAD, SECRET, NOW);
        let tampered = br#"{"id":"evt_2","type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#;
        assert_eq!(
            verify_signature(tampered, &header, SECRET, NOW, DEFAULT_TOLERANCE_SECS),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn test_wrong_secret_fails() {
        let header = sign_for_tests(PAYLOAD, "whsec_other", NOW);
        assert_eq!(
            verify_signature(PAYLOAD, &header, SECRET, NOW, DEFAULT_TOLERANCE_SECS),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn test_stale_timestamp_fails() {
        let header = sign_for_tests(PAYLOAD, SECRET, NOW);
        assert_eq!(
            verify_signature(PAYLOAD, &header, SECRET, NOW + 301, DEFAULT_TOLERANCE_SECS),
            Err(WebhookError::Stale)
        );
    }

    #[test]
    fn test_malformed_headers_fail() {
        let only_timestamp = format!("t={NOW}");
        for header in ["", "garbage", "t=abc,v1=00", only_timestamp.as_str(), "v1=0011"] {
            assert_eq!(
                verify_signature(PAYLOAD, header, SECRET, NOW, DEFAULT_TOLERANCE_SECS),
                Err(WebhookError::MalformedHeader),
                "header {header:?}"
            );
        }
    }

    #[test]
    fn test_event_parses() {
        let event: WebhookEvent = serde_json::from_slice(PAYLOAD).unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(event.data.object["id"], "cs_1");
    }
}
