//! Inbound webhook authentication.
//!
//! Every scheme is HMAC-SHA256 under some secret; they differ in what is
//! signed, how the MAC is encoded, and whether a replay window applies.
//! Comparison is constant-time in all cases. A failure here means the
//! request is dropped with 401 before anything is parsed, stored, or logged.

use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use dialplane_types::Credential;

type HmacSha256 = Hmac<Sha256>;

/// Signed timestamps older (or newer) than this are rejected.
pub const REPLAY_WINDOW_SECS: i64 = 300;

pub const PROVIDER_A_SIGNATURE_HEADER: &str = "x-provider-a-signature";
pub const PROVIDER_B_SIGNATURE_HEADER: &str = "x-provider-b-signature";
pub const PROVIDER_C_SIGNATURE_HEADER: &str = "x-provider-c-signature";
pub const PROVIDER_C_TIMESTAMP_HEADER: &str = "x-provider-c-timestamp";
pub const CRM_A_SIGNATURE_HEADER: &str = "x-crm-a-signature";
pub const CRM_B_SIGNATURE_HEADER: &str = "x-crm-b-signature";
pub const CRM_B_TIMESTAMP_HEADER: &str = "x-crm-b-request-timestamp";

/// Deliberately opaque: the variants drive logging, but callers collapse
/// all of them into 401 with no detail.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingSignature,
    #[error("signature mismatch")]
    Mismatch,
    #[error("missing or malformed timestamp header")]
    BadTimestamp,
    #[error("timestamp outside replay window")]
    Replay,
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

fn eq_constant_time(expected: &[u8], provided: &[u8]) -> bool {
    expected.ct_eq(provided).into()
}

fn verify_hex_hmac(
    secret: &Credential,
    message: &[u8],
    provided_hex: &str,
) -> Result<(), SignatureError> {
    let computed = const_hex::encode(hmac_sha256(secret.as_bytes(), message));
    if eq_constant_time(computed.as_bytes(), provided_hex.as_bytes()) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn check_replay_window(timestamp: &str, now: DateTime<Utc>) -> Result<(), SignatureError> {
    let ts: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::BadTimestamp)?;
    if (now.timestamp() - ts).abs() > REPLAY_WINDOW_SECS {
        return Err(SignatureError::Replay);
    }
    Ok(())
}

/// Provider A: HMAC-SHA256 of the raw body under the tenant's provider key,
/// hex in the signature header.
pub fn verify_provider_a(
    body: &[u8],
    signature: Option<&str>,
    tenant_key: &Credential,
) -> Result<(), SignatureError> {
    let signature = signature.ok_or(SignatureError::MissingSignature)?;
    verify_hex_hmac(tenant_key, body, signature)
}

/// Provider B: same construction under one provider-wide static secret.
pub fn verify_provider_b(
    body: &[u8],
    signature: Option<&str>,
    static_secret: &Credential,
) -> Result<(), SignatureError> {
    let signature = signature.ok_or(SignatureError::MissingSignature)?;
    verify_hex_hmac(static_secret, body, signature)
}

/// Provider C: HMAC-SHA256 over `method || url || body || timestamp` under
/// the shared secret, base64 in the signature header, with a replay window
/// on the timestamp header.
pub fn verify_provider_c(
    method: &str,
    url: &str,
    body: &[u8],
    signature: Option<&str>,
    timestamp: Option<&str>,
    secret: &Credential,
    now: DateTime<Utc>,
) -> Result<(), SignatureError> {
    let signature = signature.ok_or(SignatureError::MissingSignature)?;
    let timestamp = timestamp.ok_or(SignatureError::BadTimestamp)?;
    check_replay_window(timestamp, now)?;

    let mut message = Vec::with_capacity(method.len() + url.len() + body.len() + timestamp.len());
    message.extend_from_slice(method.as_bytes());
    message.extend_from_slice(url.as_bytes());
    message.extend_from_slice(body);
    message.extend_from_slice(timestamp.as_bytes());

    let computed =
        base64::engine::general_purpose::STANDARD.encode(hmac_sha256(secret.as_bytes(), &message));
    if eq_constant_time(computed.as_bytes(), signature.as_bytes()) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Tenant-scoped CRM trigger webhooks: raw body under the per-tenant
/// webhook secret, hex encoded. Sources that send a timestamp header (CRM
/// B does) also get the replay window.
pub fn verify_trigger(
    body: &[u8],
    signature: Option<&str>,
    webhook_secret: &Credential,
    timestamp: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), SignatureError> {
    let signature = signature.ok_or(SignatureError::MissingSignature)?;
    if let Some(timestamp) = timestamp {
        check_replay_window(timestamp, now)?;
    }
    verify_hex_hmac(webhook_secret, body, signature)
}

/// Constant-time equality for full bearer secrets (partner keys, the cron
/// secret).
pub fn bearer_matches(provided: &str, expected: &Credential) -> bool {
    eq_constant_time(expected.as_bytes(), provided.as_bytes())
}

/// Produce the hex signature a sender would attach. Used by outbound
/// signing tests and the test utilities.
pub fn sign_hex(secret: &Credential, body: &[u8]) -> String {
    const_hex::encode(hmac_sha256(secret.as_bytes(), body))
}

/// Produce the base64 provider C signature for a request.
pub fn sign_provider_c(
    secret: &Credential,
    method: &str,
    url: &str,
    body: &[u8],
    timestamp: &str,
) -> String {
    let mut message = Vec::new();
    message.extend_from_slice(method.as_bytes());
    message.extend_from_slice(url.as_bytes());
    message.extend_from_slice(body);
    message.extend_from_slice(timestamp.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hmac_sha256(secret.as_bytes(), &message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> Credential {
        Credential::new("wh-secret".into())
    }

    #[test]
    fn provider_a_round_trip() {
        let body = br#"{"type":"call.ended"}"#;
        let sig = sign_hex(&secret(), body);
        verify_provider_a(body, Some(&sig), &secret()).unwrap();
    }

    #[test]
    fn tampered_body_fails() {
        let sig = sign_hex(&secret(), b"original");
        assert_eq!(
            verify_provider_a(b"tampered", Some(&sig), &secret()),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn missing_header_fails() {
        assert_eq!(
            verify_provider_a(b"body", None, &secret()),
            Err(SignatureError::MissingSignature)
        );
    }

    #[test]
    fn wrong_key_fails() {
        let sig = sign_hex(&secret(), b"body");
        assert_eq!(
            verify_provider_a(b"body", Some(&sig), &Credential::new("other".into())),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn provider_c_round_trip_and_replay() {
        let now = "2026-07-21T18:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let ts = now.timestamp().to_string();
        let body = br#"{"event_type":"call_complete"}"#;
        let url = "/webhook/provider-c";

        let sig = sign_provider_c(&secret(), "POST", url, body, &ts);
        verify_provider_c("POST", url, body, Some(&sig), Some(&ts), &secret(), now).unwrap();

        // six minutes later the same signature is replay-rejected
        let later = now + chrono::Duration::minutes(6);
        assert_eq!(
            verify_provider_c("POST", url, body, Some(&sig), Some(&ts), &secret(), later),
            Err(SignatureError::Replay)
        );

        // garbage timestamp
        assert_eq!(
            verify_provider_c("POST", url, body, Some(&sig), Some("soon"), &secret(), now),
            Err(SignatureError::BadTimestamp)
        );
    }

    #[test]
    fn trigger_signature_with_optional_timestamp() {
        let now = "2026-07-21T18:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let body = br#"{"phone_number":"+14155551234"}"#;
        let sig = sign_hex(&secret(), body);

        // CRM A style: no timestamp header
        verify_trigger(body, Some(&sig), &secret(), None, now).unwrap();

        // CRM B style: fresh timestamp passes, stale fails
        let fresh = now.timestamp().to_string();
        verify_trigger(body, Some(&sig), &secret(), Some(&fresh), now).unwrap();

        let stale = (now.timestamp() - 301).to_string();
        assert_eq!(
            verify_trigger(body, Some(&sig), &secret(), Some(&stale), now),
            Err(SignatureError::Replay)
        );
    }

    #[test]
    fn bearer_compare() {
        let expected = Credential::new("pdy_sk_abc".into());
        assert!(bearer_matches("pdy_sk_abc", &expected));
        assert!(!bearer_matches("pdy_sk_abd", &expected));
        assert!(!bearer_matches("", &expected));
    }
}
