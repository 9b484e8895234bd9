// ABOUTME: Slack request signature verification (v0 HMAC-SHA256 scheme).
// ABOUTME: Rejects stale timestamps and mismatched signatures.

use crate::error::{Result, SlackError};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed request, in seconds. Older requests are replays
/// or badly delayed retries and are rejected either way.
pub const MAX_SIGNATURE_AGE_SECS: i64 = 300;

/// Compute the expected `v0=...` signature for a request.
pub fn sign(signing_secret: &str, timestamp: &str, body: &[u8]) -> String {
    let sig_base = format!("v0:{}:{}", timestamp, String::from_utf8_lossy(body));
    let mut mac =
        HmacSha256::new_from_slice(signing_secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(sig_base.as_bytes());
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify an inbound request against the signing secret.
///
/// `now_unix` is passed in rather than read from the clock so staleness is
/// testable; callers use the current UNIX time.
pub fn verify(
    signing_secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now_unix: i64,
) -> Result<()> {
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| SlackError::Signature("unparseable timestamp"))?;

    if (now_unix - ts).abs() > MAX_SIGNATURE_AGE_SECS {
        return Err(SlackError::Signature("timestamp too old"));
    }

    let expected = sign(signing_secret, timestamp, body);
    if expected != signature {
        return Err(SlackError::Signature("signature mismatch"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

    #[test]
    fn test_roundtrip_verifies() {
        let body = br#"{"type":"event_callback"}"#;
        let signature = sign(SECRET, "1700000000", body);
        assert!(verify(SECRET, "1700000000", body, &signature, 1700000010).is_ok());
    }

    #[test]
    fn test_rejects_stale_timestamp() {
        let body = b"{}";
        let signature = sign(SECRET, "1700000000", body);
        let result = verify(SECRET, "1700000000", body, &signature, 1700000000 + 301);
        assert!(matches!(
            result,
            Err(SlackError::Signature("timestamp too old"))
        ));
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let body = b"{}";
        let signature = sign("other-secret", "1700000000", body);
        let result = verify(SECRET, "1700000000", body, &signature, 1700000001);
        assert!(matches!(
            result,
            Err(SlackError::Signature("signature mismatch"))
        ));
    }

    #[test]
    fn test_rejects_tampered_body() {
        let signature = sign(SECRET, "1700000000", b"original");
        let result = verify(SECRET, "1700000000", b"tampered", &signature, 1700000001);
        assert!(matches!(
            result,
            Err(SlackError::Signature("signature mismatch"))
        ));
    }

    #[test]
    fn test_rejects_garbage_timestamp() {
        let result = verify(SECRET, "not-a-number", b"{}", "v0=00", 1700000001);
        assert!(matches!(
            result,
            Err(SlackError::Signature("unparseable timestamp"))
        ));
    }
}
