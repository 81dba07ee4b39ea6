//! Webhook payload signing.
//!
//! The signature covers `"<timestamp>.<body>"` so a captured delivery cannot
//! be replayed under a different timestamp.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex signature.
pub const SIGNATURE_HEADER: &str = "X-Ledger-Signature";
/// Header carrying the unix timestamp that was signed.
pub const TIMESTAMP_HEADER: &str = "X-Ledger-Timestamp";

/// Signs a webhook payload using HMAC-SHA256.
pub fn sign_webhook(payload: &[u8], timestamp: i64, secret: &str) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a webhook signature using constant-time comparison.
pub fn verify_webhook_signature(
    payload: &[u8],
    timestamp: i64,
    signature: &str,
    secret: &str,
) -> bool {
    match sign_webhook(payload, timestamp, secret) {
        Ok(expected) => expected.as_bytes().ct_eq(signature.as_bytes()).into(),
        Err(_) => false,
    }
}
