//! HMAC-SHA256 webhook signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `payload` under `secret`.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Check a hex signature over the raw body in constant time.
///
/// Returns false when no secret is configured.
pub fn verify(secret: Option<&str>, payload: &[u8], signature: &str) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        tracing::warn!("webhook secret not configured; rejecting webhook signature");
        return false;
    };

    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
