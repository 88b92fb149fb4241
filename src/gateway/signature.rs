//! HMAC-SHA256 signatures on inbound gateway webhooks.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureCheck {
    Verified,
    /// Header or secret absent; the request is let through.
    Skipped(&'static str),
    Mismatch,
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Recomputes the signature over the raw body and compares it in constant time.
pub fn check_signature(secret: Option<&str>, header: Option<&str>, body: &[u8]) -> SignatureCheck {
    let (secret, provided) = match (secret, header) {
        (None, _) => return SignatureCheck::Skipped("webhook secret not configured"),
        (_, None) => return SignatureCheck::Skipped("signature header missing"),
        (Some(secret), Some(header)) => (secret, header.trim()),
    };
    let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
    let Ok(expected) = hex::decode(provided) else {
        return SignatureCheck::Mismatch;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return SignatureCheck::Mismatch;
    };
    mac.update(body);
    match mac.verify_slice(&expected) {
        Ok(()) => SignatureCheck::Verified,
        Err(_) => SignatureCheck::Mismatch,
    }
}
