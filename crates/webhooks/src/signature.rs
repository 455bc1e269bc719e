//! HMAC signature verification for inbound deliveries.
//!
//! The platform signs the exact raw request body with a shared secret
//! (HMAC-SHA256) and sends the digest base64-encoded in a header. The body
//! must be hashed before any JSON parsing: parsing can reorder keys or
//! normalize whitespace, which would invalidate the signature.

use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Verify that `provided` is the base64-encoded HMAC-SHA256 of `raw_body`
/// under `secret`.
///
/// An absent header is `false` without computing anything. A length mismatch
/// is `false` before the comparison (the constant-time compare requires
/// equal-length inputs). The compare itself never short-circuits, so the
/// response time does not depend on the position of the first mismatching
/// byte.
pub fn verify(raw_body: &[u8], provided: Option<&str>, secret: &str) -> bool {
    let Some(provided) = provided else {
        return false;
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length; unreachable in practice.
        Err(_) => return false,
    };
    mac.update(raw_body);
    let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    let expected = expected.as_bytes();
    let provided = provided.as_bytes();
    if expected.len() != provided.len() {
        return false;
    }

    expected.ct_eq(provided).into()
}

/// Constant-time equality for shared-secret header values (the drain
/// trigger's access token). Absent header is `false`.
pub fn verify_shared_token(provided: Option<&str>, expected: &str) -> bool {
    let Some(provided) = provided else {
        return false;
    };
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Compute the signature header value for a body. Test/tooling helper; the
/// server itself only ever verifies.
pub fn sign(raw_body: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(raw_body);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}
