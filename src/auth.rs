use base64::Engine;
use sha2::{Digest, Sha256};

/// Derive the `authentication` string for an `Identify` reply.
///
/// Step 1: `secret = base64(sha256(password + salt))`.
/// Step 2: `base64(sha256(secret + challenge))`.
///
/// Both digests stay binary until their own base64 step; the alphabet
/// is standard with padding.
pub(crate) fn authentication_string(password: &str, challenge: &str, salt: &str) -> String {
    let engine = &base64::engine::general_purpose::STANDARD;

    let secret_hash = Sha256::digest(format!("{}{}", password, salt).as_bytes());
    let secret = engine.encode(secret_hash);

    let auth_hash = Sha256::digest(format!("{}{}", secret, challenge).as_bytes());
    engine.encode(auth_hash)
}
