// SHA-256 hashing of device secrets

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hashes a device secret for storage, returning lowercase hex.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Checks a presented secret against a stored hash.
///
/// Digests are compared in constant time; a malformed stored hash never matches.
pub fn secret_matches(secret: &str, stored_hash: &str) -> bool {
    let Ok(stored) = hex::decode(stored_hash) else {
        return false;
    };
    let presented = Sha256::digest(secret.as_bytes());
    presented.as_slice().ct_eq(stored.as_slice()).into()
}
