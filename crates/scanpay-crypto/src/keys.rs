// Scanpay Crypto - Ed25519 key handling for token signing

use anyhow::{anyhow, Result};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_core::OsRng;

/// Generates a new Ed25519 keypair using secure random bytes from the OS.
///
/// Used when the server starts without a configured seed; tokens signed with
/// such a key stop verifying once the process restarts.
pub fn generate_keypair() -> (SigningKey, VerifyingKey) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();
    (signing_key, verifying_key)
}

/// Restores a signing key from a 64-character hex seed.
pub fn signing_key_from_hex(seed_hex: &str) -> Result<SigningKey> {
    let bytes = hex::decode(seed_hex.trim())
        .map_err(|e| anyhow!("Invalid signing seed hex: {}", e))?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow!("Invalid signing seed length: expected 32 bytes"))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Encodes the seed of a signing key as lowercase hex.
pub fn signing_key_to_hex(signing_key: &SigningKey) -> String {
    hex::encode(signing_key.to_bytes())
}
