// Random identifiers: invoice public ids, receipt references, device secrets

use rand::RngCore;

/// Random bytes behind an invoice public id (96 bits).
const PUBLIC_ID_BYTES: usize = 12;

/// Random bytes behind a ledger/receipt reference (64 bits).
const REFERENCE_BYTES: usize = 8;

/// Random bytes behind a device secret (128 bits).
const DEVICE_SECRET_BYTES: usize = 16;

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Generates an unguessable invoice identifier, e.g. `pay_3F09A1C2...`.
pub fn generate_public_id() -> String {
    format!("pay_{}", hex::encode_upper(random_bytes(PUBLIC_ID_BYTES)))
}

/// Generates a reference such as `RCPT-9A3F0C11D2E4B7A0`.
///
/// The prefix tags the kind of record; the random part keeps references
/// unique across the ledger.
pub fn generate_reference(prefix: &str) -> String {
    format!("{}-{}", prefix, hex::encode_upper(random_bytes(REFERENCE_BYTES)))
}

/// Generates the secret a device presents when polling for commands.
pub fn generate_device_secret() -> String {
    hex::encode(random_bytes(DEVICE_SECRET_BYTES))
}
