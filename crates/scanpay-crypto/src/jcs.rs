// JCS (JSON Canonicalization Scheme) - RFC 8785 canonical bytes for token payloads

use anyhow::Result;
use serde::Serialize;

/// Canonicalizes a serializable value according to RFC 8785 (JCS) and returns the UTF-8 bytes.
///
/// Token payloads are signed over these bytes, so the same claims always
/// produce the same signature input regardless of field order.
pub fn jcs_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let canonical = serde_jcs::to_string(value)?;
    Ok(canonical.into_bytes())
}
