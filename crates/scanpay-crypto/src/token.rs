// Signed tokens for pay links and bearer access
//
// A token is `b64url(JCS(claims)) "." b64url(ed25519 signature over the JCS bytes)`.
// Link tokens grant read access to one invoice; access tokens carry an account id.

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::jcs::jcs_canonical_bytes;

/// Claims carried by a signed token. `exp` is a unix timestamp in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TokenClaims {
    /// Grants access to a single invoice's pay page.
    Link { pid: String, exp: i64 },
    /// Identifies an account for bearer-authenticated endpoints.
    Access { sub: String, exp: i64 },
}

impl TokenClaims {
    /// Expiry timestamp of the claims.
    pub fn exp(&self) -> i64 {
        match self {
            TokenClaims::Link { exp, .. } | TokenClaims::Access { exp, .. } => *exp,
        }
    }
}

/// Signs claims and returns the compact token string.
pub fn sign_token(signing_key: &SigningKey, claims: &TokenClaims) -> Result<String> {
    let payload = jcs_canonical_bytes(claims)?;
    let signature = signing_key.sign(&payload);
    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(&payload),
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}

/// Verifies a token's signature and expiry, returning its claims.
///
/// A token is accepted up to and including the second named by `exp`.
pub fn verify_token(verifying_key: &VerifyingKey, token: &str, now: i64) -> Result<TokenClaims> {
    let (payload_b64, signature_b64) = token
        .split_once('.')
        .ok_or_else(|| anyhow!("Malformed token: missing signature part"))?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| anyhow!("Invalid token payload encoding: {}", e))?;
    let signature_bytes = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|e| anyhow!("Invalid token signature encoding: {}", e))?;

    let signature_array: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| anyhow!("Invalid signature length: expected 64 bytes"))?;
    let signature = Signature::from_bytes(&signature_array);

    verifying_key
        .verify(&payload, &signature)
        .map_err(|_| anyhow!("Token signature verification failed"))?;

    let claims: TokenClaims = serde_json::from_slice(&payload)
        .map_err(|e| anyhow!("Invalid token claims: {}", e))?;

    if claims.exp() < now {
        return Err(anyhow!("Token expired"));
    }

    Ok(claims)
}

/// Signs a pay-link token for an invoice.
pub fn sign_link_token(
    signing_key: &SigningKey,
    public_id: &str,
    now: i64,
    ttl_secs: i64,
) -> Result<String> {
    sign_token(
        signing_key,
        &TokenClaims::Link {
            pid: public_id.to_string(),
            exp: now + ttl_secs,
        },
    )
}

/// Verifies a pay-link token was issued for `expected_public_id`.
pub fn verify_link_token(
    verifying_key: &VerifyingKey,
    token: &str,
    expected_public_id: &str,
    now: i64,
) -> Result<()> {
    match verify_token(verifying_key, token, now)? {
        TokenClaims::Link { pid, .. } if pid == expected_public_id => Ok(()),
        TokenClaims::Link { .. } => Err(anyhow!("Token was issued for another invoice")),
        TokenClaims::Access { .. } => Err(anyhow!("Expected a link token")),
    }
}

/// Signs a bearer access token for an account.
pub fn sign_access_token(
    signing_key: &SigningKey,
    account: &str,
    now: i64,
    ttl_secs: i64,
) -> Result<String> {
    sign_token(
        signing_key,
        &TokenClaims::Access {
            sub: account.to_string(),
            exp: now + ttl_secs,
        },
    )
}

/// Verifies a bearer access token and returns the account it names.
pub fn verify_access_token(verifying_key: &VerifyingKey, token: &str, now: i64) -> Result<String> {
    match verify_token(verifying_key, token, now)? {
        TokenClaims::Access { sub, .. } => Ok(sub),
        TokenClaims::Link { .. } => Err(anyhow!("Expected an access token")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000;

    fn test_key() -> SigningKey {
        SigningKey::from_bytes(&[0x42; 32])
    }

    #[test]
    fn test_link_token_verifies_for_its_invoice() {
        let key = test_key();
        let token = sign_link_token(&key, "pay_AAA", NOW, 900).unwrap();

        assert!(verify_link_token(&key.verifying_key(), &token, "pay_AAA", NOW).is_ok());
        assert!(verify_link_token(&key.verifying_key(), &token, "pay_AAA", NOW + 900).is_ok());
    }

    #[test]
    fn test_link_token_rejects_other_invoice() {
        let key = test_key();
        let token = sign_link_token(&key, "pay_AAA", NOW, 900).unwrap();

        let err = verify_link_token(&key.verifying_key(), &token, "pay_BBB", NOW).unwrap_err();
        assert!(err.to_string().contains("another invoice"));
    }

    #[test]
    fn test_link_token_expires() {
        let key = test_key();
        let token = sign_link_token(&key, "pay_AAA", NOW, 900).unwrap();

        let err =
            verify_link_token(&key.verifying_key(), &token, "pay_AAA", NOW + 901).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn test_token_from_other_key_fails() {
        let token = sign_link_token(&test_key(), "pay_AAA", NOW, 900).unwrap();
        let other = SigningKey::from_bytes(&[0x99; 32]);

        let err = verify_token(&other.verifying_key(), &token, NOW).unwrap_err();
        assert!(err.to_string().contains("signature verification failed"));
    }

    #[test]
    fn test_tampered_payload_fails() {
        let key = test_key();
        let token = sign_link_token(&key, "pay_AAA", NOW, 900).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let forged_claims = TokenClaims::Link {
            pid: "pay_AAA".to_string(),
            exp: NOW + 100_000,
        };
        let forged_payload = URL_SAFE_NO_PAD.encode(jcs_canonical_bytes(&forged_claims).unwrap());
        let forged = format!("{}.{}", forged_payload, signature);

        assert!(verify_token(&key.verifying_key(), &forged, NOW).is_err());
    }

    #[test]
    fn test_malformed_tokens_fail() {
        let vk = test_key().verifying_key();
        assert!(verify_token(&vk, "", NOW).is_err());
        assert!(verify_token(&vk, "no-dot-here", NOW).is_err());
        assert!(verify_token(&vk, "!!!.???", NOW).is_err());
        assert!(verify_token(&vk, "e30.AAAA", NOW).is_err());
    }

    #[test]
    fn test_access_token_roundtrip() {
        let key = test_key();
        let account = "7a3c1f6e-0d2b-4c55-9a0e-3b1f2d4c5e6f";
        let token = sign_access_token(&key, account, NOW, 3600).unwrap();

        let sub = verify_access_token(&key.verifying_key(), &token, NOW).unwrap();
        assert_eq!(sub, account);
    }

    #[test]
    fn test_token_kinds_are_not_interchangeable() {
        let key = test_key();
        let vk = key.verifying_key();
        let link = sign_link_token(&key, "pay_AAA", NOW, 900).unwrap();
        let access = sign_access_token(&key, "acct", NOW, 900).unwrap();

        assert!(verify_access_token(&vk, &link, NOW).is_err());
        assert!(verify_link_token(&vk, &access, "acct", NOW).is_err());
    }
}
