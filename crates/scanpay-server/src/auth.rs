//! Signed credentials: pay-link tokens and bearer access tokens.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Default lifetime of a pay-link token.
pub const DEFAULT_LINK_TTL_SECS: i64 = 900;

/// Issues and checks tokens signed with the server's Ed25519 key.
pub struct TokenIssuer {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    link_ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(signing_key: SigningKey, link_ttl_secs: i64) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
            link_ttl_secs,
        }
    }

    /// Signs a link token granting read access to one invoice.
    pub fn issue_link_token(&self, public_id: &str, now: DateTime<Utc>) -> Result<String, AppError> {
        scanpay_crypto::sign_link_token(
            &self.signing_key,
            public_id,
            now.timestamp(),
            self.link_ttl_secs,
        )
        .map_err(|e| AppError::Internal(format!("Failed to sign link token: {}", e)))
    }

    /// Checks a link token was issued for `public_id` and has not lapsed.
    pub fn check_link_token(
        &self,
        token: &str,
        public_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        scanpay_crypto::verify_link_token(&self.verifying_key, token, public_id, now.timestamp())
            .map_err(|e| AppError::Unauthorized(format!("Invalid link token: {}", e)))
    }

    /// Payer-facing URL for an invoice.
    pub fn pay_url(&self, public_id: &str, token: &str) -> String {
        format!("/pay/{}?t={}", public_id, token)
    }

    /// Signs a bearer token for `account_id`.
    pub fn issue_access_token(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
        ttl_secs: i64,
    ) -> Result<String, AppError> {
        scanpay_crypto::sign_access_token(
            &self.signing_key,
            &account_id.to_string(),
            now.timestamp(),
            ttl_secs,
        )
        .map_err(|e| AppError::Internal(format!("Failed to sign access token: {}", e)))
    }

    /// Resolves a bearer token to its account.
    pub fn verify_access_token(&self, token: &str, now: DateTime<Utc>) -> Result<Uuid, AppError> {
        let subject =
            scanpay_crypto::verify_access_token(&self.verifying_key, token, now.timestamp())
                .map_err(|e| AppError::Unauthorized(format!("Invalid access token: {}", e)))?;

        Uuid::parse_str(&subject)
            .map_err(|_| AppError::Unauthorized("Access token subject is not an account id".to_string()))
    }
}

/// The account behind the request's `Authorization: Bearer` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthAccount(pub Uuid);

impl FromRequestParts<AppState> for AuthAccount {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing bearer credential".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Malformed authorization header".to_string()))?;

        let account_id = state.tokens.verify_access_token(token, state.clock.now())?;
        Ok(AuthAccount(account_id))
    }
}
