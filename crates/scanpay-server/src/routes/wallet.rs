//! Wallet endpoints: reloads, wallet payments and the wallet summary.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthAccount;
use crate::error::AppError;
use crate::models::{InvoiceStatus, WalletTransaction};
use crate::money::AmountInput;
use crate::services::TopUpAmount;
use crate::state::AppState;

/// Request body for a reload. `preset` takes precedence over `amount`.
#[derive(Debug, Deserialize)]
pub struct TopUpRequest {
    #[serde(default)]
    pub preset: Option<i64>,
    #[serde(default)]
    pub amount: Option<AmountInput>,
}

impl TopUpRequest {
    fn into_amount(self) -> Result<TopUpAmount, AppError> {
        match (self.preset, self.amount) {
            (Some(preset), _) => Ok(TopUpAmount::Preset(preset)),
            (None, Some(amount)) => Ok(TopUpAmount::Custom(amount.to_amount()?)),
            (None, None) => Err(AppError::InvalidInput(
                "Provide either preset or amount".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TopUpResponse {
    #[serde(serialize_with = "crate::money::serialize_amount")]
    pub balance: BigDecimal,
    #[serde(serialize_with = "crate::money::serialize_amount")]
    pub topup_amount: BigDecimal,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct WalletPayRequest {
    pub invoice_public_id: String,
}

#[derive(Debug, Serialize)]
pub struct WalletPayResponse {
    pub status: InvoiceStatus,
    pub paid_reference: String,
    #[serde(serialize_with = "crate::money::serialize_amount")]
    pub new_balance: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    #[serde(serialize_with = "crate::money::serialize_amount")]
    pub balance: BigDecimal,
    pub transactions: Vec<WalletTransaction>,
}

/// Creates the wallet router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/wallet/topup/", post(top_up))
        .route("/wallet/pay/", post(pay_with_wallet))
        .route("/wallet/me/", get(get_wallet))
        .with_state(state)
}

/// POST /wallet/topup/
async fn top_up(
    State(state): State<AppState>,
    AuthAccount(account_id): AuthAccount,
    Json(request): Json<TopUpRequest>,
) -> Result<(StatusCode, Json<TopUpResponse>), AppError> {
    let receipt = state
        .topups
        .top_up(account_id, request.into_amount()?)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TopUpResponse {
            balance: receipt.balance,
            topup_amount: receipt.amount,
            reference: receipt.reference,
            created_at: receipt.created_at,
        }),
    ))
}

/// POST /wallet/pay/
async fn pay_with_wallet(
    State(state): State<AppState>,
    AuthAccount(account_id): AuthAccount,
    Json(request): Json<WalletPayRequest>,
) -> Result<Json<WalletPayResponse>, AppError> {
    let payment = state
        .payments
        .pay_with_wallet(account_id, request.invoice_public_id.trim())
        .await?;

    Ok(Json(WalletPayResponse {
        status: payment.invoice.status,
        paid_reference: payment.paid_reference,
        new_balance: payment.new_balance,
    }))
}

/// GET /wallet/me/
async fn get_wallet(
    State(state): State<AppState>,
    AuthAccount(account_id): AuthAccount,
) -> Result<Json<WalletResponse>, AppError> {
    let summary = state.topups.wallet_summary(account_id).await?;
    Ok(Json(WalletResponse {
        balance: summary.wallet.balance,
        transactions: summary.transactions,
    }))
}
