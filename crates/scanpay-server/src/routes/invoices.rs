//! Invoice creation and payer-facing invoice reads.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthAccount;
use crate::error::AppError;
use crate::models::{Invoice, InvoiceStatus};
use crate::money::AmountInput;
use crate::services::CreateInvoice;
use crate::state::AppState;

/// Request body for creating an invoice.
#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub amount: AmountInput,
    #[serde(default)]
    pub description: String,
    pub device_id: String,
    pub duration_sec: i64,
}

/// An invoice together with the link a payer opens.
#[derive(Debug, Serialize)]
pub struct InvoiceWithLink {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub pay_url: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct LinkQuery {
    pub t: Option<String>,
}

/// Minimal status view polled by the payer page.
#[derive(Debug, Serialize)]
pub struct InvoiceStatusResponse {
    pub public_id: String,
    pub status: InvoiceStatus,
    pub paid_reference: Option<String>,
    pub device_id: String,
    pub duration_sec: i32,
}

/// Creates the invoices router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/invoices/", post(create_invoice))
        .route("/invoices/{public_id}/", get(get_invoice))
        .route("/invoices/{public_id}/status/", get(get_invoice_status))
        .with_state(state)
}

/// Signs a link token for `invoice` and builds its pay URL.
pub(crate) fn with_link(state: &AppState, invoice: Invoice) -> Result<InvoiceWithLink, AppError> {
    let token = state
        .tokens
        .issue_link_token(&invoice.public_id, state.clock.now())?;
    let pay_url = state.tokens.pay_url(&invoice.public_id, &token);
    Ok(InvoiceWithLink {
        invoice,
        pay_url,
        token,
    })
}

/// POST /invoices/
async fn create_invoice(
    State(state): State<AppState>,
    AuthAccount(account_id): AuthAccount,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceWithLink>), AppError> {
    let amount = request.amount.to_amount()?;
    let invoice = state
        .payments
        .create_invoice(
            account_id,
            CreateInvoice {
                device_id: request.device_id,
                amount,
                description: request.description,
                duration_sec: request.duration_sec,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(with_link(&state, invoice)?)))
}

/// GET /invoices/{public_id}/?t=<token>
async fn get_invoice(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
    Query(query): Query<LinkQuery>,
) -> Result<Json<Invoice>, AppError> {
    let token = query
        .t
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing link token".to_string()))?;
    state
        .tokens
        .check_link_token(token, &public_id, state.clock.now())?;

    let invoice = state.payments.get_invoice(&public_id).await?;
    Ok(Json(invoice))
}

/// GET /invoices/{public_id}/status/
async fn get_invoice_status(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> Result<Json<InvoiceStatusResponse>, AppError> {
    let invoice = state.payments.get_invoice(&public_id).await?;
    Ok(Json(InvoiceStatusResponse {
        public_id: invoice.public_id,
        status: invoice.status,
        paid_reference: invoice.paid_reference,
        device_id: invoice.device_id,
        duration_sec: invoice.duration_sec,
    }))
}
