//! Endpoints polled by merchant devices.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::invoices::with_link;
use crate::error::AppError;
use crate::models::Invoice;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LatestInvoiceQuery {
    pub only_pending: Option<String>,
}

impl LatestInvoiceQuery {
    fn only_pending(&self) -> bool {
        matches!(
            self.only_pending.as_deref().map(str::trim),
            Some("1") | Some("true") | Some("yes")
        )
    }
}

#[derive(Debug, Serialize)]
pub struct LatestInvoiceResponse {
    pub has_invoice: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice: Option<Invoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pay_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SecretQuery {
    pub secret: String,
}

#[derive(Debug, Serialize)]
pub struct NextCommandResponse {
    pub has_command: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<i16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct AckRequest {
    pub secret: String,
    pub command_id: i64,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub ok: bool,
}

/// Creates the device polling router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/device/{device_id}/latest-invoice/", get(latest_invoice))
        .route("/device/{device_id}/next/", get(next_command))
        .route("/device/{device_id}/ack/", post(ack_command))
        .with_state(state)
}

/// GET /device/{device_id}/latest-invoice/?only_pending=1
async fn latest_invoice(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<LatestInvoiceQuery>,
) -> Result<Json<LatestInvoiceResponse>, AppError> {
    let invoice = state
        .payments
        .latest_invoice_for_device(&device_id, query.only_pending())
        .await?;

    Ok(Json(match invoice {
        Some(invoice) => {
            let linked = with_link(&state, invoice)?;
            LatestInvoiceResponse {
                has_invoice: true,
                invoice: Some(linked.invoice),
                pay_url: Some(linked.pay_url),
                token: Some(linked.token),
            }
        }
        None => LatestInvoiceResponse {
            has_invoice: false,
            invoice: None,
            pay_url: None,
            token: None,
        },
    }))
}

/// GET /device/{device_id}/next/?secret=<secret>
async fn next_command(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<SecretQuery>,
) -> Result<Json<NextCommandResponse>, AppError> {
    let command = state
        .devices
        .next_command(&device_id, &query.secret)
        .await?;

    Ok(Json(match command {
        Some(command) => NextCommandResponse {
            has_command: true,
            command_id: Some(command.id),
            action: Some(command.action),
            duration_sec: Some(command.duration_sec),
        },
        None => NextCommandResponse {
            has_command: false,
            command_id: None,
            action: None,
            duration_sec: None,
        },
    }))
}

/// POST /device/{device_id}/ack/
async fn ack_command(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(request): Json<AckRequest>,
) -> Result<Json<AckResponse>, AppError> {
    state
        .devices
        .ack_command(&device_id, &request.secret, request.command_id)
        .await?;
    Ok(Json(AckResponse { ok: true }))
}
