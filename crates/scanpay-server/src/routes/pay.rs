//! Anonymous guest settlement.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::InvoiceStatus;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GuestPayRequest {
    pub invoice_public_id: String,
    /// Display name only; never stored.
    #[serde(default)]
    pub guest_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GuestPayResponse {
    pub status: InvoiceStatus,
    pub paid_reference: Option<String>,
}

/// Creates the guest payment router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/pay/guest/", post(guest_pay))
        .with_state(state)
}

/// POST /pay/guest/
async fn guest_pay(
    State(state): State<AppState>,
    Json(request): Json<GuestPayRequest>,
) -> Result<Json<GuestPayResponse>, AppError> {
    let public_id = request.invoice_public_id.trim();
    if let Some(name) = request.guest_name.as_deref().filter(|n| !n.is_empty()) {
        tracing::debug!(public_id = %public_id, guest_name = %name, "Guest payment requested");
    }

    let invoice = state.payments.guest_pay(public_id).await?;
    Ok(Json(GuestPayResponse {
        status: invoice.status,
        paid_reference: invoice.paid_reference,
    }))
}
