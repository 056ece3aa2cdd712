//! Device registry endpoints, scoped to the authenticated account.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthAccount;
use crate::error::AppError;
use crate::models::Device;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub device_id: String,
}

/// A new device plus the secret it must present when polling commands.
#[derive(Debug, Serialize)]
pub struct RegisterDeviceResponse {
    #[serde(flatten)]
    pub device: Device,
    pub secret: String,
}

/// Creates the devices router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/devices/", get(list_devices).post(register_device))
        .route("/devices/{device_id}/", delete(delete_device))
        .with_state(state)
}

/// GET /devices/
async fn list_devices(
    State(state): State<AppState>,
    AuthAccount(account_id): AuthAccount,
) -> Result<Json<Vec<Device>>, AppError> {
    Ok(Json(state.devices.list(account_id).await?))
}

/// POST /devices/
async fn register_device(
    State(state): State<AppState>,
    AuthAccount(account_id): AuthAccount,
    Json(request): Json<RegisterDeviceRequest>,
) -> Result<(StatusCode, Json<RegisterDeviceResponse>), AppError> {
    let registered = state
        .devices
        .register(account_id, &request.device_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterDeviceResponse {
            device: registered.device,
            secret: registered.secret,
        }),
    ))
}

/// DELETE /devices/{device_id}/
async fn delete_device(
    State(state): State<AppState>,
    AuthAccount(account_id): AuthAccount,
    Path(device_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.devices.delete(account_id, &device_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
