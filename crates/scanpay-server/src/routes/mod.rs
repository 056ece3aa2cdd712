//! API routes for the scan-to-pay server.

pub mod device;
pub mod devices;
pub mod invoices;
pub mod pay;
pub mod wallet;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Creates the main API router with all routes mounted.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Creates the `/api` routes.
fn api_routes(state: AppState) -> Router {
    Router::new()
        .merge(invoices::router(state.clone()))
        .merge(device::router(state.clone()))
        .merge(wallet::router(state.clone()))
        .merge(pay::router(state.clone()))
        .merge(devices::router(state))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
