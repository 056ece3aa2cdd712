//! Scanpay Server - API for scan-to-pay
//!
//! This crate provides the REST API behind the scan-to-pay flow: merchant
//! devices request payment, payers settle from a prepaid wallet or as a
//! guest, and devices poll for the resulting commands.

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod money;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

pub use error::AppError;
pub use routes::create_router;
pub use state::AppState;
