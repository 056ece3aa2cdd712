//! Settlement records, one per paid invoice.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// How an invoice was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "payment_method", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    Wallet,
    Guest,
}

/// Record of a successful settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PaymentRecord {
    pub id: i64,
    pub invoice_public_id: String,
    pub method: PaymentMethod,
    /// Paying account; `None` for guest settlements.
    pub account_id: Option<Uuid>,
    #[serde(serialize_with = "crate::money::serialize_amount")]
    pub amount: BigDecimal,
    /// Same value as the invoice's `paid_reference`.
    pub reference: String,
    pub created_at: DateTime<Utc>,
}
