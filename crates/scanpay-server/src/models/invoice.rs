//! Invoice model and its lifecycle rules.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

use crate::error::AppError;

/// Longest validity window an invoice may request (one day).
pub const MAX_DURATION_SECS: i64 = 24 * 60 * 60;

/// Longest accepted invoice description.
pub const MAX_DESCRIPTION_CHARS: usize = 200;

/// Possible states of an invoice.
///
/// Transitions are monotonic: `Pending` moves to `Paid` or `Expired` and
/// never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "invoice_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    /// Awaiting payment.
    Pending,
    /// Settled; `paid_reference` is set.
    Paid,
    /// Validity window elapsed before settlement.
    Expired,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Expired => "EXPIRED",
        }
    }
}

/// A request for payment of a fixed amount, bound to one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    /// Internal row id; orders invoices created in the same instant.
    #[serde(skip)]
    pub id: i64,
    /// Opaque identifier used in pay links.
    pub public_id: String,
    /// Account that created the invoice.
    #[serde(skip)]
    pub owner_id: Uuid,
    /// Amount due, two decimal places.
    #[serde(serialize_with = "crate::money::serialize_amount")]
    pub amount: BigDecimal,
    pub description: String,
    /// Device that requested the payment.
    pub device_id: String,
    /// Requested validity window in seconds.
    pub duration_sec: i32,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    /// `created_at + duration_sec`, fixed at creation.
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Receipt reference, set exactly when the invoice is paid.
    pub paid_reference: Option<String>,
}

/// Data required to create a new invoice.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub public_id: String,
    pub owner_id: Uuid,
    pub amount: BigDecimal,
    pub description: String,
    pub device_id: String,
    pub duration_sec: i32,
    pub created_at: DateTime<Utc>,
}

impl NewInvoice {
    /// Expiry instant derived from the creation time and requested window.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(i64::from(self.duration_sec))
    }

    /// Materializes the pending invoice with the given row id.
    pub fn into_invoice(self, id: i64) -> Invoice {
        let expires_at = self.expires_at();
        Invoice {
            id,
            public_id: self.public_id,
            owner_id: self.owner_id,
            amount: self.amount,
            description: self.description,
            device_id: self.device_id,
            duration_sec: self.duration_sec,
            status: InvoiceStatus::Pending,
            created_at: self.created_at,
            expires_at,
            paid_at: None,
            paid_reference: None,
        }
    }
}

impl Invoice {
    /// True once `now` has reached the expiry instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Status as observed at `now`: a stored `Pending` past its expiry reads as `Expired`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> InvoiceStatus {
        match self.status {
            InvoiceStatus::Pending if self.is_expired_at(now) => InvoiceStatus::Expired,
            status => status,
        }
    }

    /// Returns the invoice with its status replaced by the effective status.
    pub fn observed_at(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.effective_status(now);
        self
    }

    /// True if the invoice can still be settled at `now`.
    pub fn is_payable_at(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == InvoiceStatus::Pending
    }

    /// Validates that the invoice can be settled at `now`.
    pub fn check_payable(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        match self.effective_status(now) {
            InvoiceStatus::Pending => Ok(()),
            InvoiceStatus::Expired => Err(AppError::Expired(self.public_id.clone())),
            InvoiceStatus::Paid => Err(AppError::AlreadyPaid {
                public_id: self.public_id.clone(),
                status: self.status.as_str().to_string(),
            }),
        }
    }

    /// Applies the `Pending -> Paid` transition.
    pub fn mark_paid(&mut self, reference: &str, paid_at: DateTime<Utc>) {
        self.status = InvoiceStatus::Paid;
        self.paid_at = Some(paid_at);
        self.paid_reference = Some(reference.to_string());
    }
}
