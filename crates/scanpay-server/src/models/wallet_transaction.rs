//! Append-only wallet ledger entries.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Kinds of wallet ledger entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "wallet_tx_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    /// Credit from a reload.
    Topup,
    /// Debit settling an invoice.
    Payment,
}

/// Represents an immutable wallet ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WalletTransaction {
    #[serde(skip)]
    pub id: i64,
    #[serde(skip)]
    pub account_id: Uuid,
    pub tx_type: TransactionType,
    /// Always positive; the direction comes from `tx_type`.
    #[serde(serialize_with = "crate::money::serialize_amount")]
    pub amount: BigDecimal,
    /// Unique across the ledger.
    pub reference: String,
    /// Invoice settled by a payment entry.
    pub invoice_public_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Data required to append a ledger entry.
#[derive(Debug, Clone)]
pub struct NewWalletTransaction {
    pub account_id: Uuid,
    pub tx_type: TransactionType,
    pub amount: BigDecimal,
    pub reference: String,
    pub invoice_public_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewWalletTransaction {
    /// A credit entry for a reload.
    pub fn topup(
        account_id: Uuid,
        amount: BigDecimal,
        reference: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id,
            tx_type: TransactionType::Topup,
            amount,
            reference,
            invoice_public_id: None,
            created_at,
        }
    }

    /// A debit entry settling an invoice.
    pub fn payment(
        account_id: Uuid,
        amount: BigDecimal,
        reference: String,
        invoice_public_id: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id,
            tx_type: TransactionType::Payment,
            amount,
            reference,
            invoice_public_id: Some(invoice_public_id),
            created_at,
        }
    }

    /// Signed effect of the entry on the wallet balance.
    pub fn balance_delta(&self) -> BigDecimal {
        match self.tx_type {
            TransactionType::Topup => self.amount.clone(),
            TransactionType::Payment => -self.amount.clone(),
        }
    }

    /// Materializes the entry with the given row id.
    pub fn into_transaction(self, id: i64) -> WalletTransaction {
        WalletTransaction {
            id,
            account_id: self.account_id,
            tx_type: self.tx_type,
            amount: self.amount,
            reference: self.reference,
            invoice_public_id: self.invoice_public_id,
            created_at: self.created_at,
        }
    }
}
