//! Storage ports for invoices, the wallet ledger and the device registry.
//!
//! Each concern is its own trait so services depend only on what they use.
//! `SettlementStore` is the one operation that spans stores: it must commit
//! the invoice transition, wallet debit, ledger entry, payment record and
//! device command together or not at all.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    Device, DeviceCommand, Invoice, NewDevice, NewInvoice, NewWalletTransaction, PaymentRecord,
    Wallet, WalletTransaction,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Persists a new `PENDING` invoice.
    async fn insert_invoice(&self, invoice: NewInvoice) -> Result<Invoice, AppError>;

    /// Looks up an invoice by public id. Never writes.
    async fn find_invoice(&self, public_id: &str) -> Result<Option<Invoice>, AppError>;

    /// Most recent invoice for a device by `(created_at, id)`.
    ///
    /// With `pending_at`, only invoices stored as `PENDING` whose expiry is
    /// after that instant are considered. Never writes.
    async fn latest_invoice_for_device(
        &self,
        device_id: &str,
        pending_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Invoice>, AppError>;

    /// Flips stored `PENDING` invoices whose expiry has passed to `EXPIRED`.
    async fn expire_stale_invoices(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Returns the account's wallet, creating an empty one on first access.
    async fn wallet(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<Wallet, AppError>;

    /// Atomically appends a credit entry and adds it to the wallet balance.
    async fn credit_wallet(
        &self,
        entry: NewWalletTransaction,
    ) -> Result<(Wallet, WalletTransaction), AppError>;

    /// Newest-first ledger entries for an account.
    async fn recent_transactions(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> Result<Vec<WalletTransaction>, AppError>;
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Registers a device; `Conflict` if the id is taken.
    async fn insert_device(&self, device: NewDevice) -> Result<Device, AppError>;

    async fn find_device(&self, device_id: &str) -> Result<Option<Device>, AppError>;

    /// Devices owned by an account, ordered by id.
    async fn list_devices(&self, owner_id: Uuid) -> Result<Vec<Device>, AppError>;

    /// Removes the registry entry only. Returns false if it did not exist.
    async fn delete_device(&self, device_id: &str) -> Result<bool, AppError>;

    /// Records that the device polled at `now`, then hands out its oldest
    /// queued command (marking it `SENT`).
    async fn take_next_command(
        &self,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DeviceCommand>, AppError>;

    /// Marks a command `ACKED`. Returns false if the device has no such command.
    async fn ack_command(
        &self,
        device_id: &str,
        command_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;
}

/// Who pays for a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payer {
    /// Debit the account's wallet.
    Wallet(Uuid),
    /// Anonymous, simulated external payment.
    Guest,
}

/// A request to settle one invoice.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub public_id: String,
    pub payer: Payer,
    /// Fresh unique reference; becomes the invoice's `paid_reference`.
    pub reference: String,
    pub settled_at: DateTime<Utc>,
}

/// Outcome of a committed settlement.
#[derive(Debug, Clone)]
pub struct SettlementReceipt {
    /// The invoice after the `PENDING -> PAID` transition.
    pub invoice: Invoice,
    /// Wallet balance after the debit; `None` for guest settlements.
    pub new_balance: Option<BigDecimal>,
    /// The device command emitted for this settlement.
    pub command: DeviceCommand,
}

#[async_trait]
pub trait SettlementStore: Send + Sync {
    /// Settles an invoice exactly once.
    ///
    /// Under one lock or transaction: re-validates the invoice is payable at
    /// `settled_at` (and, for wallet payers, that the balance covers it),
    /// then debits the wallet, appends the `PAYMENT` entry, marks the invoice
    /// paid, records the payment and queues the device START command. Any
    /// failure leaves every store untouched.
    async fn settle_invoice(&self, settlement: Settlement) -> Result<SettlementReceipt, AppError>;

    /// Settlement records for an invoice, oldest first.
    async fn payments_for_invoice(&self, public_id: &str)
        -> Result<Vec<PaymentRecord>, AppError>;
}

/// Everything the services need from persistence.
pub trait Store: InvoiceStore + LedgerStore + DeviceStore + SettlementStore {}

impl<T> Store for T where T: InvoiceStore + LedgerStore + DeviceStore + SettlementStore {}

pub type StoreRef = Arc<dyn Store>;
