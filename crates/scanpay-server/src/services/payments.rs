//! Invoice lifecycle and the two settlement paths.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::{Invoice, NewInvoice, MAX_DESCRIPTION_CHARS, MAX_DURATION_SECS};
use crate::money::normalize_amount;
use crate::store::{Payer, Settlement, SettlementReceipt, StoreRef};

/// Reference prefix for wallet settlements.
const WALLET_REFERENCE_PREFIX: &str = "PAY";

/// Reference prefix for guest settlements.
const GUEST_REFERENCE_PREFIX: &str = "GUEST";

/// Parameters for a new invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub device_id: String,
    pub amount: BigDecimal,
    pub description: String,
    pub duration_sec: i64,
}

/// Result of a wallet settlement.
#[derive(Debug, Clone)]
pub struct WalletPayment {
    pub invoice: Invoice,
    pub paid_reference: String,
    pub new_balance: BigDecimal,
}

/// Creates invoices and settles them exactly once.
pub struct PaymentOrchestrator {
    store: StoreRef,
    clock: Arc<dyn Clock>,
}

impl PaymentOrchestrator {
    pub fn new(store: StoreRef, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Creates a `PENDING` invoice for a device owned by `account_id`.
    pub async fn create_invoice(
        &self,
        account_id: Uuid,
        request: CreateInvoice,
    ) -> Result<Invoice, AppError> {
        let amount = normalize_amount(request.amount)?;
        let duration_sec = validate_duration(request.duration_sec)?;

        let description = request.description.trim().to_string();
        if description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(AppError::InvalidInput(format!(
                "Description exceeds {} characters",
                MAX_DESCRIPTION_CHARS
            )));
        }

        let device = self
            .store
            .find_device(&request.device_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Device not found: {}", request.device_id)))?;
        if !device.is_owned_by(account_id) {
            return Err(AppError::Forbidden(format!(
                "Device {} belongs to another account",
                device.device_id
            )));
        }

        let invoice = self
            .store
            .insert_invoice(NewInvoice {
                public_id: scanpay_crypto::generate_public_id(),
                owner_id: account_id,
                amount,
                description,
                device_id: device.device_id,
                duration_sec,
                created_at: self.clock.now(),
            })
            .await?;

        tracing::info!(
            public_id = %invoice.public_id,
            device_id = %invoice.device_id,
            amount = %invoice.amount,
            expires_at = %invoice.expires_at,
            "Invoice created"
        );

        Ok(invoice)
    }

    /// Loads an invoice with its effective status. Never writes.
    pub async fn get_invoice(&self, public_id: &str) -> Result<Invoice, AppError> {
        let invoice = self
            .store
            .find_invoice(public_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Invoice not found: {}", public_id)))?;

        Ok(invoice.observed_at(self.clock.now()))
    }

    /// Most recent invoice for a device, optionally restricted to payable ones.
    pub async fn latest_invoice_for_device(
        &self,
        device_id: &str,
        only_pending: bool,
    ) -> Result<Option<Invoice>, AppError> {
        let now = self.clock.now();
        let pending_at = only_pending.then_some(now);
        let invoice = self
            .store
            .latest_invoice_for_device(device_id, pending_at)
            .await?;

        Ok(invoice.map(|invoice| invoice.observed_at(now)))
    }

    /// Settles an invoice by debiting the caller's wallet.
    pub async fn pay_with_wallet(
        &self,
        account_id: Uuid,
        public_id: &str,
    ) -> Result<WalletPayment, AppError> {
        let receipt = self
            .settle(public_id, Payer::Wallet(account_id), WALLET_REFERENCE_PREFIX)
            .await?;

        let new_balance = receipt.new_balance.ok_or_else(|| {
            AppError::Internal(format!("Wallet settlement of {} returned no balance", public_id))
        })?;
        let paid_reference = paid_reference_of(&receipt.invoice)?;

        tracing::info!(
            public_id = %public_id,
            account_id = %account_id,
            reference = %paid_reference,
            new_balance = %new_balance,
            "Invoice settled from wallet"
        );

        Ok(WalletPayment {
            invoice: receipt.invoice,
            paid_reference,
            new_balance,
        })
    }

    /// Settles an invoice without touching any wallet.
    pub async fn guest_pay(&self, public_id: &str) -> Result<Invoice, AppError> {
        let receipt = self
            .settle(public_id, Payer::Guest, GUEST_REFERENCE_PREFIX)
            .await?;

        tracing::info!(
            public_id = %public_id,
            reference = ?receipt.invoice.paid_reference,
            "Invoice settled by guest"
        );

        Ok(receipt.invoice)
    }

    async fn settle(
        &self,
        public_id: &str,
        payer: Payer,
        prefix: &str,
    ) -> Result<SettlementReceipt, AppError> {
        let receipt = self
            .store
            .settle_invoice(Settlement {
                public_id: public_id.to_string(),
                payer,
                reference: scanpay_crypto::generate_reference(prefix),
                settled_at: self.clock.now(),
            })
            .await?;

        tracing::debug!(
            device_id = %receipt.command.device_id,
            command_id = receipt.command.id,
            duration_sec = receipt.command.duration_sec,
            "Device start command queued"
        );

        Ok(receipt)
    }

    /// Flips stored `PENDING` invoices past their expiry to `EXPIRED`.
    pub async fn expire_stale_invoices(&self) -> Result<u64, AppError> {
        let now: DateTime<Utc> = self.clock.now();
        let expired = self.store.expire_stale_invoices(now).await?;
        if expired > 0 {
            tracing::info!(expired, "Expired stale invoices");
        }
        Ok(expired)
    }

    /// Runs `expire_stale_invoices` every `period` until the task is aborted.
    pub fn spawn_expiry_sweep(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(e) = self.expire_stale_invoices().await {
                    tracing::error!(error = %e, "Expiry sweep failed");
                }
            }
        })
    }
}

fn validate_duration(duration_sec: i64) -> Result<i32, AppError> {
    if !(1..=MAX_DURATION_SECS).contains(&duration_sec) {
        return Err(AppError::InvalidInput(format!(
            "duration_sec must be between 1 and {}",
            MAX_DURATION_SECS
        )));
    }
    i32::try_from(duration_sec)
        .map_err(|_| AppError::InvalidInput(format!("Invalid duration_sec: {}", duration_sec)))
}

fn paid_reference_of(invoice: &Invoice) -> Result<String, AppError> {
    invoice.paid_reference.clone().ok_or_else(|| {
        AppError::Internal(format!("Paid invoice {} has no reference", invoice.public_id))
    })
}
