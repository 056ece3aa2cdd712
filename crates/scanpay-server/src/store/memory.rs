use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    DeviceStore, InvoiceStore, LedgerStore, Payer, Settlement, SettlementReceipt, SettlementStore,
};
use crate::error::AppError;
use crate::models::{
    CommandState, Device, DeviceCommand, Invoice, InvoiceStatus, NewDevice, NewInvoice,
    NewWalletTransaction, PaymentMethod, PaymentRecord, Wallet, WalletTransaction,
};

#[derive(Default)]
struct Tables {
    invoices: HashMap<String, Invoice>,
    next_invoice_id: i64,
    wallets: HashMap<Uuid, Wallet>,
    ledger: Vec<WalletTransaction>,
    ledger_references: HashSet<String>,
    payments: Vec<PaymentRecord>,
    devices: BTreeMap<String, Device>,
    commands: Vec<DeviceCommand>,
}

impl Tables {
    fn wallet_entry(&mut self, account_id: Uuid, now: DateTime<Utc>) -> &mut Wallet {
        self.wallets
            .entry(account_id)
            .or_insert_with(|| Wallet::empty(account_id, now))
    }

    fn append_ledger(&mut self, entry: NewWalletTransaction) -> Result<WalletTransaction, AppError> {
        if !self.ledger_references.insert(entry.reference.clone()) {
            return Err(AppError::Internal(format!(
                "Duplicate ledger reference: {}",
                entry.reference
            )));
        }
        let tx = entry.into_transaction(self.ledger.len() as i64 + 1);
        self.ledger.push(tx.clone());
        Ok(tx)
    }
}

/// A thread-safe in-memory store for every table.
///
/// A single `tokio::sync::Mutex` guards all tables, so each trait method is
/// one critical section. That makes settlement atomic across the invoice,
/// the wallet and the ledger. Used for tests and for `--store memory`.
#[derive(Default, Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn insert_invoice(&self, invoice: NewInvoice) -> Result<Invoice, AppError> {
        let mut tables = self.tables.lock().await;
        if tables.invoices.contains_key(&invoice.public_id) {
            return Err(AppError::Internal(format!(
                "Duplicate invoice id: {}",
                invoice.public_id
            )));
        }
        tables.next_invoice_id += 1;
        let invoice = invoice.into_invoice(tables.next_invoice_id);
        tables
            .invoices
            .insert(invoice.public_id.clone(), invoice.clone());
        Ok(invoice)
    }

    async fn find_invoice(&self, public_id: &str) -> Result<Option<Invoice>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.invoices.get(public_id).cloned())
    }

    /// Linear scan over every stored invoice, so cost grows with history.
    /// Only `PgStore` answers from the `(device_id, created_at, id)` index.
    async fn latest_invoice_for_device(
        &self,
        device_id: &str,
        pending_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Invoice>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .invoices
            .values()
            .filter(|inv| inv.device_id == device_id)
            .filter(|inv| match pending_at {
                Some(now) => inv.status == InvoiceStatus::Pending && inv.expires_at > now,
                None => true,
            })
            .max_by_key(|inv| (inv.created_at, inv.id))
            .cloned())
    }

    async fn expire_stale_invoices(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut tables = self.tables.lock().await;
        let mut expired = 0;
        for invoice in tables.invoices.values_mut() {
            if invoice.status == InvoiceStatus::Pending && invoice.is_expired_at(now) {
                invoice.status = InvoiceStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn wallet(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<Wallet, AppError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.wallet_entry(account_id, now).clone())
    }

    async fn credit_wallet(
        &self,
        entry: NewWalletTransaction,
    ) -> Result<(Wallet, WalletTransaction), AppError> {
        let mut tables = self.tables.lock().await;
        let account_id = entry.account_id;
        let now = entry.created_at;
        let delta = entry.balance_delta();

        let tx = tables.append_ledger(entry)?;
        let wallet = tables.wallet_entry(account_id, now);
        wallet.balance += delta;
        wallet.updated_at = now;
        Ok((wallet.clone(), tx))
    }

    async fn recent_transactions(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        let tables = self.tables.lock().await;
        let mut entries: Vec<WalletTransaction> = tables
            .ledger
            .iter()
            .filter(|tx| tx.account_id == account_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn insert_device(&self, device: NewDevice) -> Result<Device, AppError> {
        let mut tables = self.tables.lock().await;
        if tables.devices.contains_key(&device.device_id) {
            return Err(AppError::Conflict(format!(
                "Device {} is already registered",
                device.device_id
            )));
        }
        let device = device.into_device();
        tables
            .devices
            .insert(device.device_id.clone(), device.clone());
        Ok(device)
    }

    async fn find_device(&self, device_id: &str) -> Result<Option<Device>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables.devices.get(device_id).cloned())
    }

    async fn list_devices(&self, owner_id: Uuid) -> Result<Vec<Device>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .devices
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn delete_device(&self, device_id: &str) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.devices.remove(device_id).is_some())
    }

    async fn take_next_command(
        &self,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DeviceCommand>, AppError> {
        let mut tables = self.tables.lock().await;
        if let Some(device) = tables.devices.get_mut(device_id) {
            device.last_seen = Some(now);
        }

        let next = tables
            .commands
            .iter_mut()
            .filter(|c| c.device_id == device_id && c.state == CommandState::Queued)
            .min_by_key(|c| (c.created_at, c.id));

        Ok(next.map(|command| {
            command.state = CommandState::Sent;
            command.sent_at = Some(now);
            command.clone()
        }))
    }

    async fn ack_command(
        &self,
        device_id: &str,
        command_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        match tables
            .commands
            .iter_mut()
            .find(|c| c.id == command_id && c.device_id == device_id)
        {
            Some(command) => {
                command.state = CommandState::Acked;
                command.acked_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn settle_invoice(&self, settlement: Settlement) -> Result<SettlementReceipt, AppError> {
        let mut tables = self.tables.lock().await;
        let now = settlement.settled_at;

        // Validate everything before the first write.
        let mut invoice = tables
            .invoices
            .get(&settlement.public_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Invoice not found: {}", settlement.public_id)))?;
        invoice.check_payable(now)?;

        if let Payer::Wallet(account_id) = settlement.payer {
            tables.wallet_entry(account_id, now).check_covers(&invoice.amount)?;
            if tables.ledger_references.contains(&settlement.reference) {
                return Err(AppError::Internal(format!(
                    "Duplicate ledger reference: {}",
                    settlement.reference
                )));
            }
        }

        let new_balance = match settlement.payer {
            Payer::Wallet(account_id) => {
                let entry = NewWalletTransaction::payment(
                    account_id,
                    invoice.amount.clone(),
                    settlement.reference.clone(),
                    invoice.public_id.clone(),
                    now,
                );
                let delta = entry.balance_delta();
                tables.append_ledger(entry)?;
                let wallet = tables.wallet_entry(account_id, now);
                wallet.balance += delta;
                wallet.updated_at = now;
                Some(wallet.balance.clone())
            }
            Payer::Guest => None,
        };

        invoice.mark_paid(&settlement.reference, now);
        tables
            .invoices
            .insert(invoice.public_id.clone(), invoice.clone());

        let (method, account_id) = match settlement.payer {
            Payer::Wallet(account_id) => (PaymentMethod::Wallet, Some(account_id)),
            Payer::Guest => (PaymentMethod::Guest, None),
        };
        let payment_id = tables.payments.len() as i64 + 1;
        tables.payments.push(PaymentRecord {
            id: payment_id,
            invoice_public_id: invoice.public_id.clone(),
            method,
            account_id,
            amount: invoice.amount.clone(),
            reference: settlement.reference.clone(),
            created_at: now,
        });

        let command = DeviceCommand::start_for_invoice(
            tables.commands.len() as i64 + 1,
            &invoice.device_id,
            &invoice.public_id,
            invoice.duration_sec,
            now,
        );
        tables.commands.push(command.clone());

        Ok(SettlementReceipt {
            invoice,
            new_balance,
            command,
        })
    }

    async fn payments_for_invoice(
        &self,
        public_id: &str,
    ) -> Result<Vec<PaymentRecord>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .payments
            .iter()
            .filter(|p| p.invoice_public_id == public_id)
            .cloned()
            .collect())
    }
}
