//! PostgreSQL-backed store.
//!
//! Settlement takes row locks in a fixed order (invoice, then wallet) so two
//! concurrent settlements of the same invoice serialize on the invoice row.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    DeviceStore, InvoiceStore, LedgerStore, Payer, Settlement, SettlementReceipt, SettlementStore,
};
use crate::error::AppError;
use crate::models::{
    CommandState, Device, DeviceCommand, Invoice, InvoiceStatus, NewDevice, NewInvoice,
    NewWalletTransaction, PaymentMethod, PaymentRecord, Wallet, WalletTransaction, ACTION_START,
};

const INVOICE_COLUMNS: &str = "id, public_id, owner_id, amount, description, device_id, \
     duration_sec, status, created_at, expires_at, paid_at, paid_reference";

const WALLET_TX_COLUMNS: &str =
    "id, account_id, tx_type, amount, reference, invoice_public_id, created_at";

const DEVICE_COLUMNS: &str = "device_id, owner_id, secret_hash, is_active, last_seen, created_at";

const COMMAND_COLUMNS: &str =
    "id, device_id, invoice_public_id, action, duration_sec, state, created_at, sent_at, acked_at";

/// Store implementation over a Postgres connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.pool
            .begin()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to start transaction: {}", e)))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

/// Creates the wallet row if missing and locks it for the rest of the transaction.
async fn lock_wallet(
    tx: &mut Transaction<'static, Postgres>,
    account_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Wallet, AppError> {
    sqlx::query(
        r#"
        INSERT INTO wallets (account_id, balance, created_at, updated_at)
        VALUES ($1, 0, $2, $2)
        ON CONFLICT (account_id) DO NOTHING
        "#,
    )
    .bind(account_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    let wallet: Wallet = sqlx::query_as(
        r#"
        SELECT account_id, balance, created_at, updated_at
        FROM wallets
        WHERE account_id = $1
        FOR UPDATE
        "#,
    )
    .bind(account_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(wallet)
}

/// Applies a ledger entry to a locked wallet and appends it.
async fn apply_ledger_entry(
    tx: &mut Transaction<'static, Postgres>,
    entry: NewWalletTransaction,
) -> Result<(Wallet, WalletTransaction), AppError> {
    let delta = entry.balance_delta();

    let wallet: Wallet = sqlx::query_as(
        r#"
        UPDATE wallets
        SET balance = balance + $2, updated_at = $3
        WHERE account_id = $1
        RETURNING account_id, balance, created_at, updated_at
        "#,
    )
    .bind(entry.account_id)
    .bind(&delta)
    .bind(entry.created_at)
    .fetch_one(&mut **tx)
    .await?;

    let inserted: WalletTransaction = sqlx::query_as(&format!(
        r#"
        INSERT INTO wallet_transactions (account_id, tx_type, amount, reference, invoice_public_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {WALLET_TX_COLUMNS}
        "#
    ))
    .bind(entry.account_id)
    .bind(entry.tx_type)
    .bind(&entry.amount)
    .bind(&entry.reference)
    .bind(&entry.invoice_public_id)
    .bind(entry.created_at)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Internal(format!("Duplicate ledger reference: {}", entry.reference))
        } else {
            AppError::Database(e)
        }
    })?;

    Ok((wallet, inserted))
}

#[async_trait]
impl InvoiceStore for PgStore {
    async fn insert_invoice(&self, invoice: NewInvoice) -> Result<Invoice, AppError> {
        let expires_at = invoice.expires_at();
        let inserted: Invoice = sqlx::query_as(&format!(
            r#"
            INSERT INTO invoices (public_id, owner_id, amount, description, device_id, duration_sec, status, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(&invoice.public_id)
        .bind(invoice.owner_id)
        .bind(&invoice.amount)
        .bind(&invoice.description)
        .bind(&invoice.device_id)
        .bind(invoice.duration_sec)
        .bind(InvoiceStatus::Pending)
        .bind(invoice.created_at)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Internal(format!("Duplicate invoice id: {}", invoice.public_id))
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(inserted)
    }

    async fn find_invoice(&self, public_id: &str) -> Result<Option<Invoice>, AppError> {
        let invoice: Option<Invoice> = sqlx::query_as(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE public_id = $1"
        ))
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(invoice)
    }

    async fn latest_invoice_for_device(
        &self,
        device_id: &str,
        pending_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Invoice>, AppError> {
        let invoice: Option<Invoice> = match pending_at {
            Some(now) => {
                sqlx::query_as(&format!(
                    r#"
                    SELECT {INVOICE_COLUMNS}
                    FROM invoices
                    WHERE device_id = $1 AND status = $2 AND expires_at > $3
                    ORDER BY created_at DESC, id DESC
                    LIMIT 1
                    "#
                ))
                .bind(device_id)
                .bind(InvoiceStatus::Pending)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    r#"
                    SELECT {INVOICE_COLUMNS}
                    FROM invoices
                    WHERE device_id = $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT 1
                    "#
                ))
                .bind(device_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(invoice)
    }

    async fn expire_stale_invoices(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $1
            WHERE status = $2 AND expires_at <= $3
            "#,
        )
        .bind(InvoiceStatus::Expired)
        .bind(InvoiceStatus::Pending)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn wallet(&self, account_id: Uuid, now: DateTime<Utc>) -> Result<Wallet, AppError> {
        let wallet: Wallet = sqlx::query_as(
            r#"
            INSERT INTO wallets (account_id, balance, created_at, updated_at)
            VALUES ($1, 0, $2, $2)
            ON CONFLICT (account_id) DO UPDATE SET account_id = EXCLUDED.account_id
            RETURNING account_id, balance, created_at, updated_at
            "#,
        )
        .bind(account_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(wallet)
    }

    async fn credit_wallet(
        &self,
        entry: NewWalletTransaction,
    ) -> Result<(Wallet, WalletTransaction), AppError> {
        let mut tx = self.begin().await?;
        lock_wallet(&mut tx, entry.account_id, entry.created_at).await?;
        let result = apply_ledger_entry(&mut tx, entry).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to commit transaction: {}", e)))?;

        Ok(result)
    }

    async fn recent_transactions(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        let entries: Vec<WalletTransaction> = sqlx::query_as(&format!(
            r#"
            SELECT {WALLET_TX_COLUMNS}
            FROM wallet_transactions
            WHERE account_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(account_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

#[async_trait]
impl DeviceStore for PgStore {
    async fn insert_device(&self, device: NewDevice) -> Result<Device, AppError> {
        let inserted: Device = sqlx::query_as(&format!(
            r#"
            INSERT INTO devices (device_id, owner_id, secret_hash, is_active, created_at)
            VALUES ($1, $2, $3, TRUE, $4)
            RETURNING {DEVICE_COLUMNS}
            "#
        ))
        .bind(&device.device_id)
        .bind(device.owner_id)
        .bind(&device.secret_hash)
        .bind(device.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Device {} is already registered", device.device_id))
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(inserted)
    }

    async fn find_device(&self, device_id: &str) -> Result<Option<Device>, AppError> {
        let device: Option<Device> = sqlx::query_as(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE device_id = $1"
        ))
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(device)
    }

    async fn list_devices(&self, owner_id: Uuid) -> Result<Vec<Device>, AppError> {
        let devices: Vec<Device> = sqlx::query_as(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE owner_id = $1 ORDER BY device_id"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(devices)
    }

    async fn delete_device(&self, device_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM devices WHERE device_id = $1")
            .bind(device_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn take_next_command(
        &self,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DeviceCommand>, AppError> {
        let mut tx = self.begin().await?;

        sqlx::query("UPDATE devices SET last_seen = $2 WHERE device_id = $1")
            .bind(device_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let command: Option<DeviceCommand> = sqlx::query_as(&format!(
            r#"
            UPDATE device_commands
            SET state = $2, sent_at = $3
            WHERE id = (
                SELECT id FROM device_commands
                WHERE device_id = $1 AND state = $4
                ORDER BY created_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {COMMAND_COLUMNS}
            "#
        ))
        .bind(device_id)
        .bind(CommandState::Sent)
        .bind(now)
        .bind(CommandState::Queued)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to commit transaction: {}", e)))?;

        Ok(command)
    }

    async fn ack_command(
        &self,
        device_id: &str,
        command_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE device_commands
            SET state = $3, acked_at = $4
            WHERE device_id = $1 AND id = $2
            "#,
        )
        .bind(device_id)
        .bind(command_id)
        .bind(CommandState::Acked)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SettlementStore for PgStore {
    async fn settle_invoice(&self, settlement: Settlement) -> Result<SettlementReceipt, AppError> {
        let now = settlement.settled_at;
        let mut tx = self.begin().await?;

        // Lock order: invoice row first, then the wallet row.
        let invoice: Invoice = sqlx::query_as(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE public_id = $1 FOR UPDATE"
        ))
        .bind(&settlement.public_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Invoice not found: {}", settlement.public_id)))?;

        invoice.check_payable(now)?;

        let new_balance: Option<BigDecimal> = match settlement.payer {
            Payer::Wallet(account_id) => {
                let wallet = lock_wallet(&mut tx, account_id, now).await?;
                wallet.check_covers(&invoice.amount)?;

                let entry = NewWalletTransaction::payment(
                    account_id,
                    invoice.amount.clone(),
                    settlement.reference.clone(),
                    invoice.public_id.clone(),
                    now,
                );
                let (wallet, _) = apply_ledger_entry(&mut tx, entry).await?;
                Some(wallet.balance)
            }
            Payer::Guest => None,
        };

        let paid: Invoice = sqlx::query_as(&format!(
            r#"
            UPDATE invoices
            SET status = $2, paid_at = $3, paid_reference = $4
            WHERE id = $1
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(invoice.id)
        .bind(InvoiceStatus::Paid)
        .bind(now)
        .bind(&settlement.reference)
        .fetch_one(&mut *tx)
        .await?;

        let (method, account_id) = match settlement.payer {
            Payer::Wallet(account_id) => (PaymentMethod::Wallet, Some(account_id)),
            Payer::Guest => (PaymentMethod::Guest, None),
        };
        sqlx::query(
            r#"
            INSERT INTO payments (invoice_public_id, method, account_id, amount, reference, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&paid.public_id)
        .bind(method)
        .bind(account_id)
        .bind(&paid.amount)
        .bind(&settlement.reference)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let command: DeviceCommand = sqlx::query_as(&format!(
            r#"
            INSERT INTO device_commands (device_id, invoice_public_id, action, duration_sec, state, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {COMMAND_COLUMNS}
            "#
        ))
        .bind(&paid.device_id)
        .bind(&paid.public_id)
        .bind(ACTION_START)
        .bind(paid.duration_sec)
        .bind(CommandState::Queued)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to commit transaction: {}", e)))?;

        Ok(SettlementReceipt {
            invoice: paid,
            new_balance,
            command,
        })
    }

    async fn payments_for_invoice(
        &self,
        public_id: &str,
    ) -> Result<Vec<PaymentRecord>, AppError> {
        let payments: Vec<PaymentRecord> = sqlx::query_as(
            r#"
            SELECT id, invoice_public_id, method, account_id, amount, reference, created_at
            FROM payments
            WHERE invoice_public_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(public_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }
}
