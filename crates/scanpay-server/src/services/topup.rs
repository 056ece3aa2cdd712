//! Wallet reloads and the wallet summary view.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::{NewWalletTransaction, Wallet, WalletTransaction};
use crate::money::normalize_amount;
use crate::store::StoreRef;

/// Fixed reload amounts offered by the payer UI.
pub const PRESET_AMOUNTS: [i64; 6] = [1, 2, 5, 10, 20, 50];

/// Number of ledger entries returned with the wallet summary.
const SUMMARY_TRANSACTIONS: i64 = 20;

/// Bounds applied to every reload.
#[derive(Debug, Clone, PartialEq)]
pub struct TopUpPolicy {
    pub min: BigDecimal,
    pub max: BigDecimal,
}

impl Default for TopUpPolicy {
    fn default() -> Self {
        Self {
            // 1.00 and 500.00
            min: BigDecimal::new(100.into(), 2),
            max: BigDecimal::new(50_000.into(), 2),
        }
    }
}

/// How the caller chose the reload amount.
#[derive(Debug, Clone, PartialEq)]
pub enum TopUpAmount {
    Preset(i64),
    Custom(BigDecimal),
}

/// Result of a successful reload.
#[derive(Debug, Clone)]
pub struct TopUpReceipt {
    pub balance: BigDecimal,
    pub amount: BigDecimal,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

/// Current balance plus the most recent ledger entries.
#[derive(Debug, Clone)]
pub struct WalletSummary {
    pub wallet: Wallet,
    pub transactions: Vec<WalletTransaction>,
}

/// Validates and applies wallet credits.
pub struct TopUpProcessor {
    store: StoreRef,
    clock: Arc<dyn Clock>,
    policy: TopUpPolicy,
}

impl TopUpProcessor {
    pub fn new(store: StoreRef, clock: Arc<dyn Clock>, policy: TopUpPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Validates the requested amount against the presets and policy bounds.
    pub fn resolve_amount(&self, amount: TopUpAmount) -> Result<BigDecimal, AppError> {
        let amount = match amount {
            TopUpAmount::Preset(preset) => {
                if !PRESET_AMOUNTS.contains(&preset) {
                    return Err(AppError::InvalidInput(format!(
                        "Unknown preset {}. Supported: {:?}",
                        preset, PRESET_AMOUNTS
                    )));
                }
                BigDecimal::from(preset).with_scale(2)
            }
            TopUpAmount::Custom(amount) => normalize_amount(amount)?,
        };

        if amount < self.policy.min {
            return Err(AppError::InvalidInput(format!(
                "Minimum top-up amount is {}",
                self.policy.min
            )));
        }
        if amount > self.policy.max {
            return Err(AppError::InvalidInput(format!(
                "Maximum top-up amount is {}",
                self.policy.max
            )));
        }

        Ok(amount)
    }

    /// Credits the account's wallet and appends a `TOPUP` entry.
    pub async fn top_up(
        &self,
        account_id: Uuid,
        amount: TopUpAmount,
    ) -> Result<TopUpReceipt, AppError> {
        let amount = self.resolve_amount(amount)?;
        let entry = NewWalletTransaction::topup(
            account_id,
            amount,
            scanpay_crypto::generate_reference("TOPUP"),
            self.clock.now(),
        );

        let (wallet, tx) = self.store.credit_wallet(entry).await?;

        tracing::info!(
            account_id = %account_id,
            amount = %tx.amount,
            reference = %tx.reference,
            balance = %wallet.balance,
            "Wallet topped up"
        );

        Ok(TopUpReceipt {
            balance: wallet.balance,
            amount: tx.amount,
            reference: tx.reference,
            created_at: tx.created_at,
        })
    }

    /// Returns the wallet (creating it if needed) and its latest entries.
    pub async fn wallet_summary(&self, account_id: Uuid) -> Result<WalletSummary, AppError> {
        let wallet = self.store.wallet(account_id, self.clock.now()).await?;
        let transactions = self
            .store
            .recent_transactions(account_id, SUMMARY_TRANSACTIONS)
            .await?;

        Ok(WalletSummary {
            wallet,
            transactions,
        })
    }
}
