//! Wallet model for tracking account balances.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppError;
use crate::money::format_amount;

/// A prepaid balance owned by one account.
///
/// The balance only changes together with an appended `WalletTransaction`,
/// so it always equals top-ups minus payments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    /// Account holding the wallet.
    pub account_id: Uuid,
    /// Current balance, never negative.
    #[serde(serialize_with = "crate::money::serialize_amount")]
    pub balance: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// A fresh wallet with a zero balance.
    pub fn empty(account_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            balance: BigDecimal::from(0).with_scale(2),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the wallet can cover the given amount.
    pub fn has_sufficient_balance(&self, amount: &BigDecimal) -> bool {
        &self.balance >= amount
    }

    /// Fails with `InsufficientBalance` if the wallet cannot cover `amount`.
    pub fn check_covers(&self, amount: &BigDecimal) -> Result<(), AppError> {
        if self.has_sufficient_balance(amount) {
            Ok(())
        } else {
            Err(AppError::InsufficientBalance {
                balance: format_amount(&self.balance),
                required: format_amount(amount),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn wallet_with(balance: &str) -> Wallet {
        let mut wallet = Wallet::empty(Uuid::new_v4(), Utc::now());
        wallet.balance = BigDecimal::from_str(balance).unwrap();
        wallet
    }

    #[test]
    fn test_empty_wallet_renders_two_decimals() {
        let wallet = Wallet::empty(Uuid::new_v4(), Utc::now());
        let json = serde_json::to_value(&wallet).unwrap();
        assert_eq!(json["balance"], "0.00");
    }

    #[test]
    fn test_drained_wallet_reports_zero_balance() {
        let wallet = wallet_with("0");
        let err = wallet
            .check_covers(&BigDecimal::from_str("1").unwrap())
            .unwrap_err();

        match err {
            AppError::InsufficientBalance { balance, required } => {
                assert_eq!(balance, "0.00");
                assert_eq!(required, "1.00");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_has_sufficient_balance() {
        let wallet = wallet_with("10.00");

        assert!(wallet.has_sufficient_balance(&BigDecimal::from_str("9.99").unwrap()));
        assert!(wallet.has_sufficient_balance(&BigDecimal::from_str("10.00").unwrap()));
        assert!(!wallet.has_sufficient_balance(&BigDecimal::from_str("10.01").unwrap()));
    }

    #[test]
    fn test_check_covers_reports_amounts() {
        let wallet = wallet_with("10.00");
        let err = wallet
            .check_covers(&BigDecimal::from_str("13.50").unwrap())
            .unwrap_err();

        match err {
            AppError::InsufficientBalance { balance, required } => {
                assert_eq!(balance, "10.00");
                assert_eq!(required, "13.50");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
