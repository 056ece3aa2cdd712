//! Parsing and validation of currency amounts.

use bigdecimal::{BigDecimal, Signed, Zero};
use serde::{Deserialize, Serializer};
use std::str::FromStr;

use crate::error::AppError;

/// Number of fractional digits every stored amount carries.
pub const CURRENCY_SCALE: i64 = 2;

/// Integer digits that fit in a `NUMERIC(12,2)` column.
pub const MAX_INTEGER_DIGITS: i64 = 10;

/// An amount as it arrives in a JSON body: either `"5.00"` or `5.0`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    fn as_text(&self) -> String {
        match self {
            AmountInput::Text(text) => text.trim().to_string(),
            AmountInput::Number(number) => number.to_string(),
        }
    }

    /// Parses the input into a positive two-decimal amount.
    pub fn to_amount(&self) -> Result<BigDecimal, AppError> {
        parse_amount(&self.as_text())
    }
}

/// Parses a positive amount with at most two fractional digits.
///
/// The result is normalized to exactly two fractional digits.
pub fn parse_amount(text: &str) -> Result<BigDecimal, AppError> {
    let amount = BigDecimal::from_str(text)
        .map_err(|_| AppError::InvalidInput(format!("Invalid amount: '{}'", text)))?;
    normalize_amount(amount)
}

/// Validates an already-numeric amount and fixes its scale to two digits.
///
/// Magnitude and precision are checked on the digit count and exponent
/// before any rescaling, so `1e999999999` is rejected without expanding it.
pub fn normalize_amount(amount: BigDecimal) -> Result<BigDecimal, AppError> {
    if amount <= BigDecimal::zero() {
        return Err(AppError::InvalidInput(
            "Amount must be positive".to_string(),
        ));
    }

    let integer_digits = (amount.digits() as i64).saturating_sub(amount.fractional_digit_count());
    if integer_digits > MAX_INTEGER_DIGITS {
        return Err(AppError::InvalidInput(format!(
            "Amount exceeds {} integer digits",
            MAX_INTEGER_DIGITS
        )));
    }

    let trimmed = amount.normalized();
    if trimmed.fractional_digit_count() > CURRENCY_SCALE {
        return Err(AppError::InvalidInput(format!(
            "Amount has more than {} decimal places",
            CURRENCY_SCALE
        )));
    }

    Ok(trimmed.with_scale(CURRENCY_SCALE))
}

/// Renders an amount with exactly two fractional digits, zero included.
pub fn format_amount(amount: &BigDecimal) -> String {
    let (cents, _) = amount.with_scale(CURRENCY_SCALE).into_bigint_and_exponent();
    let sign = if cents.is_negative() { "-" } else { "" };
    let mut digits = cents.magnitude().to_string();
    while digits.len() < 3 {
        digits.insert(0, '0');
    }
    let (whole, fraction) = digits.split_at(digits.len() - 2);
    format!("{}{}.{}", sign, whole, fraction)
}

/// `serialize_with` helper writing an amount as a fixed two-decimal string.
pub fn serialize_amount<S>(amount: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_amount(amount))
}
