use crate::error::FulfillmentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A strictly positive monetary amount.
///
/// Used wherever money enters a ledger: remittance requests and payment
/// account registrations. Totals are plain `Decimal`s that may be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, FulfillmentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(FulfillmentError::validation("Amount must be positive"))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = FulfillmentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// Rejects negative values for a named money field.
pub fn ensure_non_negative(field: &str, value: Decimal) -> Result<Decimal, FulfillmentError> {
    if value < Decimal::ZERO {
        Err(FulfillmentError::validation(format!(
            "{} must not be negative",
            field
        )))
    } else {
        Ok(value)
    }
}

/// Validates an ISO-4217-shaped code: three ASCII uppercase letters.
pub fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}
