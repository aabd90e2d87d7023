//! Monetary amounts held as integer minor units.
//!
//! Both supported gateways take amounts in the smallest currency unit
//! (paise for INR), so the ledger stores exactly that and never floats.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// Number of minor units per major unit for the supported currencies.
const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// ISO 4217 currency code, normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parses a three-letter currency code.
    pub fn new(code: impl AsRef<str>) -> Result<Self, ValidationError> {
        let code = code.as_ref().trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid_format(
                "currency",
                format!("'{}' is not a three-letter ISO code", code),
            ));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Indian rupee, the marketplace default.
    pub fn inr() -> Self {
        Self("INR".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case form expected by Stripe.
    pub fn to_lowercase(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An amount of money in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub minor_units: i64,
    pub currency: Currency,
}

impl Money {
    /// Creates an amount from minor units, rejecting negatives.
    pub fn from_minor(minor_units: i64, currency: Currency) -> Result<Self, ValidationError> {
        if minor_units < 0 {
            return Err(ValidationError::out_of_range("amount", 0, i64::MAX, minor_units));
        }
        Ok(Self {
            minor_units,
            currency,
        })
    }

    /// Creates an amount from a whole major-unit price (e.g. rupees).
    pub fn from_major(major_units: i64, currency: Currency) -> Result<Self, ValidationError> {
        let minor = major_units.checked_mul(MINOR_UNITS_PER_MAJOR).ok_or_else(|| {
            ValidationError::out_of_range(
                "amount",
                0,
                i64::MAX / MINOR_UNITS_PER_MAJOR,
                major_units,
            )
        })?;
        Self::from_minor(minor, currency)
    }

    /// Returns a copy with a different minor amount in the same currency.
    pub fn with_minor(&self, minor_units: i64) -> Result<Self, ValidationError> {
        Self::from_minor(minor_units, self.currency.clone())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02} {}",
            self.minor_units / MINOR_UNITS_PER_MAJOR,
            self.minor_units % MINOR_UNITS_PER_MAJOR,
            self.currency
        )
    }
}
