//! Fixed-precision monetary values.
//!
//! Amounts are decimals with four fractional digits, always paired with an
//! ISO-4217 currency. Binary operations across currencies are rejected.
//! Floating-point never enters arithmetic.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of fractional digits carried in persistence and on the wire.
pub const SCALE: u32 = 4;

/// Active ISO-4217 codes accepted by the service.
const ACTIVE_CURRENCIES: &[&str] = &[
    "AUD", "BRL", "CAD", "CHF", "CNY", "CZK", "DKK", "EUR", "GBP", "HKD", "HUF", "IDR", "ILS",
    "INR", "JPY", "KRW", "MXN", "MYR", "NOK", "NZD", "PHP", "PLN", "SEK", "SGD", "THB", "TRY",
    "USD", "ZAR",
];

/// Result type for money operations.
pub type Result<T> = std::result::Result<T, MoneyError>;

/// Errors raised by monetary construction and arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Amount overflow")]
    Overflow,
}

/// Validated uppercase three-letter ISO-4217 currency code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    /// Parse and validate a currency code against the active allow-list.
    pub fn parse(code: &str) -> Result<Self> {
        let upper = code.to_ascii_uppercase();
        if upper.len() != 3 || !upper.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(MoneyError::UnsupportedCurrency(code.to_string()));
        }
        if !ACTIVE_CURRENCIES.contains(&upper.as_str()) {
            return Err(MoneyError::UnsupportedCurrency(code.to_string()));
        }
        let bytes = upper.as_bytes();
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        // Construction guarantees ASCII uppercase.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.as_str().to_string()
    }
}

/// A decimal amount bound to a currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Construct from an already-validated decimal.
    ///
    /// The amount is rounded half-up to four fractional digits, the scale
    /// used for persistence.
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: amount.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero),
            currency,
        }
    }

    /// Parse a decimal string such as `"100.00"`.
    ///
    /// Rejects values with more than four fractional digits rather than
    /// silently rounding client input.
    pub fn from_decimal_str(s: &str, currency: Currency) -> Result<Self> {
        let amount =
            Decimal::from_str(s).map_err(|e| MoneyError::InvalidAmount(format!("{s}: {e}")))?;
        Self::try_from_decimal(amount, currency)
    }

    /// Validate an already-parsed decimal as client input.
    pub fn try_from_decimal(amount: Decimal, currency: Currency) -> Result<Self> {
        if amount.scale() > SCALE {
            return Err(MoneyError::InvalidAmount(format!(
                "{amount}: more than {SCALE} fractional digits"
            )));
        }
        Ok(Self { amount, currency })
    }

    /// Construct from integer minor units (e.g. cents for two-digit currencies).
    pub fn from_minor_units(units: i64, currency: Currency) -> Self {
        Self {
            amount: Decimal::new(units, 2),
            currency,
        }
    }

    /// Zero in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    fn require_same_currency(&self, other: &Money) -> Result<()> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money> {
        self.require_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, self.currency))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money> {
        self.require_same_currency(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// Multiply by a decimal scalar (fee rates, proportional splits).
    pub fn mul_scalar(&self, scalar: Decimal) -> Result<Money> {
        let amount = self
            .amount
            .checked_mul(scalar)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, self.currency))
    }

    /// Ordered comparison; fails on currency mismatch instead of lying.
    pub fn cmp_same_currency(&self, other: &Money) -> Result<Ordering> {
        self.require_same_currency(other)?;
        Ok(self.amount.cmp(&other.amount))
    }

    /// Render for persistence and response bodies: exactly four fractional
    /// digits, half-up.
    pub fn format_amount(&self) -> String {
        format_decimal(self.amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.format_amount(), self.currency)
    }
}

/// Format a bare decimal with the service-wide four-digit scale.
pub fn format_decimal(amount: Decimal) -> String {
    let mut d = amount.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
    d.rescale(SCALE);
    d.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd() -> Currency {
        Currency::parse("USD").unwrap()
    }

    #[test]
    fn test_parse_currency_case_insensitive() {
        assert_eq!(Currency::parse("usd").unwrap().as_str(), "USD");
        assert_eq!(Currency::parse("EUR").unwrap().as_str(), "EUR");
    }

    #[test]
    fn test_parse_currency_rejects_unknown() {
        assert!(matches!(
            Currency::parse("XXX"),
            Err(MoneyError::UnsupportedCurrency(_))
        ));
        assert!(Currency::parse("US").is_err());
        assert!(Currency::parse("USDT").is_err());
    }

    #[test]
    fn test_from_decimal_str() {
        let m = Money::from_decimal_str("100.00", usd()).unwrap();
        assert_eq!(m.format_amount(), "100.0000");
    }

    #[test]
    fn test_rejects_excess_precision() {
        assert!(Money::from_decimal_str("1.00001", usd()).is_err());
        assert!(Money::from_decimal_str("1.0001", usd()).is_ok());
    }

    #[test]
    fn test_currency_mismatch() {
        let a = Money::from_decimal_str("10", usd()).unwrap();
        let b = Money::from_decimal_str("10", Currency::parse("EUR").unwrap()).unwrap();
        assert!(matches!(
            a.checked_add(&b),
            Err(MoneyError::CurrencyMismatch { .. })
        ));
        assert!(a.cmp_same_currency(&b).is_err());
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_decimal_str("100.00", usd()).unwrap();
        let b = Money::from_decimal_str("30.00", usd()).unwrap();
        let diff = a.checked_sub(&b).unwrap();
        assert_eq!(diff.format_amount(), "70.0000");
        let sum = diff.checked_add(&b).unwrap();
        assert_eq!(sum.cmp_same_currency(&a).unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_minor_units() {
        let m = Money::from_minor_units(10099, usd());
        assert_eq!(m.format_amount(), "100.9900");
    }

    #[test]
    fn test_rounding_half_up_on_store() {
        let m = Money::new(Decimal::from_str("1.00005").unwrap(), usd());
        assert_eq!(m.format_amount(), "1.0001");
    }

    #[test]
    fn test_format_pads_scale() {
        let m = Money::from_decimal_str("5", usd()).unwrap();
        assert_eq!(m.format_amount(), "5.0000");
    }
}
