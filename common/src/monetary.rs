//! Currency codes and amount handling.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// ISO 4217 currency code.
///
/// Codes are always stored uppercase. `Currency::new` trusts its input;
/// use [`Currency::parse`] for anything that comes from a caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Parse and validate a caller-supplied code.
    ///
    /// Accepts exactly three ASCII letters after trimming, in any case.
    pub fn parse(code: &str) -> Result<Self, ValidationError> {
        let trimmed = code.trim();
        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::InvalidCurrency(format!(
                "'{}' is not a three-letter currency code",
                code
            )));
        }
        Ok(Self::new(trimmed))
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Get the standard decimal places for this currency.
    pub fn decimal_places(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "VND" => 0,
            "BHD" | "KWD" | "OMR" => 3,
            _ => 2,
        }
    }

    /// Round a value to this currency's minor unit, half away from zero.
    ///
    /// The result always carries exactly the minor-unit scale, so `9` in
    /// USD comes back as `9.00`.
    pub fn round(&self, value: Decimal) -> Decimal {
        let places = self.decimal_places();
        let mut rounded = value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(places);
        rounded
    }

    /// Common currencies
    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn gbp() -> Self {
        Self::new("GBP")
    }

    pub fn jpy() -> Self {
        Self::new("JPY")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Currency {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// Parse a caller-supplied amount.
///
/// Plain and scientific notation are accepted. `NaN`, infinities, empty
/// input and negative values are rejected.
pub fn parse_amount(raw: &str) -> Result<Decimal, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidAmount("amount is empty".to_string()));
    }

    let value = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| {
            ValidationError::InvalidAmount(format!("'{}' is not a finite number", raw))
        })?;

    validate_amount(value)
}

/// Reject negative amounts.
pub fn validate_amount(value: Decimal) -> Result<Decimal, ValidationError> {
    if value.is_zero() {
        // Folds "-0" into plain zero.
        return Ok(Decimal::ZERO);
    }
    if value.is_sign_negative() {
        return Err(ValidationError::InvalidAmount(format!(
            "amount must be non-negative, got {}",
            value
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_normalizes_case() {
        assert_eq!(Currency::new("eur"), Currency::eur());
        assert_eq!(Currency::parse(" gbp ").unwrap(), Currency::gbp());
    }

    #[test]
    fn test_currency_parse_rejects_bad_codes() {
        for code in ["", "US", "USDX", "U$D", "12A"] {
            assert!(
                matches!(Currency::parse(code), Err(ValidationError::InvalidCurrency(_))),
                "{code:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_currency_decimal_places() {
        assert_eq!(Currency::usd().decimal_places(), 2);
        assert_eq!(Currency::jpy().decimal_places(), 0);
        assert_eq!(Currency::new("KWD").decimal_places(), 3);
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(Currency::usd().round(dec!(1.005)), dec!(1.01));
        assert_eq!(Currency::usd().round(dec!(88.888888)), dec!(88.89));
        assert_eq!(Currency::jpy().round(dec!(1234.5)), dec!(1235));
        assert_eq!(Currency::usd().round(dec!(9)).to_string(), "9.00");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("100").unwrap(), dec!(100));
        assert_eq!(parse_amount(" 12.50 ").unwrap(), dec!(12.50));
        assert_eq!(parse_amount("1e3").unwrap(), dec!(1000));
        assert_eq!(parse_amount("-0").unwrap(), dec!(0));
    }

    #[test]
    fn test_parse_amount_rejects_invalid() {
        for raw in ["", "abc", "NaN", "inf", "-inf", "-5", "-0.01"] {
            assert!(
                matches!(parse_amount(raw), Err(ValidationError::InvalidAmount(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_currency_serde_roundtrip_uppercases() {
        let parsed: Currency = serde_json::from_str("\"chf\"").unwrap();
        assert_eq!(parsed.code(), "CHF");
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"CHF\"");
    }
}
