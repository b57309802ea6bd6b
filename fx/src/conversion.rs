//! Conversion request and result types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use xrate_common::{parse_amount, Currency, RateEntry};

use crate::error::FxResult;

/// Request to convert an amount between two currencies.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub from: Currency,
    pub to: Currency,
    /// Non-negative amount in `from`.
    pub amount: Decimal,
}

impl ConversionRequest {
    /// Create a new conversion request.
    pub fn new(from: Currency, to: Currency, amount: Decimal) -> Self {
        Self { from, to, amount }
    }

    /// Build a request from raw caller input, validating every field.
    pub fn parse(from: &str, to: &str, amount: &str) -> FxResult<Self> {
        Ok(Self {
            from: Currency::parse(from)?,
            to: Currency::parse(to)?,
            amount: parse_amount(amount)?,
        })
    }
}

/// Which path produced the rate of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Same currency on both sides.
    Identity,
    /// Entry based on the source currency.
    Direct,
    /// Entry based on the target currency.
    Inverse,
    /// Entry based on a third currency holding both sides.
    Cross,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Provenance::Identity => "identity",
            Provenance::Direct => "direct",
            Provenance::Inverse => "inverse",
            Provenance::Cross => "cross",
        };
        f.write_str(name)
    }
}

/// A rate picked from one cached or fetched entry.
#[derive(Debug, Clone)]
pub(crate) struct Quote {
    pub rate: Decimal,
    pub provenance: Provenance,
    pub base_used: Currency,
    pub as_of: Option<DateTime<Utc>>,
    pub stale: bool,
}

impl Quote {
    pub fn from_entry(entry: &RateEntry, rate: Decimal, provenance: Provenance, now: DateTime<Utc>) -> Self {
        Self {
            rate,
            provenance,
            base_used: entry.base.clone(),
            as_of: entry.as_of.or(Some(entry.fetched_at)),
            stale: entry.is_stale(now),
        }
    }
}

/// Outcome of a conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub from: Currency,
    pub to: Currency,
    /// Amount the caller asked to convert.
    pub requested: Decimal,
    /// Converted amount, rounded to the target's minor unit.
    pub amount: Decimal,
    /// Unrounded units of `to` per unit of `from`.
    pub rate_used: Decimal,
    /// True when served from an expired entry because the source was down.
    pub stale: bool,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_used: Option<Currency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
}

impl ConversionResult {
    /// Result for a same-currency request. The amount is returned untouched.
    pub fn identity(currency: Currency, amount: Decimal) -> Self {
        Self {
            from: currency.clone(),
            to: currency,
            requested: amount,
            amount,
            rate_used: Decimal::ONE,
            stale: false,
            provenance: Provenance::Identity,
            base_used: None,
            as_of: None,
        }
    }

    pub(crate) fn from_quote(from: Currency, to: Currency, requested: Decimal, amount: Decimal, quote: Quote) -> Self {
        Self {
            from,
            to,
            requested,
            amount,
            rate_used: quote.rate,
            stale: quote.stale,
            provenance: quote.provenance,
            base_used: Some(quote.base_used),
            as_of: quote.as_of,
        }
    }
}
