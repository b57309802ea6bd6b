//! Cached rate entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::monetary::Currency;

/// Source name for entries written by hand rather than fetched.
pub const MANUAL_SOURCE: &str = "manual";

/// A set of rates quoted against one base currency.
///
/// `rates[c]` is the number of units of `c` per one unit of `base`. The
/// base itself is never stored in `rates`; its rate is implicitly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateEntry {
    /// Currency all rates are quoted against.
    pub base: Currency,
    /// Units of each currency per one unit of base.
    pub rates: BTreeMap<Currency, Decimal>,
    /// When the entry was obtained.
    pub fetched_at: DateTime<Utc>,
    /// Lifetime in whole seconds before the entry turns stale.
    pub ttl_seconds: i64,
    /// Name of the source that produced the entry.
    pub source: String,
    /// Publication time reported by the source, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
}

impl RateEntry {
    /// Create an empty entry fetched now.
    pub fn new(base: Currency, ttl: Duration, source: impl Into<String>) -> Self {
        Self {
            base,
            rates: BTreeMap::new(),
            fetched_at: Utc::now(),
            ttl_seconds: ttl.num_seconds(),
            source: source.into(),
            as_of: None,
        }
    }

    /// Add a rate. A rate for the base currency itself is ignored.
    pub fn with_rate(mut self, currency: Currency, rate: Decimal) -> Self {
        self.set_rate(currency, rate);
        self
    }

    /// Override the fetch time.
    pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = fetched_at;
        self
    }

    /// Set the source publication time.
    pub fn with_as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = Some(as_of);
        self
    }

    /// Insert or replace a rate.
    pub fn set_rate(&mut self, currency: Currency, rate: Decimal) {
        if currency != self.base {
            self.rates.insert(currency, rate);
        }
    }

    /// Lifetime as a duration, `None` when `ttl_seconds` is out of range.
    pub fn ttl(&self) -> Option<Duration> {
        Duration::try_seconds(self.ttl_seconds)
    }

    /// Instant from which the entry is stale.
    ///
    /// `None` when the TTL reaches past the representable time range.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at.checked_add_signed(self.ttl()?)
    }

    /// An entry is stale once its age reaches its TTL.
    ///
    /// A TTL too large to add to `fetched_at` never expires; a negative one
    /// out of range is already expired.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires_at) => now >= expires_at,
            None => self.ttl_seconds < 0,
        }
    }

    /// Units of `currency` per one unit of base, if known.
    pub fn rate_for(&self, currency: &Currency) -> Option<Decimal> {
        if *currency == self.base {
            return Some(Decimal::ONE);
        }
        self.rates.get(currency).copied()
    }

    /// Units of `to` per one unit of `from`, derived through this entry's base.
    ///
    /// Returns `None` when either side is missing or the `from` rate is zero.
    pub fn quote(&self, from: &Currency, to: &Currency) -> Option<Decimal> {
        let from_rate = self.rate_for(from)?;
        let to_rate = self.rate_for(to)?;
        if from_rate.is_zero() {
            return None;
        }
        to_rate.checked_div(from_rate)
    }
}
