//! Rate resolver: cached lookups, cross-rate derivation and refresh on miss.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};
use xrate_common::{constants, validate_amount, Currency, RateEntry, MANUAL_SOURCE};

use crate::cache::CacheStore;
use crate::conversion::{ConversionRequest, ConversionResult, Provenance, Quote};
use crate::error::{FxError, FxResult};
use crate::provider::RateSource;

/// Configuration for the rate resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// TTL for entries created by manual seeding.
    pub default_ttl: Duration,
    /// Upper bound on a rate source fetch.
    pub fetch_timeout: StdDuration,
    /// Upper bound on each cache store call.
    pub store_timeout: StdDuration,
    /// Pivot tried first during cross-rate derivation.
    pub canonical_base: Currency,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_ttl: constants::default_rate_ttl(),
            fetch_timeout: constants::fetch_timeout(),
            store_timeout: constants::store_timeout(),
            canonical_base: Currency::usd(),
        }
    }
}

impl ResolverConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_ttl <= Duration::zero() {
            return Err("Default TTL must be positive".to_string());
        }

        if self.default_ttl > constants::max_rate_ttl() {
            return Err(format!(
                "Default TTL must not exceed {} days",
                constants::max_rate_ttl().num_days()
            ));
        }

        if self.fetch_timeout.is_zero() {
            return Err("Fetch timeout must be positive".to_string());
        }

        if self.store_timeout.is_zero() {
            return Err("Store timeout must be positive".to_string());
        }

        Currency::parse(self.canonical_base.code()).map_err(|e| e.to_string())?;

        Ok(())
    }
}

/// Which cached entries a lookup may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Freshness {
    FreshOnly,
    AnyAge,
}

impl Freshness {
    fn admits(self, entry: &RateEntry, now: DateTime<Utc>) -> bool {
        self == Freshness::AnyAge || !entry.is_stale(now)
    }
}

/// Converts amounts using cached rates, refreshing from the source on miss.
///
/// The resolver keeps no state between calls; everything shared lives in
/// the cache store.
pub struct RateResolver {
    source: Arc<dyn RateSource>,
    store: Arc<dyn CacheStore>,
    config: ResolverConfig,
}

impl RateResolver {
    /// Create a new resolver over the given source and store.
    pub fn new(source: Arc<dyn RateSource>, store: Arc<dyn CacheStore>, config: ResolverConfig) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Convert an amount.
    ///
    /// Lookup order is direct, inverse, then cross through any cached pivot.
    /// On a miss the source is fetched once for `from`. When the fetch fails
    /// an expired entry may still answer, flagged as stale.
    #[instrument(skip(self, request), fields(
        from = %request.from,
        to = %request.to,
        amount = %request.amount
    ))]
    pub async fn convert(&self, request: ConversionRequest) -> FxResult<ConversionResult> {
        let amount = validate_amount(request.amount)?;
        let from = Currency::parse(request.from.code())?;
        let to = Currency::parse(request.to.code())?;

        if from == to {
            return Ok(ConversionResult::identity(from, amount));
        }

        let now = Utc::now();
        let cached = self.find_quote(&from, &to, now, Freshness::FreshOnly, None).await;
        if let Some(quote) = cached {
            return self.finish(from, to, amount, quote);
        }

        debug!("No fresh cached rate, consulting source");
        let fetched = self.fetch(&from).await;
        match fetched {
            Ok(fetched) => {
                self.store_put_lenient(fetched.clone()).await;

                let retried = self
                    .find_quote(&from, &to, Utc::now(), Freshness::FreshOnly, Some(&fetched))
                    .await;
                match retried {
                    Some(quote) => self.finish(from, to, amount, quote),
                    None => Err(FxError::InvalidCurrency(format!(
                        "{} is not quoted against {} by {}",
                        to,
                        from,
                        self.source.name()
                    ))),
                }
            }
            Err(FxError::UnknownCurrency(currency)) => Err(FxError::InvalidCurrency(format!(
                "{} is not recognized by {}",
                currency,
                self.source.name()
            ))),
            Err(e) => {
                warn!(error = %e, "Rate source failed, falling back to stale cache");

                let fallback = self.find_quote(&from, &to, now, Freshness::AnyAge, None).await;
                match fallback {
                    Some(quote) => {
                        warn!(base_used = %quote.base_used, "Serving stale rate");
                        self.finish(from, to, amount, quote)
                    }
                    None => Err(FxError::RateUnavailable { from, to }),
                }
            }
        }
    }

    /// Parse raw caller input and convert.
    pub async fn convert_input(&self, from: &str, to: &str, amount: &str) -> FxResult<ConversionResult> {
        let request = ConversionRequest::parse(from, to, amount)?;
        self.convert(request).await
    }

    /// Every cached entry, sorted by base, stale ones included.
    pub async fn cached_rates(&self) -> FxResult<Vec<RateEntry>> {
        let mut entries = self.with_store_timeout("list", self.store.list()).await?;
        entries.sort_by(|a, b| a.base.cmp(&b.base));
        Ok(entries)
    }

    /// Record a single rate by hand, creating the base entry if needed.
    #[instrument(skip(self))]
    pub async fn set_rate(&self, base: &Currency, currency: &Currency, rate: Decimal) -> FxResult<RateEntry> {
        if rate <= Decimal::ZERO {
            return Err(FxError::InvalidRate(rate));
        }

        let base = Currency::parse(base.code())?;
        let currency = Currency::parse(currency.code())?;
        if base == currency {
            return Err(FxError::InvalidCurrency(format!(
                "cannot set a rate of {} against itself",
                base
            )));
        }

        let existing = self.with_store_timeout("get", self.store.get(&base)).await?;
        let mut entry = existing
            .unwrap_or_else(|| RateEntry::new(base.clone(), self.config.default_ttl, MANUAL_SOURCE));

        let now = Utc::now();
        entry.set_rate(currency.clone(), rate);
        entry.fetched_at = now;
        entry.as_of = Some(now);
        entry.source = MANUAL_SOURCE.to_string();

        self.with_store_timeout("put", self.store.put(entry.clone())).await?;

        info!(base = %base, currency = %currency, rate = %rate, "Rate recorded");
        Ok(entry)
    }

    /// Try direct, inverse, then cross lookups against cached entries.
    ///
    /// `fetched`, when given, stands in for the cached entry of `from` so a
    /// refresh is visible even if writing it back failed.
    async fn find_quote(
        &self,
        from: &Currency,
        to: &Currency,
        now: DateTime<Utc>,
        freshness: Freshness,
        fetched: Option<&RateEntry>,
    ) -> Option<Quote> {
        let from_entry = match fetched {
            Some(entry) => Some(entry.clone()),
            None => self.store_get_lenient(from).await,
        };
        if let Some(entry) = from_entry.filter(|e| freshness.admits(e, now)) {
            if let Some(rate) = entry.quote(from, to) {
                debug!(base = %entry.base, "Direct rate");
                return Some(Quote::from_entry(&entry, rate, Provenance::Direct, now));
            }
        }

        if let Some(entry) = self
            .store_get_lenient(to)
            .await
            .filter(|e| freshness.admits(e, now))
        {
            if let Some(rate) = entry.quote(from, to) {
                debug!(base = %entry.base, "Inverse rate");
                return Some(Quote::from_entry(&entry, rate, Provenance::Inverse, now));
            }
        }

        let mut pivots: Vec<RateEntry> = self
            .store_list_lenient()
            .await
            .into_iter()
            .filter(|e| e.base != *from && e.base != *to && freshness.admits(e, now))
            .collect();
        let canonical = &self.config.canonical_base;
        pivots.sort_by(|a, b| {
            (a.base != *canonical)
                .cmp(&(b.base != *canonical))
                .then_with(|| a.base.cmp(&b.base))
        });

        pivots.iter().find_map(|entry| {
            entry.quote(from, to).map(|rate| {
                debug!(pivot = %entry.base, "Cross rate");
                Quote::from_entry(entry, rate, Provenance::Cross, now)
            })
        })
    }

    fn finish(&self, from: Currency, to: Currency, amount: Decimal, quote: Quote) -> FxResult<ConversionResult> {
        let converted = amount.checked_mul(quote.rate).ok_or_else(|| {
            FxError::InvalidAmount(format!("{} {} is too large to convert", amount, from))
        })?;
        let rounded = to.round(converted);

        info!(
            provenance = %quote.provenance,
            base_used = %quote.base_used,
            rate = %quote.rate,
            result = %rounded,
            stale = quote.stale,
            "Conversion completed"
        );

        Ok(ConversionResult::from_quote(from, to, amount, rounded, quote))
    }

    async fn fetch(&self, base: &Currency) -> FxResult<RateEntry> {
        let entry = tokio::time::timeout(self.config.fetch_timeout, self.source.fetch_rates(base))
            .await
            .map_err(|_| {
                FxError::SourceUnavailable(format!(
                    "{} did not answer within {:?}",
                    self.source.name(),
                    self.config.fetch_timeout
                ))
            })??;

        info!(
            base = %entry.base,
            source = self.source.name(),
            rates = entry.rates.len(),
            "Refreshed rates"
        );
        Ok(entry)
    }

    async fn with_store_timeout<T>(
        &self,
        operation: &str,
        call: impl Future<Output = FxResult<T>>,
    ) -> FxResult<T> {
        tokio::time::timeout(self.config.store_timeout, call)
            .await
            .map_err(|_| {
                FxError::Store(format!(
                    "{} timed out after {:?}",
                    operation, self.config.store_timeout
                ))
            })?
    }

    // A failed read is a miss: the source stays the authority.
    async fn store_get_lenient(&self, base: &Currency) -> Option<RateEntry> {
        match self.with_store_timeout("get", self.store.get(base)).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(base = %base, error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn store_list_lenient(&self) -> Vec<RateEntry> {
        match self.with_store_timeout("list", self.store.list()).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Cache listing failed");
                Vec::new()
            }
        }
    }

    async fn store_put_lenient(&self, entry: RateEntry) {
        let base = entry.base.clone();
        if let Err(e) = self.with_store_timeout("put", self.store.put(entry)).await {
            warn!(base = %base, error = %e, "Cache write failed");
        }
    }
}

/// Shared resolver.
pub type SharedRateResolver = Arc<RateResolver>;
