//! Rate source trait and implementations.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};
use xrate_common::{constants, from_unix_seconds, Currency, RateEntry};

use crate::error::{FxError, FxResult};

/// An authority that can quote every rate against a base currency.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Fetch a fresh entry for `base`.
    ///
    /// Fails with [`FxError::UnknownCurrency`] when the source does not
    /// know `base` and [`FxError::SourceUnavailable`] for anything else.
    async fn fetch_rates(&self, base: &Currency) -> FxResult<RateEntry>;
}

/// Configuration for [`HttpRateSource`].
#[derive(Debug, Clone)]
pub struct HttpRateSourceConfig {
    /// Endpoint root, e.g. `https://api.exchangerate-api.com/v4`.
    pub base_url: String,
    /// Sent as the `access_key` query parameter when present.
    pub api_key: Option<String>,
    /// Client-side request timeout.
    pub timeout: StdDuration,
    /// TTL stamped on fetched entries.
    pub ttl: Duration,
}

impl Default for HttpRateSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.exchangerate-api.com/v4".to_string(),
            api_key: None,
            timeout: constants::fetch_timeout(),
            ttl: constants::default_rate_ttl(),
        }
    }
}

/// Body of a `latest/{BASE}` response.
#[derive(Debug, Deserialize)]
struct LatestResponse {
    base: Option<String>,
    #[serde(default)]
    rates: HashMap<String, Decimal>,
    time_last_updated: Option<i64>,
    result: Option<String>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
}

/// Rate source backed by an exchangerate-api style HTTP endpoint.
pub struct HttpRateSource {
    client: reqwest::Client,
    config: HttpRateSourceConfig,
}

impl HttpRateSource {
    /// Create a new HTTP source.
    pub fn new(config: HttpRateSourceConfig) -> FxResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FxError::SourceUnavailable(format!("failed to build client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn latest_url(&self, base: &Currency) -> String {
        format!(
            "{}/latest/{}",
            self.config.base_url.trim_end_matches('/'),
            base.code()
        )
    }

    /// Turn a response body into an entry for `base`.
    fn parse_latest(&self, base: &Currency, body: &str) -> FxResult<RateEntry> {
        let response: LatestResponse = serde_json::from_str(body)
            .map_err(|e| FxError::SourceUnavailable(format!("undecodable response: {}", e)))?;

        if response.result.as_deref() == Some("error") {
            return Err(match response.error_type.as_deref() {
                Some("unsupported-code") | Some("malformed-request") => {
                    FxError::UnknownCurrency(base.clone())
                }
                other => FxError::SourceUnavailable(format!(
                    "source reported error: {}",
                    other.unwrap_or("unspecified")
                )),
            });
        }

        if let Some(reported) = response.base.as_deref() {
            if Currency::new(reported) != *base {
                return Err(FxError::SourceUnavailable(format!(
                    "asked for {} but source answered for {}",
                    base, reported
                )));
            }
        }

        if response.rates.is_empty() {
            return Err(FxError::SourceUnavailable(format!(
                "source returned no rates for {}",
                base
            )));
        }

        let mut entry = RateEntry::new(base.clone(), self.config.ttl, self.name());
        for (code, rate) in response.rates {
            entry.set_rate(Currency::new(code), rate);
        }
        if let Some(as_of) = response.time_last_updated.and_then(from_unix_seconds) {
            entry = entry.with_as_of(as_of);
        }

        Ok(entry)
    }
}

/// Map a non-success status to the error taxonomy.
fn classify_status(status: StatusCode, base: &Currency) -> FxError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => FxError::UnknownCurrency(base.clone()),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            FxError::SourceUnavailable(format!("request limit exceeded ({})", status))
        }
        _ => FxError::SourceUnavailable(format!("unexpected status {}", status)),
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    fn name(&self) -> &str {
        "exchangerate-api"
    }

    async fn fetch_rates(&self, base: &Currency) -> FxResult<RateEntry> {
        let mut request = self.client.get(self.latest_url(base));
        if let Some(key) = &self.config.api_key {
            request = request.query(&[("access_key", key)]);
        }

        let response = request.send().await.map_err(|e| {
            warn!(base = %base, error = %e, "Rate source request failed");
            FxError::SourceUnavailable(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FxError::SourceUnavailable(e.to_string()))?;

        if !status.is_success() {
            // An error body can name an unknown code more precisely than the status.
            if let Err(FxError::UnknownCurrency(c)) = self.parse_latest(base, &body) {
                return Err(FxError::UnknownCurrency(c));
            }
            return Err(classify_status(status, base));
        }

        let entry = self.parse_latest(base, &body)?;
        debug!(base = %base, rates = entry.rates.len(), "Fetched rates from source");
        Ok(entry)
    }
}

/// How a [`MockRateSource`] answers.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMode {
    /// Serve configured rates.
    Serving,
    /// Fail every fetch with `SourceUnavailable`.
    Unavailable,
    /// Serve configured rates after sleeping.
    Delayed(StdDuration),
}

/// Mock rate source for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateSource {
    name: String,
    rates: dashmap::DashMap<Currency, Vec<(Currency, Decimal)>>,
    ttl: Duration,
    mode: parking_lot::Mutex<MockMode>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateSource {
    /// Create a new mock source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: dashmap::DashMap::new(),
            ttl: constants::default_rate_ttl(),
            mode: parking_lot::Mutex::new(MockMode::Serving),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Set every rate served for `base`.
    pub fn set_rates(&self, base: Currency, rates: &[(Currency, Decimal)]) {
        self.rates.insert(base, rates.to_vec());
    }

    pub fn set_mode(&self, mode: MockMode) {
        *self.mode.lock() = mode;
    }

    /// Number of fetches attempted so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for MockRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rates(&self, base: &Currency) -> FxResult<RateEntry> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let mode = *self.mode.lock();
        match mode {
            MockMode::Unavailable => {
                return Err(FxError::SourceUnavailable(format!("{} is down", self.name)));
            }
            MockMode::Delayed(delay) => tokio::time::sleep(delay).await,
            MockMode::Serving => {}
        }

        let rates = self
            .rates
            .get(base)
            .map(|r| r.clone())
            .ok_or_else(|| FxError::UnknownCurrency(base.clone()))?;

        Ok(rates
            .into_iter()
            .fold(RateEntry::new(base.clone(), self.ttl, self.name.clone()), |entry, (c, r)| {
                entry.with_rate(c, r)
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn http_source() -> HttpRateSource {
        HttpRateSource::new(HttpRateSourceConfig::default()).unwrap()
    }

    #[test]
    fn test_latest_url() {
        let source = HttpRateSource::new(HttpRateSourceConfig {
            base_url: "https://rates.example.com/v4/".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            source.latest_url(&Currency::usd()),
            "https://rates.example.com/v4/latest/USD"
        );
    }

    #[test]
    fn test_parse_latest() {
        let body = r#"{
            "base": "USD",
            "date": "2023-09-04",
            "time_last_updated": 1693838400,
            "rates": {"USD": 1, "EUR": 0.9204, "GBP": 0.7921, "JPY": 146.5}
        }"#;

        let entry = http_source().parse_latest(&Currency::usd(), body).unwrap();

        assert_eq!(entry.base, Currency::usd());
        assert_eq!(entry.rates.len(), 3);
        assert_eq!(entry.rate_for(&Currency::eur()), Some(dec!(0.9204)));
        assert_eq!(entry.rate_for(&Currency::jpy()), Some(dec!(146.5)));
        assert_eq!(entry.source, "exchangerate-api");
        assert!(entry.as_of.is_some());
    }

    #[test]
    fn test_parse_unsupported_code() {
        let body = r#"{"result": "error", "error-type": "unsupported-code"}"#;
        let result = http_source().parse_latest(&Currency::new("XYZ"), body);

        assert!(matches!(result, Err(FxError::UnknownCurrency(c)) if c.code() == "XYZ"));
    }

    #[test]
    fn test_parse_base_mismatch() {
        let body = r#"{"base": "EUR", "rates": {"USD": 1.08}}"#;
        let result = http_source().parse_latest(&Currency::usd(), body);

        assert!(matches!(result, Err(FxError::SourceUnavailable(_))));
    }

    #[test]
    fn test_parse_garbage() {
        let result = http_source().parse_latest(&Currency::usd(), "<html>busy</html>");
        assert!(matches!(result, Err(FxError::SourceUnavailable(_))));
    }

    #[test]
    fn test_classify_status() {
        let usd = Currency::usd();
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, &usd),
            FxError::UnknownCurrency(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, &usd),
            FxError::SourceUnavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, &usd),
            FxError::SourceUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_source() {
        let source = HttpRateSource::new(HttpRateSourceConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: StdDuration::from_secs(2),
            ..Default::default()
        })
        .unwrap();

        let result = source.fetch_rates(&Currency::usd()).await;
        assert!(matches!(result, Err(FxError::SourceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_mock_source() {
        let source = MockRateSource::new("test");
        source.set_rates(Currency::usd(), &[(Currency::eur(), dec!(0.9))]);

        let entry = source.fetch_rates(&Currency::usd()).await.unwrap();
        assert_eq!(entry.rate_for(&Currency::eur()), Some(dec!(0.9)));

        let unknown = source.fetch_rates(&Currency::new("XYZ")).await;
        assert!(matches!(unknown, Err(FxError::UnknownCurrency(_))));

        source.set_mode(MockMode::Unavailable);
        let down = source.fetch_rates(&Currency::usd()).await;
        assert!(matches!(down, Err(FxError::SourceUnavailable(_))));

        assert_eq!(source.calls(), 3);
    }
}
