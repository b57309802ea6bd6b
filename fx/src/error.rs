//! Rate resolution error types.

use rust_decimal::Decimal;
use thiserror::Error;
use xrate_common::{Currency, ValidationError};

/// Errors that can occur while resolving or caching rates.
#[derive(Debug, Error)]
pub enum FxError {
    /// Currency code is malformed or not recognized by the rate source.
    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    /// Amount is malformed, not finite or negative.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Manually supplied rate is not positive.
    #[error("Invalid rate {0}: rates must be positive")]
    InvalidRate(Decimal),

    /// Rate source could not be reached or answered with an error.
    #[error("Rate source unavailable: {0}")]
    SourceUnavailable(String),

    /// Rate source does not know the requested base currency.
    #[error("Unknown currency at rate source: {0}")]
    UnknownCurrency(Currency),

    /// No cached or fetched entry can price the pair.
    #[error("No rate available for {from}/{to}")]
    RateUnavailable { from: Currency, to: Currency },

    /// Cache store failed or timed out.
    #[error("Cache store error: {0}")]
    Store(String),
}

impl FxError {
    /// Check if this error is transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FxError::SourceUnavailable(_) | FxError::Store(_))
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::InvalidCurrency(_) => "INVALID_CURRENCY",
            FxError::InvalidAmount(_) => "INVALID_AMOUNT",
            FxError::InvalidRate(_) => "INVALID_RATE",
            FxError::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
            FxError::UnknownCurrency(_) => "UNKNOWN_CURRENCY",
            FxError::RateUnavailable { .. } => "RATE_UNAVAILABLE",
            FxError::Store(_) => "STORE_ERROR",
        }
    }
}

impl From<ValidationError> for FxError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidCurrency(msg) => FxError::InvalidCurrency(msg),
            ValidationError::InvalidAmount(msg) => FxError::InvalidAmount(msg),
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_conversion() {
        let err: FxError = ValidationError::InvalidAmount("-5".to_string()).into();
        assert!(matches!(err, FxError::InvalidAmount(_)));
        assert_eq!(err.error_code(), "INVALID_AMOUNT");
    }

    #[test]
    fn test_retryable() {
        assert!(FxError::SourceUnavailable("timeout".to_string()).is_retryable());
        assert!(!FxError::InvalidCurrency("XX".to_string()).is_retryable());
        assert!(!FxError::RateUnavailable {
            from: Currency::eur(),
            to: Currency::gbp()
        }
        .is_retryable());
    }
}
