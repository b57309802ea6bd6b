//! Validation errors for caller-supplied currencies and amounts.

use thiserror::Error;

/// Raised when caller input cannot be turned into a currency or an amount.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Currency code is not a three-letter ISO 4217 style code.
    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    /// Amount is malformed, not finite or negative.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}
