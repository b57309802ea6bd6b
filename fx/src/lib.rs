//! xrate FX Engine
//!
//! Rate cache and cross-rate resolution for currency conversion.
//!
//! # Features
//!
//! - Direct, inverse and cross-rate lookups over cached single-base entries
//! - Refresh from a rate source on miss, with bounded timeouts
//! - Stale-cache fallback when the rate source is unavailable
//! - Pluggable cache stores (in-memory, JSON file)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xrate_fx::{HttpRateSource, HttpRateSourceConfig, MemoryCacheStore, RateResolver, ResolverConfig};
//!
//! let source = Arc::new(HttpRateSource::new(HttpRateSourceConfig::default())?);
//! let resolver = RateResolver::new(source, Arc::new(MemoryCacheStore::new()), ResolverConfig::default());
//!
//! let result = resolver.convert_input("EUR", "GBP", "100").await?;
//! println!("{} GBP ({})", result.amount, result.provenance);
//! ```

pub mod cache;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod provider;

pub use cache::{CacheStats, CacheStore, FileCacheStore, MemoryCacheStore};
pub use conversion::{ConversionRequest, ConversionResult, Provenance};
pub use engine::{RateResolver, ResolverConfig, SharedRateResolver};
pub use error::{FxError, FxResult};
pub use provider::{HttpRateSource, HttpRateSourceConfig, RateSource};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::{MockMode, MockRateSource};
