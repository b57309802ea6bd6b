//! xrate Common Types
//!
//! This crate contains the value types shared across xrate: currency codes,
//! cached rate entries, amount parsing and the validation errors raised
//! while turning caller input into those types.

pub mod error;
pub mod monetary;
pub mod rates;
pub mod time;

pub use error::*;
pub use monetary::*;
pub use rates::*;
pub use time::*;
