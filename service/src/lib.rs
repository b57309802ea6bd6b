//! xrate Service
//!
//! Request surface for the rate resolver: configuration, the HTTP API and
//! logging setup shared by the `xrate` binary.

pub mod api;
pub mod config;
pub mod telemetry;

pub use config::ServiceConfig;
