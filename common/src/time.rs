//! Time utilities and constants for xrate.

use chrono::{DateTime, Duration, Utc};

/// Default timing constants.
pub mod constants {
    use super::Duration;

    /// Default lifetime of a cached rate entry (1 hour).
    pub fn default_rate_ttl() -> Duration {
        Duration::hours(1)
    }

    /// Longest TTL a resolver accepts (366 days).
    pub fn max_rate_ttl() -> Duration {
        Duration::days(366)
    }

    /// Upper bound on a rate source fetch (5 seconds).
    pub fn fetch_timeout() -> std::time::Duration {
        std::time::Duration::from_secs(5)
    }

    /// Upper bound on a single cache store call (2 seconds).
    pub fn store_timeout() -> std::time::Duration {
        std::time::Duration::from_secs(2)
    }
}

/// A timestamp with timezone (always UTC for xrate).
pub type Timestamp = DateTime<Utc>;

/// Build a timestamp from unix seconds, as reported by rate providers.
pub fn from_unix_seconds(secs: i64) -> Option<Timestamp> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}
