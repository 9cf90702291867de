//! Configuration for reservation TTLs and the expiry sweep.

use chrono::TimeDelta;
use std::time::Duration;

/// Tunables for the reservation lifecycle.
///
/// The TTL is a single global constant, not per-variant or per-session;
/// nothing in the domain calls for finer granularity yet.
///
/// # Example
///
/// ```
/// use stockpile_core::config::StockConfig;
/// use chrono::TimeDelta;
///
/// let config = StockConfig::default().with_reservation_ttl(TimeDelta::minutes(30));
/// assert_eq!(config.reservation_ttl, TimeDelta::minutes(30));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StockConfig {
    /// How long a checkout hold lives before the sweep may expire it.
    pub reservation_ttl: TimeDelta,
    /// How often the sweep pass runs.
    pub sweep_interval: Duration,
    /// Maximum stale reservations processed per sweep pass.
    pub sweep_batch_limit: usize,
}

impl StockConfig {
    /// Override the reservation TTL.
    #[must_use]
    pub const fn with_reservation_ttl(mut self, ttl: TimeDelta) -> Self {
        self.reservation_ttl = ttl;
        self
    }

    /// Override the sweep interval.
    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Override the sweep batch limit.
    #[must_use]
    pub const fn with_sweep_batch_limit(mut self, limit: usize) -> Self {
        self.sweep_batch_limit = limit;
        self
    }
}

impl Default for StockConfig {
    /// 15 minute TTL, 60 second sweep, 500 reservations per pass.
    fn default() -> Self {
        Self {
            reservation_ttl: TimeDelta::minutes(15),
            sweep_interval: Duration::from_secs(60),
            sweep_batch_limit: 500,
        }
    }
}
