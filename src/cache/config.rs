//! Cache sizing and expiry presets.

use std::time::Duration;

/// Size and expiry of one cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_capacity: u64,
    /// Entries expire this long after insertion.
    pub ttl: Option<Duration>,
    /// Entries expire when untouched for this long.
    pub tti: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Some(Duration::from_secs(300)),
            tti: None,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    #[must_use]
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.ttl = Some(duration);
        self
    }

    #[must_use]
    pub fn tti(mut self, duration: Duration) -> Self {
        self.tti = Some(duration);
        self
    }

    /// Wallet users. Looked up on nearly every update.
    pub fn users() -> Self {
        Self {
            max_capacity: 50_000,
            ttl: Some(Duration::from_secs(600)),
            tti: Some(Duration::from_secs(300)),
        }
    }

    /// Wallet balances. Short lived; refreshed after every payment.
    pub fn balances() -> Self {
        Self {
            max_capacity: 20_000,
            ttl: Some(Duration::from_secs(60)),
            tti: None,
        }
    }

    /// Pending confirmations, pagination cursors and prompts.
    pub fn session() -> Self {
        Self {
            max_capacity: 20_000,
            ttl: Some(Duration::from_secs(1800)),
            tti: Some(Duration::from_secs(300)),
        }
    }
}
