//! Cache configuration

use std::time::Duration;

/// Configuration for ephemeral cache TTL and sweep settings.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use docmirror_lib::cache::CacheConfig;
///
/// let config = CacheConfig::default()
///     .with_query_ttl(Duration::from_secs(60))
///     .with_sweep_interval(Duration::from_secs(120));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for query results in the ephemeral cache.
    ///
    /// Default: 5 minutes
    pub query_ttl: Duration,

    /// Period of the background sweep that evicts expired ephemeral entries.
    ///
    /// Default: 5 minutes
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            query_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    /// Creates a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the query TTL.
    pub fn with_query_ttl(mut self, ttl: Duration) -> Self {
        self.query_ttl = ttl;
        self
    }

    /// Sets the background sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}
