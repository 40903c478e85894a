//! Background eviction of expired TTL cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::CacheProvider;

/// Spawns a task that runs [`gc`](CacheProvider::gc) on `cache` every
/// `interval` until `shutdown` is cancelled.
///
/// Lazy eviction only reclaims entries that are looked up again; the sweep
/// bounds growth for keys that never are.
pub fn spawn_sweeper(
    cache: Arc<dyn CacheProvider>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The immediate first tick has nothing to sweep.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = cache.gc().await;
                    if removed > 0 {
                        debug!(removed, "swept expired cache entries");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::cache::CachedValue;
    use crate::cache::InMemoryCache;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sweeper_evicts_expired_entries_until_cancelled() {
        let cache = Arc::new(InMemoryCache::new());
        cache
            .set("dead", CachedValue::with_ttl(vec![1], Duration::ZERO))
            .await;

        let config = CacheConfig::new().with_sweep_interval(Duration::from_millis(10));
        let shutdown = CancellationToken::new();
        let handle = spawn_sweeper(cache.clone(), config.sweep_interval, shutdown.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
