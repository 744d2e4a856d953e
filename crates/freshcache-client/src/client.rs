use crate::cache_client::{CacheClient, FreshnessStats};
use crate::db_client::DbClient;
use crate::error::Error;
use freshcache_tracker::AnyTracker;
use std::sync::Arc;

/// Fill-race strategy. The spec treats both as deployment-time
/// configuration and forbids mixing within one deployment; this enum is
/// how a binary records which one it was configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FillStrategy {
    /// The cache server itself fetches from the backing store on a miss.
    ServerDriven,
    /// The client fetches from the backing store and backfills the cache.
    ClientDriven,
}

/// Ties the sharded cache client, the backing-store client and the local
/// EW tracker together the way the original `Client` class wraps
/// `CacheClient` + `DBClient` + a shared `Tracker*`.
pub struct Client {
    cache: CacheClient,
    db: DbClient,
    tracker: Arc<AnyTracker>,
    fill_strategy: FillStrategy,
    default_ttl_secs: i64,
}

impl Client {
    pub fn new(
        cache: CacheClient,
        db: DbClient,
        tracker: Arc<AnyTracker>,
        fill_strategy: FillStrategy,
        default_ttl_secs: i64,
    ) -> Self {
        Self { cache, db, tracker, fill_strategy, default_ttl_secs }
    }

    pub fn cache(&self) -> &CacheClient {
        &self.cache
    }

    pub fn db(&self) -> &DbClient {
        &self.db
    }

    pub fn tracker(&self) -> &Arc<AnyTracker> {
        &self.tracker
    }

    /// `GetAsync`: records a read, dispatches to the owning shard. On a
    /// miss under `ClientDriven`, falls back to the backing store and
    /// backfills the cache; under `ServerDriven`, the cache server already
    /// performed that fill, so a miss here is a true miss.
    pub async fn get(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, Error> {
        use freshcache_tracker::Tracker;
        self.tracker.record_read(&key);

        if let Some(value) = self.cache.get_async(key.clone()).await? {
            return Ok(Some(value));
        }

        if self.fill_strategy == FillStrategy::ServerDriven {
            return Ok(None);
        }

        match self.db.get_async(key.clone()).await? {
            Some(value) => {
                self.cache.set_async(key, value.clone(), self.default_ttl_secs).await?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// `SetAsync`: records a write, queries the tracker for this key's EW,
    /// and forwards both to the backing store. The backing store maps EW
    /// through the policy engine and fans the resulting action out to the
    /// owning cache shard.
    pub async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> Result<bool, Error> {
        use freshcache_tracker::Tracker;
        self.tracker.record_write(&key);
        let ew = self.tracker.ew(&key);
        self.db.put_async(key, value, ew).await
    }

    pub async fn set_ttl(&self, ttl_secs: i64) -> Result<bool, Error> {
        self.cache.set_ttl_async(ttl_secs).await
    }

    pub async fn get_mr(&self) -> Result<f64, Error> {
        self.cache.get_mr().await
    }

    pub async fn get_freshness_stats(&self) -> Result<FreshnessStats, Error> {
        self.cache.get_freshness_stats().await
    }

    /// Graceful shutdown: drain both completion queues, resolving every
    /// outstanding promise with a cancellation error.
    pub fn shutdown(&self) {
        self.cache.shutdown();
        self.db.shutdown();
    }
}
