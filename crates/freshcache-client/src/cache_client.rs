use crate::backpressure::Backpressure;
use crate::completion::CompletionQueue;
use crate::error::Error;
use crate::router::ShardRouter;
use freshcache_proto::cache::cache_service_client::CacheServiceClient;
use freshcache_proto::cache::{
    CacheGetFreshnessStatsRequest, CacheGetMrRequest, CacheGetRequest, CacheInvalidateRequest,
    CacheSetRequest, CacheSetTtlRequest, CacheUpdateRequest,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

/// The outcome of any one cache RPC kind, funneled through a single
/// completion queue per the async fabric design.
enum CacheCallResponse {
    Get { value: Vec<u8>, success: bool },
    Set { success: bool },
    SetTtl { success: bool },
    GetMr { mr: f64, success: bool },
    Invalidate { success: bool },
    Update { success: bool },
    FreshnessStats { num_invalidates: u64, num_updates: u64, success: bool },
}

/// Aggregate freshness counters and miss ratio across every cache shard.
#[derive(Debug, Clone, Copy, Default)]
pub struct FreshnessStats {
    pub num_invalidates: u64,
    pub num_updates: u64,
}

/// Client-side handle onto the sharded cache tier: one stub per shard,
/// dispatched through a shared completion queue and gated by a shared
/// backpressure limiter, exactly mirroring `freshcache-server`'s handler
/// surface from the other end of the wire.
pub struct CacheClient {
    router: Arc<ShardRouter>,
    completion: CompletionQueue<CacheCallResponse>,
    backpressure: Arc<Backpressure>,
    _dispatcher: Arc<JoinHandle<()>>,
}

impl CacheClient {
    pub fn new(addresses: Vec<String>, max_concurrent_rpcs: usize) -> Result<Self, Error> {
        let router = Arc::new(ShardRouter::new(addresses)?);
        let (completion, dispatcher) = CompletionQueue::new();
        Ok(Self {
            router,
            completion,
            backpressure: Arc::new(Backpressure::new(max_concurrent_rpcs)),
            _dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn shard_count(&self) -> usize {
        self.router.shard_count()
    }

    pub fn backpressure(&self) -> &Backpressure {
        &self.backpressure
    }

    async fn stub_for_key(&self, key: &[u8]) -> Result<CacheServiceClient<tonic::transport::Channel>, Error> {
        Ok(CacheServiceClient::new(self.router.channel_for_key(key).await?))
    }

    async fn stub_for_shard(&self, index: usize) -> Result<CacheServiceClient<tonic::transport::Channel>, Error> {
        Ok(CacheServiceClient::new(self.router.channel(index).await?))
    }

    async fn issue(
        &self,
        fut: impl std::future::Future<Output = Result<CacheCallResponse, Error>> + Send + 'static,
    ) -> Result<CacheCallResponse, Error> {
        let permit = self.backpressure.acquire().await;
        metrics::gauge!("freshcache_client_cache_in_flight").set(self.backpressure.in_flight() as f64);
        let started = Instant::now();
        let result = self.completion.dispatch(async move {
            let result = fut.await;
            drop(permit);
            result
        }).await;
        let elapsed = started.elapsed();
        metrics::gauge!("freshcache_client_cache_in_flight").set(self.backpressure.in_flight() as f64);
        metrics::histogram!("freshcache_client_cache_rpc_seconds").record(elapsed.as_secs_f64());
        tracing::trace!(elapsed_us = elapsed.as_micros() as u64, "cache rpc completed");
        result
    }

    /// `GetAsync`: routes to `stubs[hash(key) mod N]`. Returns `None` on a
    /// cache miss (not an error — the look-aside path).
    pub async fn get_async(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, Error> {
        let mut stub = self.stub_for_key(&key).await?;
        let reply = self
            .issue(async move {
                let resp = stub.get(CacheGetRequest { key }).await?.into_inner();
                Ok(CacheCallResponse::Get { value: resp.value, success: resp.success })
            })
            .await?;
        match reply {
            CacheCallResponse::Get { value, success } => Ok(success.then_some(value)),
            _ => unreachable!("cache_client: mismatched completion variant for Get"),
        }
    }

    /// `SetAsync`: unconditional overwrite into the shard owning `key`.
    pub async fn set_async(&self, key: Vec<u8>, value: Vec<u8>, ttl_secs: i64) -> Result<bool, Error> {
        let mut stub = self.stub_for_key(&key).await?;
        let reply = self
            .issue(async move {
                let resp = stub
                    .set(CacheSetRequest { key, value, ttl: ttl_secs })
                    .await?
                    .into_inner();
                Ok(CacheCallResponse::Set { success: resp.success })
            })
            .await?;
        match reply {
            CacheCallResponse::Set { success } => Ok(success),
            _ => unreachable!("cache_client: mismatched completion variant for Set"),
        }
    }

    pub async fn invalidate_async(&self, key: Vec<u8>) -> Result<bool, Error> {
        let mut stub = self.stub_for_key(&key).await?;
        let reply = self
            .issue(async move {
                let resp = stub.invalidate(CacheInvalidateRequest { key }).await?.into_inner();
                Ok(CacheCallResponse::Invalidate { success: resp.success })
            })
            .await?;
        match reply {
            CacheCallResponse::Invalidate { success } => Ok(success),
            _ => unreachable!("cache_client: mismatched completion variant for Invalidate"),
        }
    }

    pub async fn update_async(&self, key: Vec<u8>, value: Vec<u8>) -> Result<bool, Error> {
        let mut stub = self.stub_for_key(&key).await?;
        let reply = self
            .issue(async move {
                let resp = stub.update(CacheUpdateRequest { key, value }).await?.into_inner();
                Ok(CacheCallResponse::Update { success: resp.success })
            })
            .await?;
        match reply {
            CacheCallResponse::Update { success } => Ok(success),
            _ => unreachable!("cache_client: mismatched completion variant for Update"),
        }
    }

    /// Non-keyed: dispatched to every shard, result aggregated (sent to
    /// all shards since a process-wide default TTL is per-shard state).
    pub async fn set_ttl_async(&self, ttl_secs: i64) -> Result<bool, Error> {
        let mut all_ok = true;
        for index in self.router.all_shards() {
            let mut stub = self.stub_for_shard(index).await?;
            let reply = self
                .issue(async move {
                    let resp = stub.set_ttl(CacheSetTtlRequest { ttl: ttl_secs }).await?.into_inner();
                    Ok(CacheCallResponse::SetTtl { success: resp.success })
                })
                .await?;
            if let CacheCallResponse::SetTtl { success } = reply {
                all_ok &= success;
            }
        }
        Ok(all_ok)
    }

    /// Non-keyed: miss ratio averaged across every shard, `-1.0` if no
    /// shard has seen any requests.
    pub async fn get_mr(&self) -> Result<f64, Error> {
        let mut sum = 0.0;
        let mut count = 0u32;
        for index in self.router.all_shards() {
            let mut stub = self.stub_for_shard(index).await?;
            let reply = self
                .issue(async move {
                    let resp = stub.get_mr(CacheGetMrRequest {}).await?.into_inner();
                    Ok(CacheCallResponse::GetMr { mr: resp.mr, success: resp.success })
                })
                .await?;
            if let CacheCallResponse::GetMr { mr, success } = reply {
                if success {
                    sum += mr;
                    count += 1;
                }
            }
        }
        Ok(if count == 0 { -1.0 } else { sum / count as f64 })
    }

    /// Non-keyed: freshness counters summed across every shard.
    pub async fn get_freshness_stats(&self) -> Result<FreshnessStats, Error> {
        let mut stats = FreshnessStats::default();
        for index in self.router.all_shards() {
            let mut stub = self.stub_for_shard(index).await?;
            let reply = self
                .issue(async move {
                    let resp = stub
                        .get_freshness_stats(CacheGetFreshnessStatsRequest {})
                        .await?
                        .into_inner();
                    Ok(CacheCallResponse::FreshnessStats {
                        num_invalidates: resp.num_invalidates,
                        num_updates: resp.num_updates,
                        success: resp.success,
                    })
                })
                .await?;
            if let CacheCallResponse::FreshnessStats { num_invalidates, num_updates, .. } = reply {
                stats.num_invalidates += num_invalidates;
                stats.num_updates += num_updates;
            }
        }
        Ok(stats)
    }

    /// Graceful shutdown: resolve every outstanding promise with a
    /// cancellation error before the client is dropped.
    pub fn shutdown(&self) {
        self.completion.cancel_all_pending();
    }
}
