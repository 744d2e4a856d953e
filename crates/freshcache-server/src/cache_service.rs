use crate::slab::{Slab, SlabPool};
use freshcache_client::{DbClient, FillStrategy};
use freshcache_proto::cache::cache_service_server::CacheService;
use freshcache_proto::cache::{
    CacheGetFreshnessStatsRequest, CacheGetFreshnessStatsResponse, CacheGetMrRequest, CacheGetMrResponse,
    CacheGetRequest, CacheGetResponse, CacheInvalidateRequest, CacheInvalidateResponse, CacheSetRequest,
    CacheSetResponse, CacheSetTtlRequest, CacheSetTtlResponse, CacheUpdateRequest, CacheUpdateResponse,
};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tonic::{Request, Response, Status};

/// One shard's worth of the `CacheService`: a pooled slab, hit/miss/
/// freshness counters, and (under `ServerDriven`) a backing-store client
/// used to fill the slab on a miss.
pub struct CacheServiceImpl {
    slab_pool: SlabPool,
    default_ttl_secs: AtomicI64,
    fill_strategy: FillStrategy,
    db: Option<Arc<DbClient>>,
    hits: AtomicU64,
    misses: AtomicU64,
    num_invalidates: AtomicU64,
    num_updates: AtomicU64,
    in_flight: AtomicI64,
}

impl CacheServiceImpl {
    pub fn new(
        slab_pool: SlabPool,
        default_ttl_secs: i64,
        fill_strategy: FillStrategy,
        db: Option<Arc<DbClient>>,
    ) -> Self {
        Self {
            slab_pool,
            default_ttl_secs: AtomicI64::new(default_ttl_secs),
            fill_strategy,
            db,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            num_invalidates: AtomicU64::new(0),
            num_updates: AtomicU64::new(0),
            in_flight: AtomicI64::new(0),
        }
    }

    async fn slab(&self) -> Result<deadpool::managed::Object<crate::slab::SlabManager>, Status> {
        self.slab_pool
            .get()
            .await
            .map_err(|e| Status::internal(format!("slab pool exhausted: {e}")))
    }

    async fn get_inner(&self, key: Vec<u8>) -> Result<Response<CacheGetResponse>, Status> {
        let slab = self.slab().await?;

        if let Some(value) = slab.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("freshcache_cache_hits_total").increment(1);
            return Ok(Response::new(CacheGetResponse { value, success: true }));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("freshcache_cache_misses_total").increment(1);

        if self.fill_strategy != FillStrategy::ServerDriven {
            return Ok(Response::new(CacheGetResponse { value: Vec::new(), success: false }));
        }

        let Some(db) = &self.db else {
            tracing::warn!("server-driven fill configured without a db client");
            return Ok(Response::new(CacheGetResponse { value: Vec::new(), success: false }));
        };

        match db
            .get_async(key.clone())
            .await
            .map_err(|e| Status::unavailable(format!("backing-store fetch failed: {e}")))?
        {
            Some(value) => {
                slab.set(key, value.clone(), self.default_ttl_secs.load(Ordering::Relaxed));
                Ok(Response::new(CacheGetResponse { value, success: true }))
            }
            None => Ok(Response::new(CacheGetResponse { value: Vec::new(), success: false })),
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicI64);

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicI64) -> Self {
        let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!("freshcache_cache_in_flight").set(n as f64);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let n = self.0.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::gauge!("freshcache_cache_in_flight").set(n as f64);
    }
}

#[tonic::async_trait]
impl CacheService for CacheServiceImpl {
    #[tracing::instrument(skip_all, fields(call = "get", key = ?request.get_ref().key))]
    async fn get(&self, request: Request<CacheGetRequest>) -> Result<Response<CacheGetResponse>, Status> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        let started = Instant::now();
        let key = request.into_inner().key;
        let result = self.get_inner(key).await;
        metrics::histogram!("freshcache_cache_get_seconds").record(started.elapsed().as_secs_f64());
        result
    }

    #[tracing::instrument(skip_all, fields(call = "set", key = ?request.get_ref().key))]
    async fn set(&self, request: Request<CacheSetRequest>) -> Result<Response<CacheSetResponse>, Status> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        let started = Instant::now();
        let req = request.into_inner();
        let slab = self.slab().await?;
        slab.set(req.key, req.value, req.ttl);
        metrics::histogram!("freshcache_cache_set_seconds").record(started.elapsed().as_secs_f64());
        Ok(Response::new(CacheSetResponse { success: true }))
    }

    #[tracing::instrument(skip_all, fields(call = "set_ttl"))]
    async fn set_ttl(
        &self,
        request: Request<CacheSetTtlRequest>,
    ) -> Result<Response<CacheSetTtlResponse>, Status> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        self.default_ttl_secs.store(request.into_inner().ttl, Ordering::Relaxed);
        Ok(Response::new(CacheSetTtlResponse { success: true }))
    }

    #[tracing::instrument(skip_all, fields(call = "get_mr"))]
    async fn get_mr(&self, _request: Request<CacheGetMrRequest>) -> Result<Response<CacheGetMrResponse>, Status> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return Ok(Response::new(CacheGetMrResponse { mr: -1.0, success: false }));
        }
        Ok(Response::new(CacheGetMrResponse { mr: misses as f64 / total as f64, success: true }))
    }

    #[tracing::instrument(skip_all, fields(call = "invalidate", key = ?request.get_ref().key))]
    async fn invalidate(
        &self,
        request: Request<CacheInvalidateRequest>,
    ) -> Result<Response<CacheInvalidateResponse>, Status> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        let key = request.into_inner().key;
        let slab = self.slab().await?;
        slab.delete(&key);
        self.num_invalidates.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("freshcache_cache_invalidates_total").increment(1);
        Ok(Response::new(CacheInvalidateResponse { success: true }))
    }

    #[tracing::instrument(skip_all, fields(call = "update", key = ?request.get_ref().key))]
    async fn update(&self, request: Request<CacheUpdateRequest>) -> Result<Response<CacheUpdateResponse>, Status> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        let req = request.into_inner();
        let slab = self.slab().await?;
        // REPLACE semantics: a key absent from the slab was never cached
        // and an update carries nothing for it to invalidate either, so a
        // miss here is a success, not an error.
        slab.replace(&req.key, req.value);
        self.num_updates.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("freshcache_cache_updates_total").increment(1);
        Ok(Response::new(CacheUpdateResponse { success: true }))
    }

    #[tracing::instrument(skip_all, fields(call = "get_freshness_stats"))]
    async fn get_freshness_stats(
        &self,
        _request: Request<CacheGetFreshnessStatsRequest>,
    ) -> Result<Response<CacheGetFreshnessStatsResponse>, Status> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        Ok(Response::new(CacheGetFreshnessStatsResponse {
            num_invalidates: self.num_invalidates.load(Ordering::Relaxed),
            num_updates: self.num_updates.load(Ordering::Relaxed),
            success: true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slab::{build_slab_pool, InMemorySlab};

    fn service() -> CacheServiceImpl {
        let pool = build_slab_pool(InMemorySlab::new(), 4);
        CacheServiceImpl::new(pool, 0, FillStrategy::ClientDriven, None)
    }

    #[tokio::test]
    async fn miss_then_set_then_hit() {
        let svc = service();
        let miss = svc.get(Request::new(CacheGetRequest { key: b"k".to_vec() })).await.unwrap();
        assert!(!miss.into_inner().success);

        svc.set(Request::new(CacheSetRequest { key: b"k".to_vec(), value: b"v".to_vec(), ttl: 0 }))
            .await
            .unwrap();

        let hit = svc.get(Request::new(CacheGetRequest { key: b"k".to_vec() })).await.unwrap();
        let hit = hit.into_inner();
        assert!(hit.success);
        assert_eq!(hit.value, b"v");
    }

    #[tokio::test]
    async fn invalidate_is_idempotent() {
        let svc = service();
        svc.set(Request::new(CacheSetRequest { key: b"k".to_vec(), value: b"v".to_vec(), ttl: 0 }))
            .await
            .unwrap();
        for _ in 0..2 {
            let resp = svc.invalidate(Request::new(CacheInvalidateRequest { key: b"k".to_vec() })).await.unwrap();
            assert!(resp.into_inner().success);
        }
        let stats = svc
            .get_freshness_stats(Request::new(CacheGetFreshnessStatsRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(stats.num_invalidates, 2);
    }

    #[tokio::test]
    async fn miss_ratio_tracks_hits_and_misses() {
        let svc = service();
        svc.get(Request::new(CacheGetRequest { key: b"a".to_vec() })).await.unwrap();
        svc.set(Request::new(CacheSetRequest { key: b"a".to_vec(), value: b"v".to_vec(), ttl: 0 }))
            .await
            .unwrap();
        svc.get(Request::new(CacheGetRequest { key: b"a".to_vec() })).await.unwrap();

        let mr = svc.get_mr(Request::new(CacheGetMrRequest {})).await.unwrap().into_inner();
        assert!(mr.success);
        assert!((mr.mr - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn get_mr_reports_no_evidence_before_any_request() {
        let svc = service();
        let mr = svc.get_mr(Request::new(CacheGetMrRequest {})).await.unwrap().into_inner();
        assert!(!mr.success);
        assert_eq!(mr.mr, -1.0);
    }
}
