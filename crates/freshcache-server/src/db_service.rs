use dashmap::DashMap;
use freshcache_client::CacheClient;
use freshcache_policy::{wire, Action, CostConstants, PolicyMode};
use freshcache_proto::db::db_service_server::DbService;
use freshcache_proto::db::{
    DbDeleteRequest, DbDeleteResponse, DbGetLoadRequest, DbGetLoadResponse, DbGetReadCountRequest,
    DbGetReadCountResponse, DbGetRequest, DbGetResponse, DbGetWriteCountRequest, DbGetWriteCountResponse,
    DbPutRequest, DbPutResponse, DbStartRecordRequest, DbStartRecordResponse,
};
use freshcache_tracker::{AnyTracker, Tracker, NO_EVIDENCE};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tonic::{Request, Response, Status};

/// The reference backing store: an in-memory map standing in for the
/// authoritative database the original cache tier sits in front of, plus
/// the freshness-policy dispatch that runs on every `Put`.
pub struct DbServiceImpl {
    store: DashMap<Vec<u8>, Vec<u8>>,
    cache: Arc<CacheClient>,
    tracker: Option<Arc<AnyTracker>>,
    costs: CostConstants,
    mode: PolicyMode,
    recording: AtomicBool,
    read_count: AtomicU64,
    write_count: AtomicU64,
    in_flight: AtomicI64,
}

impl DbServiceImpl {
    pub fn new(
        cache: Arc<CacheClient>,
        tracker: Option<Arc<AnyTracker>>,
        costs: CostConstants,
        mode: PolicyMode,
    ) -> Self {
        Self {
            store: DashMap::new(),
            cache,
            tracker,
            costs,
            mode,
            recording: AtomicBool::new(false),
            read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
            in_flight: AtomicI64::new(0),
        }
    }

    /// Resolve the wire `ew` value (a sentinel or a client-supplied
    /// estimate) plus the configured static mode into the concrete
    /// `(ew, mode)` pair the policy engine decides against.
    fn resolve_policy_inputs(&self, key: &[u8], ew: f64) -> (f64, PolicyMode) {
        if ew == wire::TTL_ONLY {
            return (NO_EVIDENCE, PolicyMode::TtlOnly);
        }
        if ew == wire::INVALIDATE_ALWAYS {
            return (NO_EVIDENCE, PolicyMode::InvalidateAlways);
        }
        if ew == wire::UPDATE_ALWAYS {
            return (NO_EVIDENCE, PolicyMode::UpdateAlways);
        }
        if ew == wire::ADAPTIVE {
            let estimate = match &self.tracker {
                Some(tracker) => tracker.ew(key),
                None => NO_EVIDENCE,
            };
            return (estimate, self.mode);
        }
        (ew, self.mode)
    }
}

struct InFlightGuard<'a>(&'a AtomicI64);

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicI64) -> Self {
        let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!("freshcache_db_in_flight").set(n as f64);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let n = self.0.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::gauge!("freshcache_db_in_flight").set(n as f64);
    }
}

#[tonic::async_trait]
impl DbService for DbServiceImpl {
    #[tracing::instrument(skip_all, fields(call = "get", key = ?request.get_ref().key))]
    async fn get(&self, request: Request<DbGetRequest>) -> Result<Response<DbGetResponse>, Status> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        let started = Instant::now();
        let key = request.into_inner().key;
        if self.recording.load(Ordering::Relaxed) {
            self.read_count.fetch_add(1, Ordering::Relaxed);
        }
        metrics::counter!("freshcache_db_reads_total").increment(1);
        let result = match self.store.get(&key) {
            Some(value) => Ok(Response::new(DbGetResponse { value: value.clone(), found: true })),
            None => Ok(Response::new(DbGetResponse { value: Vec::new(), found: false })),
        };
        metrics::histogram!("freshcache_db_get_seconds").record(started.elapsed().as_secs_f64());
        result
    }

    #[tracing::instrument(skip_all, fields(call = "put", key = ?request.get_ref().key))]
    async fn put(&self, request: Request<DbPutRequest>) -> Result<Response<DbPutResponse>, Status> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        let started = Instant::now();
        let req = request.into_inner();
        if self.recording.load(Ordering::Relaxed) {
            self.write_count.fetch_add(1, Ordering::Relaxed);
        }
        metrics::counter!("freshcache_db_writes_total").increment(1);

        let (ew, mode) = self.resolve_policy_inputs(&req.key, req.ew);
        let action = freshcache_policy::decide(ew, self.costs, mode);

        self.store.insert(req.key.clone(), req.value.clone());

        let dispatch_result = match action {
            Action::Invalidate => {
                metrics::counter!("freshcache_db_policy_invalidate_total").increment(1);
                self.cache.invalidate_async(req.key).await
            }
            Action::Update => {
                metrics::counter!("freshcache_db_policy_update_total").increment(1);
                self.cache.update_async(req.key, req.value).await
            }
            Action::Skip => {
                metrics::counter!("freshcache_db_policy_skip_total").increment(1);
                Ok(true)
            }
        };
        let result = match dispatch_result {
            Ok(success) => Ok(Response::new(DbPutResponse { success })),
            Err(e) => {
                tracing::warn!(error = %e, "freshness-policy dispatch to cache shard failed");
                Ok(Response::new(DbPutResponse { success: false }))
            }
        };
        metrics::histogram!("freshcache_db_put_seconds").record(started.elapsed().as_secs_f64());
        result
    }

    #[tracing::instrument(skip_all, fields(call = "delete", key = ?request.get_ref().key))]
    async fn delete(&self, request: Request<DbDeleteRequest>) -> Result<Response<DbDeleteResponse>, Status> {
        let _guard = InFlightGuard::enter(&self.in_flight);
        let key = request.into_inner().key;
        let existed = self.store.remove(&key).is_some();
        let _ = self.cache.invalidate_async(key).await;
        Ok(Response::new(DbDeleteResponse { success: existed }))
    }

    #[tracing::instrument(skip_all, fields(call = "get_load"))]
    async fn get_load(&self, _request: Request<DbGetLoadRequest>) -> Result<Response<DbGetLoadResponse>, Status> {
        Ok(Response::new(DbGetLoadResponse { load: self.in_flight.load(Ordering::Relaxed) as f64 }))
    }

    #[tracing::instrument(skip_all, fields(call = "start_record"))]
    async fn start_record(
        &self,
        _request: Request<DbStartRecordRequest>,
    ) -> Result<Response<DbStartRecordResponse>, Status> {
        self.recording.store(true, Ordering::Relaxed);
        self.read_count.store(0, Ordering::Relaxed);
        self.write_count.store(0, Ordering::Relaxed);
        Ok(Response::new(DbStartRecordResponse { success: true }))
    }

    #[tracing::instrument(skip_all, fields(call = "get_read_count"))]
    async fn get_read_count(
        &self,
        _request: Request<DbGetReadCountRequest>,
    ) -> Result<Response<DbGetReadCountResponse>, Status> {
        Ok(Response::new(DbGetReadCountResponse { read_count: self.read_count.load(Ordering::Relaxed) }))
    }

    #[tracing::instrument(skip_all, fields(call = "get_write_count"))]
    async fn get_write_count(
        &self,
        _request: Request<DbGetWriteCountRequest>,
    ) -> Result<Response<DbGetWriteCountResponse>, Status> {
        Ok(Response::new(DbGetWriteCountResponse { write_count: self.write_count.load(Ordering::Relaxed) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freshcache_policy::CostConstants;

    fn service_with_one_shard(addr: &str) -> DbServiceImpl {
        let cache = Arc::new(CacheClient::new(vec![addr.to_string()], 16).unwrap());
        DbServiceImpl::new(cache, None, CostConstants::default(), PolicyMode::Adaptive)
    }

    #[tokio::test]
    async fn put_without_evidence_invalidates_by_default() {
        // Channels dial lazily; constructing the client and resolving the
        // policy inputs doesn't require a live shard.
        let svc = service_with_one_shard("http://127.0.0.1:1");
        let (ew, mode) = svc.resolve_policy_inputs(b"k", wire::ADAPTIVE);
        assert_eq!(ew, NO_EVIDENCE);
        assert_eq!(freshcache_policy::decide(ew, svc.costs, mode), Action::Invalidate);
    }

    #[tokio::test]
    async fn ttl_only_sentinel_skips_regardless_of_estimate() {
        let svc = service_with_one_shard("http://127.0.0.1:1");
        let (ew, mode) = svc.resolve_policy_inputs(b"k", wire::TTL_ONLY);
        assert_eq!(freshcache_policy::decide(ew, svc.costs, mode), Action::Skip);
    }

    #[tokio::test]
    async fn positive_estimate_runs_the_break_even_inequality() {
        let svc = service_with_one_shard("http://127.0.0.1:1");
        let (ew, mode) = svc.resolve_policy_inputs(b"k", 1.3);
        assert_eq!(ew, 1.3);
        assert_eq!(mode, PolicyMode::Adaptive);
        assert_eq!(freshcache_policy::decide(ew, svc.costs, mode), Action::Invalidate);
    }

    #[tokio::test]
    async fn start_record_resets_counters() {
        let svc = service_with_one_shard("http://127.0.0.1:1");
        svc.read_count.store(5, Ordering::Relaxed);
        svc.start_record(Request::new(DbStartRecordRequest {})).await.unwrap();
        let count = svc.get_read_count(Request::new(DbGetReadCountRequest {})).await.unwrap().into_inner();
        assert_eq!(count.read_count, 0);
    }
}
