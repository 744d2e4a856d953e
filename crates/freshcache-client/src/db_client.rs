use crate::backpressure::Backpressure;
use crate::completion::CompletionQueue;
use crate::error::Error;
use crate::retry::GetRetryPolicy;
use freshcache_proto::db::db_service_client::DbServiceClient;
use freshcache_proto::db::{
    DbDeleteRequest, DbGetLoadRequest, DbGetReadCountRequest, DbGetRequest, DbGetWriteCountRequest,
    DbPutRequest, DbStartRecordRequest,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tonic::transport::{Channel, Endpoint};

enum DbCallResponse {
    Get { value: Vec<u8>, found: bool },
    Put { success: bool },
    Delete { success: bool },
    Load { load: f64 },
    StartRecord { success: bool },
    ReadCount { read_count: u64 },
    WriteCount { write_count: u64 },
}

/// Client-side handle onto the single backing-store endpoint. Reads go
/// through [`GetRetryPolicy`]; writes (`Put`, `Delete`) are issued once
/// and surface their error directly, per the spec's "writes are not
/// retried" rule.
pub struct DbClient {
    address: String,
    channel: futures::lock::Mutex<Option<Channel>>,
    completion: CompletionQueue<DbCallResponse>,
    backpressure: Arc<Backpressure>,
    retry: GetRetryPolicy,
    _dispatcher: Arc<JoinHandle<()>>,
}

impl DbClient {
    pub fn new(address: String, max_concurrent_rpcs: usize, retry: GetRetryPolicy) -> Self {
        let (completion, dispatcher) = CompletionQueue::new();
        Self {
            address,
            channel: futures::lock::Mutex::new(None),
            completion,
            backpressure: Arc::new(Backpressure::new(max_concurrent_rpcs)),
            retry,
            _dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn backpressure(&self) -> &Backpressure {
        &self.backpressure
    }

    async fn stub(&self) -> Result<DbServiceClient<Channel>, Error> {
        let mut guard = self.channel.lock().await;
        if let Some(channel) = &*guard {
            return Ok(DbServiceClient::new(channel.clone()));
        }
        let endpoint =
            Endpoint::from_shared(self.address.clone()).map_err(|e| Error::InvalidEndpoint(e.to_string()))?;
        let channel = endpoint.connect().await?;
        *guard = Some(channel.clone());
        Ok(DbServiceClient::new(channel))
    }

    async fn issue(
        &self,
        fut: impl std::future::Future<Output = Result<DbCallResponse, Error>> + Send + 'static,
    ) -> Result<DbCallResponse, Error> {
        let permit = self.backpressure.acquire().await;
        metrics::gauge!("freshcache_client_db_in_flight").set(self.backpressure.in_flight() as f64);
        let started = Instant::now();
        let result = self
            .completion
            .dispatch(async move {
                let result = fut.await;
                drop(permit);
                result
            })
            .await;
        metrics::gauge!("freshcache_client_db_in_flight").set(self.backpressure.in_flight() as f64);
        metrics::histogram!("freshcache_client_db_rpc_seconds").record(started.elapsed().as_secs_f64());
        result
    }

    /// `AsyncGet`: up to `retry.max_attempts()` tries, each budgeted with
    /// a growing per-attempt timeout, paused by `retry.pause()` between
    /// attempts. Returns `None` (not an error) on a definitive `!found`.
    pub async fn get_async(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>, Error> {
        let mut last_err = None;
        for attempt in 1..=self.retry.max_attempts() {
            let budget = self.retry.attempt_timeout(attempt);
            let key = key.clone();
            let attempt_result = tokio::time::timeout(budget, async {
                let mut stub = self.stub().await?;
                self.issue(async move {
                    let resp = stub.get(DbGetRequest { key }).await?.into_inner();
                    Ok(DbCallResponse::Get { value: resp.value, found: resp.found })
                })
                .await
            })
            .await;

            match attempt_result {
                Ok(Ok(DbCallResponse::Get { value, found })) => {
                    return Ok(found.then_some(value));
                }
                Ok(Ok(_)) => unreachable!("db_client: mismatched completion variant for Get"),
                Ok(Err(e)) => last_err = Some(e),
                Err(_elapsed) => last_err = Some(Error::Timeout(attempt)),
            }

            if attempt < self.retry.max_attempts() {
                tokio::time::sleep(self.retry.pause()).await;
            }
        }
        Err(last_err.unwrap_or(Error::Timeout(self.retry.max_attempts())))
    }

    /// `AsyncPut`: not retried. `ew` carries the wire sentinel/estimate
    /// described in the spec's external-interfaces section.
    pub async fn put_async(&self, key: Vec<u8>, value: Vec<u8>, ew: f64) -> Result<bool, Error> {
        let mut stub = self.stub().await?;
        let reply = self
            .issue(async move {
                let resp = stub.put(DbPutRequest { key, value, ew }).await?.into_inner();
                Ok(DbCallResponse::Put { success: resp.success })
            })
            .await?;
        match reply {
            DbCallResponse::Put { success } => Ok(success),
            _ => unreachable!("db_client: mismatched completion variant for Put"),
        }
    }

    pub async fn delete_async(&self, key: Vec<u8>) -> Result<bool, Error> {
        let mut stub = self.stub().await?;
        let reply = self
            .issue(async move {
                let resp = stub.delete(DbDeleteRequest { key }).await?.into_inner();
                Ok(DbCallResponse::Delete { success: resp.success })
            })
            .await?;
        match reply {
            DbCallResponse::Delete { success } => Ok(success),
            _ => unreachable!("db_client: mismatched completion variant for Delete"),
        }
    }

    pub async fn get_load(&self) -> Result<f64, Error> {
        let mut stub = self.stub().await?;
        let reply = self
            .issue(async move {
                let resp = stub.get_load(DbGetLoadRequest {}).await?.into_inner();
                Ok(DbCallResponse::Load { load: resp.load })
            })
            .await?;
        match reply {
            DbCallResponse::Load { load } => Ok(load),
            _ => unreachable!("db_client: mismatched completion variant for GetLoad"),
        }
    }

    pub async fn start_record(&self) -> Result<bool, Error> {
        let mut stub = self.stub().await?;
        let reply = self
            .issue(async move {
                let resp = stub.start_record(DbStartRecordRequest {}).await?.into_inner();
                Ok(DbCallResponse::StartRecord { success: resp.success })
            })
            .await?;
        match reply {
            DbCallResponse::StartRecord { success } => Ok(success),
            _ => unreachable!("db_client: mismatched completion variant for StartRecord"),
        }
    }

    pub async fn get_read_count(&self) -> Result<u64, Error> {
        let mut stub = self.stub().await?;
        let reply = self
            .issue(async move {
                let resp = stub.get_read_count(DbGetReadCountRequest {}).await?.into_inner();
                Ok(DbCallResponse::ReadCount { read_count: resp.read_count })
            })
            .await?;
        match reply {
            DbCallResponse::ReadCount { read_count } => Ok(read_count),
            _ => unreachable!("db_client: mismatched completion variant for GetReadCount"),
        }
    }

    pub async fn get_write_count(&self) -> Result<u64, Error> {
        let mut stub = self.stub().await?;
        let reply = self
            .issue(async move {
                let resp = stub.get_write_count(DbGetWriteCountRequest {}).await?.into_inner();
                Ok(DbCallResponse::WriteCount { write_count: resp.write_count })
            })
            .await?;
        match reply {
            DbCallResponse::WriteCount { write_count } => Ok(write_count),
            _ => unreachable!("db_client: mismatched completion variant for GetWriteCount"),
        }
    }

    pub fn shutdown(&self) {
        self.completion.cancel_all_pending();
    }
}
