use freshcache_client::{CacheClient, Client, DbClient, FillStrategy, GetRetryPolicy};
use freshcache_policy::{CostConstants, PolicyMode};
use freshcache_proto::cache::cache_service_server::CacheServiceServer;
use freshcache_proto::db::db_service_server::DbServiceServer;
use freshcache_server::{build_slab_pool, CacheServiceImpl, DbServiceImpl, InMemorySlab};
use freshcache_tracker::{AnyTracker, TrackerKind};
use freshcache_workload::{warm_up, ConstantRateGenerator, RecordSource};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

async fn start_cache_shard() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let pool = build_slab_pool(InMemorySlab::new(), 8);
    let service = CacheServiceImpl::new(pool, 0, FillStrategy::ClientDriven, None);
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(CacheServiceServer::new(service))
            .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    addr
}

async fn start_db(cache: Arc<CacheClient>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = DbServiceImpl::new(cache, None, CostConstants::default(), PolicyMode::Adaptive);
    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(DbServiceServer::new(service))
            .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    addr
}

#[tokio::test]
async fn warm_up_populates_db_and_prefills_a_fraction_of_the_cache() {
    let cache_addr = start_cache_shard().await;
    // One CacheClient for the backing store's own policy-dispatch path...
    let server_side_cache = Arc::new(CacheClient::new(vec![format!("http://{cache_addr}")], 64).unwrap());
    let db_addr = start_db(server_side_cache).await;

    tokio::time::sleep(Duration::from_millis(50)).await;

    // ...and a separate one for the end client, exactly as two distinct
    // processes would each dial the same shard independently.
    let cache = CacheClient::new(vec![format!("http://{cache_addr}")], 64).unwrap();
    let db = DbClient::new(format!("http://{db_addr}"), 64, GetRetryPolicy::default());
    let tracker = Arc::new(AnyTracker::new(TrackerKind::Exact, 1000));
    let client = Client::new(cache, db, tracker, FillStrategy::ClientDriven, 0);

    let mut generator = ConstantRateGenerator::new(10, Duration::from_millis(1), 5, 32, 0.5, 99);
    let records: Vec<_> = std::iter::from_fn(|| generator.next_record()).collect();

    warm_up(&client, &records, 2).await.unwrap();

    // Every distinct key landed in the backing store.
    for key in 0..5 {
        let key = format!("key{key}").into_bytes();
        let found = client.db().get_async(key).await.unwrap();
        assert!(found.is_some());
    }
}
