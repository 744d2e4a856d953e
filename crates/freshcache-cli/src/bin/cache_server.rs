use clap::Parser;
use freshcache_cli::logging::{init_logging, LogArgs};
use freshcache_cli::metrics_server;
use freshcache_client::{DbClient, FillStrategy, GetRetryPolicy};
use freshcache_proto::cache::cache_service_server::CacheServiceServer;
use freshcache_server::{build_slab_pool, CacheServerArgs, CacheServiceImpl, InMemorySlab};
use std::net::SocketAddr;
use std::sync::Arc;

/// Serves one shard of the freshness-aware cache tier.
#[derive(Debug, Parser)]
#[command(name = "freshcache-cache-server", version)]
struct Cli {
    #[command(flatten)]
    log: LogArgs,

    #[command(flatten)]
    cache: CacheServerArgs,

    #[arg(long, env = "FRESHCACHE_METRICS_LISTEN", default_value = "0.0.0.0:9100")]
    metrics_listen: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    let db = match cli.cache.fill_strategy {
        FillStrategy::ServerDriven => {
            let address = cli
                .cache
                .db_address
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--db-address is required when --fill-strategy=server-driven"))?;
            Some(Arc::new(DbClient::new(address, 100, GetRetryPolicy::default())))
        }
        FillStrategy::ClientDriven => None,
    };

    let slab = InMemorySlab::new();
    let slab_pool = build_slab_pool(slab, cli.cache.slab_pool_size);
    let service =
        CacheServiceImpl::new(slab_pool, cli.cache.default_ttl_secs, cli.cache.fill_strategy, db);

    let metrics_listener = tokio::net::TcpListener::bind(cli.metrics_listen).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, metrics_server::build_router()).await {
            tracing::error!(error = %e, "metrics server exited");
        }
    });

    tracing::info!(listen = %cli.cache.listen, fill_strategy = ?cli.cache.fill_strategy, "starting cache shard");
    tonic::transport::Server::builder()
        .add_service(CacheServiceServer::new(service))
        .serve(cli.cache.listen)
        .await?;
    Ok(())
}
