use clap::Parser;
use freshcache_cli::logging::{init_logging, LogArgs};
use freshcache_cli::metrics_server;
use freshcache_client::CacheClient;
use freshcache_policy::CostConstants;
use freshcache_proto::db::db_service_server::DbServiceServer;
use freshcache_server::{DbServerArgs, DbServiceImpl};
use freshcache_tracker::AnyTracker;
use std::net::SocketAddr;
use std::sync::Arc;

/// Serves the reference backing store and runs the freshness-policy
/// dispatch on every write.
#[derive(Debug, Parser)]
#[command(name = "freshcache-db-server", version)]
struct Cli {
    #[command(flatten)]
    log: LogArgs,

    #[command(flatten)]
    db: DbServerArgs,

    #[arg(long, env = "FRESHCACHE_METRICS_LISTEN", default_value = "0.0.0.0:9101")]
    metrics_listen: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    if cli.db.cache_addresses.is_empty() {
        anyhow::bail!("at least one --cache-address is required");
    }

    let cache = Arc::new(CacheClient::new(cli.db.cache_addresses.clone(), cli.db.max_concurrent_rpcs)?);
    let tracker = cli.db.tracker_kind.map(|kind| Arc::new(AnyTracker::new(kind, cli.db.expected_num_keys)));
    let costs = CostConstants::new(cli.db.cost_invalidate, cli.db.cost_update);
    let service = DbServiceImpl::new(cache, tracker, costs, cli.db.policy_mode);

    let metrics_listener = tokio::net::TcpListener::bind(cli.metrics_listen).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, metrics_server::build_router()).await {
            tracing::error!(error = %e, "metrics server exited");
        }
    });

    tracing::info!(listen = %cli.db.listen, policy_mode = ?cli.db.policy_mode, "starting backing store");
    tonic::transport::Server::builder()
        .add_service(DbServiceServer::new(service))
        .serve(cli.db.listen)
        .await?;
    Ok(())
}
