use clap::Parser;
use freshcache_cli::logging::{init_logging, LogArgs};
use freshcache_client::{CacheClient, Client, DbClient, FillStrategy, GetRetryPolicy};
use freshcache_tracker::{AnyTracker, TrackerKind};
use freshcache_workload::{collect_all, replay, warm_up, ConstantRateGenerator, ZipfPoissonGenerator};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum WorkloadKind {
    ConstantRate,
    ZipfPoisson,
}

/// Drives the workload contract of the trace-record driver against a
/// configured set of cache shards and a backing store: warms both up,
/// then replays a synthetic trace and reports throughput and error
/// counts.
#[derive(Debug, Parser)]
#[command(name = "freshcache-bench", version)]
struct Cli {
    #[command(flatten)]
    log: LogArgs,

    #[arg(long = "cache-address", required = true, value_delimiter = ',')]
    cache_addresses: Vec<String>,

    #[arg(long)]
    db_address: String,

    #[arg(long, value_enum, default_value = "exact")]
    tracker_kind: TrackerKind,

    #[arg(long, value_enum, default_value = "client-driven")]
    fill_strategy: FillStrategy,

    #[arg(long, default_value_t = 100_000)]
    expected_num_keys: usize,

    #[arg(long, default_value_t = 0)]
    default_ttl_secs: i64,

    #[arg(long, value_enum, default_value = "zipf-poisson")]
    workload: WorkloadKind,

    #[arg(long, default_value_t = 10_000)]
    num_records: usize,

    #[arg(long, default_value_t = 1_000)]
    num_keys: usize,

    #[arg(long, default_value_t = 256)]
    value_len: usize,

    /// Only used by `--workload constant-rate`.
    #[arg(long, default_value_t = 0.2)]
    write_ratio: f64,

    /// Only used by `--workload zipf-poisson`.
    #[arg(long, default_value_t = 1.1)]
    zipf_alpha: f64,

    /// Only used by `--workload zipf-poisson`; mean requests per second.
    #[arg(long, default_value_t = 50.0)]
    poisson_lambda: f64,

    #[arg(long, default_value_t = 1)]
    constant_rate_interval_ms: u64,

    #[arg(long, default_value_t = 5)]
    warmup_factor: usize,

    #[arg(long, default_value_t = 8)]
    num_workers: usize,

    #[arg(long, default_value_t = 1000)]
    max_interval_ms: u64,

    #[arg(long, default_value_t = 1.0)]
    interval_scale: f64,

    #[arg(long, default_value_t = 1000)]
    max_concurrent_rpcs: usize,

    #[arg(long, default_value_t = 100)]
    max_db_concurrent_rpcs: usize,

    #[arg(long, default_value_t = 7)]
    seed: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    let cache = CacheClient::new(cli.cache_addresses.clone(), cli.max_concurrent_rpcs)?;
    let db = DbClient::new(cli.db_address.clone(), cli.max_db_concurrent_rpcs, GetRetryPolicy::default());
    let tracker = Arc::new(AnyTracker::new(cli.tracker_kind, cli.expected_num_keys));
    let client = Arc::new(Client::new(cache, db, tracker, cli.fill_strategy, cli.default_ttl_secs));

    let records = match cli.workload {
        WorkloadKind::ConstantRate => collect_all(ConstantRateGenerator::new(
            cli.num_records,
            Duration::from_millis(cli.constant_rate_interval_ms),
            cli.num_keys,
            cli.value_len,
            cli.write_ratio,
            cli.seed,
        )),
        WorkloadKind::ZipfPoisson => collect_all(ZipfPoissonGenerator::new(
            cli.num_records,
            cli.zipf_alpha,
            cli.poisson_lambda,
            cli.num_keys,
            cli.value_len,
            cli.seed,
        )),
    };

    tracing::info!(records = records.len(), "generated synthetic trace");
    warm_up(&client, &records, cli.warmup_factor).await?;

    let stats = replay(
        client.clone(),
        records,
        cli.num_workers,
        Duration::from_millis(cli.max_interval_ms),
        cli.interval_scale,
    )
    .await;

    let mr = client.get_mr().await.unwrap_or(-1.0);
    let freshness = client.get_freshness_stats().await.ok();
    tracing::info!(
        requests_issued = stats.requests_issued,
        errors = stats.errors,
        miss_ratio = mr,
        ?freshness,
        "bench run complete"
    );
    client.shutdown();
    Ok(())
}
