use freshcache_client::FillStrategy;
use freshcache_policy::PolicyMode;
use freshcache_tracker::TrackerKind;
use std::net::SocketAddr;

/// Recognized options for a single cache-shard process.
#[derive(Debug, Clone, clap::Args)]
pub struct CacheServerArgs {
    #[arg(long, env = "FRESHCACHE_CACHE_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// TTL applied to entries this server fills itself under `ServerDriven`.
    /// `<= 0` means never-expire.
    #[arg(long, env = "FRESHCACHE_CACHE_DEFAULT_TTL_SECS", default_value_t = 0)]
    pub default_ttl_secs: i64,

    /// Backing-store address, required when `fill_strategy` is `server-driven`.
    #[arg(long, env = "FRESHCACHE_CACHE_DB_ADDRESS")]
    pub db_address: Option<String>,

    #[arg(long, value_enum, env = "FRESHCACHE_FILL_STRATEGY", default_value = "server-driven")]
    pub fill_strategy: FillStrategy,

    #[arg(long, env = "FRESHCACHE_CACHE_SLAB_POOL_SIZE", default_value_t = 64)]
    pub slab_pool_size: usize,

    #[arg(long, env = "FRESHCACHE_CACHE_MAX_CONCURRENT_RPCS", default_value_t = 1000)]
    pub max_concurrent_rpcs: usize,
}

/// Recognized options for the single backing-store process.
#[derive(Debug, Clone, clap::Args)]
pub struct DbServerArgs {
    #[arg(long, env = "FRESHCACHE_DB_LISTEN", default_value = "0.0.0.0:9090")]
    pub listen: SocketAddr,

    /// One entry per cache shard, in shard-index order.
    #[arg(long = "cache-address", env = "FRESHCACHE_DB_CACHE_ADDRESSES", value_delimiter = ',')]
    pub cache_addresses: Vec<String>,

    #[arg(long, value_enum, env = "FRESHCACHE_POLICY_MODE", default_value = "adaptive")]
    pub policy_mode: PolicyMode,

    #[arg(long, env = "FRESHCACHE_POLICY_COST_INVALIDATE", default_value_t = 10.0)]
    pub cost_invalidate: f64,

    #[arg(long, env = "FRESHCACHE_POLICY_COST_UPDATE", default_value_t = 46.0)]
    pub cost_update: f64,

    /// When set, the backing store keeps its own tracker and uses it
    /// whenever a `Put` arrives carrying the adaptive sentinel instead of a
    /// client-supplied estimate.
    #[arg(long, value_enum, env = "FRESHCACHE_DB_TRACKER_KIND")]
    pub tracker_kind: Option<TrackerKind>,

    #[arg(long, env = "FRESHCACHE_DB_EXPECTED_NUM_KEYS", default_value_t = 100_000)]
    pub expected_num_keys: usize,

    #[arg(long, env = "FRESHCACHE_DB_MAX_CONCURRENT_RPCS", default_value_t = 1000)]
    pub max_concurrent_rpcs: usize,
}
