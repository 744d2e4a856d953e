use crate::error::Error;
use futures::lock::Mutex as AsyncMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tonic::transport::{Channel, Endpoint};
use xxhash_rust::xxh3::xxh3_64;

/// A Channel which may be ready (`Some`) or not yet dialed (`None`),
/// guarded by an async-aware lock so concurrent callers to the same shard
/// coalesce onto a single dial rather than racing to connect.
type DialState = Arc<AsyncMutex<Option<Channel>>>;

/// Routes keyed operations to the cache shard owning `hash(key) mod
/// N_shards`, and non-keyed operations across every shard in turn.
/// Connections are dialed lazily and cached, in the manner of the
/// reference client library's own topology router, simplified here to a
/// fixed shard list rather than a dynamically discovered broker topology.
pub struct ShardRouter {
    endpoints: Vec<String>,
    states: Vec<DialState>,
    round_robin: AtomicUsize,
}

impl ShardRouter {
    pub fn new(addresses: Vec<String>) -> Result<Self, Error> {
        if addresses.is_empty() {
            return Err(Error::NoShards);
        }
        let states = addresses.iter().map(|_| Arc::new(AsyncMutex::new(None))).collect();
        Ok(Self {
            endpoints: addresses,
            states,
            round_robin: AtomicUsize::new(0),
        })
    }

    pub fn shard_count(&self) -> usize {
        self.endpoints.len()
    }

    /// `hash(key) mod N_shards`.
    pub fn shard_for_key(&self, key: &[u8]) -> usize {
        (xxh3_64(key) as usize) % self.endpoints.len()
    }

    /// The next shard in round-robin order, for non-keyed operations
    /// (`SetTTL`, `GetMR`, `GetFreshnessStats`) whose results the caller
    /// aggregates across shards separately.
    pub fn next_round_robin(&self) -> usize {
        self.round_robin.fetch_add(1, Ordering::Relaxed) % self.endpoints.len()
    }

    pub fn all_shards(&self) -> impl Iterator<Item = usize> {
        0..self.endpoints.len()
    }

    /// Resolve a ready `Channel` for shard `index`, dialing it on first
    /// use. Subsequent calls reuse the cached connection.
    pub async fn channel(&self, index: usize) -> Result<Channel, Error> {
        let state = self.states[index].clone();
        let mut guard = state.lock().await;
        if let Some(channel) = &*guard {
            return Ok(channel.clone());
        }
        let endpoint = Endpoint::from_shared(self.endpoints[index].clone())
            .map_err(|e| Error::InvalidEndpoint(e.to_string()))?;
        let channel = endpoint.connect().await?;
        *guard = Some(channel.clone());
        Ok(channel)
    }

    pub async fn channel_for_key(&self, key: &[u8]) -> Result<Channel, Error> {
        self.channel(self.shard_for_key(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_always_routes_to_the_same_shard() {
        let router = ShardRouter::new(vec![
            "http://127.0.0.1:1".into(),
            "http://127.0.0.1:2".into(),
            "http://127.0.0.1:3".into(),
        ])
        .unwrap();
        let a = router.shard_for_key(b"stable-key");
        let b = router.shard_for_key(b"stable-key");
        assert_eq!(a, b);
        assert!(a < router.shard_count());
    }

    #[test]
    fn round_robin_cycles_through_every_shard() {
        let router = ShardRouter::new(vec!["http://127.0.0.1:1".into(), "http://127.0.0.1:2".into()]).unwrap();
        let seen: Vec<usize> = (0..4).map(|_| router.next_round_robin()).collect();
        assert_eq!(seen, vec![0, 1, 0, 1]);
    }

    #[test]
    fn rejects_an_empty_shard_list() {
        assert!(matches!(ShardRouter::new(vec![]), Err(Error::NoShards)));
    }
}
