use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

/// The in-memory KV slab: an opaque `{GET, SET(ttl), DELETE, REPLACE}`
/// interface, per the spec's treatment of the slab as an external
/// collaborator whose wire protocol is out of scope. `ttl <= 0` always
/// means "never expire" — the adapter boundary the spec's open question
/// asks for, rather than the original's backend-dependent ambiguity.
pub trait Slab: Send + Sync {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn set(&self, key: Vec<u8>, value: Vec<u8>, ttl_secs: i64);
    /// Returns whether the key was present before the delete.
    fn delete(&self, key: &[u8]) -> bool;
    /// `REPLACE(ttl=0)`: only succeeds if the key is already present.
    fn replace(&self, key: &[u8], value: Vec<u8>) -> bool;
}

/// A `dashmap`-backed reference slab. Expiry is checked lazily on access
/// rather than via a background sweep, which is sufficient for the
/// soft-state semantics the spec requires (a stale-but-unexpired read is
/// never a correctness issue here, only a freshness one already governed
/// by the policy engine).
#[derive(Default)]
pub struct InMemorySlab {
    entries: DashMap<Vec<u8>, Entry>,
}

impl InMemorySlab {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { entries: DashMap::new() })
    }

    fn deadline(ttl_secs: i64) -> Option<Instant> {
        if ttl_secs <= 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_secs(ttl_secs as u64))
        }
    }
}

impl Slab for InMemorySlab {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let expired = match self.entries.get(key) {
            Some(entry) => matches!(entry.expires_at, Some(deadline) if Instant::now() >= deadline),
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    fn set(&self, key: Vec<u8>, value: Vec<u8>, ttl_secs: i64) {
        self.entries.insert(key, Entry { value, expires_at: Self::deadline(ttl_secs) });
    }

    fn delete(&self, key: &[u8]) -> bool {
        self.entries.remove(key).is_some()
    }

    fn replace(&self, key: &[u8], value: Vec<u8>) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.value = value;
                entry.expires_at = None;
                true
            }
            None => false,
        }
    }
}

/// A trivial `deadpool` manager around the in-process slab: acquiring a
/// connection just clones the shared handle. This exists so the server
/// handler acquires/releases a pooled "slab connection" on every RPC path
/// the way it would against an out-of-process slab cluster, keeping the
/// handler code agnostic to whether the slab is in-process or remote.
pub struct SlabManager {
    slab: Arc<InMemorySlab>,
}

impl SlabManager {
    pub fn new(slab: Arc<InMemorySlab>) -> Self {
        Self { slab }
    }
}

#[async_trait::async_trait]
impl deadpool::managed::Manager for SlabManager {
    type Type = Arc<InMemorySlab>;
    type Error = std::convert::Infallible;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        Ok(self.slab.clone())
    }

    async fn recycle(
        &self,
        _conn: &mut Self::Type,
        _metrics: &deadpool::managed::Metrics,
    ) -> deadpool::managed::RecycleResult<Self::Error> {
        Ok(())
    }
}

pub type SlabPool = deadpool::managed::Pool<SlabManager>;

pub fn build_slab_pool(slab: Arc<InMemorySlab>, max_size: usize) -> SlabPool {
    deadpool::managed::Pool::builder(SlabManager::new(slab))
        .max_size(max_size.max(1))
        .build()
        .expect("slab pool configuration is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_zero_never_expires() {
        let slab = InMemorySlab::new();
        slab.set(b"k".to_vec(), b"v".to_vec(), 0);
        assert_eq!(slab.get(b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn negative_ttl_is_treated_as_never_expire() {
        let slab = InMemorySlab::new();
        slab.set(b"k".to_vec(), b"v".to_vec(), -1);
        assert_eq!(slab.get(b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn delete_reports_prior_presence() {
        let slab = InMemorySlab::new();
        assert!(!slab.delete(b"missing"));
        slab.set(b"k".to_vec(), b"v".to_vec(), 0);
        assert!(slab.delete(b"k"));
        assert!(!slab.delete(b"k"));
    }

    #[test]
    fn replace_requires_presence() {
        let slab = InMemorySlab::new();
        assert!(!slab.replace(b"missing", b"v".to_vec()));
        slab.set(b"k".to_vec(), b"v1".to_vec(), 0);
        assert!(slab.replace(b"k", b"v2".to_vec()));
        assert_eq!(slab.get(b"k"), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn pool_hands_out_the_shared_slab() {
        let slab = InMemorySlab::new();
        slab.set(b"k".to_vec(), b"v".to_vec(), 0);
        let pool = build_slab_pool(slab, 4);
        let conn = pool.get().await.unwrap();
        assert_eq!(conn.get(b"k"), Some(b"v".to_vec()));
    }
}
