use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Gates RPC issue with a bounded `in_flight` counter. Below the limit,
/// acquiring a permit is a single atomic decrement (the semaphore's fast
/// path); at the limit, callers suspend until a completion releases a
/// permit, standing in for the original's condition-variable wait.
pub struct Backpressure {
    semaphore: Arc<Semaphore>,
    limit: usize,
    high_water_mark: AtomicUsize,
}

impl Backpressure {
    pub fn new(limit: usize) -> Self {
        assert!(limit > 0, "backpressure limit must be positive");
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            high_water_mark: AtomicUsize::new(0),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Block (without spinning) until a slot is free, then hold it until
    /// the returned permit is dropped.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("backpressure semaphore is never closed");
        let in_flight = self.limit - self.semaphore.available_permits();
        self.high_water_mark.fetch_max(in_flight, Ordering::Relaxed);
        permit
    }

    /// Highest observed `in_flight` count since construction. Exposed for
    /// the backpressure test property (`in_flight <= MAX_CONCURRENT_RPCS`).
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn high_water_mark_never_exceeds_the_limit() {
        let bp = Arc::new(Backpressure::new(8));
        let observed = Arc::new(StdAtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..(8 + 50) {
            let bp = bp.clone();
            let observed = observed.clone();
            handles.push(tokio::spawn(async move {
                let _permit = bp.acquire().await;
                observed.fetch_max(bp.in_flight(), Ordering::Relaxed);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(bp.high_water_mark() <= 8);
        assert!(observed.load(Ordering::Relaxed) <= 8);
    }
}
