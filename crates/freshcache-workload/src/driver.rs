use crate::record::TraceRecord;
use freshcache_client::{Client, Error};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

fn synthetic_value(key: &[u8], value_len: usize) -> Vec<u8> {
    let mut value = key.to_vec();
    value.resize(value_len.max(key.len()), b'a');
    value
}

/// Populates the backing store with every distinct key in `records`, then
/// pre-fills a `1 / warmup_factor` fraction of them straight into the
/// cache, bypassing the normal miss-fill path.
pub async fn warm_up(client: &Client, records: &[TraceRecord], warmup_factor: usize) -> Result<(), Error> {
    let warmup_factor = warmup_factor.max(1);
    let mut seen = HashSet::new();
    let mut distinct_keys = Vec::new();
    for record in records {
        if seen.insert(record.key.clone()) {
            distinct_keys.push((record.key.clone(), record.value_len));
        }
    }

    tracing::info!(distinct_keys = distinct_keys.len(), warmup_factor, "warming up backing store");
    for (key, value_len) in &distinct_keys {
        client.set(key.clone(), synthetic_value(key, *value_len)).await?;
    }

    let mut prefilled = 0usize;
    for (index, (key, value_len)) in distinct_keys.iter().enumerate() {
        if index % warmup_factor == 0 {
            client.cache().set_async(key.clone(), synthetic_value(key, *value_len), 0).await?;
            prefilled += 1;
        }
    }
    tracing::info!(prefilled, "warm-up complete");
    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReplayStats {
    pub requests_issued: u64,
    pub errors: u64,
}

/// Issues `records` in timestamp order, sleeping between records by the
/// inter-arrival gap (clamped to `[0, max_interval]` and scaled by
/// `interval_scale`), fanning the actual RPC work out across
/// `num_workers` concurrent tasks the way the reference driver spreads
/// requests over a worker-thread pool sized to hardware concurrency.
pub async fn replay(
    client: Arc<Client>,
    records: Vec<TraceRecord>,
    num_workers: usize,
    max_interval: Duration,
    interval_scale: f64,
) -> ReplayStats {
    let num_workers = num_workers.max(1);
    let (tx, rx) = mpsc::channel::<TraceRecord>(num_workers * 4);
    let rx = Arc::new(AsyncMutex::new(rx));

    let issued = Arc::new(AtomicU64::new(0));
    let errors = Arc::new(AtomicU64::new(0));

    let mut workers = Vec::with_capacity(num_workers);
    for _ in 0..num_workers {
        let rx = rx.clone();
        let client = client.clone();
        let issued = issued.clone();
        let errors = errors.clone();
        workers.push(tokio::spawn(async move {
            loop {
                let record = {
                    let mut guard = rx.lock().await;
                    guard.recv().await
                };
                let Some(record) = record else { break };
                issued.fetch_add(1, Ordering::Relaxed);
                let result = if record.is_write {
                    let value = synthetic_value(&record.key, record.value_len);
                    client.set(record.key, value).await.map(|_| ())
                } else {
                    client.get(record.key).await.map(|_| ())
                };
                if result.is_err() {
                    errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }

    let mut last_at = Duration::ZERO;
    for record in records {
        let gap = record.at.saturating_sub(last_at);
        last_at = record.at;
        let scaled = Duration::from_secs_f64((gap.as_secs_f64() * interval_scale).max(0.0));
        let sleep_for = scaled.min(max_interval);
        if !sleep_for.is_zero() {
            tokio::time::sleep(sleep_for).await;
        }
        if tx.send(record).await.is_err() {
            break;
        }
    }
    drop(tx);

    for worker in workers {
        let _ = worker.await;
    }

    let stats = ReplayStats {
        requests_issued: issued.load(Ordering::Relaxed),
        errors: errors.load(Ordering::Relaxed),
    };
    tracing::info!(?stats, "replay complete");
    stats
}
