use crate::record::{RecordSource, TraceRecord};
use crate::zipf::FastZipf;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use std::time::Duration;

fn key_for_rank(rank: usize) -> Vec<u8> {
    format!("key{rank}").into_bytes()
}

/// Fixed inter-arrival interval, uniformly distributed keys, a
/// configurable read/write mix. The simplest of the synthetic sources,
/// useful for deterministic unit and integration tests.
pub struct ConstantRateGenerator {
    remaining: usize,
    elapsed: Duration,
    interval: Duration,
    num_keys: usize,
    value_len: usize,
    write_ratio: f64,
    rng: rand::rngs::SmallRng,
}

impl ConstantRateGenerator {
    pub fn new(
        num_records: usize,
        interval: Duration,
        num_keys: usize,
        value_len: usize,
        write_ratio: f64,
        seed: u64,
    ) -> Self {
        Self {
            remaining: num_records,
            elapsed: Duration::ZERO,
            interval,
            num_keys: num_keys.max(1),
            value_len,
            write_ratio,
            rng: rand::rngs::SmallRng::seed_from_u64(seed),
        }
    }
}

impl RecordSource for ConstantRateGenerator {
    fn next_record(&mut self) -> Option<TraceRecord> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let rank = self.rng.gen_range(0..self.num_keys);
        let is_write = self.rng.gen_bool(self.write_ratio.clamp(0.0, 1.0));
        let record = TraceRecord {
            at: self.elapsed,
            key: key_for_rank(rank),
            value_len: self.value_len,
            is_write,
        };
        self.elapsed += self.interval;
        Some(record)
    }
}

/// Zipf-distributed keys with Poisson-process inter-arrivals, grounded on
/// the reference generator's `PoissonWorkload`: a `FastZipf` over `[1,
/// num_keys]` picks the key, an exponential distribution with rate
/// `lambda` picks the gap to the next request, and a per-key modulo rule
/// skews roughly a third of the key space towards writes rather than
/// reads, so hot-key read/write asymmetry is present in the synthetic
/// trace the same way it is in the original benchmark.
pub struct ZipfPoissonGenerator {
    remaining: usize,
    elapsed: Duration,
    zipf: FastZipf,
    exp: Exp<f64>,
    value_len: usize,
    rng: rand::rngs::SmallRng,
}

impl ZipfPoissonGenerator {
    pub fn new(num_records: usize, alpha: f64, lambda: f64, num_keys: usize, value_len: usize, seed: u64) -> Self {
        Self {
            remaining: num_records,
            elapsed: Duration::ZERO,
            zipf: FastZipf::new(alpha, num_keys.max(1)),
            exp: Exp::new(lambda).expect("lambda must be positive"),
            value_len,
            rng: rand::rngs::SmallRng::seed_from_u64(seed),
        }
    }
}

impl RecordSource for ZipfPoissonGenerator {
    fn next_record(&mut self) -> Option<TraceRecord> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let rank = self.zipf.sample(&mut self.rng);
        let is_write = if rank % 3 < 2 {
            self.rng.gen_range(0..100) >= 90
        } else {
            self.rng.gen_range(0..100) < 90
        };
        let gap_secs = self.exp.sample(&mut self.rng);
        let record = TraceRecord {
            at: self.elapsed,
            key: key_for_rank(rank),
            value_len: self.value_len,
            is_write,
        };
        self.elapsed += Duration::from_secs_f64(gap_secs);
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_rate_is_exhausted_after_num_records() {
        let mut gen = ConstantRateGenerator::new(5, Duration::from_millis(10), 3, 16, 0.5, 1);
        let records: Vec<_> = std::iter::from_fn(|| gen.next_record()).collect();
        assert_eq!(records.len(), 5);
        assert!(records.windows(2).all(|w| w[1].at >= w[0].at));
    }

    #[test]
    fn zipf_poisson_timestamps_are_nondecreasing() {
        let mut gen = ZipfPoissonGenerator::new(200, 1.1, 5.0, 50, 16, 42);
        let records: Vec<_> = std::iter::from_fn(|| gen.next_record()).collect();
        assert_eq!(records.len(), 200);
        assert!(records.windows(2).all(|w| w[1].at >= w[0].at));
    }
}
