use crate::{Tracker, NO_EVIDENCE};
use freshcache_sketch::{epsilon_delta_for_cardinality, CountMinSketch};
use parking_lot::RwLock;

struct State {
    reads: CountMinSketch,
    writes: CountMinSketch,
}

/// Two count-min sketches, one for reads and one for writes.
/// `EW(k) = estimate_writes(k) / estimate_reads(k)`, `NO_EVIDENCE` if no
/// reads have been observed for `k`. `conservative` selects whether both
/// sketches use conservative updates (`MinSketchConservative`) or
/// standard ones (`MinSketch`).
pub struct MinSketchTracker {
    state: RwLock<State>,
    conservative: bool,
}

impl MinSketchTracker {
    pub fn new(expected_num_keys: usize, conservative: bool) -> Self {
        let eps_delta = epsilon_delta_for_cardinality(expected_num_keys);
        Self {
            state: RwLock::new(State {
                reads: CountMinSketch::new(eps_delta, eps_delta, conservative),
                writes: CountMinSketch::new(eps_delta, eps_delta, conservative),
            }),
            conservative,
        }
    }
}

impl Tracker for MinSketchTracker {
    fn record_read(&self, key: &[u8]) {
        self.state.write().reads.increment(key, 1);
    }

    fn record_write(&self, key: &[u8]) {
        self.state.write().writes.increment(key, 1);
    }

    fn ew(&self, key: &[u8]) -> f64 {
        let state = self.state.read();
        let reads = state.reads.estimate(key);
        if reads == 0 {
            return NO_EVIDENCE;
        }
        state.writes.estimate(key) as f64 / reads as f64
    }

    fn storage_bytes(&self) -> usize {
        let state = self.state.read();
        state.reads.storage_bytes() + state.writes.storage_bytes()
    }

    fn reconfigure(&self, expected_num_keys: usize) {
        let eps_delta = epsilon_delta_for_cardinality(expected_num_keys);
        let mut state = self.state.write();
        state.reads = CountMinSketch::new(eps_delta, eps_delta, self.conservative);
        state.writes = CountMinSketch::new(eps_delta, eps_delta, self.conservative);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_evidence_without_reads() {
        let t = MinSketchTracker::new(1_000, false);
        t.record_write(b"k");
        assert_eq!(t.ew(b"k"), NO_EVIDENCE);
    }

    #[test]
    fn estimate_ratio_tracks_ground_truth_for_a_hot_key() {
        let t = MinSketchTracker::new(1_000, false);
        for _ in 0..10 {
            t.record_write(b"hot");
        }
        t.record_read(b"hot");
        // Count-min is one-sided: the ratio can only be >= the true 10.0.
        assert!(t.ew(b"hot") >= 10.0);
    }

    #[test]
    fn conservative_variant_never_underestimates_either_sketch() {
        let t = MinSketchTracker::new(1_000, true);
        for _ in 0..5 {
            t.record_write(b"k");
        }
        t.record_read(b"k");
        assert!(t.ew(b"k") >= 5.0);
    }
}
