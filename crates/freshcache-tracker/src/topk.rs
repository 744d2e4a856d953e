use crate::{Tracker, NO_EVIDENCE};
use freshcache_sketch::{epsilon_delta_for_cardinality, heavy_hitter_budget, CountMinSketch, TopKSketch};
use parking_lot::RwLock;

struct State {
    reads: TopKSketch,
    writes: TopKSketch,
}

/// Tracks read and write frequency each through their own top-K
/// heavy-hitter sketch: exact counters for the hottest `K = sqrt(|keys|)`
/// keys per stream, falling through to a cold count-min sketch otherwise.
///
/// `sample_cold` selects between `TopKSketch` (cold keys report `0`) and
/// `TopKSketchSample` (cold keys report the sketch's estimate).
pub struct TopKSketchTracker {
    state: RwLock<State>,
    sample_cold: bool,
}

impl TopKSketchTracker {
    pub fn new(expected_num_keys: usize, sample_cold: bool) -> Self {
        Self {
            state: RwLock::new(Self::build(expected_num_keys, sample_cold)),
            sample_cold,
        }
    }

    fn build(expected_num_keys: usize, sample_cold: bool) -> State {
        let eps_delta = epsilon_delta_for_cardinality(expected_num_keys);
        let k = heavy_hitter_budget(expected_num_keys);
        State {
            reads: TopKSketch::new(k, CountMinSketch::new(eps_delta, eps_delta, false), sample_cold),
            writes: TopKSketch::new(k, CountMinSketch::new(eps_delta, eps_delta, false), sample_cold),
        }
    }
}

impl Tracker for TopKSketchTracker {
    fn record_read(&self, key: &[u8]) {
        self.state.write().reads.increment(key);
    }

    fn record_write(&self, key: &[u8]) {
        self.state.write().writes.increment(key);
    }

    fn ew(&self, key: &[u8]) -> f64 {
        let state = self.state.read();
        let reads = state.reads.get_count(key);
        if reads == 0 {
            return NO_EVIDENCE;
        }
        state.writes.get_count(key) as f64 / reads as f64
    }

    fn storage_bytes(&self) -> usize {
        let state = self.state.read();
        state.reads.storage_bytes() + state.writes.storage_bytes()
    }

    fn reconfigure(&self, expected_num_keys: usize) {
        *self.state.write() = Self::build(expected_num_keys, self.sample_cold);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_key_has_no_evidence() {
        let t = TopKSketchTracker::new(100, false);
        assert_eq!(t.ew(b"never-seen"), NO_EVIDENCE);
    }

    #[test]
    fn heavy_hitter_ratio_is_exact_while_resident_in_top_k() {
        let t = TopKSketchTracker::new(4, false);
        for _ in 0..6 {
            t.record_write(b"hot");
        }
        t.record_read(b"hot");
        assert_eq!(t.ew(b"hot"), 6.0);
    }
}
