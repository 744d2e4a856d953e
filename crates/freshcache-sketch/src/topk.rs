use crate::count_min::CountMinSketch;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Exact counters for the `K` hottest keys observed, backed by a count-min
/// sketch for everything else. Admission follows the spec's eviction rule:
/// a candidate displaces the current minimum whenever its sketch estimate
/// is at least the minimum's count, with ties resolved in the candidate's
/// favor.
///
/// `sample_cold` selects between the two tracker-facing variants: when
/// `false`, keys that never made it into the top-K report a count of zero
/// (`TopKSketch`); when `true`, they fall back to the sketch's estimate
/// (`TopKSketchSample`).
#[derive(Debug, Clone)]
pub struct TopKSketch {
    k: usize,
    sample_cold: bool,
    sketch: CountMinSketch,
    top_k: HashMap<Vec<u8>, u32>,
    // Lazily-deleted min-heap: entries may be stale (superseded by a newer
    // count for the same key in `top_k`); `peek_min` filters those out.
    heap: BinaryHeap<Reverse<(u32, Vec<u8>)>>,
}

impl TopKSketch {
    pub fn new(k: usize, sketch: CountMinSketch, sample_cold: bool) -> Self {
        Self {
            k,
            sample_cold,
            sketch,
            top_k: HashMap::new(),
            heap: BinaryHeap::new(),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.top_k.len()
    }

    pub fn is_empty(&self) -> bool {
        self.top_k.is_empty()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.top_k.contains_key(key)
    }

    /// Pop stale heap entries until the true current minimum surfaces,
    /// leaving it on the heap. Returns `None` if the top-K map is empty.
    fn peek_min(&mut self) -> Option<(u32, Vec<u8>)> {
        while let Some(Reverse((count, key))) = self.heap.peek().cloned() {
            match self.top_k.get(&key) {
                Some(&current) if current == count => return Some((count, key)),
                _ => {
                    self.heap.pop();
                }
            }
        }
        None
    }

    pub fn increment(&mut self, key: &[u8]) {
        if let Some(c) = self.top_k.get_mut(key) {
            *c += 1;
            self.heap.push(Reverse((*c, key.to_vec())));
            return;
        }

        if self.top_k.len() < self.k {
            let c = self.sketch.estimate(key);
            self.sketch.decrement(key, c);
            let new_count = c + 1;
            self.top_k.insert(key.to_vec(), new_count);
            self.heap.push(Reverse((new_count, key.to_vec())));
            return;
        }

        let c = self.sketch.estimate(key);
        match self.peek_min() {
            Some((m, min_key)) if c >= m => {
                let evicted_count = self.top_k.remove(&min_key).unwrap_or(0);
                self.sketch.increment(&min_key, evicted_count);
                let new_count = c + 1;
                self.top_k.insert(key.to_vec(), new_count);
                self.heap.push(Reverse((new_count, key.to_vec())));
            }
            _ => {
                self.sketch.increment(key, 1);
            }
        }
    }

    /// Exact count if `key` is a tracked heavy hitter; otherwise `0` or the
    /// sketch's (over-)estimate depending on `sample_cold`.
    pub fn get_count(&self, key: &[u8]) -> u32 {
        if let Some(&c) = self.top_k.get(key) {
            return c;
        }
        if self.sample_cold {
            self.sketch.estimate(key)
        } else {
            0
        }
    }

    pub fn storage_bytes(&self) -> usize {
        self.sketch.storage_bytes()
            + self
                .top_k
                .iter()
                .map(|(k, _)| k.len() + std::mem::size_of::<u32>())
                .sum::<usize>()
            + self.heap.len() * std::mem::size_of::<(u32, Vec<u8>)>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(k: usize, sample_cold: bool) -> TopKSketch {
        TopKSketch::new(k, CountMinSketch::with_dimensions(32, 3, false), sample_cold)
    }

    #[test]
    fn admits_heavy_hitters_up_to_k() {
        let mut topk = fresh(2, false);
        for k in [b"a".as_slice(), b"a", b"a", b"b", b"b", b"c"] {
            topk.increment(k);
        }
        assert_eq!(topk.len(), 2);
        assert!(topk.contains(b"a"));
        assert!(topk.contains(b"b"));
        assert!(!topk.contains(b"c"));
        assert_eq!(topk.get_count(b"a"), 3);
        assert_eq!(topk.get_count(b"b"), 2);
    }

    #[test]
    fn cold_key_returns_zero_in_strict_variant() {
        let mut topk = fresh(2, false);
        for k in [b"a".as_slice(), b"a", b"a", b"b", b"b", b"c"] {
            topk.increment(k);
        }
        assert_eq!(topk.get_count(b"c"), 0);
    }

    #[test]
    fn cold_key_returns_sketch_estimate_in_sample_variant() {
        let mut topk = fresh(2, true);
        for k in [b"a".as_slice(), b"a", b"a", b"b", b"b", b"c"] {
            topk.increment(k);
        }
        assert_eq!(topk.get_count(b"c"), 1);
    }

    #[test]
    fn size_never_exceeds_k() {
        let mut topk = fresh(3, false);
        let keys: Vec<Vec<u8>> = (0..50).map(|i| format!("key-{i}").into_bytes()).collect();
        for k in keys.iter().cycle().take(500) {
            topk.increment(k);
            assert!(topk.len() <= 3);
        }
    }

    #[test]
    fn tie_prefers_incoming_key() {
        // K=1: "a" occupies the single slot at count 1. "b" then
        // accumulates in the cold sketch until its estimate ties the
        // incumbent's count, at which point the tie-break rule admits it.
        let mut topk = fresh(1, false);
        topk.increment(b"a");
        assert!(topk.contains(b"a"));

        topk.increment(b"b"); // sketch estimate for b was 0, loses to a's 1
        assert!(topk.contains(b"a"));
        assert!(!topk.contains(b"b"));

        topk.increment(b"b"); // sketch estimate for b is now 1, ties a's 1
        assert!(topk.contains(b"b"));
        assert!(!topk.contains(b"a"));
        assert_eq!(topk.get_count(b"b"), 2);
    }
}
