use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Euler's number, used to size sketch width from an error bound `epsilon`.
const E: f64 = std::f64::consts::E;

/// A `d x w` counter grid with `d` independent hashes, giving a one-sided
/// error estimator: `estimate(k)` is never less than the true count.
///
/// Width and depth follow the standard sizing `w = ceil(e / epsilon)`,
/// `d = ceil(ln(1 / delta))`. Hashes are `d` independently seeded xxh3
/// digests of the key, each folded into `[0, w)`.
#[derive(Debug, Clone)]
pub struct CountMinSketch {
    width: usize,
    depth: usize,
    conservative: bool,
    rows: Vec<Vec<u32>>,
    seeds: Vec<u64>,
}

impl CountMinSketch {
    /// Build a sketch sized for the given error bound `epsilon` and failure
    /// probability `delta`, in either standard or conservative-update mode.
    pub fn new(epsilon: f64, delta: f64, conservative: bool) -> Self {
        assert!(epsilon > 0.0 && epsilon < 1.0, "epsilon must be in (0, 1)");
        assert!(delta > 0.0 && delta < 1.0, "delta must be in (0, 1)");
        let width = (E / epsilon).ceil().max(1.0) as usize;
        let depth = (1.0_f64 / delta).ln().ceil().max(1.0) as usize;
        Self::with_dimensions(width, depth, conservative)
    }

    /// Build a sketch with an explicit width/depth, bypassing the
    /// epsilon/delta sizing formula. Used by trackers that derive
    /// epsilon = delta = 1/sqrt(expected_num_keys) per the spec, and by
    /// tests that want small, deterministic dimensions.
    pub fn with_dimensions(width: usize, depth: usize, conservative: bool) -> Self {
        let width = width.max(1);
        let depth = depth.max(1);
        let seeds: Vec<u64> = (0..depth as u64).map(|i| 0x9E3779B97F4A7C15u64 ^ (i.wrapping_mul(0xBF58476D1CE4E5B9))).collect();
        Self {
            width,
            depth,
            conservative,
            rows: vec![vec![0u32; width]; depth],
            seeds,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_conservative(&self) -> bool {
        self.conservative
    }

    fn slot(&self, row: usize, key: &[u8]) -> usize {
        let h = xxh3_64_with_seed(key, self.seeds[row]);
        (h as usize) % self.width
    }

    fn slots(&self, key: &[u8]) -> Vec<usize> {
        (0..self.depth).map(|row| self.slot(row, key)).collect()
    }

    /// Add `count` occurrences of `key`. In conservative mode, only rows
    /// currently at the minimum value are incremented, which tightens the
    /// overestimation bound at the cost of a read-before-write per row.
    pub fn increment(&mut self, key: &[u8], count: u32) {
        let slots = self.slots(key);
        if self.conservative {
            let min = slots
                .iter()
                .enumerate()
                .map(|(row, &s)| self.rows[row][s])
                .min()
                .unwrap_or(0);
            for (row, s) in slots.into_iter().enumerate() {
                if self.rows[row][s] == min {
                    self.rows[row][s] = self.rows[row][s].saturating_add(count);
                }
            }
        } else {
            for (row, s) in slots.into_iter().enumerate() {
                self.rows[row][s] = self.rows[row][s].saturating_add(count);
            }
        }
    }

    /// Subtract `count` occurrences of `key` from every row, unconditionally.
    /// Used by the top-K sketch to claw back counters for a key that is
    /// promoted into the exact top-K map.
    pub fn decrement(&mut self, key: &[u8], count: u32) {
        for (row, s) in self.slots(key).into_iter().enumerate() {
            self.rows[row][s] = self.rows[row][s].saturating_sub(count);
        }
    }

    /// `min` over all rows of the counter at the key's slot: a one-sided
    /// overestimate of the true count.
    pub fn estimate(&self, key: &[u8]) -> u32 {
        self.slots(key)
            .into_iter()
            .enumerate()
            .map(|(row, s)| self.rows[row][s])
            .min()
            .unwrap_or(0)
    }

    /// Self-reported memory footprint in bytes, for evaluation purposes.
    pub fn storage_bytes(&self) -> usize {
        self.rows.len() * self.width * std::mem::size_of::<u32>()
            + self.seeds.len() * std::mem::size_of::<u64>()
    }

    pub fn clear(&mut self) {
        for row in &mut self.rows {
            row.iter_mut().for_each(|c| *c = 0);
        }
    }
}

/// Derive `epsilon = delta = 1 / sqrt(max(expected_num_keys, 1))`, the
/// sizing rule the tracker family uses when reconfiguring for a target
/// cardinality.
pub fn epsilon_delta_for_cardinality(expected_num_keys: usize) -> f64 {
    1.0 / (expected_num_keys.max(1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::collections::HashMap;

    #[test]
    fn estimate_zero_for_unseen_key() {
        let sketch = CountMinSketch::with_dimensions(16, 4, false);
        assert_eq!(sketch.estimate(b"nope"), 0);
    }

    #[test]
    fn standard_update_never_underestimates() {
        let mut sketch = CountMinSketch::with_dimensions(8, 3, false);
        let keys: Vec<&[u8]> = vec![b"a", b"b", b"c", b"d", b"e"];
        let mut truth: HashMap<&[u8], u32> = HashMap::new();
        for (i, k) in keys.iter().cycle().take(200).enumerate() {
            let c = (i % 3) as u32 + 1;
            sketch.increment(k, c);
            *truth.entry(*k).or_insert(0) += c;
        }
        for (k, count) in truth {
            assert!(sketch.estimate(k) >= count, "estimate underestimated true count");
        }
    }

    #[test]
    fn conservative_update_never_underestimates() {
        let mut sketch = CountMinSketch::with_dimensions(8, 3, true);
        let mut truth: HashMap<&[u8], u32> = HashMap::new();
        for k in [b"x".as_slice(), b"y".as_slice(), b"z".as_slice()].iter().cycle().take(150) {
            sketch.increment(k, 1);
            *truth.entry(*k).or_insert(0) += 1;
        }
        for (k, count) in truth {
            assert!(sketch.estimate(k) >= count);
        }
    }

    #[test]
    fn conservative_is_never_larger_than_standard() {
        let mut standard = CountMinSketch::with_dimensions(8, 3, false);
        let mut conservative = CountMinSketch::with_dimensions(8, 3, true);
        for k in [b"p".as_slice(), b"q".as_slice(), b"r".as_slice()].iter().cycle().take(300) {
            standard.increment(k, 1);
            conservative.increment(k, 1);
        }
        for k in [b"p".as_slice(), b"q".as_slice(), b"r".as_slice()] {
            assert!(conservative.estimate(k) <= standard.estimate(k));
        }
    }

    #[quickcheck]
    fn one_sided_error_holds_for_random_streams(raw_keys: Vec<u8>) -> bool {
        if raw_keys.is_empty() {
            return true;
        }
        let mut sketch = CountMinSketch::with_dimensions(32, 4, false);
        let mut truth: HashMap<u8, u32> = HashMap::new();
        for &b in &raw_keys {
            sketch.increment(&[b], 1);
            *truth.entry(b).or_insert(0) += 1;
        }
        truth.into_iter().all(|(b, count)| sketch.estimate(&[b]) >= count)
    }

    #[test]
    fn epsilon_delta_sizing_shrinks_with_cardinality() {
        assert!(epsilon_delta_for_cardinality(100) < epsilon_delta_for_cardinality(10));
    }
}
