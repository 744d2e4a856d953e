use crate::{Tracker, NO_EVIDENCE};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default, Clone, Copy)]
struct Counts {
    reads: u64,
    writes: u64,
}

/// Stores `(num_reads, num_writes)` per key in an ordinary hash map.
/// `EW = writes / reads`, `NO_EVIDENCE` if either is zero. Exact, with
/// memory proportional to the number of distinct keys ever observed.
pub struct ExactPerKey {
    state: RwLock<HashMap<Vec<u8>, Counts>>,
}

impl ExactPerKey {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for ExactPerKey {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracker for ExactPerKey {
    fn record_read(&self, key: &[u8]) {
        let mut state = self.state.write();
        state.entry(key.to_vec()).or_default().reads += 1;
    }

    fn record_write(&self, key: &[u8]) {
        let mut state = self.state.write();
        state.entry(key.to_vec()).or_default().writes += 1;
    }

    fn ew(&self, key: &[u8]) -> f64 {
        let state = self.state.read();
        match state.get(key) {
            Some(c) if c.reads > 0 && c.writes > 0 => c.writes as f64 / c.reads as f64,
            _ => NO_EVIDENCE,
        }
    }

    fn storage_bytes(&self) -> usize {
        let state = self.state.read();
        state
            .iter()
            .map(|(k, _)| k.len() + std::mem::size_of::<Counts>())
            .sum()
    }

    fn reconfigure(&self, _expected_num_keys: usize) {
        self.state.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_evidence_before_any_read() {
        let t = ExactPerKey::new();
        t.record_write(b"k");
        assert_eq!(t.ew(b"k"), NO_EVIDENCE);
    }

    #[test]
    fn ratio_of_writes_to_reads() {
        let t = ExactPerKey::new();
        t.record_write(b"k");
        t.record_write(b"k");
        t.record_write(b"k");
        t.record_read(b"k");
        assert_eq!(t.ew(b"k"), 3.0);
    }

    #[test]
    fn reconfigure_clears_state() {
        let t = ExactPerKey::new();
        t.record_write(b"k");
        t.record_read(b"k");
        t.reconfigure(100);
        assert_eq!(t.ew(b"k"), NO_EVIDENCE);
    }
}
