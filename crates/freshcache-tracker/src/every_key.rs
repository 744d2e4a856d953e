use crate::{Tracker, NO_EVIDENCE};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default, Clone, Copy)]
struct KeyData {
    expected_writes: f64,
    num_writes_since_last_read: u64,
    num_samples: u64,
}

/// Maintains a streaming mean of "writes observed between consecutive
/// reads" per key. Each read folds the writes accumulated since the prior
/// read into the running mean and resets the window.
///
/// A run of consecutive reads with no intervening writes resets the
/// window to zero without touching the mean: that run genuinely carries
/// no new information about the key's write rate, so the estimate is left
/// alone rather than dragged toward zero.
pub struct EveryKeySampled {
    state: RwLock<HashMap<Vec<u8>, KeyData>>,
}

impl EveryKeySampled {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for EveryKeySampled {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracker for EveryKeySampled {
    fn record_read(&self, key: &[u8]) {
        let mut state = self.state.write();
        let data = state.entry(key.to_vec()).or_default();
        if data.num_writes_since_last_read > 0 {
            let total = data.expected_writes * data.num_samples as f64
                + data.num_writes_since_last_read as f64;
            data.num_samples += 1;
            data.expected_writes = total / data.num_samples as f64;
        }
        data.num_writes_since_last_read = 0;
    }

    fn record_write(&self, key: &[u8]) {
        let mut state = self.state.write();
        state.entry(key.to_vec()).or_default().num_writes_since_last_read += 1;
    }

    fn ew(&self, key: &[u8]) -> f64 {
        let state = self.state.read();
        match state.get(key) {
            Some(data) if data.num_samples > 0 => data.expected_writes,
            _ => NO_EVIDENCE,
        }
    }

    fn storage_bytes(&self) -> usize {
        let state = self.state.read();
        state
            .iter()
            .map(|(k, _)| k.len() + std::mem::size_of::<KeyData>())
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
    fn no_evidence_until_first_read_after_a_write() {
        let t = EveryKeySampled::new();
        t.record_write(b"k");
        t.record_write(b"k");
        assert_eq!(t.ew(b"k"), NO_EVIDENCE);
    }

    #[test]
    fn first_window_sets_the_mean() {
        let t = EveryKeySampled::new();
        t.record_write(b"k");
        t.record_write(b"k");
        t.record_read(b"k");
        assert_eq!(t.ew(b"k"), 2.0);
    }

    #[test]
    fn mean_updates_across_windows() {
        let t = EveryKeySampled::new();
        t.record_write(b"k");
        t.record_write(b"k");
        t.record_read(b"k"); // window of 2 -> mean 2.0
        t.record_write(b"k");
        t.record_write(b"k");
        t.record_write(b"k");
        t.record_write(b"k");
        t.record_read(b"k"); // window of 4 -> mean (2+4)/2 = 3.0
        assert_eq!(t.ew(b"k"), 3.0);
    }

    #[test]
    fn a_read_with_no_intervening_write_does_not_move_the_mean() {
        let t = EveryKeySampled::new();
        t.record_write(b"k");
        t.record_write(b"k");
        t.record_read(b"k"); // mean = 2.0
        t.record_read(b"k"); // no writes since last read: mean unchanged
        t.record_read(b"k");
        assert_eq!(t.ew(b"k"), 2.0);
    }
}
