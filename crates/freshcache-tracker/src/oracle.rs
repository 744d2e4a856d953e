use crate::{Tracker, NO_EVIDENCE};
use parking_lot::RwLock;
use std::collections::HashMap;

/// One operation in a pre-recorded trace, as the oracle needs to see it:
/// whether it was a write, and which key it touched.
#[derive(Debug, Clone)]
pub struct TraceOp {
    pub is_write: bool,
    pub key: Vec<u8>,
}

struct State {
    trace: Vec<TraceOp>,
    // For each key, the sorted indices into `trace` at which it appears,
    // so `ew` can binary-search for "the next occurrence after op_idx".
    indices_by_key: HashMap<Vec<u8>, Vec<usize>>,
}

fn index(trace: Vec<TraceOp>) -> State {
    let mut indices_by_key: HashMap<Vec<u8>, Vec<usize>> = HashMap::new();
    for (idx, op) in trace.iter().enumerate() {
        indices_by_key.entry(op.key.clone()).or_default().push(idx);
    }
    State {
        trace,
        indices_by_key,
    }
}

/// A tracker whose answers come from a future-knowledge source rather
/// than online counting: given the full trace ahead of time, `ew(key,
/// op_idx)` counts writes to `key` between `op_idx` and the next read of
/// `key`, used only to establish an evaluation ceiling for the other
/// variants. `record_read`/`record_write` are no-ops; the trace is fixed
/// at construction (or replaced via [`OracleTracker::load_trace`]).
pub struct OracleTracker {
    state: RwLock<State>,
}

impl OracleTracker {
    pub fn new(trace: Vec<TraceOp>) -> Self {
        Self {
            state: RwLock::new(index(trace)),
        }
    }

    pub fn load_trace(&self, trace: Vec<TraceOp>) {
        *self.state.write() = index(trace);
    }

    /// Expected writes between `op_idx` (exclusive) and the next read of
    /// `key`, or `NO_EVIDENCE` if `key` is never read again after `op_idx`.
    pub fn ew_at(&self, key: &[u8], op_idx: usize) -> f64 {
        let state = self.state.read();
        let Some(positions) = state.indices_by_key.get(key) else {
            return NO_EVIDENCE;
        };
        let start = positions.partition_point(|&p| p <= op_idx);
        let mut writes = 0u64;
        for &pos in &positions[start..] {
            if state.trace[pos].is_write {
                writes += 1;
            } else {
                return writes as f64;
            }
        }
        NO_EVIDENCE
    }
}

impl Tracker for OracleTracker {
    fn record_read(&self, _key: &[u8]) {}

    fn record_write(&self, _key: &[u8]) {}

    /// Without an explicit `op_idx`, the oracle answers as of the start of
    /// the trace. Callers that care about position should use
    /// [`OracleTracker::ew_at`] directly.
    fn ew(&self, key: &[u8]) -> f64 {
        self.ew_at(key, 0)
    }

    fn storage_bytes(&self) -> usize {
        let state = self.state.read();
        state.trace.len() * std::mem::size_of::<TraceOp>()
            + state
                .indices_by_key
                .iter()
                .map(|(k, v)| k.len() + v.len() * std::mem::size_of::<usize>())
                .sum::<usize>()
    }

    fn reconfigure(&self, _expected_num_keys: usize) {
        // Cardinality has no bearing on an exact future-knowledge tracker.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(is_write: bool, key: &str) -> TraceOp {
        TraceOp {
            is_write,
            key: key.as_bytes().to_vec(),
        }
    }

    #[test]
    fn counts_writes_until_next_read() {
        let trace = vec![
            op(true, "k"),  // 0
            op(true, "k"),  // 1
            op(false, "k"), // 2: read
            op(true, "k"),  // 3
        ];
        let oracle = OracleTracker::new(trace);
        assert_eq!(oracle.ew_at(b"k", 0), 2.0);
    }

    #[test]
    fn no_evidence_if_never_read_again() {
        let trace = vec![op(true, "k"), op(true, "k")];
        let oracle = OracleTracker::new(trace);
        assert_eq!(oracle.ew_at(b"k", 0), NO_EVIDENCE);
    }
}
