//! The EW tracker family: online estimators of per-key expected-writes-
//! between-reads, exposed through one uniform trait so the policy engine
//! never needs to know which variant backs a given deployment.

mod every_key;
mod exact;
mod min_sketch;
mod oracle;
mod topk;

pub use every_key::EveryKeySampled;
pub use exact::ExactPerKey;
pub use min_sketch::MinSketchTracker;
pub use oracle::{OracleTracker, TraceOp};
pub use topk::TopKSketchTracker;

/// Sentinel returned by `ew()` meaning "no evidence observed for this key
/// yet" — the policy engine treats this the same as a cold key and always
/// invalidates.
pub const NO_EVIDENCE: f64 = -1.0;

/// Uniform query interface implemented by every tracker variant.
///
/// Implementations are shared across all client worker threads (held
/// behind an `Arc`), and must therefore be `Send + Sync`: writers
/// (`record_read`, `record_write`, `reconfigure`) take an internal lock
/// exclusively, readers (`ew`, `storage_bytes`) take it shared. The
/// tracker never errors; a degraded estimate under contention or after a
/// `reconfigure` reset is expected behavior, not a fault.
pub trait Tracker: Send + Sync {
    /// Observe a read of `key`.
    fn record_read(&self, key: &[u8]);

    /// Observe a write of `key`.
    fn record_write(&self, key: &[u8]);

    /// Current expected-writes-between-reads estimate for `key`, or
    /// [`NO_EVIDENCE`] if the tracker has nothing to go on.
    fn ew(&self, key: &[u8]) -> f64;

    /// Self-reported memory footprint, for evaluation.
    fn storage_bytes(&self) -> usize;

    /// Rebuild internal structures sized for a target cardinality. Any
    /// history accumulated before the call may be discarded.
    fn reconfigure(&self, expected_num_keys: usize);
}

/// Selects which tracker variant a deployment runs, mirroring the
/// `tracker_kind` configuration option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TrackerKind {
    Exact,
    EveryKey,
    MinSketch,
    MinSketchConservative,
    TopKSketch,
    TopKSketchSample,
    Oracle,
}

/// A tagged union over the tracker variants, so a deployment can select
/// one at runtime (via `TrackerKind`) without reaching for trait objects
/// or deep inheritance.
pub enum AnyTracker {
    Exact(ExactPerKey),
    EveryKey(EveryKeySampled),
    MinSketch(MinSketchTracker),
    MinSketchConservative(MinSketchTracker),
    TopKSketch(TopKSketchTracker),
    TopKSketchSample(TopKSketchTracker),
    Oracle(OracleTracker),
}

impl AnyTracker {
    /// Build the tracker named by `kind`, sized for `expected_num_keys`.
    /// The `Oracle` variant starts with an empty trace; call
    /// [`AnyTracker::load_oracle_trace`] before querying it meaningfully.
    pub fn new(kind: TrackerKind, expected_num_keys: usize) -> Self {
        match kind {
            TrackerKind::Exact => AnyTracker::Exact(ExactPerKey::new()),
            TrackerKind::EveryKey => AnyTracker::EveryKey(EveryKeySampled::new()),
            TrackerKind::MinSketch => {
                AnyTracker::MinSketch(MinSketchTracker::new(expected_num_keys, false))
            }
            TrackerKind::MinSketchConservative => {
                AnyTracker::MinSketchConservative(MinSketchTracker::new(expected_num_keys, true))
            }
            TrackerKind::TopKSketch => {
                AnyTracker::TopKSketch(TopKSketchTracker::new(expected_num_keys, false))
            }
            TrackerKind::TopKSketchSample => {
                AnyTracker::TopKSketchSample(TopKSketchTracker::new(expected_num_keys, true))
            }
            TrackerKind::Oracle => AnyTracker::Oracle(OracleTracker::new(Vec::new())),
        }
    }

    /// Replace the oracle's future-knowledge trace. No-op on other variants.
    pub fn load_oracle_trace(&self, trace: Vec<TraceOp>) {
        if let AnyTracker::Oracle(o) = self {
            o.load_trace(trace);
        }
    }
}

impl Tracker for AnyTracker {
    fn record_read(&self, key: &[u8]) {
        match self {
            AnyTracker::Exact(t) => t.record_read(key),
            AnyTracker::EveryKey(t) => t.record_read(key),
            AnyTracker::MinSketch(t) => t.record_read(key),
            AnyTracker::MinSketchConservative(t) => t.record_read(key),
            AnyTracker::TopKSketch(t) => t.record_read(key),
            AnyTracker::TopKSketchSample(t) => t.record_read(key),
            AnyTracker::Oracle(t) => t.record_read(key),
        }
    }

    fn record_write(&self, key: &[u8]) {
        match self {
            AnyTracker::Exact(t) => t.record_write(key),
            AnyTracker::EveryKey(t) => t.record_write(key),
            AnyTracker::MinSketch(t) => t.record_write(key),
            AnyTracker::MinSketchConservative(t) => t.record_write(key),
            AnyTracker::TopKSketch(t) => t.record_write(key),
            AnyTracker::TopKSketchSample(t) => t.record_write(key),
            AnyTracker::Oracle(t) => t.record_write(key),
        }
    }

    fn ew(&self, key: &[u8]) -> f64 {
        match self {
            AnyTracker::Exact(t) => t.ew(key),
            AnyTracker::EveryKey(t) => t.ew(key),
            AnyTracker::MinSketch(t) => t.ew(key),
            AnyTracker::MinSketchConservative(t) => t.ew(key),
            AnyTracker::TopKSketch(t) => t.ew(key),
            AnyTracker::TopKSketchSample(t) => t.ew(key),
            AnyTracker::Oracle(t) => t.ew(key),
        }
    }

    fn storage_bytes(&self) -> usize {
        match self {
            AnyTracker::Exact(t) => t.storage_bytes(),
            AnyTracker::EveryKey(t) => t.storage_bytes(),
            AnyTracker::MinSketch(t) => t.storage_bytes(),
            AnyTracker::MinSketchConservative(t) => t.storage_bytes(),
            AnyTracker::TopKSketch(t) => t.storage_bytes(),
            AnyTracker::TopKSketchSample(t) => t.storage_bytes(),
            AnyTracker::Oracle(t) => t.storage_bytes(),
        }
    }

    fn reconfigure(&self, expected_num_keys: usize) {
        match self {
            AnyTracker::Exact(t) => t.reconfigure(expected_num_keys),
            AnyTracker::EveryKey(t) => t.reconfigure(expected_num_keys),
            AnyTracker::MinSketch(t) => t.reconfigure(expected_num_keys),
            AnyTracker::MinSketchConservative(t) => t.reconfigure(expected_num_keys),
            AnyTracker::TopKSketch(t) => t.reconfigure(expected_num_keys),
            AnyTracker::TopKSketchSample(t) => t.reconfigure(expected_num_keys),
            AnyTracker::Oracle(t) => t.reconfigure(expected_num_keys),
        }
    }
}
