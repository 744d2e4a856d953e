use std::time::Duration;

/// One request from a trace: read or write `key`, `value_len` bytes,
/// `at` time since the start of the trace.
#[derive(Debug, Clone)]
pub struct TraceRecord {
    pub at: Duration,
    pub key: Vec<u8>,
    pub value_len: usize,
    pub is_write: bool,
}

/// Anything that can hand back a trace one record at a time. Concrete
/// parsing of a particular on-disk trace format (Twitter/Meta/Tencent/IBM/
/// WikiCDN-style logs) is outside this crate's scope; only the contract
/// plus a handful of synthetic generators live here.
pub trait RecordSource {
    fn next_record(&mut self) -> Option<TraceRecord>;
}

impl RecordSource for std::vec::IntoIter<TraceRecord> {
    fn next_record(&mut self) -> Option<TraceRecord> {
        self.next()
    }
}

/// Drain a `RecordSource` fully into memory, for sources (like the
/// synthetic generators) that are already bounded.
pub fn collect_all(mut source: impl RecordSource) -> Vec<TraceRecord> {
    let mut records = Vec::new();
    while let Some(record) = source.next_record() {
        records.push(record);
    }
    records
}
