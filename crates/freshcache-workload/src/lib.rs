//! The trace-record contract the core depends on (but does not
//! implement), a handful of synthetic generators sufficient to drive it
//! without a real trace file, and the warm-up + replay driver.

mod driver;
mod generators;
mod record;
mod zipf;

pub use driver::{replay, warm_up, ReplayStats};
pub use generators::{ConstantRateGenerator, ZipfPoissonGenerator};
pub use record::{collect_all, RecordSource, TraceRecord};
pub use zipf::FastZipf;
