//! Shared bootstrap code (logging, metrics) for the three freshcache
//! binaries; the binaries themselves live under `src/bin/`.

pub mod logging;
pub mod metrics_server;
