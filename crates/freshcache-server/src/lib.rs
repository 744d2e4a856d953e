//! Server-side handlers for the cache and backing-store gRPC services, the
//! in-memory slab they sit on top of, and the freshness-policy dispatch
//! that runs on every backing-store write.

mod cache_service;
mod config;
mod db_service;
mod slab;

pub use cache_service::CacheServiceImpl;
pub use config::{CacheServerArgs, DbServerArgs};
pub use db_service::DbServiceImpl;
pub use slab::{build_slab_pool, InMemorySlab, Slab, SlabManager, SlabPool};
