//! Generated tonic/prost client and server stubs for the cache and
//! backing-store RPC surfaces. Nothing here is hand-written: see build.rs.

pub mod cache {
    tonic::include_proto!("freshcache.cache");
}

pub mod db {
    tonic::include_proto!("freshcache.db");
}
