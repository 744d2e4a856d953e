use thiserror::Error;

/// Client-side error surface. Transient transport errors on backing-store
/// reads are retried internally (see [`crate::retry::GetRetryPolicy`]);
/// everything else surfaces to the caller once.
#[derive(Debug, Error)]
pub enum Error {
    #[error("rpc failed: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("no cache shards configured")]
    NoShards,

    #[error("backing-store read timed out after {0} attempt(s)")]
    Timeout(u32),

    #[error("request cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
