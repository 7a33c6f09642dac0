use thiserror::Error;

/// Errors from endpoint construction, resolution, and the wire codec.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("address is nil")]
    NilAddress,

    #[error("short buffer: field needs {needed} bytes, {remaining} remaining")]
    ShortBuffer { needed: usize, remaining: usize },

    #[error("field of {len} bytes exceeds the 255-byte frame limit")]
    OversizedField { len: usize },

    #[error("zone is not valid UTF-8")]
    InvalidZone,

    #[error("failed to resolve address {addr}: {source}")]
    Resolve {
        addr: String,
        source: std::io::Error,
    },

    #[error("address {addr} resolved to no endpoints")]
    NoAddresses { addr: String },
}

pub type Result<T> = std::result::Result<T, EndpointError>;
