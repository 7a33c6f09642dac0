use thiserror::Error;

use crate::endpoint::EndpointError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Fatal to the construction attempt; there is no internal retry.
    #[error("failed to bind UDP socket: {0}")]
    Bind(#[source] std::io::Error),

    /// The distinguished use-after-close condition: the socket handle has
    /// been released and every further operation on it fails with this.
    #[error("socket is not open")]
    NotOpen,

    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error("network I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
