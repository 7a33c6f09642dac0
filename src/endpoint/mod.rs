//! Network endpoints as values, with a compact binary wire form.

pub mod addr;
pub mod error;
pub mod port;
mod wire;

pub use addr::Endpoint;
pub use error::{EndpointError, Result as EndpointResult};
pub use port::{Port, PortCounter};
