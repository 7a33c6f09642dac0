//! Datagram server: one bound socket, one receive loop, concurrent sends.

pub mod error;
pub mod handler;
pub mod udp;

pub use error::{Result as ServerResult, ServerError};
pub use handler::PacketHandler;
pub use udp::{Server, MAX_DATAGRAM_LEN};
