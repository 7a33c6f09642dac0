//! udplink - minimal UDP transport layer
//!
//! Endpoints as plain values with a compact binary wire form for carrying
//! addresses inside application payloads, plus a datagram server that
//! dispatches received packets to a handler without blocking its read loop.

pub mod endpoint;
pub mod logging;
pub mod server;

pub use endpoint::{Endpoint, EndpointError, Port, PortCounter};
pub use server::{PacketHandler, Server, ServerError, MAX_DATAGRAM_LEN};
