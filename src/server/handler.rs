use crate::endpoint::Endpoint;

/// Consumer callback for received datagrams.
///
/// Invoked once per datagram with the payload (0 to
/// [`MAX_DATAGRAM_LEN`](crate::MAX_DATAGRAM_LEN) bytes) and the sender's
/// address, which is always non-nil. Each invocation runs on its own
/// thread, so implementations may block freely but must tolerate
/// completions arriving out of receive order.
#[cfg_attr(test, mockall::automock)]
pub trait PacketHandler: Send + Sync {
    fn receive(&self, payload: Vec<u8>, from: Endpoint);
}
