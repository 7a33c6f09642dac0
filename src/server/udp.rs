use std::net::{Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicU16, AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::error::{Result, ServerError};
use super::handler::PacketHandler;
use crate::endpoint::{Endpoint, EndpointError, Port};

/// The largest possible UDP payload once the IP and UDP headers are
/// removed.
pub const MAX_DATAGRAM_LEN: usize = 65_507;

/// Pacing between successive `send_all` datagrams so a batch does not
/// burst the receiver.
const SEND_PACING: Duration = Duration::from_millis(1);

/// Server lifecycle. Transitions only move forward: `Created` → `Running`
/// → `Stopping` → `Closed`, with `Created` → `Stopping` permitted for
/// stop-before-run. A closed server is never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Lifecycle {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Closed = 3,
}

/// A UDP server owning one bound socket. Runs at most one receive loop,
/// dispatching each datagram to the [`PacketHandler`] on its own thread,
/// and accepts concurrent sends from any thread.
///
/// The socket supports concurrent reads and writes natively; the only
/// shared mutable state is the lifecycle latch and the socket slot, which
/// is emptied exactly once by [`close`](Server::close).
pub struct Server {
    conn: RwLock<Option<Arc<UdpSocket>>>,
    handler: Arc<dyn PacketHandler>,
    state: AtomicU8,
    port: AtomicU16,
}

impl Server {
    /// Bind a socket on `port` (use [`Port::ANY`] for an ephemeral port)
    /// without starting the receive loop.
    pub fn bind(port: Port, handler: Arc<dyn PacketHandler>) -> Result<Self> {
        let socket =
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port.raw())).map_err(ServerError::Bind)?;
        debug!(port = %port, "socket bound");
        Ok(Self {
            conn: RwLock::new(Some(Arc::new(socket))),
            handler,
            state: AtomicU8::new(Lifecycle::Created as u8),
            port: AtomicU16::new(port.raw()),
        })
    }

    /// Bind and immediately start the receive loop on a detached thread,
    /// returning without waiting for it.
    pub fn start(port: Port, handler: Arc<dyn PacketHandler>) -> Result<Arc<Self>> {
        let server = Arc::new(Self::bind(port, handler)?);
        let looper = Arc::clone(&server);
        thread::Builder::new()
            .name(format!("udplink-recv-{}", server.port()))
            .spawn(move || looper.run())?;
        Ok(server)
    }

    /// The receive loop. Blocks until [`stop`](Server::stop) or
    /// [`close`](Server::close) is called. A second call, or a call after
    /// stop or close, returns immediately.
    ///
    /// Each datagram's valid prefix is copied into a fresh buffer and
    /// handed to the handler on its own thread; the loop never waits for a
    /// handler to finish. Read errors while no stop was requested are
    /// logged and tolerated.
    pub fn run(&self) {
        if self
            .state
            .compare_exchange(
                Lifecycle::Created as u8,
                Lifecycle::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }
        let Some(socket) = self.conn() else {
            // a close can take the socket between the guard and here
            let _ = self.state.compare_exchange(
                Lifecycle::Running as u8,
                Lifecycle::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            return;
        };
        debug!(port = %self.port(), "receive loop started");
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        loop {
            let received = socket.recv_from(&mut buf);
            if self.stop_requested() {
                break;
            }
            match received {
                Ok((len, from)) => {
                    let payload = buf[..len].to_vec();
                    let from = Endpoint::from(from);
                    let handler = Arc::clone(&self.handler);
                    thread::spawn(move || handler.receive(payload, from));
                }
                Err(e) => {
                    warn!(error = %e, "datagram read failed; continuing");
                }
            }
        }
        debug!(port = %self.port(), "receive loop exited");
    }

    /// Whether the receive loop is active. A stopped server can still
    /// send as long as it is open.
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == Lifecycle::Running as u8
    }

    /// Whether the socket handle is still held. A closed server can
    /// neither send nor receive.
    pub fn is_open(&self) -> bool {
        self.conn().is_some()
    }

    /// The bound port. Resolved from the socket's local address on first
    /// use when the server was bound to an ephemeral port.
    pub fn port(&self) -> Port {
        let cached = self.port.load(Ordering::Relaxed);
        if cached != 0 {
            return Port(cached);
        }
        if let Some(socket) = self.conn() {
            if let Ok(addr) = socket.local_addr() {
                self.port.store(addr.port(), Ordering::Relaxed);
                return Port(addr.port());
            }
        }
        Port(0)
    }

    /// Request the receive loop to exit. Idempotent. Fails with
    /// [`ServerError::NotOpen`] once the server is closed, or with the
    /// I/O error from adjusting the socket's read deadline.
    ///
    /// Collapsing the read deadline to near zero is the cancellation
    /// mechanism for the blocking read. A read already parked in the
    /// kernel does not observe the changed deadline, so an empty datagram
    /// to the socket's own loopback port unblocks it; the loop discards
    /// whatever its final read returned once the stop latch is set, so the
    /// nudge never reaches the handler.
    pub fn stop(&self) -> Result<()> {
        let socket = self.conn().ok_or(ServerError::NotOpen)?;
        let _ = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
                (state != Lifecycle::Closed as u8).then_some(Lifecycle::Stopping as u8)
            });
        socket.set_read_timeout(Some(Duration::from_micros(1)))?;
        if let Err(e) = socket.send_to(&[], (Ipv4Addr::LOCALHOST, self.port().raw())) {
            debug!(error = %e, "stop nudge failed");
        }
        Ok(())
    }

    /// Stop the receive loop, then release the socket. Further sends fail
    /// with [`ServerError::NotOpen`], as does a second `close`. The port
    /// is freed once the receive loop has exited, which `stop` makes
    /// prompt.
    pub fn close(&self) -> Result<()> {
        self.stop()?;
        let mut conn = self.conn.write().unwrap_or_else(PoisonError::into_inner);
        let socket = conn.take().ok_or(ServerError::NotOpen)?;
        self.state.store(Lifecycle::Closed as u8, Ordering::SeqCst);
        drop(socket);
        debug!("socket released");
        Ok(())
    }

    /// Send one datagram to `dest`, returning the number of bytes
    /// written. A short write signals a lower-level size problem, not a
    /// condition to retry; UDP writes are datagram-atomic. Safe to call
    /// concurrently with the receive loop and with other sends.
    pub fn send(&self, packet: &[u8], dest: &Endpoint) -> Result<usize> {
        let socket = self.conn().ok_or(ServerError::NotOpen)?;
        let addr = dest.socket_addr().ok_or(EndpointError::NilAddress)?;
        let written = socket.send_to(packet, addr)?;
        debug!(bytes = written, dest = %dest, "datagram sent");
        Ok(written)
    }

    /// Send every packet to `dest` in order, pacing roughly a millisecond
    /// apart. Failures are collected with the index of the packet they
    /// belong to; the remaining packets are still attempted, including
    /// after the socket is found closed mid-batch.
    pub fn send_all(&self, packets: &[Vec<u8>], dest: &Endpoint) -> Vec<(usize, ServerError)> {
        let mut errors = Vec::new();
        for (i, packet) in packets.iter().enumerate() {
            if let Err(e) = self.send(packet, dest) {
                warn!(packet = i, error = %e, "send failed");
                errors.push((i, e));
            }
            thread::sleep(SEND_PACING);
        }
        errors
    }

    fn stop_requested(&self) -> bool {
        self.state.load(Ordering::SeqCst) >= Lifecycle::Stopping as u8
    }

    fn conn(&self) -> Option<Arc<UdpSocket>> {
        self.conn
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::handler::MockPacketHandler;
    use std::sync::mpsc;

    fn noop_handler() -> Arc<dyn PacketHandler> {
        let mut mock = MockPacketHandler::new();
        mock.expect_receive().returning(|_, _| {});
        Arc::new(mock)
    }

    #[test]
    fn test_bind_ephemeral_resolves_port() {
        let server = Server::bind(Port::ANY, noop_handler()).unwrap();
        assert!(server.is_open());
        assert!(!server.is_running());
        assert_ne!(server.port(), Port(0));
    }

    #[test]
    fn test_send_to_nil_endpoint() {
        let server = Server::bind(Port::ANY, noop_handler()).unwrap();
        let err = server.send(&[1], &Endpoint::nil()).unwrap_err();
        assert!(matches!(
            err,
            ServerError::Endpoint(EndpointError::NilAddress)
        ));
    }

    #[test]
    fn test_send_after_close() {
        let server = Server::bind(Port::ANY, noop_handler()).unwrap();
        let dest = server.port().loopback();
        server.close().unwrap();
        assert!(!server.is_open());
        assert!(matches!(
            server.send(&[1, 2], &dest),
            Err(ServerError::NotOpen)
        ));
    }

    #[test]
    fn test_double_close() {
        let server = Server::bind(Port::ANY, noop_handler()).unwrap();
        server.close().unwrap();
        assert!(matches!(server.close(), Err(ServerError::NotOpen)));
    }

    #[test]
    fn test_stop_before_run_blocks_restart() {
        let server = Server::bind(Port::ANY, noop_handler()).unwrap();
        server.stop().unwrap();
        // stop is idempotent
        server.stop().unwrap();
        // the loop guard refuses to enter Running after a stop
        server.run();
        assert!(!server.is_running());
        server.close().unwrap();
    }

    #[test]
    fn test_send_all_on_closed_server() {
        let server = Server::bind(Port::ANY, noop_handler()).unwrap();
        let dest = server.port().loopback();
        server.close().unwrap();

        let packets = vec![vec![1], vec![2], vec![3]];
        let errors = server.send_all(&packets, &dest);
        assert_eq!(errors.len(), 3);
        for (i, (idx, err)) in errors.iter().enumerate() {
            assert_eq!(*idx, i);
            assert!(matches!(err, ServerError::NotOpen));
        }
    }

    #[test]
    fn test_read_errors_are_tolerated() {
        let (tx, rx) = mpsc::channel();
        let mut mock = MockPacketHandler::new();
        mock.expect_receive().returning(move |payload, _| {
            tx.send(payload).ok();
        });

        let server = Arc::new(Server::bind(Port::ANY, Arc::new(mock)).unwrap());
        // every read times out until a datagram actually arrives
        server
            .conn()
            .unwrap()
            .set_read_timeout(Some(Duration::from_millis(1)))
            .unwrap();
        let looper = Arc::clone(&server);
        let loop_thread = thread::spawn(move || looper.run());

        // let the loop chew through a pile of timed-out reads
        thread::sleep(Duration::from_millis(50));
        assert!(server.is_running());

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(&[42], ("127.0.0.1", server.port().raw()))
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), vec![42]);

        server.close().unwrap();
        loop_thread.join().unwrap();
    }

    #[test]
    fn test_run_with_released_socket_does_not_report_running() {
        let server = Server::bind(Port::ANY, noop_handler()).unwrap();
        server.conn.write().unwrap().take();
        server.run();
        assert!(!server.is_running());
    }

    #[test]
    fn test_dispatches_to_handler() {
        let (tx, rx) = mpsc::channel();
        let mut mock = MockPacketHandler::new();
        mock.expect_receive().returning(move |payload, from| {
            tx.send((payload, from)).ok();
        });

        let server = Server::start(Port::ANY, Arc::new(mock)).unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(&[7, 8, 9], ("127.0.0.1", server.port().raw()))
            .unwrap();

        let (payload, from) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(payload, vec![7, 8, 9]);
        let sender_port = sender.local_addr().unwrap().port();
        assert!(from.to_string().ends_with(&format!(":{sender_port}")));
        server.close().unwrap();
    }
}
