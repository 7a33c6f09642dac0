use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU16, Ordering};

use super::addr::Endpoint;

/// A port number. Sometimes a port needs to be a number, sometimes a
/// string, sometimes a full endpoint; this newtype carries the helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Port(pub u16);

impl Port {
    /// The wildcard port: binding to it lets the OS pick a free one.
    pub const ANY: Port = Port(0);

    pub fn raw(self) -> u16 {
        self.0
    }

    /// `:PORT`, the form a bind address wants.
    pub fn colon_string(self) -> String {
        format!(":{}", self.0)
    }

    /// Best-effort endpoint for `host:PORT`. Resolution failures yield the
    /// nil endpoint; callers needing the failure detail should use
    /// [`Endpoint::resolve`] directly.
    pub fn on(self, host: &str) -> Endpoint {
        Endpoint::resolve(&format!("{host}:{}", self.0)).unwrap_or_default()
    }

    /// Endpoint on all interfaces.
    pub fn wildcard(self) -> Endpoint {
        Endpoint::new(&Ipv4Addr::UNSPECIFIED.octets(), self.0, "")
    }

    /// Endpoint on `127.0.0.1`.
    pub fn loopback(self) -> Endpoint {
        Endpoint::new(&Ipv4Addr::LOCALHOST.octets(), self.0, "")
    }
}

/// The bare decimal, no prefix.
impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for Port {
    fn from(port: u16) -> Self {
        Port(port)
    }
}

/// A threadsafe incrementing port source. The first port returned is one
/// greater than `start`. Handy for tests that need distinct fixed ports.
pub struct PortCounter {
    next: AtomicU16,
}

impl PortCounter {
    pub fn new(start: u16) -> Self {
        Self {
            next: AtomicU16::new(start),
        }
    }

    pub fn next(&self) -> Port {
        Port(self.next.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_forms() {
        assert_eq!(Port(5555).colon_string(), ":5555");
        assert_eq!(Port(5555).to_string(), "5555");
    }

    #[test]
    fn test_endpoint_derivations() {
        assert_eq!(Port(8080).loopback().to_string(), "127.0.0.1:8080");
        assert_eq!(Port(8080).wildcard().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_on_host() {
        let endpoint = Port(443).on("127.0.0.1");
        assert_eq!(endpoint.to_string(), "127.0.0.1:443");

        // failures are swallowed at this convenience layer
        assert!(Port(443).on("no-such-host.invalid").is_nil());
    }

    #[test]
    fn test_counter() {
        let counter = PortCounter::new(6000);
        assert_eq!(counter.next(), Port(6001));
        assert_eq!(counter.next(), Port(6002));
    }
}
