use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, ToSocketAddrs};

use tracing::debug;

use super::error::{EndpointError, Result};
use super::port::Port;
use super::wire;

/// A network endpoint as a plain value: raw IP bytes, a port, and an
/// optional zone for scoped IPv6 addresses. Independent of any live socket.
///
/// The nil endpoint (no underlying address) is a valid, distinguishable
/// value: it renders as `""` and reports port 0. It is what best-effort
/// resolution returns on failure.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Endpoint {
    inner: Option<AddrParts>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AddrParts {
    /// 4 bytes for IPv4, 16 for IPv6, possibly empty.
    ip: Vec<u8>,
    port: u16,
    zone: String,
}

impl Endpoint {
    /// Build an endpoint directly from primitives.
    pub fn new(ip: &[u8], port: u16, zone: &str) -> Self {
        Self {
            inner: Some(AddrParts {
                ip: ip.to_vec(),
                port,
                zone: zone.to_string(),
            }),
        }
    }

    /// The nil endpoint.
    pub const fn nil() -> Self {
        Self { inner: None }
    }

    /// Resolve a textual address through the platform resolver. A leading
    /// `:` (port only) means the wildcard host, as in `":5555"`.
    pub fn resolve(addr: &str) -> Result<Self> {
        let target = if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_string()
        };
        let mut resolved = target
            .to_socket_addrs()
            .map_err(|source| EndpointError::Resolve {
                addr: addr.to_string(),
                source,
            })?;
        resolved
            .next()
            .map(Endpoint::from)
            .ok_or_else(|| EndpointError::NoAddresses {
                addr: addr.to_string(),
            })
    }

    /// Decode an endpoint from its wire form.
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        let mut endpoint = Endpoint::nil();
        endpoint.unmarshal(bytes)?;
        Ok(endpoint)
    }

    pub fn is_nil(&self) -> bool {
        self.inner.is_none()
    }

    /// Raw address bytes, empty for a nil endpoint.
    pub fn ip(&self) -> &[u8] {
        self.inner.as_ref().map_or(&[], |parts| &parts.ip)
    }

    /// The port, 0 for a nil endpoint.
    pub fn port(&self) -> Port {
        Port(self.inner.as_ref().map_or(0, |parts| parts.port))
    }

    /// The zone, empty for a nil endpoint or an unscoped address.
    pub fn zone(&self) -> &str {
        self.inner.as_ref().map_or("", |parts| &parts.zone)
    }

    /// Convert to a socket address for use with the native socket layer.
    /// `None` for nil endpoints and for IP byte strings that are neither
    /// 4 nor 16 bytes. Non-numeric zones cannot be mapped to a scope id
    /// without an interface lookup and are dropped.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        let parts = self.inner.as_ref()?;
        match parts.ip.len() {
            4 => {
                let octets: [u8; 4] = parts.ip[..].try_into().ok()?;
                Some(SocketAddrV4::new(Ipv4Addr::from(octets), parts.port).into())
            }
            16 => {
                let octets: [u8; 16] = parts.ip[..].try_into().ok()?;
                let scope = parts.zone.parse().unwrap_or(0);
                Some(SocketAddrV6::new(Ipv6Addr::from(octets), parts.port, 0, scope).into())
            }
            _ => None,
        }
    }

    /// Encode to the wire form:
    /// `[u8 ip_len][ip bytes][u16 port LE][u8 zone_len][zone bytes]`.
    ///
    /// Fails with [`EndpointError::NilAddress`] on a nil endpoint.
    pub fn marshal(&self) -> Result<Vec<u8>> {
        let parts = self.inner.as_ref().ok_or(EndpointError::NilAddress)?;
        let mut buf = Vec::with_capacity(1 + parts.ip.len() + 2 + 1 + parts.zone.len());
        wire::write_field(&mut buf, &parts.ip)?;
        buf.extend_from_slice(&parts.port.to_le_bytes());
        wire::write_field(&mut buf, parts.zone.as_bytes())?;
        Ok(buf)
    }

    /// Decode the wire form into this endpoint, overwriting its IP, port,
    /// and zone. On a framing error the endpoint is left unmodified: all
    /// three fields are parsed before any of them is committed.
    pub fn unmarshal(&mut self, bytes: &[u8]) -> Result<()> {
        let mut rest = bytes;
        let ip = wire::read_field(&mut rest)?;
        let port = wire::read_port(&mut rest)?;
        let zone = wire::read_field(&mut rest)?;
        let zone = std::str::from_utf8(zone).map_err(|_| EndpointError::InvalidZone)?;
        debug!(ip_len = ip.len(), port, zone, "endpoint decoded");

        match &mut self.inner {
            Some(parts) => {
                parts.ip = ip.to_vec();
                parts.port = port;
                parts.zone = zone.to_string();
            }
            None => *self = Endpoint::new(ip, port, zone),
        }
        Ok(())
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Endpoint::new(&v4.ip().octets(), v4.port(), ""),
            SocketAddr::V6(v6) => {
                let zone = if v6.scope_id() == 0 {
                    String::new()
                } else {
                    v6.scope_id().to_string()
                };
                Endpoint::new(&v6.ip().octets(), v6.port(), &zone)
            }
        }
    }
}

/// `IP:PORT`, with IPv6 literals bracketed (`[v6%zone]:port`). The nil
/// endpoint renders as the empty string, an endpoint with an empty IP as
/// `:PORT`.
impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(parts) = self.inner.as_ref() else {
            return Ok(());
        };
        match parts.ip.len() {
            4 => {
                let octets: [u8; 4] = parts.ip[..].try_into().map_err(|_| fmt::Error)?;
                write!(f, "{}:{}", Ipv4Addr::from(octets), parts.port)
            }
            16 => {
                let octets: [u8; 16] = parts.ip[..].try_into().map_err(|_| fmt::Error)?;
                let ip = Ipv6Addr::from(octets);
                if parts.zone.is_empty() {
                    write!(f, "[{}]:{}", ip, parts.port)
                } else {
                    write!(f, "[{}%{}]:{}", ip, parts.zone, parts.port)
                }
            }
            _ => write!(f, ":{}", parts.port),
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn ip_strategy() -> impl Strategy<Value = Vec<u8>> {
        prop_oneof![
            Just(Vec::new()),
            proptest::collection::vec(any::<u8>(), 4),
            proptest::collection::vec(any::<u8>(), 16),
        ]
    }

    proptest! {
        #[test]
        fn test_roundtrip_property(
            ip in ip_strategy(),
            port in any::<u16>(),
            zone in "[a-zA-Z0-9]{0,8}",
        ) {
            let endpoint = Endpoint::new(&ip, port, &zone);
            let decoded = Endpoint::from_wire(&endpoint.marshal().unwrap()).unwrap();
            prop_assert_eq!(decoded.ip(), &ip[..]);
            prop_assert_eq!(decoded.port(), Port(port));
            prop_assert_eq!(decoded.zone(), zone);
        }
    }
}
