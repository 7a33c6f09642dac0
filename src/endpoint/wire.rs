//! Binary framing for endpoints carried inside application payloads.
//!
//! Layout: `[u8 ip_len][ip bytes][u16 port LE][u8 zone_len][zone bytes]`.
//! The IP and zone fields are length-prefixed; the port is a fixed two
//! bytes. Native socket addresses never travel in this form; the codec
//! exists for protocols that embed peer addresses in their own messages.

use super::error::{EndpointError, Result};

/// Append a length-prefixed field. Fields longer than the one-byte prefix
/// can describe are rejected rather than truncated.
pub(super) fn write_field(buf: &mut Vec<u8>, field: &[u8]) -> Result<()> {
    if field.len() > u8::MAX as usize {
        return Err(EndpointError::OversizedField { len: field.len() });
    }
    buf.push(field.len() as u8);
    buf.extend_from_slice(field);
    Ok(())
}

/// Read a length-prefixed field, advancing `buf` past it.
pub(super) fn read_field<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8]> {
    let (&len, rest) = buf.split_first().ok_or(EndpointError::ShortBuffer {
        needed: 1,
        remaining: 0,
    })?;
    let len = len as usize;
    if rest.len() < len {
        return Err(EndpointError::ShortBuffer {
            needed: len,
            remaining: rest.len(),
        });
    }
    let (field, rest) = rest.split_at(len);
    *buf = rest;
    Ok(field)
}

/// Read the fixed two-byte little-endian port field, advancing `buf`.
pub(super) fn read_port(buf: &mut &[u8]) -> Result<u16> {
    if buf.len() < 2 {
        return Err(EndpointError::ShortBuffer {
            needed: 2,
            remaining: buf.len(),
        });
    }
    let port = u16::from_le_bytes([buf[0], buf[1]]);
    *buf = &buf[2..];
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_roundtrip() {
        let mut buf = Vec::new();
        write_field(&mut buf, &[10, 20, 30]).unwrap();
        assert_eq!(buf, vec![3, 10, 20, 30]);

        let mut rest: &[u8] = &buf;
        assert_eq!(read_field(&mut rest).unwrap(), &[10, 20, 30]);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_empty_field() {
        let mut buf = Vec::new();
        write_field(&mut buf, &[]).unwrap();
        assert_eq!(buf, vec![0]);

        let mut rest: &[u8] = &buf;
        assert_eq!(read_field(&mut rest).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn test_field_too_long() {
        let mut buf = Vec::new();
        let big = vec![0u8; 256];
        assert!(matches!(
            write_field(&mut buf, &big),
            Err(EndpointError::OversizedField { len: 256 })
        ));
    }

    #[test]
    fn test_short_buffer_missing_prefix() {
        let mut rest: &[u8] = &[];
        assert!(matches!(
            read_field(&mut rest),
            Err(EndpointError::ShortBuffer {
                needed: 1,
                remaining: 0
            })
        ));
    }

    #[test]
    fn test_short_buffer_truncated_field() {
        let mut rest: &[u8] = &[4, 1, 2];
        assert!(matches!(
            read_field(&mut rest),
            Err(EndpointError::ShortBuffer {
                needed: 4,
                remaining: 2
            })
        ));
    }

    #[test]
    fn test_short_buffer_truncated_port() {
        let mut rest: &[u8] = &[0x39];
        assert!(matches!(
            read_port(&mut rest),
            Err(EndpointError::ShortBuffer {
                needed: 2,
                remaining: 1
            })
        ));
    }

    #[test]
    fn test_port_little_endian() {
        let mut rest: &[u8] = &[0x39, 0x05];
        assert_eq!(read_port(&mut rest).unwrap(), 1337);
        assert!(rest.is_empty());
    }
}
