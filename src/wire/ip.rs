use core::fmt;

use super::Ipv6Address;

enum_with_unknown! {
    /// IPv6 next header values.
    pub enum Protocol(u8) {
        HopByHop  = 0x00,
        Tcp       = 0x06,
        Udp       = 0x11,
        Ipv6Route = 0x2b,
        Ipv6Frag  = 0x2c,
        Icmpv6    = 0x3a,
        Ipv6NoNxt = 0x3b,
        Ipv6Opts  = 0x3c,
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Protocol::HopByHop => write!(f, "Hop-by-Hop"),
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Ipv6Route => write!(f, "IPv6-Route"),
            Protocol::Ipv6Frag => write!(f, "IPv6-Frag"),
            Protocol::Icmpv6 => write!(f, "ICMPv6"),
            Protocol::Ipv6NoNxt => write!(f, "IPv6-NoNxt"),
            Protocol::Ipv6Opts => write!(f, "IPv6-Opts"),
            Protocol::Unknown(id) => write!(f, "0x{id:02x}"),
        }
    }
}

impl Protocol {
    /// Whether this value names an extension header the walker steps over.
    pub fn is_extension_header(&self) -> bool {
        matches!(
            self,
            Protocol::HopByHop | Protocol::Ipv6Route | Protocol::Ipv6Frag | Protocol::Ipv6Opts
        )
    }
}

/// An internet endpoint address.
///
/// An unspecified address or a zero port stand for "any" when an
/// endpoint is used as a demultiplexing key.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Endpoint {
    pub addr: Ipv6Address,
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint address from given address and port.
    pub const fn new(addr: Ipv6Address, port: u16) -> Endpoint {
        Endpoint { addr, port }
    }

    /// Query whether the endpoint has a specified address and port.
    pub const fn is_specified(&self) -> bool {
        !self.addr.is_unspecified() && self.port != 0
    }
}

impl Default for Endpoint {
    fn default() -> Endpoint {
        Endpoint::new(Ipv6Address::UNSPECIFIED, 0)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}]:{}", self.addr, self.port)
    }
}

impl From<u16> for Endpoint {
    fn from(port: u16) -> Endpoint {
        Endpoint {
            addr: Ipv6Address::UNSPECIFIED,
            port,
        }
    }
}

impl<T: Into<Ipv6Address>> From<(T, u16)> for Endpoint {
    fn from((addr, port): (T, u16)) -> Endpoint {
        Endpoint {
            addr: addr.into(),
            port,
        }
    }
}

pub mod checksum {
    use byteorder::{ByteOrder, NetworkEndian};

    use super::*;

    const fn propagate_carries(word: u32) -> u16 {
        let sum = (word >> 16) + (word & 0xffff);
        ((sum >> 16) as u16) + (sum as u16)
    }

    /// Compute an RFC 1071 compliant checksum (without the final complement).
    pub fn data(mut data: &[u8]) -> u16 {
        let mut accum = 0;

        // For each 32-byte chunk...
        const CHUNK_SIZE: usize = 32;
        while data.len() >= CHUNK_SIZE {
            let mut d = &data[..CHUNK_SIZE];
            // ... take by 2 bytes and sum them.
            while d.len() >= 2 {
                accum += NetworkEndian::read_u16(d) as u32;
                d = &d[2..];
            }

            data = &data[CHUNK_SIZE..];
        }

        // Sum the rest that does not fit the last 32-byte chunk,
        // taking by 2 bytes.
        while data.len() >= 2 {
            accum += NetworkEndian::read_u16(data) as u32;
            data = &data[2..];
        }

        // Add the last remaining odd byte, if any.
        if let Some(&value) = data.first() {
            accum += (value as u32) << 8;
        }

        propagate_carries(accum)
    }

    /// Combine several RFC 1071 compliant checksums.
    pub fn combine(checksums: &[u16]) -> u16 {
        let mut accum: u32 = 0;
        for &word in checksums {
            accum += word as u32;
        }
        propagate_carries(accum)
    }

    /// Compute the IPv6 pseudo header checksum: source and destination
    /// address, 32-bit upper-layer length and the next header value.
    pub fn pseudo_header(
        src_addr: &Ipv6Address,
        dst_addr: &Ipv6Address,
        next_header: Protocol,
        length: u32,
    ) -> u16 {
        let mut proto_len = [0u8; 8];
        proto_len[7] = next_header.into();
        NetworkEndian::write_u32(&mut proto_len[0..4], length);

        combine(&[
            data(&src_addr.octets()),
            data(&dst_addr.octets()),
            data(&proto_len[..]),
        ])
    }

    /// Compute the complemented upper-layer checksum over the pseudo header and `data`.
    pub fn upper_layer(
        src_addr: &Ipv6Address,
        dst_addr: &Ipv6Address,
        next_header: Protocol,
        payload: &[u8],
    ) -> u16 {
        !combine(&[
            pseudo_header(src_addr, dst_addr, next_header, payload.len() as u32),
            data(payload),
        ])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_protocol_roundtrip_unknown() {
        assert_eq!(Protocol::from(0x3a), Protocol::Icmpv6);
        assert_eq!(Protocol::from(0x99), Protocol::Unknown(0x99));
        assert_eq!(u8::from(Protocol::Unknown(0x99)), 0x99);
        assert!(Protocol::Ipv6Frag.is_extension_header());
        assert!(!Protocol::Tcp.is_extension_header());
    }

    #[test]
    fn test_checksum_odd_length() {
        // RFC 1071 section 3 example, with a trailing odd byte.
        let bytes = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(checksum::data(&bytes), 0xddf2);
        assert_eq!(checksum::data(&[0xab]), 0xab00);
    }

    #[test]
    fn test_checksum_verifies_to_ones() {
        let src = Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);
        let dst = Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 2);
        let mut payload = [0x12, 0x34, 0x00, 0x35, 0x00, 0x0a, 0x00, 0x00, 0xaa, 0xbb];
        let sum = checksum::upper_layer(&src, &dst, Protocol::Udp, &payload);
        payload[6..8].copy_from_slice(&sum.to_be_bytes());
        let check = checksum::combine(&[
            checksum::pseudo_header(&src, &dst, Protocol::Udp, payload.len() as u32),
            checksum::data(&payload),
        ]);
        assert_eq!(check, 0xffff);
    }

    #[test]
    fn test_endpoint_display() {
        let ep = Endpoint::new(Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1), 80);
        assert_eq!(format!("{ep}"), "[fe80::1]:80");
        assert!(ep.is_specified());
        assert!(!Endpoint::from(80).is_specified());
    }
}
