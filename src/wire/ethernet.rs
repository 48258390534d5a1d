use core::fmt;

use super::{Ipv6Address, Ipv6AddressExt};

/// A six-octet Ethernet II address.
///
/// This is the link-layer address carried in Neighbor Discovery
/// source/target link-layer address options, and the next-hop tag
/// put on every outbound [PacketBuffer](crate::iface::PacketBuffer).
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 6]);

impl Address {
    /// The broadcast address.
    pub const BROADCAST: Address = Address([0xff; 6]);

    /// Construct an Ethernet address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not six octets long.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; 6];
        bytes.copy_from_slice(data);
        Address(bytes)
    }

    /// Return an Ethernet address as a sequence of octets, in big-endian.
    pub const fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Query whether the address is an unicast address.
    pub fn is_unicast(&self) -> bool {
        !(self.is_broadcast() || self.is_multicast())
    }

    /// Query whether this address is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Query whether the "multicast" bit in the OUI is set.
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// The multicast link address an IPv6 multicast group maps onto,
    /// `33:33` followed by the low 32 bits of the group. See [RFC 2464 § 7].
    ///
    /// [RFC 2464 § 7]: https://tools.ietf.org/html/rfc2464#section-7
    pub fn from_ipv6_multicast(group: &Ipv6Address) -> Address {
        let o = group.octets();
        Address([0x33, 0x33, o[12], o[13], o[14], o[15]])
    }

    /// The modified EUI-64 interface identifier, with the universal/local bit flipped.
    pub fn interface_id(&self) -> [u8; 8] {
        let b = self.0;
        [b[0] ^ 0x02, b[1], b[2], 0xff, 0xfe, b[3], b[4], b[5]]
    }

    /// The `fe80::/64` address built from the interface identifier.
    pub fn link_local_address(&self) -> Ipv6Address {
        let mut bytes = [0u8; 16];
        bytes[0] = 0xfe;
        bytes[1] = 0x80;
        bytes[8..].copy_from_slice(&self.interface_id());
        Ipv6Address::from_bytes(&bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Address {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0],
            self.0[1],
            self.0[2],
            self.0[3],
            self.0[4],
            self.0[5]
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_link_local_from_eui48() {
        let hw = Address([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(
            hw.link_local_address(),
            Ipv6Address::new(0xfe80, 0, 0, 0, 0x0000, 0x00ff, 0xfe00, 0x0001)
        );
    }

    #[test]
    fn test_multicast_mapping() {
        let group = Ipv6Address::new(0xff02, 0, 0, 0, 0, 1, 0xff00, 0x0001);
        let hw = Address::from_ipv6_multicast(&group);
        assert_eq!(hw, Address([0x33, 0x33, 0xff, 0x00, 0x00, 0x01]));
        assert!(hw.is_multicast());
        assert!(!hw.is_unicast());
    }

    #[test]
    fn test_display() {
        let hw = Address([0x02, 0xab, 0x00, 0x00, 0x10, 0xff]);
        assert_eq!(format!("{hw}"), "02:ab:00:00:10:ff");
    }
}
