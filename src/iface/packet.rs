use alloc::vec::Vec;

use crate::wire::*;

/// Offset of the `Next Header` octet in the fixed IPv6 header.
const NEXT_HEADER_OFFSET: usize = 6;

/// An owned buffer holding exactly one IPv6 datagram.
///
/// The buffer moves by value from the input path through the dispatcher and the
/// protocol handlers to the transmit path. Besides the bytes it carries the state
/// of the extension header walk: how many octets of extension headers precede the
/// current header, which protocol that header is, and where the octet naming it
/// lives (for Parameter Problem pointers).
///
/// The payload length field of the fixed header always equals the number of
/// octets present after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketBuffer {
    buffer: Vec<u8>,
    ext_len: usize,
    next_header: IpProtocol,
    next_header_offset: usize,
    link_dst: Option<EthernetAddress>,
}

/// An ICMPv6 error message that replaces the packet that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum IcmpError {
    DstUnreachable(Icmpv6DstUnreachable),
    PktTooBig { mtu: u32 },
    TimeExceeded(Icmpv6TimeExceeded),
    ParamProblem {
        reason: Icmpv6ParamProblem,
        pointer: u32,
    },
}

impl IcmpError {
    pub(crate) fn message(&self) -> Icmpv6Message {
        match self {
            IcmpError::DstUnreachable(_) => Icmpv6Message::DstUnreachable,
            IcmpError::PktTooBig { .. } => Icmpv6Message::PktTooBig,
            IcmpError::TimeExceeded(_) => Icmpv6Message::TimeExceeded,
            IcmpError::ParamProblem { .. } => Icmpv6Message::ParamProblem,
        }
    }
}

impl PacketBuffer {
    /// Take ownership of a received IPv6 datagram.
    ///
    /// Returns `None` if the buffer does not hold an IPv6 header, if the version
    /// is not 6, if the payload length points past the end of the buffer, or if
    /// the source address is multicast. Octets past the payload length (link
    /// layer padding) are cut off.
    pub fn from_bytes(mut bytes: Vec<u8>) -> Option<PacketBuffer> {
        let (total_len, next_header) = {
            let packet = match Ipv6Packet::new_checked(&bytes[..]) {
                Ok(packet) => packet,
                Err(_) => {
                    net_debug!("ipv6: truncated packet");
                    return None;
                }
            };
            if packet.version() != 6 {
                net_debug!("ipv6: bad version {}", packet.version());
                return None;
            }
            if packet.src_addr().is_multicast() {
                net_debug!("ipv6: multicast source {}", packet.src_addr());
                return None;
            }
            (packet.total_len(), packet.next_header())
        };
        bytes.truncate(total_len);

        Some(PacketBuffer {
            buffer: bytes,
            ext_len: 0,
            next_header,
            next_header_offset: NEXT_HEADER_OFFSET,
            link_dst: None,
        })
    }

    /// Allocate a datagram with the given fixed header and a zeroed payload of
    /// `ip_repr.payload_len` octets.
    pub fn new(ip_repr: &Ipv6Repr) -> PacketBuffer {
        let mut buffer = alloc::vec![0; ip_repr.buffer_len() + ip_repr.payload_len];
        ip_repr.emit(&mut Ipv6Packet::new_unchecked(&mut buffer[..]));
        PacketBuffer {
            buffer,
            ext_len: 0,
            next_header: ip_repr.next_header,
            next_header_offset: NEXT_HEADER_OFFSET,
            link_dst: None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn ip_packet(&self) -> Ipv6Packet<&[u8]> {
        Ipv6Packet::new_unchecked(&self.buffer[..])
    }

    pub fn ip_packet_mut(&mut self) -> Ipv6Packet<&mut [u8]> {
        Ipv6Packet::new_unchecked(&mut self.buffer[..])
    }

    /// The fixed header as a high-level representation.
    pub fn ip_repr(&self) -> Ipv6Repr {
        let packet = self.ip_packet();
        Ipv6Repr {
            src_addr: packet.src_addr(),
            dst_addr: packet.dst_addr(),
            next_header: packet.next_header(),
            payload_len: packet.payload_len() as usize,
            hop_limit: packet.hop_limit(),
        }
    }

    pub fn src_addr(&self) -> Ipv6Address {
        self.ip_packet().src_addr()
    }

    pub fn dst_addr(&self) -> Ipv6Address {
        self.ip_packet().dst_addr()
    }

    pub fn hop_limit(&self) -> u8 {
        self.ip_packet().hop_limit()
    }

    /// Octets of extension headers walked so far.
    pub fn ext_len(&self) -> usize {
        self.ext_len
    }

    /// The protocol of the header at the walk cursor.
    pub fn next_header(&self) -> IpProtocol {
        self.next_header
    }

    /// Offset from the start of the datagram of the octet that names the
    /// header at the walk cursor.
    pub fn next_header_offset(&self) -> usize {
        self.next_header_offset
    }

    /// Everything after the walk cursor.
    pub fn payload(&self) -> &[u8] {
        &self.buffer[IPV6_HEADER_LEN + self.ext_len..]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[IPV6_HEADER_LEN + self.ext_len..]
    }

    /// The link layer destination, once the next hop has been resolved.
    pub fn link_dst(&self) -> Option<EthernetAddress> {
        self.link_dst
    }

    pub(crate) fn set_link_dst(&mut self, addr: EthernetAddress) {
        self.link_dst = Some(addr)
    }

    /// Step the walk cursor over an extension header of `len` octets whose
    /// `Next Header` field holds `next_header`.
    pub(crate) fn skip_ext_header(&mut self, next_header: IpProtocol, len: usize) {
        self.next_header_offset = IPV6_HEADER_LEN + self.ext_len;
        self.ext_len += len;
        self.next_header = next_header;
    }

    /// Rewind the walk cursor to the fixed header.
    pub(crate) fn reset_walk(&mut self) {
        self.ext_len = 0;
        self.next_header = self.ip_packet().next_header();
        self.next_header_offset = NEXT_HEADER_OFFSET;
    }

    /// Splice the walked extension headers out of the datagram.
    ///
    /// The fixed header's next header becomes the protocol at the cursor and
    /// its payload length shrinks to match.
    pub fn remove_ext_headers(&mut self) {
        if self.ext_len == 0 {
            return;
        }
        let start = IPV6_HEADER_LEN + self.ext_len;
        self.buffer.copy_within(start.., IPV6_HEADER_LEN);
        self.buffer.truncate(self.buffer.len() - self.ext_len);
        let payload_len = (self.buffer.len() - IPV6_HEADER_LEN) as u16;
        let next_header = self.next_header;
        let mut packet = self.ip_packet_mut();
        packet.set_next_header(next_header);
        packet.set_payload_len(payload_len);
        self.ext_len = 0;
        self.next_header_offset = NEXT_HEADER_OFFSET;
    }

    /// Insert an extension header directly after the fixed header.
    ///
    /// The first octet of `header` is overwritten with the protocol that used
    /// to follow the fixed header, which then names `protocol` instead.
    pub fn insert_ext_header(&mut self, protocol: IpProtocol, header: &[u8]) {
        let old_len = self.buffer.len();
        let previous: u8 = self.ip_packet().next_header().into();
        self.buffer.resize(old_len + header.len(), 0);
        self.buffer
            .copy_within(IPV6_HEADER_LEN..old_len, IPV6_HEADER_LEN + header.len());
        self.buffer[IPV6_HEADER_LEN..IPV6_HEADER_LEN + header.len()].copy_from_slice(header);
        if !header.is_empty() {
            self.buffer[IPV6_HEADER_LEN] = previous;
        }
        let payload_len = (self.buffer.len() - IPV6_HEADER_LEN) as u16;
        let mut packet = self.ip_packet_mut();
        packet.set_next_header(protocol);
        packet.set_payload_len(payload_len);
        self.reset_walk();
    }

    /// Reuse this allocation for an ICMPv6 error sent back to the source.
    ///
    /// As much of the offending datagram as fits in the minimum MTU is kept
    /// as the error's payload.
    pub(crate) fn into_icmp_error(
        self,
        src_addr: Ipv6Address,
        hop_limit: u8,
        error: IcmpError,
    ) -> PacketBuffer {
        let dst_addr = self.src_addr();
        let mut buffer = self.buffer;

        let header_len = IPV6_HEADER_LEN + ICMPV6_HEADER_LEN;
        let invoking_len = buffer.len().min(IPV6_MIN_MTU - header_len);
        buffer.truncate(invoking_len);
        buffer.resize(invoking_len + header_len, 0);
        buffer.copy_within(0..invoking_len, header_len);

        let ip_repr = Ipv6Repr {
            src_addr,
            dst_addr,
            next_header: IpProtocol::Icmpv6,
            payload_len: buffer.len() - IPV6_HEADER_LEN,
            hop_limit,
        };
        ip_repr.emit(&mut Ipv6Packet::new_unchecked(&mut buffer[..]));

        let mut icmp_packet = Icmpv6Packet::new_unchecked(&mut buffer[IPV6_HEADER_LEN..]);
        icmp_packet.set_msg_type(error.message());
        icmp_packet.clear_reserved();
        match error {
            IcmpError::DstUnreachable(reason) => icmp_packet.set_msg_code(reason.into()),
            IcmpError::PktTooBig { mtu } => {
                icmp_packet.set_msg_code(0);
                icmp_packet.set_pkt_too_big_mtu(mtu);
            }
            IcmpError::TimeExceeded(reason) => icmp_packet.set_msg_code(reason.into()),
            IcmpError::ParamProblem { reason, pointer } => {
                icmp_packet.set_msg_code(reason.into());
                icmp_packet.set_param_problem_ptr(pointer);
            }
        }
        icmp_packet.fill_checksum(&src_addr, &dst_addr);

        PacketBuffer {
            buffer,
            ext_len: 0,
            next_header: IpProtocol::Icmpv6,
            next_header_offset: NEXT_HEADER_OFFSET,
            link_dst: None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::ipv6::test::{MOCK_IP_ADDR_1, MOCK_IP_ADDR_2};

    fn udp_datagram(payload_len: usize) -> Vec<u8> {
        let repr = Ipv6Repr {
            src_addr: MOCK_IP_ADDR_1,
            dst_addr: MOCK_IP_ADDR_2,
            next_header: IpProtocol::Udp,
            payload_len,
            hop_limit: 64,
        };
        PacketBuffer::new(&repr).into_bytes()
    }

    #[test]
    fn test_from_bytes_truncates_padding() {
        let mut bytes = udp_datagram(8);
        bytes.extend_from_slice(&[0xff; 6]);
        let packet = PacketBuffer::from_bytes(bytes).unwrap();
        assert_eq!(packet.len(), 48);
        assert_eq!(packet.next_header(), IpProtocol::Udp);
        assert_eq!(packet.payload().len(), 8);
    }

    #[test]
    fn test_from_bytes_rejects() {
        let mut bytes = udp_datagram(8);
        bytes.truncate(44);
        assert!(PacketBuffer::from_bytes(bytes).is_none());

        let mut bytes = udp_datagram(8);
        bytes[0] = 0x40;
        assert!(PacketBuffer::from_bytes(bytes).is_none());

        let mut bytes = udp_datagram(8);
        bytes[8] = 0xff;
        assert!(PacketBuffer::from_bytes(bytes).is_none());
    }

    #[test]
    fn test_remove_ext_headers() {
        let mut bytes = udp_datagram(16);
        bytes[6] = IpProtocol::Ipv6Opts.into();
        // Destination options: next header UDP, one PadN covering six octets.
        bytes[40..48].copy_from_slice(&[0x11, 0x00, 0x01, 0x04, 0, 0, 0, 0]);
        bytes[48..56].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        let mut packet = PacketBuffer::from_bytes(bytes).unwrap();
        packet.skip_ext_header(IpProtocol::Udp, 8);
        assert_eq!(packet.next_header_offset(), 40);
        assert_eq!(packet.payload(), &[1, 2, 3, 4, 5, 6, 7, 8]);

        packet.remove_ext_headers();
        assert_eq!(packet.len(), 48);
        assert_eq!(packet.ext_len(), 0);
        assert_eq!(packet.ip_repr().next_header, IpProtocol::Udp);
        assert_eq!(packet.ip_repr().payload_len, 8);
        assert_eq!(packet.payload(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_insert_ext_header() {
        let mut bytes = udp_datagram(8);
        bytes[40..48].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let mut packet = PacketBuffer::from_bytes(bytes).unwrap();

        packet.insert_ext_header(IpProtocol::HopByHop, &[0, 0, 0x01, 0x04, 0, 0, 0, 0]);
        assert_eq!(packet.len(), 56);
        assert_eq!(packet.next_header(), IpProtocol::HopByHop);
        assert_eq!(packet.ip_repr().payload_len, 16);
        assert_eq!(packet.as_bytes()[40], 0x11);
        assert_eq!(&packet.as_bytes()[48..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_into_icmp_error() {
        let bytes = udp_datagram(1400);
        let packet = PacketBuffer::from_bytes(bytes).unwrap();
        let error = packet.into_icmp_error(
            MOCK_IP_ADDR_2,
            64,
            IcmpError::ParamProblem {
                reason: Icmpv6ParamProblem::ErroneousHdrField,
                pointer: 4,
            },
        );
        assert_eq!(error.len(), IPV6_MIN_MTU);
        assert_eq!(error.src_addr(), MOCK_IP_ADDR_2);
        assert_eq!(error.dst_addr(), MOCK_IP_ADDR_1);

        let icmp_packet = Icmpv6Packet::new_checked(error.payload()).unwrap();
        assert!(icmp_packet.verify_checksum(&MOCK_IP_ADDR_2, &MOCK_IP_ADDR_1));
        assert_eq!(icmp_packet.msg_type(), Icmpv6Message::ParamProblem);
        assert_eq!(icmp_packet.param_problem_ptr(), 4);
        // The invoking packet starts with its own IPv6 header.
        let inner = Ipv6Packet::new_unchecked(icmp_packet.payload());
        assert_eq!(inner.src_addr(), MOCK_IP_ADDR_1);
        assert_eq!(inner.payload_len(), 1400);
    }
}
