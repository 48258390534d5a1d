use alloc::vec::Vec;

use super::PacketBuffer;
use crate::config::REASSEMBLY_BUFFER_SIZE;
use crate::time::{Duration, Instant};
use crate::wire::*;

/// How long a reassembly may stay incomplete.
pub(crate) const REASSEMBLY_MAX_AGE: Duration = Duration::from_secs(60);

/// What became of a fragment handed to the reassembler.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// The fragment was absorbed (or dropped); nothing more to do.
    Incomplete,
    /// The last missing fragment arrived. The datagram has to be walked again
    /// from its fixed header.
    Complete(PacketBuffer),
    /// A fragment other than the last one had a length that is not a multiple
    /// of 8. The reassembly was aborted and the fragment is handed back so it
    /// can be answered with a Parameter Problem.
    BadLength(PacketBuffer),
}

#[derive(Debug)]
struct Context {
    src_addr: Ipv6Address,
    dst_addr: Ipv6Address,
    ident: u32,
    /// The fixed header and the unfragmentable extension headers.
    header: Vec<u8>,
    first_seen: bool,
    /// Length of the fragmentable part, once the last fragment was seen.
    total_len: Option<usize>,
    expires_at: Instant,
}

/// A buffer holding at most one datagram under reassembly.
///
/// Received ranges are tracked in a bitmap with one bit per 8 octets of
/// fragmentable payload.
pub(crate) struct Reassembler {
    context: Option<Context>,
    buffer: [u8; REASSEMBLY_BUFFER_SIZE],
    bitmap: [u8; REASSEMBLY_BUFFER_SIZE / 64],
}

impl core::fmt::Debug for Reassembler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reassembler")
            .field("context", &self.context)
            .finish()
    }
}

impl Reassembler {
    pub(crate) fn new() -> Self {
        Reassembler {
            context: None,
            buffer: [0; REASSEMBLY_BUFFER_SIZE],
            bitmap: [0; REASSEMBLY_BUFFER_SIZE / 64],
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.context.is_some()
    }

    fn reset(&mut self) {
        self.context = None;
        self.bitmap = [0; REASSEMBLY_BUFFER_SIZE / 64];
    }

    fn mark(&mut self, start: usize, end: usize) {
        for block in start / 8..end.div_ceil(8) {
            self.bitmap[block / 8] |= 0x80 >> (block % 8);
        }
    }

    fn is_filled(&self, len: usize) -> bool {
        (0..len.div_ceil(8)).all(|block| self.bitmap[block / 8] & (0x80 >> (block % 8)) != 0)
    }

    /// Absorb one fragment.
    ///
    /// The walk cursor of `packet` must sit on the fragment header described
    /// by `frag`.
    pub(crate) fn process(
        &mut self,
        now: Instant,
        packet: PacketBuffer,
        frag: &Ipv6FragmentRepr,
    ) -> Outcome {
        let src_addr = packet.src_addr();
        let dst_addr = packet.dst_addr();
        let unfragmentable_len = IPV6_HEADER_LEN + packet.ext_len();

        let matches = self.context.as_ref().map(|c| {
            c.src_addr == src_addr && c.dst_addr == dst_addr && c.ident == frag.ident
        });
        match matches {
            Some(false) => {
                net_debug!("reassembly: already in progress, dropping fragment");
                return Outcome::Incomplete;
            }
            Some(true) => (),
            None => {
                net_trace!(
                    "reassembly: start {} -> {} ident {:#x}",
                    src_addr,
                    dst_addr,
                    frag.ident
                );
                self.bitmap = [0; REASSEMBLY_BUFFER_SIZE / 64];
                self.context = Some(Context {
                    src_addr,
                    dst_addr,
                    ident: frag.ident,
                    header: packet.as_bytes()[..unfragmentable_len].to_vec(),
                    first_seen: false,
                    total_len: None,
                    expires_at: now + REASSEMBLY_MAX_AGE,
                });
            }
        }

        let data = &packet.payload()[IPV6_FRAGMENT_HEADER_LEN..];
        let offset = frag.frag_offset as usize;
        let len = data.len();

        if offset + len > REASSEMBLY_BUFFER_SIZE {
            net_debug!("reassembly: datagram too large, aborting");
            self.reset();
            return Outcome::Incomplete;
        }

        if frag.more_frags && len % 8 != 0 {
            net_debug!("reassembly: fragment length {} not a multiple of 8", len);
            self.reset();
            return Outcome::BadLength(packet);
        }

        self.buffer[offset..offset + len].copy_from_slice(data);
        self.mark(offset, offset + len);

        let total_len = {
            // Set by the match above.
            let Some(context) = self.context.as_mut() else {
                return Outcome::Incomplete;
            };

            if offset == 0 {
                context.first_seen = true;
                context.header.clear();
                context
                    .header
                    .extend_from_slice(&packet.as_bytes()[..unfragmentable_len]);
                context.header[packet.next_header_offset()] = frag.next_header.into();
            }

            if !frag.more_frags {
                context.total_len = Some(offset + len);
            }

            match context.total_len {
                Some(total_len) if context.first_seen => total_len,
                _ => return Outcome::Incomplete,
            }
        };
        if !self.is_filled(total_len) {
            return Outcome::Incomplete;
        }

        let Some(context) = self.context.take() else {
            return Outcome::Incomplete;
        };
        let mut bytes = context.header;
        bytes.extend_from_slice(&self.buffer[..total_len]);
        let payload_len = (bytes.len() - IPV6_HEADER_LEN) as u16;
        Ipv6Packet::new_unchecked(&mut bytes[..]).set_payload_len(payload_len);
        net_trace!("reassembly: complete, {} octets", bytes.len());
        self.reset();

        match PacketBuffer::from_bytes(bytes) {
            Some(packet) => Outcome::Complete(packet),
            None => Outcome::Incomplete,
        }
    }

    /// Expire a reassembly that took too long.
    ///
    /// If its first fragment had arrived, the fixed header of the datagram is
    /// returned so that a Time Exceeded error can be sent about it.
    pub(crate) fn poll(&mut self, now: Instant) -> Option<PacketBuffer> {
        let context = self.context.as_ref()?;
        if context.expires_at > now {
            return None;
        }
        net_debug!("reassembly: timed out");
        let first_seen = context.first_seen;
        let mut header = context.header[..IPV6_HEADER_LEN].to_vec();
        self.reset();

        if !first_seen {
            return None;
        }
        let mut packet = Ipv6Packet::new_unchecked(&mut header[..]);
        packet.set_payload_len(0);
        packet.set_next_header(IpProtocol::Ipv6NoNxt);
        PacketBuffer::from_bytes(header)
    }

    pub(crate) fn poll_at(&self) -> Option<Instant> {
        self.context.as_ref().map(|c| c.expires_at)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::ipv6::test::{MOCK_IP_ADDR_1, MOCK_IP_ADDR_2};
    use rstest::rstest;

    const IDENT: u32 = 0x1234_5678;

    fn datagram_payload() -> Vec<u8> {
        (0..100u8).collect()
    }

    fn fragment(offset: usize, data: &[u8], more_frags: bool, ident: u32) -> PacketBuffer {
        let ip_repr = Ipv6Repr {
            src_addr: MOCK_IP_ADDR_1,
            dst_addr: MOCK_IP_ADDR_2,
            next_header: IpProtocol::Ipv6Frag,
            payload_len: IPV6_FRAGMENT_HEADER_LEN + data.len(),
            hop_limit: 64,
        };
        let mut packet = PacketBuffer::new(&ip_repr);
        let frag_repr = Ipv6FragmentRepr {
            next_header: IpProtocol::Udp,
            frag_offset: offset as u16,
            more_frags,
            ident,
        };
        let payload = packet.payload_mut();
        frag_repr.emit(&mut Ipv6FragmentHeader::new_unchecked(
            &mut payload[..IPV6_FRAGMENT_HEADER_LEN],
        ));
        payload[IPV6_FRAGMENT_HEADER_LEN..].copy_from_slice(data);
        packet
    }

    fn feed(
        reassembler: &mut Reassembler,
        now: Instant,
        packet: PacketBuffer,
    ) -> Outcome {
        let frag_repr = {
            let header = Ipv6FragmentHeader::new_checked(packet.payload()).unwrap();
            Ipv6FragmentRepr::parse(&header).unwrap()
        };
        reassembler.process(now, packet, &frag_repr)
    }

    #[rstest]
    #[case::in_order(&[0, 1, 2])]
    #[case::reversed(&[2, 1, 0])]
    #[case::last_first(&[2, 0, 1])]
    #[case::first_last(&[1, 2, 0])]
    fn test_reassemble(#[case] order: &[usize]) {
        let payload = datagram_payload();
        let pieces = [(0, 40, true), (40, 80, true), (80, 100, false)];

        let mut reassembler = Reassembler::new();
        let mut result = None;
        for (i, &index) in order.iter().enumerate() {
            let (start, end, more) = pieces[index];
            let packet = fragment(start, &payload[start..end], more, IDENT);
            match feed(&mut reassembler, Instant::ZERO, packet) {
                Outcome::Incomplete => assert!(i < order.len() - 1),
                Outcome::Complete(packet) => result = Some(packet),
                Outcome::BadLength(_) => panic!("unexpected bad length"),
            }
        }

        let packet = result.unwrap();
        assert!(!reassembler.is_active());
        assert_eq!(packet.ip_repr().next_header, IpProtocol::Udp);
        assert_eq!(packet.ip_repr().payload_len, 100);
        assert_eq!(packet.payload(), &payload[..]);
    }

    #[test]
    fn test_bad_length() {
        let payload = datagram_payload();
        let mut reassembler = Reassembler::new();
        let packet = fragment(0, &payload[..30], true, IDENT);
        assert!(matches!(
            feed(&mut reassembler, Instant::ZERO, packet),
            Outcome::BadLength(_)
        ));
        assert!(!reassembler.is_active());
    }

    #[test]
    fn test_last_fragment_any_length() {
        let payload = datagram_payload();
        let mut reassembler = Reassembler::new();
        let packet = fragment(48, &payload[48..], false, IDENT);
        assert!(matches!(
            feed(&mut reassembler, Instant::ZERO, packet),
            Outcome::Incomplete
        ));
        assert!(reassembler.is_active());
    }

    #[test]
    fn test_mismatch_dropped() {
        let payload = datagram_payload();
        let mut reassembler = Reassembler::new();
        let packet = fragment(0, &payload[..48], true, IDENT);
        feed(&mut reassembler, Instant::ZERO, packet);

        let other = fragment(48, &payload[48..], false, IDENT + 1);
        assert!(matches!(
            feed(&mut reassembler, Instant::ZERO, other),
            Outcome::Incomplete
        ));

        let last = fragment(48, &payload[48..], false, IDENT);
        assert!(matches!(
            feed(&mut reassembler, Instant::ZERO, last),
            Outcome::Complete(_)
        ));
    }

    #[test]
    fn test_overflow_aborts() {
        let mut reassembler = Reassembler::new();
        let packet = fragment(REASSEMBLY_BUFFER_SIZE - 8, &[0; 16], false, IDENT);
        assert!(matches!(
            feed(&mut reassembler, Instant::ZERO, packet),
            Outcome::Incomplete
        ));
        assert!(!reassembler.is_active());
    }

    #[test]
    fn test_timeout() {
        let payload = datagram_payload();
        let mut reassembler = Reassembler::new();
        let packet = fragment(0, &payload[..48], true, IDENT);
        feed(&mut reassembler, Instant::ZERO, packet);
        assert_eq!(reassembler.poll_at(), Some(Instant::ZERO + REASSEMBLY_MAX_AGE));

        assert!(reassembler.poll(Instant::from_secs(59)).is_none());
        let header = reassembler.poll(Instant::from_secs(60)).unwrap();
        assert_eq!(header.len(), IPV6_HEADER_LEN);
        assert_eq!(header.src_addr(), MOCK_IP_ADDR_1);
        assert!(!reassembler.is_active());
    }

    #[test]
    fn test_timeout_without_first_fragment() {
        let payload = datagram_payload();
        let mut reassembler = Reassembler::new();
        let packet = fragment(48, &payload[48..], false, IDENT);
        feed(&mut reassembler, Instant::ZERO, packet);
        assert!(reassembler.poll(Instant::from_secs(60)).is_none());
        assert!(!reassembler.is_active());
    }
}
