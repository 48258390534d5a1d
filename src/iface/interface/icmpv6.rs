use super::*;

/// A handler for one kind of ICMPv6 message.
///
/// It owns the packet from then on and returns the reply to send, if any.
pub type Icmpv6HandlerFn = fn(&mut InterfaceInner, PacketBuffer) -> Option<PacketBuffer>;

/// Called with the source, identifier, sequence number and data of every
/// Echo Reply received.
pub type EchoReplyCallback = fn(Ipv6Address, u16, u16, &[u8]);

/// Error type for `register_icmpv6_handler`, `add_echo_reply_callback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegistryFull;

impl core::fmt::Display for RegistryFull {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Registry full")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RegistryFull {}

/// An entry of the ICMPv6 handler registry.
#[derive(Debug, Clone, Copy)]
pub struct Icmpv6Handler {
    pub msg_type: Icmpv6Message,
    /// `None` matches any code.
    pub code: Option<u8>,
    pub handler: Icmpv6HandlerFn,
}

impl Icmpv6Handler {
    fn matches(&self, msg_type: Icmpv6Message, code: u8) -> bool {
        self.msg_type == msg_type && self.code.map_or(true, |c| c == code)
    }
}

/// Result of looking a message up in the handler registry.
#[derive(Debug)]
pub enum Dispatch {
    /// A handler took the message; this is its reply.
    Handled(Option<PacketBuffer>),
    NoHandler,
}

impl InterfaceInner {
    pub(super) fn register_icmpv6_handler(
        &mut self,
        msg_type: Icmpv6Message,
        code: Option<u8>,
        handler: Icmpv6HandlerFn,
    ) -> Result<(), RegistryFull> {
        self.icmpv6_handlers
            .push(Icmpv6Handler {
                msg_type,
                code,
                handler,
            })
            .map_err(|_| RegistryFull)
    }

    pub(super) fn register_default_handlers(&mut self) {
        let role_handler: (Icmpv6Message, Icmpv6HandlerFn) = match self.role {
            Role::Host => (Icmpv6Message::RouterAdvert, ndisc::router_advert),
            Role::Router => (Icmpv6Message::RouterSolicit, ndisc::router_solicit),
        };
        let handlers: [(Icmpv6Message, Option<u8>, Icmpv6HandlerFn); 5] = [
            (Icmpv6Message::EchoRequest, Some(0), echo_request),
            (Icmpv6Message::EchoReply, Some(0), echo_reply),
            (Icmpv6Message::NeighborSolicit, Some(0), ndisc::neighbor_solicit),
            (Icmpv6Message::NeighborAdvert, Some(0), ndisc::neighbor_advert),
            (role_handler.0, Some(0), role_handler.1),
        ];
        for (msg_type, code, handler) in handlers {
            if self.register_icmpv6_handler(msg_type, code, handler).is_err() {
                net_debug!("icmpv6: no room for the {} handler", msg_type);
            }
        }
    }

    pub(super) fn process_icmpv6(&mut self, packet: PacketBuffer) -> Option<PacketBuffer> {
        let (msg_type, msg_code) = {
            let icmp_packet = check!(Icmpv6Packet::new_checked(packet.payload()));
            if !icmp_packet.verify_checksum(&packet.src_addr(), &packet.dst_addr()) {
                net_debug!("icmpv6: bad checksum, dropping");
                return None;
            }
            (icmp_packet.msg_type(), icmp_packet.msg_code())
        };

        match self.dispatch_icmpv6(msg_type, msg_code, packet) {
            Dispatch::Handled(reply) => reply,
            Dispatch::NoHandler => {
                net_debug!("icmpv6: no handler for {} code {}", msg_type, msg_code);
                None
            }
        }
    }

    /// Hand a message to the first registered handler matching its type and code.
    pub fn dispatch_icmpv6(
        &mut self,
        msg_type: Icmpv6Message,
        code: u8,
        packet: PacketBuffer,
    ) -> Dispatch {
        let handler = self
            .icmpv6_handlers
            .iter()
            .find(|h| h.matches(msg_type, code))
            .map(|h| h.handler);
        match handler {
            Some(handler) => Dispatch::Handled(handler(self, packet)),
            None => Dispatch::NoHandler,
        }
    }
}

/// Turn an Echo Request around in place.
fn echo_request(cx: &mut InterfaceInner, mut packet: PacketBuffer) -> Option<PacketBuffer> {
    let src_addr = packet.src_addr();
    let dst_addr = packet.dst_addr();
    if src_addr.is_unspecified() {
        return None;
    }

    let reply_src = if dst_addr.is_multicast() {
        cx.get_source_address_ipv6(&src_addr)?
    } else if cx.addresses.is_usable(&dst_addr) || dst_addr.is_loopback() {
        dst_addr
    } else {
        net_debug!("icmpv6: echo request to tentative {}, dropping", dst_addr);
        return None;
    };
    net_trace!("icmpv6: echo request from {}", src_addr);

    packet.remove_ext_headers();
    let hop_limit = cx.hop_limit;
    {
        let mut ip_packet = packet.ip_packet_mut();
        ip_packet.set_src_addr(reply_src);
        ip_packet.set_dst_addr(src_addr);
        ip_packet.set_hop_limit(hop_limit);
    }
    {
        let mut icmp_packet = Icmpv6Packet::new_unchecked(packet.payload_mut());
        icmp_packet.set_msg_type(Icmpv6Message::EchoReply);
        icmp_packet.set_msg_code(0);
        icmp_packet.fill_checksum(&reply_src, &src_addr);
    }
    cx.routing.invert_header(&mut packet);
    Some(packet)
}

fn echo_reply(cx: &mut InterfaceInner, packet: PacketBuffer) -> Option<PacketBuffer> {
    let src_addr = packet.src_addr();
    let dst_addr = packet.dst_addr();
    let icmp_packet = check!(Icmpv6Packet::new_checked(packet.payload()));
    if let Icmpv6Repr::EchoReply {
        ident,
        seq_no,
        data,
    } = check!(Icmpv6Repr::parse(&src_addr, &dst_addr, &icmp_packet))
    {
        net_trace!("icmpv6: echo reply from {} seq {}", src_addr, seq_no);
        for callback in cx.echo_callbacks.iter() {
            callback(src_addr, ident, seq_no, data);
        }
    }
    None
}
