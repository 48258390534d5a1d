use super::*;

impl InterfaceInner {
    pub(super) fn process_tcp(
        &mut self,
        sockets: &mut Sockets,
        mut packet: PacketBuffer,
    ) -> Option<PacketBuffer> {
        packet.remove_ext_headers();
        let ip_repr = packet.ip_repr();
        if ip_repr.dst_addr.is_multicast() {
            net_debug!("tcp: segment to multicast {}, dropping", ip_repr.dst_addr);
            return None;
        }

        let tcp_packet = check!(TcpPacket::new_checked(packet.payload()));
        let tcp_repr = check!(TcpRepr::parse(
            &tcp_packet,
            &ip_repr.src_addr,
            &ip_repr.dst_addr
        ));
        net_trace!("tcp: received {}", tcp_repr);

        sockets.process_tcp(self, &ip_repr, &tcp_repr, |cx, ip_repr, tcp_repr| {
            let reply = cx.tcp_packet(ip_repr, tcp_repr);
            cx.send_packet(reply)
        });
        None
    }

    /// Run the TCP timers and transmit what the connections have pending.
    pub(super) fn tcp_egress(&mut self, sockets: &mut Sockets) {
        sockets.dispatch_tcp(self, |cx, ip_repr, tcp_repr| {
            let packet = cx.tcp_packet(ip_repr, tcp_repr);
            cx.send_packet(packet)
        })
    }

    fn tcp_packet(&self, ip_repr: &Ipv6Repr, tcp_repr: &TcpRepr) -> PacketBuffer {
        let mut packet = PacketBuffer::new(ip_repr);
        tcp_repr.emit(
            &mut TcpPacket::new_unchecked(packet.payload_mut()),
            &ip_repr.src_addr,
            &ip_repr.dst_addr,
        );
        packet
    }
}
