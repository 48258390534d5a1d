use super::*;

impl InterfaceInner {
    pub(super) fn process_udp(
        &mut self,
        sockets: &mut Sockets,
        mut packet: PacketBuffer,
    ) -> Option<PacketBuffer> {
        packet.remove_ext_headers();
        let ip_repr = packet.ip_repr();
        let handled = {
            let udp_packet = check!(UdpPacket::new_checked(packet.payload()));
            let udp_repr = check!(UdpRepr::parse(
                &udp_packet,
                &ip_repr.src_addr,
                &ip_repr.dst_addr
            ));
            net_trace!(
                "udp: [{}]:{} -> port {} ({} octets)",
                ip_repr.src_addr,
                udp_repr.src_port,
                udp_repr.dst_port,
                udp_repr.payload.len()
            );
            sockets.process_udp(&ip_repr, &udp_repr)
        };

        if handled || !self.udp_port_unreachable {
            return None;
        }
        // The datagram wasn't taken by an endpoint, send an ICMP port unreachable packet.
        let error = IcmpError::DstUnreachable(Icmpv6DstUnreachable::PortUnreachable);
        self.icmpv6_error(packet, error, false)
    }

    /// Transmit the datagrams the endpoints have staged.
    pub(super) fn udp_egress(&mut self, sockets: &mut Sockets) {
        sockets.dispatch_udp(|local, remote, data| {
            let src_addr = if local.addr.is_unspecified() {
                match self.get_source_address_ipv6(&remote.addr) {
                    Some(addr) => addr,
                    None => {
                        net_debug!("udp: no source address for {}, dropping", remote.addr);
                        return;
                    }
                }
            } else {
                local.addr
            };
            let packet = self.udp_packet(
                IpEndpoint::new(src_addr, local.port),
                remote,
                data,
            );
            self.send_packet(packet);
        })
    }

    fn udp_packet(
        &self,
        local: IpEndpoint,
        remote: IpEndpoint,
        data: &[u8],
    ) -> PacketBuffer {
        let udp_repr = UdpRepr {
            src_port: local.port,
            dst_port: remote.port,
            payload: data,
        };
        let ip_repr = Ipv6Repr {
            src_addr: local.addr,
            dst_addr: remote.addr,
            next_header: IpProtocol::Udp,
            payload_len: udp_repr.buffer_len(),
            hop_limit: self.hop_limit,
        };
        let mut packet = PacketBuffer::new(&ip_repr);
        udp_repr.emit(
            &mut UdpPacket::new_unchecked(packet.payload_mut()),
            &local.addr,
            &remote.addr,
        );
        packet
    }
}
