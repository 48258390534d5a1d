use super::*;

/// Where the extension header walk ended.
enum Walk {
    /// The cursor reached an upper-layer protocol.
    Upper(PacketBuffer),
    /// A datagram was reassembled and must go through the walk again.
    Restart(PacketBuffer),
    /// Processing stopped, possibly with an error to send back.
    Done(Option<PacketBuffer>),
}

/// Outcome of stepping over one extension header.
enum Step {
    Next(PacketBuffer),
    Stop(Option<PacketBuffer>),
}

impl Default for Step {
    fn default() -> Self {
        Step::Stop(None)
    }
}

/// What the options of a Hop-by-Hop or Destination Options header decided.
enum OptionsVerdict {
    Continue,
    Drop,
    Error { pointer: usize, to_multicast: bool },
}

impl InterfaceInner {
    /// Process a received datagram. Returns the packet to send in reply, if
    /// any. Forwarded packets go straight to the transmit path.
    pub(super) fn process_ipv6(
        &mut self,
        sockets: &mut Sockets,
        reassembler: &mut Reassembler,
        mut packet: PacketBuffer,
    ) -> Option<PacketBuffer> {
        loop {
            let dst_addr = packet.dst_addr();
            net_trace!(
                "ipv6: {} -> {} ({} octets)",
                packet.src_addr(),
                dst_addr,
                packet.len()
            );

            if !self.accepts(&dst_addr) {
                return self.process_not_for_us(packet);
            }

            match self.walk_ext_headers(reassembler, packet) {
                Walk::Upper(packet) => return self.process_upper(sockets, packet),
                Walk::Restart(reassembled) => packet = reassembled,
                Walk::Done(reply) => return reply,
            }
        }
    }

    /// Whether packets sent to `addr` are delivered to this node.
    pub(super) fn accepts(&self, addr: &Ipv6Address) -> bool {
        if addr.is_loopback() || self.addresses.contains(addr) {
            return true;
        }
        addr.is_multicast() && self.has_multicast_group(addr)
    }

    fn process_not_for_us(&mut self, mut packet: PacketBuffer) -> Option<PacketBuffer> {
        let src_addr = packet.src_addr();
        let dst_addr = packet.dst_addr();

        if self.role == Role::Host {
            net_trace!("ipv6: {} is not for us, dropping", dst_addr);
            return None;
        }
        if dst_addr.is_multicast() || dst_addr.is_loopback() || src_addr.is_unspecified() {
            return None;
        }

        if src_addr.is_link_local() {
            if !dst_addr.is_link_local() && !self.is_on_link(&dst_addr) {
                let error = IcmpError::DstUnreachable(Icmpv6DstUnreachable::BeyondScope);
                return self.icmpv6_error(packet, error, false);
            }
            return None;
        }
        if dst_addr.is_link_local() {
            return None;
        }

        if packet.len() > self.link_mtu {
            net_debug!("ipv6: {} octets do not fit the link MTU", packet.len());
            let error = IcmpError::PktTooBig {
                mtu: self.link_mtu as u32,
            };
            return self.icmpv6_error(packet, error, false);
        }
        if packet.hop_limit() <= 1 {
            net_debug!("ipv6: hop limit exceeded for {}", dst_addr);
            let error = IcmpError::TimeExceeded(Icmpv6TimeExceeded::HopLimitExceeded);
            return self.icmpv6_error(packet, error, false);
        }
        if !self.routing.update_forward(&mut packet) {
            net_debug!("ipv6: routing refused to forward to {}", dst_addr);
            return None;
        }

        let hop_limit = packet.hop_limit() - 1;
        packet.ip_packet_mut().set_hop_limit(hop_limit);
        net_trace!("ipv6: forwarding {} -> {}", src_addr, dst_addr);
        self.forward_packet(packet);
        None
    }

    fn walk_ext_headers(&mut self, reassembler: &mut Reassembler, mut packet: PacketBuffer) -> Walk {
        let mut dst_opts_seen = 0;
        let mut routing_seen = 0;

        loop {
            match packet.next_header() {
                IpProtocol::Icmpv6 | IpProtocol::Udp | IpProtocol::Tcp => {
                    return Walk::Upper(packet)
                }
                IpProtocol::Ipv6NoNxt => return Walk::Done(None),
                IpProtocol::HopByHop if packet.ext_len() == 0 => {
                    packet = match self.process_options(packet) {
                        Step::Next(packet) => packet,
                        Step::Stop(reply) => return Walk::Done(reply),
                    }
                }
                IpProtocol::Ipv6Opts if dst_opts_seen < 2 => {
                    dst_opts_seen += 1;
                    packet = match self.process_options(packet) {
                        Step::Next(packet) => packet,
                        Step::Stop(reply) => return Walk::Done(reply),
                    }
                }
                IpProtocol::Ipv6Route if routing_seen < 1 => {
                    routing_seen += 1;
                    packet = match self.process_routing(packet) {
                        Step::Next(packet) => packet,
                        Step::Stop(reply) => return Walk::Done(reply),
                    }
                }
                IpProtocol::Ipv6Frag => return self.process_fragment(reassembler, packet),
                next_header => {
                    net_debug!("ipv6: unrecognized next header {}", next_header);
                    let error = IcmpError::ParamProblem {
                        reason: Icmpv6ParamProblem::UnrecognizedNxtHdr,
                        pointer: packet.next_header_offset() as u32,
                    };
                    return Walk::Done(self.icmpv6_error(packet, error, false));
                }
            }
        }
    }

    /// Walk the options of the Hop-by-Hop or Destination Options header at
    /// the cursor, and step over it.
    fn process_options(&mut self, mut packet: PacketBuffer) -> Step {
        let (verdict, next_header, len) = {
            let header = check!(Ipv6ExtHeader::new_checked(packet.payload()));
            let repr = check!(Ipv6ExtHeaderRepr::parse(&header));
            (self.verify_options(repr.data), repr.next_header, repr.buffer_len())
        };

        match verdict {
            OptionsVerdict::Continue => {
                packet.skip_ext_header(next_header, len);
                Step::Next(packet)
            }
            OptionsVerdict::Drop => Step::Stop(None),
            OptionsVerdict::Error {
                pointer,
                to_multicast,
            } => {
                let error = IcmpError::ParamProblem {
                    reason: Icmpv6ParamProblem::UnrecognizedOption,
                    pointer: (IPV6_HEADER_LEN + packet.ext_len() + pointer) as u32,
                };
                Step::Stop(self.icmpv6_error(packet, error, to_multicast))
            }
        }
    }

    fn verify_options(&mut self, data: &[u8]) -> OptionsVerdict {
        // Options start after the next header and length octets.
        const OPTIONS_OFFSET: usize = 2;

        let mut options = Ipv6OptionsIterator::new(data);
        loop {
            let offset = options.offset();
            let option = match options.next() {
                Some(Ok(option)) => option,
                Some(Err(_)) => {
                    net_debug!("ipv6: malformed option, dropping");
                    return OptionsVerdict::Drop;
                }
                None => return OptionsVerdict::Continue,
            };

            match option {
                Ipv6OptionRepr::Pad1 | Ipv6OptionRepr::PadN(_) => (),
                Ipv6OptionRepr::RoutingProtocol(data) => {
                    if !self.routing.verify_option(data) {
                        net_debug!("ipv6: routing option rejected");
                        return OptionsVerdict::Drop;
                    }
                }
                Ipv6OptionRepr::Unknown { type_, .. } => {
                    let pointer = OPTIONS_OFFSET + offset;
                    match Ipv6OptionFailureType::from(type_) {
                        Ipv6OptionFailureType::Skip => (),
                        Ipv6OptionFailureType::DiscardSendAll => {
                            net_debug!("ipv6: unknown option {}, sending error", type_);
                            return OptionsVerdict::Error {
                                pointer,
                                to_multicast: true,
                            };
                        }
                        Ipv6OptionFailureType::DiscardSendUnicast => {
                            net_debug!("ipv6: unknown option {}, sending error", type_);
                            return OptionsVerdict::Error {
                                pointer,
                                to_multicast: false,
                            };
                        }
                        _ => {
                            net_debug!("ipv6: unknown option {}, dropping", type_);
                            return OptionsVerdict::Drop;
                        }
                    }
                }
            }
        }
    }

    fn process_routing(&mut self, mut packet: PacketBuffer) -> Step {
        // Offset of segments left from the start of the routing header.
        const SEGMENTS_LEFT_OFFSET: usize = 3;

        let (segments_left, next_header, len) = {
            let header = check!(Ipv6ExtHeader::new_checked(packet.payload()));
            let repr = check!(Ipv6ExtHeaderRepr::parse(&header));
            let routing = check!(Ipv6RoutingHeader::new_checked(repr.data));
            (routing.segments_left(), repr.next_header, repr.buffer_len())
        };

        if segments_left > 0 {
            net_debug!("ipv6: routing header with {} segments left", segments_left);
            let error = IcmpError::ParamProblem {
                reason: Icmpv6ParamProblem::ErroneousHdrField,
                pointer: (IPV6_HEADER_LEN + packet.ext_len() + SEGMENTS_LEFT_OFFSET) as u32,
            };
            return Step::Stop(self.icmpv6_error(packet, error, false));
        }

        packet.skip_ext_header(next_header, len);
        Step::Next(packet)
    }

    fn process_fragment(&mut self, reassembler: &mut Reassembler, packet: PacketBuffer) -> Walk {
        // Offset of the payload length field in the fixed header.
        const PAYLOAD_LEN_POINTER: u32 = 4;

        let repr = {
            let header = match Ipv6FragmentHeader::new_checked(packet.payload()) {
                Ok(header) => header,
                Err(_) => return Walk::Done(None),
            };
            match Ipv6FragmentRepr::parse(&header) {
                Ok(repr) => repr,
                Err(_) => return Walk::Done(None),
            }
        };

        match reassembler.process(self.now, packet, &repr) {
            Outcome::Incomplete => Walk::Done(None),
            Outcome::Complete(reassembled) => {
                net_trace!("ipv6: reassembled {} octets", reassembled.len());
                Walk::Restart(reassembled)
            }
            Outcome::BadLength(packet) => {
                let error = IcmpError::ParamProblem {
                    reason: Icmpv6ParamProblem::ErroneousHdrField,
                    pointer: PAYLOAD_LEN_POINTER,
                };
                Walk::Done(self.icmpv6_error(packet, error, false))
            }
        }
    }

    fn process_upper(&mut self, sockets: &mut Sockets, packet: PacketBuffer) -> Option<PacketBuffer> {
        match packet.next_header() {
            IpProtocol::Icmpv6 => self.process_icmpv6(packet),
            IpProtocol::Udp => self.process_udp(sockets, packet),
            IpProtocol::Tcp => self.process_tcp(sockets, packet),
            _ => None,
        }
    }
}
