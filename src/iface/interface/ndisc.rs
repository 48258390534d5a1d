// Neighbor Discovery (RFC 4861) and Stateless Address Autoconfiguration
// (RFC 4862): message handlers, next-hop resolution, and the timers of the
// neighbor cache, the address table and router discovery.

use super::*;
use crate::config::{IFACE_MAX_ADDR_COUNT, IFACE_NEIGHBOR_CACHE_COUNT};
use crate::iface::address::State as AddressState;
use crate::iface::neighbor::State as NeighborState;

pub(super) const MAX_MULTICAST_SOLICIT: u8 = 3;
pub(super) const MAX_UNICAST_SOLICIT: u8 = 3;
pub(super) const REACHABLE_TIME: Duration = Duration::from_secs(30);
pub(super) const RETRANS_TIMER: Duration = Duration::from_secs(1);
pub(super) const DELAY_FIRST_PROBE_TIME: Duration = Duration::from_secs(5);
pub(super) const MAX_RTR_SOLICITATIONS: u8 = 3;
pub(super) const RTR_SOLICITATION_INTERVAL: Duration = Duration::from_secs(4);
pub(super) const MAX_RTR_SOLICITATION_DELAY: Duration = Duration::from_secs(1);
pub(super) const MAX_RA_DELAY_TIME: Duration = Duration::from_millis(500);
/// Upper bound of the random delay before the first DAD probe.
pub(super) const MAX_DAD_DELAY: Duration = Duration::from_secs(1);
const MAX_REACHABLE_TIME: Duration = Duration::from_millis(3_600_000);
const MAX_ROUTER_LIFETIME: Duration = Duration::from_secs(9000);
/// RFC 4862 § 5.5.3 e)
const MIN_VALID_LIFETIME: Duration = Duration::from_secs(2 * 60 * 60);
/// Neighbor Discovery messages are only valid if they were not forwarded.
const NDISC_HOP_LIMIT: u8 = 255;

enum NeighborAction {
    Solicit(Ipv6Address),
    Probe(Ipv6Address),
    Remove(Ipv6Address),
}

impl InterfaceInner {
    /// A reachable time drawn uniformly from 0.5 to 1.5 times the base.
    pub(super) fn random_reachable_time(&mut self) -> Duration {
        let base = self.base_reachable_time.total_micros();
        let jitter = self.rand.rand_below(base + 1);
        Duration::from_micros(base / 2 + jitter)
    }

    /// Assign a tentative address and schedule its first DAD probe.
    pub(super) fn start_dad(
        &mut self,
        addr: Ipv6Address,
        kind: AddressKind,
        valid_until: Option<Instant>,
        preferred_until: Option<Instant>,
    ) -> Result<(), TableFull> {
        let delay = Duration::from_micros(self.rand.rand_below(MAX_DAD_DELAY.total_micros()));
        let dad_transmits = self.dad_transmits;
        self.addresses.add_tentative(
            addr,
            kind,
            valid_until,
            preferred_until,
            dad_transmits,
            self.now + delay,
        )?;
        net_debug!("address {}: starting DAD", addr);
        Ok(())
    }

    fn dad_failed(&mut self, addr: Ipv6Address) {
        net_debug!("address {}: duplicate detected, DAD failed", addr);
        self.addresses.remove(&addr);
    }

    pub(super) fn poll_dad(&mut self) {
        let now = self.now;
        let retrans_timer = self.retrans_timer;
        let mut probes: Vec<Ipv6Address, IFACE_MAX_ADDR_COUNT> = Vec::new();
        let mut completed: Vec<Ipv6Address, IFACE_MAX_ADDR_COUNT> = Vec::new();

        for entry in self.addresses.iter_mut() {
            if entry.state != AddressState::Tentative {
                continue;
            }
            match entry.dad_timer {
                Some(timer) if timer <= now => (),
                _ => continue,
            }
            if entry.dad_count == 0 {
                entry.dad_timer = None;
                entry.set_state(AddressState::Preferred);
                let _ = completed.push(entry.addr);
            } else {
                entry.dad_count -= 1;
                entry.dad_timer = Some(now + retrans_timer);
                let _ = probes.push(entry.addr);
            }
        }

        for addr in probes {
            net_trace!("address {}: DAD probe", addr);
            self.send_neighbor_solicit(Ipv6Address::UNSPECIFIED, addr.solicited_node(), addr);
        }
        for addr in completed {
            net_debug!("address {}: DAD succeeded", addr);
            if addr.is_link_local() {
                self.start_router_discovery();
            }
        }
    }

    fn start_router_discovery(&mut self) {
        match self.role {
            Role::Host if self.send_router_solicitations => {
                let delay = self
                    .rand
                    .rand_below(MAX_RTR_SOLICITATION_DELAY.total_micros());
                self.rs_count = MAX_RTR_SOLICITATIONS;
                self.rs_at = Some(self.now + Duration::from_micros(delay));
            }
            Role::Host => (),
            Role::Router => self.ra_at = Some(self.now),
        }
    }

    pub(super) fn poll_router_discovery(&mut self) {
        let now = self.now;

        if matches!(self.rs_at, Some(at) if at <= now) {
            if self.rs_count > 0 {
                self.rs_count -= 1;
                self.send_router_solicit();
            }
            self.rs_at = match self.rs_count {
                0 => None,
                _ => Some(now + RTR_SOLICITATION_INTERVAL),
            };
        }

        if matches!(self.ra_at, Some(at) if at <= now) {
            self.send_router_advert();
            self.ra_at = Some(now + self.ra_interval);
        }
    }

    pub(super) fn poll_neighbors(&mut self) {
        let now = self.now;
        let retrans_timer = self.retrans_timer;
        let mut actions: Vec<NeighborAction, IFACE_NEIGHBOR_CACHE_COUNT> = Vec::new();

        for neighbor in self.neighbors.iter_mut() {
            match neighbor.timer {
                Some(timer) if timer <= now => (),
                _ => continue,
            }
            let ip_addr = neighbor.ip_addr;
            let action = match neighbor.state {
                NeighborState::Reachable => {
                    neighbor.set_state(NeighborState::Stale, None);
                    continue;
                }
                NeighborState::Stale => {
                    neighbor.timer = None;
                    continue;
                }
                NeighborState::Delay => {
                    neighbor.set_state(NeighborState::Probe, Some(now + retrans_timer));
                    neighbor.ns_count = 1;
                    NeighborAction::Probe(ip_addr)
                }
                NeighborState::Probe if neighbor.ns_count >= MAX_UNICAST_SOLICIT => {
                    NeighborAction::Remove(ip_addr)
                }
                NeighborState::Incomplete if neighbor.ns_count >= MAX_MULTICAST_SOLICIT => {
                    NeighborAction::Remove(ip_addr)
                }
                NeighborState::Probe => {
                    neighbor.ns_count += 1;
                    neighbor.timer = Some(now + retrans_timer);
                    NeighborAction::Probe(ip_addr)
                }
                NeighborState::Incomplete => {
                    neighbor.ns_count += 1;
                    neighbor.timer = Some(now + retrans_timer);
                    NeighborAction::Solicit(ip_addr)
                }
            };
            let _ = actions.push(action);
        }

        for action in actions {
            match action {
                NeighborAction::Solicit(ip_addr) => {
                    if let Some(src_addr) = self.get_source_address_ipv6(&ip_addr) {
                        self.send_neighbor_solicit(src_addr, ip_addr.solicited_node(), ip_addr);
                    }
                }
                NeighborAction::Probe(ip_addr) => {
                    if let Some(src_addr) = self.get_source_address_ipv6(&ip_addr) {
                        self.send_neighbor_solicit(src_addr, ip_addr, ip_addr);
                    }
                }
                NeighborAction::Remove(ip_addr) => self.neighbor_unreachable(ip_addr),
            }
        }
    }

    fn neighbor_unreachable(&mut self, ip_addr: Ipv6Address) {
        let Some(neighbor) = self.neighbors.remove(&ip_addr) else {
            return;
        };
        net_debug!("neighbor {}: unreachable", ip_addr);

        if let Some(packet) = neighbor.pending {
            // Only forwarded packets have a source to report the failure to.
            if !self.addresses.contains(&packet.src_addr()) {
                let error = IcmpError::DstUnreachable(Icmpv6DstUnreachable::AddrUnreachable);
                if let Some(error) = self.icmpv6_error(packet, error, false) {
                    self.send_packet(error);
                }
            }
        }

        if self.routers.remove(&ip_addr).is_some() || neighbor.is_router {
            net_debug!("router {}: unreachable, repairing", ip_addr);
            self.routing.global_repair();
        }
    }

    /// Find the link-layer destination of `packet`.
    ///
    /// Returns the packet if it can be transmitted right away. Otherwise it is
    /// parked on the neighbor entry of its next hop, or dropped when there is
    /// no route.
    pub(super) fn resolve_link_dst(&mut self, mut packet: PacketBuffer) -> Option<PacketBuffer> {
        let src_addr = packet.src_addr();
        let dst_addr = packet.dst_addr();

        if dst_addr.is_multicast() {
            packet.set_link_dst(EthernetAddress::from_ipv6_multicast(&dst_addr));
            return Some(packet);
        }
        if dst_addr.is_loopback() || self.addresses.contains(&dst_addr) {
            packet.set_link_dst(self.hardware_addr);
            return Some(packet);
        }

        let next_hop = if self.is_on_link(&dst_addr) {
            dst_addr
        } else {
            match self.routers.default_router() {
                Some(router) => router,
                None => {
                    net_debug!("iface: no route to {}, dropping", dst_addr);
                    return None;
                }
            }
        };

        let now = self.now;
        match self.neighbors.lookup_mut(&next_hop) {
            Some(neighbor) => match neighbor.lladdr {
                Some(lladdr) if neighbor.state != NeighborState::Incomplete => {
                    if neighbor.state == NeighborState::Stale {
                        neighbor.set_state(NeighborState::Delay, Some(now + DELAY_FIRST_PROBE_TIME));
                    }
                    packet.set_link_dst(lladdr);
                    Some(packet)
                }
                _ => {
                    if neighbor.pending.replace(packet).is_some() {
                        net_debug!("neighbor {}: replacing pending packet", next_hop);
                    }
                    None
                }
            },
            None => {
                let timer = Some(now + self.retrans_timer);
                match self
                    .neighbors
                    .add(next_hop, None, false, NeighborState::Incomplete, timer)
                {
                    Ok(neighbor) => {
                        neighbor.ns_count = 1;
                        neighbor.pending = Some(packet);
                    }
                    Err(_) => return None,
                }

                let ns_src = if self.addresses.is_usable(&src_addr) {
                    Some(src_addr)
                } else {
                    self.get_source_address_ipv6(&next_hop)
                };
                match ns_src {
                    Some(ns_src) => {
                        self.send_neighbor_solicit(ns_src, next_hop.solicited_node(), next_hop)
                    }
                    None => net_debug!("neighbor {}: no source for solicitation", next_hop),
                }
                None
            }
        }
    }

    /// Transmit the packet parked on a neighbor entry, if its link-layer
    /// address is known now.
    fn release_pending(&mut self, ip_addr: &Ipv6Address) {
        let released = match self.neighbors.lookup_mut(ip_addr) {
            Some(neighbor) => match neighbor.lladdr {
                Some(lladdr) => neighbor.pending.take().map(|mut packet| {
                    packet.set_link_dst(lladdr);
                    packet
                }),
                None => None,
            },
            None => None,
        };
        if let Some(packet) = released {
            net_trace!("neighbor {}: releasing pending packet", ip_addr);
            self.push_tx(packet);
        }
    }

    /// Record a link-layer address announced in a solicitation or an
    /// advertisement from a router.
    fn learn_neighbor(
        &mut self,
        ip_addr: Ipv6Address,
        lladdr: EthernetAddress,
        is_router: Option<bool>,
    ) {
        match self.neighbors.lookup_mut(&ip_addr) {
            Some(neighbor) => {
                if neighbor.lladdr != Some(lladdr) {
                    neighbor.lladdr = Some(lladdr);
                    neighbor.set_state(NeighborState::Stale, None);
                }
                if let Some(is_router) = is_router {
                    neighbor.is_router = is_router;
                }
            }
            None => {
                let is_router = is_router.unwrap_or(false);
                if self
                    .neighbors
                    .add(ip_addr, Some(lladdr), is_router, NeighborState::Stale, None)
                    .is_err()
                {
                    return;
                }
            }
        }
        self.release_pending(&ip_addr);
    }

    fn ndisc_packet(
        &self,
        src_addr: Ipv6Address,
        dst_addr: Ipv6Address,
        repr: NdiscRepr,
    ) -> PacketBuffer {
        self.icmpv6_packet(src_addr, dst_addr, NDISC_HOP_LIMIT, &Icmpv6Repr::Ndisc(repr))
    }

    fn send_neighbor_solicit(
        &mut self,
        src_addr: Ipv6Address,
        dst_addr: Ipv6Address,
        target_addr: Ipv6Address,
    ) {
        let lladdr = match src_addr.is_unspecified() {
            true => None,
            false => Some(self.hardware_addr),
        };
        let repr = NdiscRepr::NeighborSolicit {
            target_addr,
            lladdr,
        };
        let packet = self.ndisc_packet(src_addr, dst_addr, repr);
        self.send_packet(packet);
    }

    fn neighbor_advert_packet(
        &self,
        dst_addr: Ipv6Address,
        target_addr: Ipv6Address,
        mut flags: NdiscNeighborFlags,
    ) -> PacketBuffer {
        if self.role == Role::Router {
            flags |= NdiscNeighborFlags::ROUTER;
        }
        let repr = NdiscRepr::NeighborAdvert {
            flags,
            target_addr,
            lladdr: Some(self.hardware_addr),
        };
        self.ndisc_packet(target_addr, dst_addr, repr)
    }

    fn send_router_solicit(&mut self) {
        let (src_addr, lladdr) = match self.addresses.link_local() {
            Some(addr) => (addr, Some(self.hardware_addr)),
            None => (Ipv6Address::UNSPECIFIED, None),
        };
        net_trace!("ndisc: sending router solicitation");
        let packet = self.ndisc_packet(
            src_addr,
            IPV6_LINK_LOCAL_ALL_ROUTERS,
            NdiscRepr::RouterSolicit { lladdr },
        );
        self.send_packet(packet);
    }

    fn send_router_advert(&mut self) {
        let Some(src_addr) = self.addresses.link_local() else {
            net_debug!("ndisc: no link-local address to advertise from");
            return;
        };

        let mut prefix_info = Vec::new();
        for prefix in self.router_prefixes.iter() {
            let mut flags = NdiscPrefixInfoFlags::empty();
            if prefix.on_link {
                flags |= NdiscPrefixInfoFlags::ON_LINK;
            }
            if prefix.autonomous {
                flags |= NdiscPrefixInfoFlags::ADDRCONF;
            }
            let _ = prefix_info.push(NdiscPrefixInformation {
                prefix_len: prefix.cidr.prefix_len(),
                flags,
                valid_lifetime: Duration::from_secs(prefix.valid_lifetime as u64),
                preferred_lifetime: Duration::from_secs(prefix.preferred_lifetime as u64),
                prefix: prefix.cidr.address(),
            });
        }

        let repr = NdiscRepr::RouterAdvert {
            hop_limit: self.hop_limit,
            flags: NdiscRouterFlags::empty(),
            router_lifetime: (self.ra_interval * 3).min(MAX_ROUTER_LIFETIME),
            reachable_time: Duration::ZERO,
            retrans_time: Duration::ZERO,
            lladdr: Some(self.hardware_addr),
            mtu: Some(self.link_mtu as u32),
            prefix_info,
        };
        net_trace!("ndisc: sending router advertisement");
        let packet = self.ndisc_packet(src_addr, IPV6_LINK_LOCAL_ALL_NODES, repr);
        self.send_packet(packet);
    }

    fn process_prefix_info(&mut self, info: &NdiscPrefixInformation) {
        if info.prefix_len > 128
            || info.prefix.is_link_local()
            || info.preferred_lifetime > info.valid_lifetime
        {
            net_debug!("ndisc: ignoring prefix {}/{}", info.prefix, info.prefix_len);
            return;
        }

        let now = self.now;
        let deadline = |lifetime: Duration| match lifetime {
            NDISC_INFINITE_LIFETIME => None,
            lifetime => Some(now + lifetime),
        };
        let cidr = Ipv6Cidr::new(Ipv6Address::from(info.prefix.mask(info.prefix_len)), info.prefix_len);
        let autonomous = info.flags.contains(NdiscPrefixInfoFlags::ADDRCONF);

        if info.flags.contains(NdiscPrefixInfoFlags::ON_LINK) {
            if info.valid_lifetime == Duration::ZERO {
                self.prefixes.remove(&cidr);
            } else if self
                .prefixes
                .update(cidr, autonomous, deadline(info.valid_lifetime))
                .is_err()
            {
                net_debug!("ndisc: prefix list full");
            }
        }

        if !autonomous || info.prefix_len != 64 || info.valid_lifetime == Duration::ZERO {
            return;
        }

        let addr = cidr.address().with_interface_id(&self.hardware_addr.interface_id());
        let preferred_until = deadline(info.preferred_lifetime);
        match self.addresses.lookup_mut(&addr) {
            Some(entry) if entry.kind == AddressKind::Autoconf => {
                let received = info.valid_lifetime;
                let remaining = entry.valid_until.map(|valid_until| now.until(valid_until));
                entry.valid_until = if received == NDISC_INFINITE_LIFETIME {
                    None
                } else if received > MIN_VALID_LIFETIME || remaining.is_some_and(|r| received > r) {
                    Some(now + received)
                } else if remaining.is_some_and(|r| r <= MIN_VALID_LIFETIME) {
                    entry.valid_until
                } else {
                    Some(now + MIN_VALID_LIFETIME)
                };
                entry.preferred_until = preferred_until;
                if entry.state == AddressState::Deprecated
                    && info.preferred_lifetime != Duration::ZERO
                {
                    entry.set_state(AddressState::Preferred);
                }
                net_trace!("address {}: lifetimes refreshed", addr);
            }
            Some(_) => (),
            None => {
                let valid_until = deadline(info.valid_lifetime);
                if self
                    .start_dad(addr, AddressKind::Autoconf, valid_until, preferred_until)
                    .is_err()
                {
                    net_debug!("ndisc: no room for autoconfigured {}", addr);
                }
            }
        }
    }
}

fn parse_ndisc(packet: &PacketBuffer) -> Option<NdiscRepr> {
    if packet.hop_limit() != NDISC_HOP_LIMIT {
        net_debug!("ndisc: hop limit {} is not 255, dropping", packet.hop_limit());
        return None;
    }
    let icmp_packet = Icmpv6Packet::new_checked(packet.payload()).ok()?;
    NdiscRepr::parse(&icmp_packet).ok()
}

pub(super) fn neighbor_solicit(cx: &mut InterfaceInner, packet: PacketBuffer) -> Option<PacketBuffer> {
    let src_addr = packet.src_addr();
    let dst_addr = packet.dst_addr();
    let NdiscRepr::NeighborSolicit {
        target_addr,
        lladdr,
    } = parse_ndisc(&packet)?
    else {
        return None;
    };
    if target_addr.is_multicast() {
        return None;
    }

    if src_addr.is_unspecified() {
        // A DAD probe.
        if lladdr.is_some() || !dst_addr.is_solicited_node_multicast() {
            return None;
        }
        if cx.addresses.is_tentative(&target_addr) {
            cx.dad_failed(target_addr);
            return None;
        }
        if cx.addresses.is_usable(&target_addr) {
            net_debug!("address {}: defending against DAD probe", target_addr);
            return Some(cx.neighbor_advert_packet(
                IPV6_LINK_LOCAL_ALL_NODES,
                target_addr,
                NdiscNeighborFlags::OVERRIDE,
            ));
        }
        return None;
    }

    if cx.addresses.contains(&src_addr) {
        net_debug!("ndisc: solicitation from our own {}, dropping", src_addr);
        return None;
    }
    if !cx.addresses.is_usable(&target_addr) {
        return None;
    }
    if let Some(lladdr) = lladdr {
        cx.learn_neighbor(src_addr, lladdr, None);
    }

    net_trace!("ndisc: solicitation for {} from {}", target_addr, src_addr);
    Some(cx.neighbor_advert_packet(
        src_addr,
        target_addr,
        NdiscNeighborFlags::SOLICITED | NdiscNeighborFlags::OVERRIDE,
    ))
}

pub(super) fn neighbor_advert(cx: &mut InterfaceInner, packet: PacketBuffer) -> Option<PacketBuffer> {
    let dst_addr = packet.dst_addr();
    let NdiscRepr::NeighborAdvert {
        flags,
        target_addr,
        lladdr,
    } = parse_ndisc(&packet)?
    else {
        return None;
    };
    let solicited = flags.contains(NdiscNeighborFlags::SOLICITED);
    if target_addr.is_multicast() || (solicited && dst_addr.is_multicast()) {
        return None;
    }

    if cx.addresses.contains(&target_addr) {
        if cx.addresses.is_tentative(&target_addr) {
            cx.dad_failed(target_addr);
        } else {
            net_debug!("address {}: in use by another node", target_addr);
        }
        return None;
    }

    let now = cx.now;
    let reachable_until = Some(now + cx.reachable_time);
    let is_router = flags.contains(NdiscNeighborFlags::ROUTER);
    let mut router_lost = false;
    {
        let Some(neighbor) = cx.neighbors.lookup_mut(&target_addr) else {
            net_trace!("ndisc: unsolicited advertisement for {}", target_addr);
            return None;
        };

        if neighbor.state == NeighborState::Incomplete {
            let lladdr = lladdr?;
            neighbor.lladdr = Some(lladdr);
            match solicited {
                true => neighbor.set_state(NeighborState::Reachable, reachable_until),
                false => neighbor.set_state(NeighborState::Stale, None),
            }
        } else {
            let changed = lladdr.is_some_and(|lladdr| neighbor.lladdr != Some(lladdr));
            if changed && !flags.contains(NdiscNeighborFlags::OVERRIDE) {
                if neighbor.state == NeighborState::Reachable {
                    neighbor.set_state(NeighborState::Stale, None);
                }
                return None;
            }
            if let Some(lladdr) = lladdr {
                neighbor.lladdr = Some(lladdr);
            }
            if solicited {
                neighbor.set_state(NeighborState::Reachable, reachable_until);
            } else if changed {
                neighbor.set_state(NeighborState::Stale, None);
            }
            router_lost = neighbor.is_router && !is_router;
        }
        neighbor.is_router = is_router;
    }

    if router_lost && cx.routers.remove(&target_addr).is_some() {
        net_debug!("router {}: no longer a router", target_addr);
    }
    cx.release_pending(&target_addr);
    None
}

pub(super) fn router_solicit(cx: &mut InterfaceInner, packet: PacketBuffer) -> Option<PacketBuffer> {
    let src_addr = packet.src_addr();
    let NdiscRepr::RouterSolicit { lladdr } = parse_ndisc(&packet)? else {
        return None;
    };

    match (src_addr.is_unspecified(), lladdr) {
        (true, Some(_)) => return None,
        (false, Some(lladdr)) => cx.learn_neighbor(src_addr, lladdr, Some(false)),
        _ => (),
    }

    let delay = cx.rand.rand_below(MAX_RA_DELAY_TIME.total_micros());
    let at = cx.now + Duration::from_micros(delay);
    cx.ra_at = match cx.ra_at {
        Some(ra_at) if ra_at <= at => Some(ra_at),
        _ => Some(at),
    };
    net_trace!("ndisc: solicited advertisement due at {}", at);
    None
}

pub(super) fn router_advert(cx: &mut InterfaceInner, packet: PacketBuffer) -> Option<PacketBuffer> {
    let src_addr = packet.src_addr();
    if !src_addr.is_link_local() {
        net_debug!("ndisc: router advertisement from {}, dropping", src_addr);
        return None;
    }
    let NdiscRepr::RouterAdvert {
        hop_limit,
        router_lifetime,
        reachable_time,
        retrans_time,
        lladdr,
        mtu,
        prefix_info,
        ..
    } = parse_ndisc(&packet)?
    else {
        return None;
    };

    if let Some(mtu) = mtu {
        if !(IPV6_MIN_MTU as u32..=65535).contains(&mtu) {
            net_debug!("ndisc: bad MTU {} in router advertisement", mtu);
            return None;
        }
        cx.link_mtu = (mtu as usize).min(IFACE_LINK_MTU);
    }
    if hop_limit != 0 {
        cx.hop_limit = hop_limit;
    }
    if reachable_time != Duration::ZERO
        && reachable_time <= MAX_REACHABLE_TIME
        && reachable_time != cx.base_reachable_time
    {
        cx.base_reachable_time = reachable_time;
        cx.reachable_time = cx.random_reachable_time();
    }
    if retrans_time != Duration::ZERO {
        cx.retrans_timer = retrans_time;
    }

    if let Some(lladdr) = lladdr {
        cx.learn_neighbor(src_addr, lladdr, Some(true));
    }

    for info in prefix_info.iter() {
        cx.process_prefix_info(info);
    }

    if router_lifetime == Duration::ZERO {
        if cx.routers.remove(&src_addr).is_some() {
            net_debug!("router {}: withdrawn", src_addr);
        }
    } else {
        if cx.routers.update(src_addr, cx.now + router_lifetime).is_err() {
            net_debug!("ndisc: default router list full");
        }
        if let Some(neighbor) = cx.neighbors.lookup_mut(&src_addr) {
            neighbor.is_router = true;
        }
    }

    cx.rs_count = 0;
    cx.rs_at = None;
    None
}
