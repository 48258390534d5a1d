// Heads up! Before working on this file you should read the parts
// of RFC 8200 that discuss extension headers, and RFCs 4861, 4862
// and 4443 for any NDISC and ICMPv6 work.

#[cfg(test)]
mod tests;

mod icmpv6;
mod ipv6;
mod ndisc;
mod tcp;
mod udp;

pub use self::icmpv6::{Dispatch, EchoReplyCallback, Icmpv6Handler, Icmpv6HandlerFn, RegistryFull};

use alloc::boxed::Box;
use core::result::Result;
use heapless::{Deque, Vec};

use super::address::{Kind as AddressKind, Table as AddressTable, TableFull};
use super::neighbor::Cache as NeighborCache;
use super::packet::{IcmpError, PacketBuffer};
use super::prefix::{AdvertisedPrefix, List as PrefixList};
use super::reassembly::{Outcome, Reassembler};
use super::route::RouterList;
use super::routing::{NoRouting, RoutingHooks};
use crate::config::{
    IFACE_ECHO_CALLBACK_COUNT, IFACE_ICMPV6_HANDLER_COUNT, IFACE_LINK_MTU,
    IFACE_MAX_MULTICAST_GROUP_COUNT, IFACE_MAX_PREFIX_COUNT, IFACE_TX_QUEUE_COUNT,
};
use crate::rand::Rand;
use crate::socket::Sockets;
use crate::time::{Duration, Instant};
use crate::wire::*;

/// Whether the interface forwards packets and advertises itself as a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Host,
    Router,
}

/// Error type for `join_multicast_group`, `leave_multicast_group`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MulticastError {
    /// The table of joined multicast groups is already full.
    GroupTableFull,
    /// Cannot join/leave the given multicast group.
    Unaddressable,
}

impl core::fmt::Display for MulticastError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            MulticastError::GroupTableFull => write!(f, "GroupTableFull"),
            MulticastError::Unaddressable => write!(f, "Unaddressable"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MulticastError {}

/// Configuration structure used for creating a network interface.
#[non_exhaustive]
pub struct Config {
    /// Random seed.
    ///
    /// It is strongly recommended that the random seed is different on each boot,
    /// to avoid problems with DAD collisions and TCP sequence numbers.
    ///
    /// The seed doesn't have to be cryptographically secure.
    pub random_seed: u64,

    /// The hardware address of the interface. The link-local address is
    /// derived from it.
    pub hardware_addr: EthernetAddress,

    pub role: Role,

    /// Hop limit of originated packets, until a Router Advertisement says otherwise.
    pub hop_limit: u8,

    /// Prefixes advertised in Router Advertisements (router role).
    pub router_prefixes: Vec<AdvertisedPrefix, IFACE_MAX_PREFIX_COUNT>,

    /// Interval between unsolicited Router Advertisements (router role).
    pub ra_interval: Duration,

    /// Whether to solicit Router Advertisements once the link-local address
    /// is usable (host role).
    pub send_router_solicitations: bool,

    /// Whether to answer UDP datagrams for closed ports with a Port
    /// Unreachable error.
    pub udp_port_unreachable: bool,

    /// Number of Neighbor Solicitations sent for Duplicate Address Detection.
    pub dad_transmits: u8,
}

impl Config {
    pub fn new(hardware_addr: EthernetAddress) -> Self {
        Config {
            random_seed: 0,
            hardware_addr,
            role: Role::Host,
            hop_limit: 64,
            router_prefixes: Vec::new(),
            ra_interval: Duration::from_secs(200),
            send_router_solicitations: true,
            udp_port_unreachable: true,
            dad_transmits: 1,
        }
    }
}

/// A network interface.
///
/// The interface owns the neighbor, address, prefix and default router
/// tables, and the reassembly buffer. Datagrams enter through [receive] and
/// leave through the `emit` closure handed to [receive], [poll] and
/// [send_echo_request].
///
/// [receive]: #method.receive
/// [poll]: #method.poll
/// [send_echo_request]: #method.send_echo_request
pub struct Interface {
    pub(crate) inner: InterfaceInner,
    reassembler: Reassembler,
}

/// The part of an interface that protocol handlers work with.
///
/// Separating the reassembly buffer from the rest makes it possible to hand
/// the handlers and the sockets a mutable borrow of the interface state while
/// a reassembled datagram is still being processed.
pub struct InterfaceInner {
    now: Instant,
    rand: Rand,

    hardware_addr: EthernetAddress,
    role: Role,
    hop_limit: u8,
    link_mtu: usize,
    base_reachable_time: Duration,
    reachable_time: Duration,
    retrans_timer: Duration,
    dad_transmits: u8,
    send_router_solicitations: bool,
    udp_port_unreachable: bool,

    addresses: AddressTable,
    prefixes: PrefixList,
    routers: RouterList,
    neighbors: NeighborCache,
    multicast_groups: Vec<Ipv6Address, IFACE_MAX_MULTICAST_GROUP_COUNT>,

    router_prefixes: Vec<AdvertisedPrefix, IFACE_MAX_PREFIX_COUNT>,
    ra_interval: Duration,
    /// When the next Router Advertisement is due (router role).
    ra_at: Option<Instant>,
    /// Router Solicitations still to be sent (host role).
    rs_count: u8,
    rs_at: Option<Instant>,

    icmpv6_handlers: Vec<Icmpv6Handler, IFACE_ICMPV6_HANDLER_COUNT>,
    echo_callbacks: Vec<EchoReplyCallback, IFACE_ECHO_CALLBACK_COUNT>,

    tx_queue: Deque<PacketBuffer, IFACE_TX_QUEUE_COUNT>,
    routing: Box<dyn RoutingHooks>,
}

impl Interface {
    /// Create a network interface using the previously provided configuration.
    ///
    /// The link-local address derived from the hardware address starts
    /// Duplicate Address Detection right away.
    ///
    /// # Panics
    /// This function panics if the hardware address is not unicast.
    pub fn new(config: Config, now: Instant) -> Self {
        assert!(
            config.hardware_addr.is_unicast(),
            "Hardware address {} is not unicast",
            config.hardware_addr
        );

        let mut inner = InterfaceInner {
            now,
            rand: Rand::new(config.random_seed),
            hardware_addr: config.hardware_addr,
            role: config.role,
            hop_limit: config.hop_limit,
            link_mtu: IFACE_LINK_MTU,
            base_reachable_time: ndisc::REACHABLE_TIME,
            reachable_time: ndisc::REACHABLE_TIME,
            retrans_timer: ndisc::RETRANS_TIMER,
            dad_transmits: config.dad_transmits,
            send_router_solicitations: config.send_router_solicitations,
            udp_port_unreachable: config.udp_port_unreachable,
            addresses: AddressTable::new(),
            prefixes: PrefixList::new(),
            routers: RouterList::new(),
            neighbors: NeighborCache::new(),
            multicast_groups: Vec::new(),
            router_prefixes: config.router_prefixes,
            ra_interval: config.ra_interval,
            ra_at: None,
            rs_count: 0,
            rs_at: None,
            icmpv6_handlers: Vec::new(),
            echo_callbacks: Vec::new(),
            tx_queue: Deque::new(),
            routing: Box::new(NoRouting),
        };
        inner.reachable_time = inner.random_reachable_time();
        inner.register_default_handlers();

        let link_local = config.hardware_addr.link_local_address();
        if inner
            .start_dad(link_local, AddressKind::Autoconf, None, None)
            .is_err()
        {
            net_debug!("iface: no room for the link-local address");
        }

        Interface {
            inner,
            reassembler: Reassembler::new(),
        }
    }

    /// Get the handler context.
    ///
    /// The context is what ICMPv6 handlers operate on.
    pub fn context(&self) -> &InterfaceInner {
        &self.inner
    }

    /// Get the handler context.
    pub fn context_mut(&mut self) -> &mut InterfaceInner {
        &mut self.inner
    }

    pub fn hardware_addr(&self) -> EthernetAddress {
        self.inner.hardware_addr
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    pub fn hop_limit(&self) -> u8 {
        self.inner.hop_limit
    }

    pub fn link_mtu(&self) -> usize {
        self.inner.link_mtu
    }

    pub fn reachable_time(&self) -> Duration {
        self.inner.reachable_time
    }

    pub fn retrans_timer(&self) -> Duration {
        self.inner.retrans_timer
    }

    pub fn addresses(&self) -> &AddressTable {
        &self.inner.addresses
    }

    pub fn neighbors(&self) -> &NeighborCache {
        &self.inner.neighbors
    }

    pub fn prefixes(&self) -> &PrefixList {
        &self.inner.prefixes
    }

    pub fn routers(&self) -> &RouterList {
        &self.inner.routers
    }

    /// Assign an address manually. It becomes usable once Duplicate Address
    /// Detection completes.
    ///
    /// # Panics
    /// This function panics if the address is not unicast.
    pub fn add_address(&mut self, addr: Ipv6Address) -> Result<(), TableFull> {
        assert!(addr.x_is_unicast(), "Address {addr} is not unicast");
        if self.inner.addresses.contains(&addr) {
            return Ok(());
        }
        self.inner
            .start_dad(addr, AddressKind::Manual, None, None)
            .map(|_| ())
    }

    /// Remove an address. Returns whether it was assigned.
    pub fn remove_address(&mut self, addr: &Ipv6Address) -> bool {
        self.inner.addresses.remove(addr).is_some()
    }

    /// Start receiving packets sent to a multicast group.
    ///
    /// Returns `Ok(false)` if the group was already joined.
    pub fn join_multicast_group(&mut self, addr: Ipv6Address) -> Result<bool, MulticastError> {
        if !addr.is_multicast() {
            return Err(MulticastError::Unaddressable);
        }
        if self.inner.multicast_groups.contains(&addr) {
            return Ok(false);
        }
        self.inner
            .multicast_groups
            .push(addr)
            .map_err(|_| MulticastError::GroupTableFull)?;
        Ok(true)
    }

    /// Stop receiving packets sent to a multicast group.
    ///
    /// Returns `Ok(false)` if the group was not joined.
    pub fn leave_multicast_group(&mut self, addr: Ipv6Address) -> Result<bool, MulticastError> {
        if !addr.is_multicast() {
            return Err(MulticastError::Unaddressable);
        }
        match self.inner.multicast_groups.iter().position(|g| *g == addr) {
            Some(index) => {
                self.inner.multicast_groups.swap_remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Check whether the interface listens to a given multicast group.
    pub fn has_multicast_group(&self, addr: Ipv6Address) -> bool {
        self.inner.has_multicast_group(&addr)
    }

    /// Get an address usable as the source of packets sent to `dst_addr`,
    /// selected using RFC 6724.
    pub fn get_source_address_ipv6(&self, dst_addr: &Ipv6Address) -> Option<Ipv6Address> {
        self.inner.get_source_address_ipv6(dst_addr)
    }

    /// Route ICMPv6 messages of a type, and optionally only of one code, to
    /// `handler`. Handlers are tried in the order they were registered; the
    /// built-in ones come first.
    pub fn register_icmpv6_handler(
        &mut self,
        msg_type: Icmpv6Message,
        code: Option<u8>,
        handler: Icmpv6HandlerFn,
    ) -> Result<(), RegistryFull> {
        self.inner.register_icmpv6_handler(msg_type, code, handler)
    }

    /// Call `callback` for every Echo Reply received.
    pub fn add_echo_reply_callback(
        &mut self,
        callback: EchoReplyCallback,
    ) -> Result<(), RegistryFull> {
        self.inner
            .echo_callbacks
            .push(callback)
            .map_err(|_| RegistryFull)
    }

    /// Replace the routing-protocol hooks.
    pub fn set_routing_hooks(&mut self, hooks: Box<dyn RoutingHooks>) {
        self.inner.routing = hooks;
    }

    /// Send an Echo Request to `dst_addr`.
    ///
    /// Returns whether anything was transmitted, which includes a Neighbor
    /// Solicitation sent in place of the request.
    pub fn send_echo_request<F>(
        &mut self,
        now: Instant,
        dst_addr: Ipv6Address,
        ident: u16,
        seq_no: u16,
        data: &[u8],
        mut emit: F,
    ) -> bool
    where
        F: FnMut(PacketBuffer),
    {
        self.inner.now = now;
        let Some(src_addr) = self.inner.get_source_address_ipv6(&dst_addr) else {
            net_debug!("icmpv6: no source address for {}", dst_addr);
            return false;
        };
        let icmp_repr = Icmpv6Repr::EchoRequest {
            ident,
            seq_no,
            data,
        };
        let packet = self.inner.icmpv6_packet(src_addr, dst_addr, self.inner.hop_limit, &icmp_repr);
        self.inner.send_packet(packet);
        self.inner.flush(&mut emit)
    }

    /// Process one received datagram.
    ///
    /// The reply or the forwarded packet, packets released by neighbor
    /// resolution, and any Neighbor Discovery messages produced on the way
    /// are handed to `emit`. Returns whether anything was emitted.
    pub fn receive<F>(
        &mut self,
        now: Instant,
        sockets: &mut Sockets,
        packet: PacketBuffer,
        mut emit: F,
    ) -> bool
    where
        F: FnMut(PacketBuffer),
    {
        self.inner.now = now;
        if let Some(reply) = self
            .inner
            .process_ipv6(sockets, &mut self.reassembler, packet)
        {
            self.inner.send_packet(reply);
        }
        self.inner.flush(&mut emit)
    }

    /// Run the timers and transmit what the sockets have staged.
    ///
    /// Returns whether anything was emitted.
    pub fn poll<F>(&mut self, now: Instant, sockets: &mut Sockets, mut emit: F) -> bool
    where
        F: FnMut(PacketBuffer),
    {
        self.inner.now = now;

        if let Some(header) = self.reassembler.poll(now) {
            let error = IcmpError::TimeExceeded(Icmpv6TimeExceeded::FragReassemExceeded);
            if let Some(packet) = self.inner.icmpv6_error(header, error, false) {
                self.inner.send_packet(packet);
            }
        }

        self.inner.addresses.expire(now);
        self.inner.prefixes.expire(now);
        self.inner.routers.expire(now);
        self.inner.poll_dad();
        self.inner.poll_neighbors();
        self.inner.poll_router_discovery();

        self.inner.udp_egress(sockets);
        self.inner.tcp_egress(sockets);

        self.inner.flush(&mut emit)
    }

    /// Return a _soft deadline_ for calling [poll] the next time.
    /// The [Instant] returned is the time at which you should call [poll] next.
    /// It is harmless (but wastes energy) to call it before the [Instant], and
    /// potentially harmful (impacting quality of service) to call it after the
    /// [Instant]
    ///
    /// [poll]: #method.poll
    /// [Instant]: struct.Instant.html
    pub fn poll_at(&mut self, now: Instant, sockets: &Sockets) -> Option<Instant> {
        self.inner.now = now;
        let inner = &self.inner;
        if !inner.tx_queue.is_empty() {
            return Some(now);
        }

        [
            self.reassembler.poll_at(),
            inner.addresses.poll_at(),
            inner.prefixes.poll_at(),
            inner.routers.poll_at(),
            inner.neighbors.poll_at(),
            inner.ra_at,
            inner.rs_at,
            sockets.poll_at(now),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Return an _advisory wait time_ for calling [poll] the next time.
    /// The [Duration] returned is the time left to wait before calling [poll] next.
    ///
    /// [poll]: #method.poll
    /// [Duration]: struct.Duration.html
    pub fn poll_delay(&mut self, now: Instant, sockets: &Sockets) -> Option<Duration> {
        match self.poll_at(now, sockets) {
            Some(poll_at) if now < poll_at => Some(poll_at - now),
            Some(_) => Some(Duration::ZERO),
            _ => None,
        }
    }
}

impl InterfaceInner {
    pub fn now(&self) -> Instant {
        self.now
    }

    #[cfg(test)]
    pub(crate) fn set_now(&mut self, now: Instant) {
        self.now = now
    }

    pub fn hardware_addr(&self) -> EthernetAddress {
        self.hardware_addr
    }

    pub fn hop_limit(&self) -> u8 {
        self.hop_limit
    }

    pub fn addresses(&self) -> &AddressTable {
        &self.addresses
    }

    pub(crate) fn rand(&mut self) -> &mut Rand {
        &mut self.rand
    }

    /// Check whether `addr` is one of the groups this interface listens to.
    pub fn has_multicast_group(&self, addr: &Ipv6Address) -> bool {
        if *addr == IPV6_LINK_LOCAL_ALL_NODES {
            return true;
        }
        if *addr == IPV6_LINK_LOCAL_ALL_ROUTERS && self.role == Role::Router {
            return true;
        }
        self.has_solicited_node(addr) || self.multicast_groups.contains(addr)
    }

    /// Determine if the given `Ipv6Address` is the solicited node
    /// multicast address for a IPv6 addresses assigned to the interface.
    /// See [RFC 4291 § 2.7.1] for more details.
    ///
    /// [RFC 4291 § 2.7.1]: https://tools.ietf.org/html/rfc4291#section-2.7.1
    pub fn has_solicited_node(&self, addr: &Ipv6Address) -> bool {
        addr.is_solicited_node_multicast()
            && self
                .addresses
                .iter()
                .any(|a| a.addr().octets()[13..] == addr.octets()[13..])
    }

    /// Whether `addr` is reachable without a router.
    pub(crate) fn is_on_link(&self, addr: &Ipv6Address) -> bool {
        addr.is_link_local()
            || self.prefixes.is_on_link(addr)
            || self
                .router_prefixes
                .iter()
                .any(|p| p.on_link && p.cidr.contains_addr(addr))
    }

    /// Queue a packet originated by this node for transmission.
    ///
    /// The routing hooks get to insert their header first, then the next hop
    /// is resolved. A packet waiting for address resolution is held by the
    /// neighbor entry and a Neighbor Solicitation goes out in its place.
    pub fn send_packet(&mut self, mut packet: PacketBuffer) {
        self.routing.insert_header(&mut packet);
        if let Some(packet) = self.resolve_link_dst(packet) {
            self.push_tx(packet);
        }
    }

    /// Queue a packet forwarded on behalf of another node.
    fn forward_packet(&mut self, packet: PacketBuffer) {
        if let Some(packet) = self.resolve_link_dst(packet) {
            self.push_tx(packet);
        }
    }

    fn push_tx(&mut self, packet: PacketBuffer) {
        if self.tx_queue.push_back(packet).is_err() {
            net_debug!("iface: transmit queue full, dropping packet");
        }
    }

    fn flush<F: FnMut(PacketBuffer)>(&mut self, emit: &mut F) -> bool {
        let mut emitted = false;
        while let Some(packet) = self.tx_queue.pop_front() {
            #[cfg(any(test, feature = "verbose"))]
            net_trace!(
                "iface: emit {} -> {} ({} octets)",
                packet.src_addr(),
                packet.dst_addr(),
                packet.len()
            );
            emit(packet);
            emitted = true;
        }
        emitted
    }

    /// Build an ICMPv6 message in a freshly allocated packet.
    pub(crate) fn icmpv6_packet(
        &self,
        src_addr: Ipv6Address,
        dst_addr: Ipv6Address,
        hop_limit: u8,
        icmp_repr: &Icmpv6Repr,
    ) -> PacketBuffer {
        let ip_repr = Ipv6Repr {
            src_addr,
            dst_addr,
            next_header: IpProtocol::Icmpv6,
            payload_len: icmp_repr.buffer_len(),
            hop_limit,
        };
        let mut packet = PacketBuffer::new(&ip_repr);
        icmp_repr.emit(
            &src_addr,
            &dst_addr,
            &mut Icmpv6Packet::new_unchecked(packet.payload_mut()),
        );
        packet
    }

    /// Turn `packet` into an ICMPv6 error addressed to its source, unless
    /// RFC 4443 § 2.4 forbids sending one.
    ///
    /// With `to_multicast` set, the error is sent even if the offending
    /// packet was addressed to a multicast group.
    pub(crate) fn icmpv6_error(
        &mut self,
        packet: PacketBuffer,
        error: IcmpError,
        to_multicast: bool,
    ) -> Option<PacketBuffer> {
        let src_addr = packet.src_addr();
        let dst_addr = packet.dst_addr();

        if src_addr.is_unspecified() || src_addr.is_multicast() {
            net_debug!("icmpv6: no error for source {}", src_addr);
            return None;
        }
        if dst_addr.is_multicast() && !to_multicast {
            net_debug!("icmpv6: no error for multicast destination {}", dst_addr);
            return None;
        }
        if packet.next_header() == IpProtocol::Icmpv6 {
            let is_error = packet
                .payload()
                .first()
                .is_some_and(|msg_type| Icmpv6Message::from(*msg_type).is_error());
            if is_error {
                net_debug!("icmpv6: no error in reply to an error");
                return None;
            }
        }

        let reply_src = if self.addresses.is_usable(&dst_addr) {
            dst_addr
        } else {
            self.get_source_address_ipv6(&src_addr)?
        };
        net_debug!("icmpv6: {:?} to {}", error, src_addr);
        Some(packet.into_icmp_error(reply_src, self.hop_limit, error))
    }

    /// Return the IPv6 address that is a candidate source address for the given destination
    /// address, based on RFC 6724.
    pub fn get_source_address_ipv6(&self, dst_addr: &Ipv6Address) -> Option<Ipv6Address> {
        // See RFC 6724 Section 4: Candidate source address
        fn is_candidate_source_address(dst_addr: &Ipv6Address, src_addr: &Ipv6Address) -> bool {
            // For all multicast and link-local destination addresses, the candidate address MUST
            // only be an address from the same link.
            if (dst_addr.is_link_local()
                || (dst_addr.is_multicast()
                    && dst_addr.x_multicast_scope() == MulticastScope::LinkLocal))
                && !src_addr.is_link_local()
            {
                return false;
            }

            !(src_addr.is_unspecified() || src_addr.is_multicast())
        }

        // See RFC 6724 Section 2.2: Common Prefix Length
        fn common_prefix_length(dst_addr: &Ipv6Address, src_addr: &Ipv6Address) -> u32 {
            let mut bits = 0;
            for (l, r) in dst_addr.octets().iter().zip(src_addr.octets().iter()) {
                if l == r {
                    bits += 8;
                } else {
                    bits += (l ^ r).leading_zeros();
                    break;
                }
            }
            bits.min(64)
        }

        if dst_addr.is_loopback() {
            return Some(Ipv6Address::LOCALHOST);
        }

        let mut candidate: Option<&super::address::AddressEntry> = None;
        for entry in self.addresses.iter() {
            if !self.addresses.is_usable(&entry.addr())
                || !is_candidate_source_address(dst_addr, &entry.addr())
            {
                continue;
            }
            let Some(current) = candidate else {
                candidate = Some(entry);
                continue;
            };
            let (cur, addr) = (current.addr(), entry.addr());

            // Rule 1: prefer the address that is the same as the output destination address.
            if cur == *dst_addr {
                continue;
            }
            if addr == *dst_addr {
                candidate = Some(entry);
                continue;
            }

            // Rule 2: prefer appropriate scope.
            let (cur_scope, scope) = (cur.x_multicast_scope(), addr.x_multicast_scope());
            let dst_scope = dst_addr.x_multicast_scope();
            if cur_scope < scope {
                if cur_scope < dst_scope {
                    candidate = Some(entry);
                }
                continue;
            } else if scope < cur_scope {
                if scope >= dst_scope {
                    candidate = Some(entry);
                }
                continue;
            }

            // Rule 3: avoid deprecated addresses.
            let cur_deprecated = current.state() == super::address::State::Deprecated;
            let deprecated = entry.state() == super::address::State::Deprecated;
            if cur_deprecated != deprecated {
                if cur_deprecated {
                    candidate = Some(entry);
                }
                continue;
            }

            // Rule 8: use longest matching prefix.
            if common_prefix_length(dst_addr, &cur) < common_prefix_length(dst_addr, &addr) {
                candidate = Some(entry);
            }
        }

        candidate.map(|entry| entry.addr())
    }
}
