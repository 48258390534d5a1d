// Heads up! Before working on this file you should read, at least,
// the parts of RFC 4861 that discuss Neighbor Unreachability Detection.

use heapless::Vec;

use super::PacketBuffer;
use crate::config::IFACE_NEIGHBOR_CACHE_COUNT;
use crate::time::Instant;
use crate::wire::{EthernetAddress, Ipv6Address};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CacheFull;

impl core::fmt::Display for CacheFull {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Neighbor cache full")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CacheFull {}

/// Reachability of a neighbor, as defined in RFC 4861 § 7.3.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Address resolution is in progress.
    Incomplete,
    /// The neighbor was recently confirmed reachable.
    Reachable,
    /// Reachability is unknown, but nothing is done until traffic is sent.
    Stale,
    /// Traffic was sent; waiting for upper layers to confirm reachability.
    Delay,
    /// Unicast solicitations are being sent to confirm reachability.
    Probe,
}

/// A cached neighbor.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub(crate) ip_addr: Ipv6Address,
    pub(crate) lladdr: Option<EthernetAddress>,
    pub(crate) state: State,
    pub(crate) is_router: bool,
    /// Solicitations sent in the current `Incomplete` or `Probe` run.
    pub(crate) ns_count: u8,
    /// When the current state times out. `Stale` has no timer.
    pub(crate) timer: Option<Instant>,
    pub(crate) pending: Option<PacketBuffer>,
}

impl Neighbor {
    pub fn ip_addr(&self) -> Ipv6Address {
        self.ip_addr
    }

    pub fn lladdr(&self) -> Option<EthernetAddress> {
        self.lladdr
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_router(&self) -> bool {
        self.is_router
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn set_state(&mut self, state: State, timer: Option<Instant>) {
        if self.state != state {
            net_trace!("neighbor {}: {:?} -> {:?}", self.ip_addr, self.state, state);
        }
        self.state = state;
        self.timer = timer;
        self.ns_count = 0;
    }
}

/// A neighbor cache backed by a fixed-capacity vector.
///
/// Entries are never evicted to make room; a full cache refuses new
/// neighbors until the reachability timers free a slot.
#[derive(Debug)]
pub struct Cache {
    storage: Vec<Neighbor, IFACE_NEIGHBOR_CACHE_COUNT>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    pub fn new() -> Self {
        Self {
            storage: Vec::new(),
        }
    }

    pub fn lookup(&self, ip_addr: &Ipv6Address) -> Option<&Neighbor> {
        self.storage.iter().find(|n| n.ip_addr == *ip_addr)
    }

    pub(crate) fn lookup_mut(&mut self, ip_addr: &Ipv6Address) -> Option<&mut Neighbor> {
        self.storage.iter_mut().find(|n| n.ip_addr == *ip_addr)
    }

    /// Create an entry for a neighbor not yet in the cache.
    pub(crate) fn add(
        &mut self,
        ip_addr: Ipv6Address,
        lladdr: Option<EthernetAddress>,
        is_router: bool,
        state: State,
        timer: Option<Instant>,
    ) -> Result<&mut Neighbor, CacheFull> {
        let neighbor = Neighbor {
            ip_addr,
            lladdr,
            state,
            is_router,
            ns_count: 0,
            timer,
            pending: None,
        };
        if self.storage.push(neighbor).is_err() {
            net_debug!("neighbor: cache full, dropping {}", ip_addr);
            return Err(CacheFull);
        }
        net_trace!("neighbor {}: added {:?}", ip_addr, state);
        let index = self.storage.len() - 1;
        Ok(&mut self.storage[index])
    }

    /// Remove an entry. Its timer and pending packet go with it.
    pub fn remove(&mut self, ip_addr: &Ipv6Address) -> Option<Neighbor> {
        let index = self.storage.iter().position(|n| n.ip_addr == *ip_addr)?;
        net_trace!("neighbor {}: removed", ip_addr);
        Some(self.storage.swap_remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.storage.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Neighbor> {
        self.storage.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// The earliest neighbor timer.
    pub(crate) fn poll_at(&self) -> Option<Instant> {
        self.storage.iter().filter_map(|n| n.timer).min()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::ipv6::test::{MOCK_IP_ADDR_1, MOCK_IP_ADDR_2};

    const HADDR_A: EthernetAddress = EthernetAddress([0, 0, 0, 0, 0, 1]);

    #[test]
    fn test_add_lookup_remove() {
        let mut cache = Cache::new();
        assert!(cache.lookup(&MOCK_IP_ADDR_1).is_none());

        cache
            .add(
                MOCK_IP_ADDR_1,
                Some(HADDR_A),
                false,
                State::Stale,
                None,
            )
            .unwrap();
        let neighbor = cache.lookup(&MOCK_IP_ADDR_1).unwrap();
        assert_eq!(neighbor.lladdr(), Some(HADDR_A));
        assert_eq!(neighbor.state(), State::Stale);

        assert!(cache.remove(&MOCK_IP_ADDR_1).is_some());
        assert!(cache.remove(&MOCK_IP_ADDR_1).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_full() {
        let mut cache = Cache::new();
        for i in 0..IFACE_NEIGHBOR_CACHE_COUNT {
            let addr = Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, i as u16 + 10);
            cache.add(addr, None, false, State::Incomplete, None).unwrap();
        }
        assert_eq!(
            cache
                .add(MOCK_IP_ADDR_2, None, false, State::Incomplete, None)
                .err(),
            Some(CacheFull)
        );
    }

    #[test]
    fn test_poll_at() {
        let mut cache = Cache::new();
        cache
            .add(
                MOCK_IP_ADDR_1,
                None,
                false,
                State::Incomplete,
                Some(Instant::from_millis(2000)),
            )
            .unwrap();
        cache
            .add(
                MOCK_IP_ADDR_2,
                Some(HADDR_A),
                false,
                State::Reachable,
                Some(Instant::from_millis(1000)),
            )
            .unwrap();
        assert_eq!(cache.poll_at(), Some(Instant::from_millis(1000)));

        cache
            .lookup_mut(&MOCK_IP_ADDR_2)
            .unwrap()
            .set_state(State::Stale, None);
        assert_eq!(cache.poll_at(), Some(Instant::from_millis(2000)));
    }
}
