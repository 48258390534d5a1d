use heapless::Vec;

use crate::config::IFACE_MAX_ADDR_COUNT;
use crate::time::Instant;
use crate::wire::{Ipv6Address, Ipv6AddressExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TableFull;

impl core::fmt::Display for TableFull {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Address table full")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TableFull {}

/// Lifecycle of an address assigned to this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Duplicate Address Detection has not completed yet.
    Tentative,
    Preferred,
    /// Still valid, but the preferred lifetime ran out.
    Deprecated,
}

/// How an address came to be assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Kind {
    Autoconf,
    Dhcp,
    Manual,
}

/// An address assigned to this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressEntry {
    pub(crate) addr: Ipv6Address,
    pub(crate) state: State,
    pub(crate) kind: Kind,
    /// `None` means "forever".
    pub(crate) valid_until: Option<Instant>,
    /// `None` means "forever".
    pub(crate) preferred_until: Option<Instant>,
    /// Probes still to be sent for Duplicate Address Detection.
    pub(crate) dad_count: u8,
    /// When the next probe is due, or DAD completes once none are left.
    pub(crate) dad_timer: Option<Instant>,
}

impl AddressEntry {
    pub fn addr(&self) -> Ipv6Address {
        self.addr
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn valid_until(&self) -> Option<Instant> {
        self.valid_until
    }

    pub fn preferred_until(&self) -> Option<Instant> {
        self.preferred_until
    }

    pub(crate) fn set_state(&mut self, state: State) {
        if self.state != state {
            net_trace!("address {}: {:?} -> {:?}", self.addr, self.state, state);
        }
        self.state = state;
    }

    fn timer(&self) -> Option<Instant> {
        let preferred_until = match self.state {
            State::Preferred => self.preferred_until,
            _ => None,
        };
        [self.valid_until, preferred_until, self.dad_timer]
            .into_iter()
            .flatten()
            .min()
    }
}

/// The addresses of this node.
#[derive(Debug)]
pub struct Table {
    storage: Vec<AddressEntry, IFACE_MAX_ADDR_COUNT>,
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    pub fn new() -> Self {
        Self {
            storage: Vec::new(),
        }
    }

    pub fn lookup(&self, addr: &Ipv6Address) -> Option<&AddressEntry> {
        self.storage.iter().find(|a| a.addr == *addr)
    }

    pub(crate) fn lookup_mut(&mut self, addr: &Ipv6Address) -> Option<&mut AddressEntry> {
        self.storage.iter_mut().find(|a| a.addr == *addr)
    }

    /// Whether `addr` is assigned to this node in any state.
    pub fn contains(&self, addr: &Ipv6Address) -> bool {
        self.lookup(addr).is_some()
    }

    /// Whether `addr` is assigned and usable as a source address.
    pub fn is_usable(&self, addr: &Ipv6Address) -> bool {
        matches!(
            self.lookup(addr).map(|a| a.state),
            Some(State::Preferred | State::Deprecated)
        )
    }

    /// Whether `addr` is assigned and still undergoing DAD.
    pub fn is_tentative(&self, addr: &Ipv6Address) -> bool {
        self.lookup(addr).map(|a| a.state) == Some(State::Tentative)
    }

    /// Assign a new address that starts Duplicate Address Detection.
    pub(crate) fn add_tentative(
        &mut self,
        addr: Ipv6Address,
        kind: Kind,
        valid_until: Option<Instant>,
        preferred_until: Option<Instant>,
        dad_count: u8,
        dad_timer: Instant,
    ) -> Result<&mut AddressEntry, TableFull> {
        let entry = AddressEntry {
            addr,
            state: State::Tentative,
            kind,
            valid_until,
            preferred_until,
            dad_count,
            dad_timer: Some(dad_timer),
        };
        if self.storage.push(entry).is_err() {
            net_debug!("address: table full, dropping {}", addr);
            return Err(TableFull);
        }
        net_trace!("address {}: added tentative ({:?})", addr, kind);
        let index = self.storage.len() - 1;
        Ok(&mut self.storage[index])
    }

    pub fn remove(&mut self, addr: &Ipv6Address) -> Option<AddressEntry> {
        let index = self.storage.iter().position(|a| a.addr == *addr)?;
        net_trace!("address {}: removed", addr);
        Some(self.storage.swap_remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AddressEntry> {
        self.storage.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut AddressEntry> {
        self.storage.iter_mut()
    }

    /// The preferred link-local address, if DAD has completed on it.
    pub fn link_local(&self) -> Option<Ipv6Address> {
        self.storage
            .iter()
            .find(|a| a.addr.is_link_local() && a.state == State::Preferred)
            .map(|a| a.addr)
    }

    /// Drop addresses whose valid lifetime ended and deprecate those whose
    /// preferred lifetime ended.
    pub(crate) fn expire(&mut self, now: Instant) {
        self.storage.retain(|a| match a.valid_until {
            Some(valid_until) if valid_until <= now => {
                net_debug!("address {}: valid lifetime expired", a.addr);
                false
            }
            _ => true,
        });
        for entry in self.storage.iter_mut() {
            match entry.preferred_until {
                Some(preferred_until)
                    if preferred_until <= now && entry.state == State::Preferred =>
                {
                    entry.set_state(State::Deprecated)
                }
                _ => (),
            }
        }
    }

    pub(crate) fn poll_at(&self) -> Option<Instant> {
        self.storage.iter().filter_map(|a| a.timer()).min()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::ipv6::test::MOCK_IP_ADDR_1;

    const GLOBAL: Ipv6Address = Ipv6Address::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);

    #[test]
    fn test_states() {
        let mut table = Table::new();
        table
            .add_tentative(MOCK_IP_ADDR_1, Kind::Manual, None, None, 1, Instant::ZERO)
            .unwrap();
        assert!(table.contains(&MOCK_IP_ADDR_1));
        assert!(table.is_tentative(&MOCK_IP_ADDR_1));
        assert!(!table.is_usable(&MOCK_IP_ADDR_1));
        assert_eq!(table.link_local(), None);

        table
            .lookup_mut(&MOCK_IP_ADDR_1)
            .unwrap()
            .set_state(State::Preferred);
        assert!(table.is_usable(&MOCK_IP_ADDR_1));
        assert_eq!(table.link_local(), Some(MOCK_IP_ADDR_1));
    }

    #[test]
    fn test_expire() {
        let mut table = Table::new();
        let entry = table
            .add_tentative(
                GLOBAL,
                Kind::Autoconf,
                Some(Instant::from_secs(100)),
                Some(Instant::from_secs(50)),
                0,
                Instant::ZERO,
            )
            .unwrap();
        entry.dad_timer = None;
        entry.set_state(State::Preferred);
        assert_eq!(table.poll_at(), Some(Instant::from_secs(50)));

        table.expire(Instant::from_secs(50));
        assert_eq!(table.lookup(&GLOBAL).unwrap().state(), State::Deprecated);
        assert_eq!(table.poll_at(), Some(Instant::from_secs(100)));

        table.expire(Instant::from_secs(100));
        assert!(!table.contains(&GLOBAL));
    }

    #[test]
    fn test_full() {
        let mut table = Table::new();
        for i in 0..IFACE_MAX_ADDR_COUNT {
            let addr = Ipv6Address::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, i as u16 + 10);
            table
                .add_tentative(addr, Kind::Manual, None, None, 1, Instant::ZERO)
                .unwrap();
        }
        assert_eq!(
            table
                .add_tentative(GLOBAL, Kind::Manual, None, None, 1, Instant::ZERO)
                .err(),
            Some(TableFull)
        );
    }
}
