use heapless::Vec;

use crate::config::IFACE_MAX_PREFIX_COUNT;
use crate::time::Instant;
use crate::wire::{Ipv6Address, Ipv6Cidr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ListFull;

impl core::fmt::Display for ListFull {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Prefix list full")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ListFull {}

/// An on-link prefix learned from a Router Advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Prefix {
    pub cidr: Ipv6Cidr,
    pub autonomous: bool,
    /// `None` means "forever".
    pub valid_until: Option<Instant>,
}

/// A prefix that a router advertises in its Router Advertisements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvertisedPrefix {
    pub cidr: Ipv6Cidr,
    pub on_link: bool,
    pub autonomous: bool,
    /// In seconds. `0xffffffff` means infinity.
    pub valid_lifetime: u32,
    /// In seconds. `0xffffffff` means infinity.
    pub preferred_lifetime: u32,
}

impl AdvertisedPrefix {
    /// A /64 prefix that is on-link and usable for autoconfiguration, with
    /// the lifetimes recommended by RFC 4861 § 6.2.1.
    pub fn new(prefix: Ipv6Address) -> AdvertisedPrefix {
        AdvertisedPrefix {
            cidr: Ipv6Cidr::new(prefix, 64),
            on_link: true,
            autonomous: true,
            valid_lifetime: 2_592_000,
            preferred_lifetime: 604_800,
        }
    }
}

/// The on-link prefix list.
#[derive(Debug)]
pub struct List {
    storage: Vec<Prefix, IFACE_MAX_PREFIX_COUNT>,
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl List {
    pub fn new() -> Self {
        Self {
            storage: Vec::new(),
        }
    }

    pub fn lookup(&self, cidr: &Ipv6Cidr) -> Option<&Prefix> {
        self.storage.iter().find(|p| p.cidr == *cidr)
    }

    /// Add a prefix, or refresh the lifetime of a known one.
    pub fn update(
        &mut self,
        cidr: Ipv6Cidr,
        autonomous: bool,
        valid_until: Option<Instant>,
    ) -> Result<(), ListFull> {
        if let Some(prefix) = self.storage.iter_mut().find(|p| p.cidr == cidr) {
            prefix.autonomous = autonomous;
            prefix.valid_until = valid_until;
            return Ok(());
        }
        self.storage
            .push(Prefix {
                cidr,
                autonomous,
                valid_until,
            })
            .map_err(|_| ListFull)?;
        net_trace!("prefix {}/{}: added", cidr.address(), cidr.prefix_len());
        Ok(())
    }

    pub fn remove(&mut self, cidr: &Ipv6Cidr) -> Option<Prefix> {
        let index = self.storage.iter().position(|p| p.cidr == *cidr)?;
        net_trace!("prefix {}/{}: removed", cidr.address(), cidr.prefix_len());
        Some(self.storage.swap_remove(index))
    }

    /// Whether `addr` falls within any on-link prefix.
    pub fn is_on_link(&self, addr: &Ipv6Address) -> bool {
        self.storage.iter().any(|p| p.cidr.contains_addr(addr))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Prefix> {
        self.storage.iter()
    }

    pub(crate) fn expire(&mut self, now: Instant) {
        self.storage.retain(|p| match p.valid_until {
            Some(valid_until) if valid_until <= now => {
                net_debug!(
                    "prefix {}/{}: valid lifetime expired",
                    p.cidr.address(),
                    p.cidr.prefix_len()
                );
                false
            }
            _ => true,
        })
    }

    pub(crate) fn poll_at(&self) -> Option<Instant> {
        self.storage.iter().filter_map(|p| p.valid_until).min()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PREFIX: Ipv6Address = Ipv6Address::new(0x2001, 0xdb8, 0, 1, 0, 0, 0, 0);

    #[test]
    fn test_on_link() {
        let mut list = List::new();
        let cidr = Ipv6Cidr::new(PREFIX, 64);
        list.update(cidr, true, Some(Instant::from_secs(10)))
            .unwrap();
        assert!(list.is_on_link(&Ipv6Address::new(0x2001, 0xdb8, 0, 1, 0, 0, 0, 7)));
        assert!(!list.is_on_link(&Ipv6Address::new(0x2001, 0xdb8, 0, 2, 0, 0, 0, 7)));

        list.update(cidr, true, None).unwrap();
        assert_eq!(list.iter().count(), 1);
        assert_eq!(list.lookup(&cidr).unwrap().valid_until, None);
    }

    #[test]
    fn test_expire() {
        let mut list = List::new();
        let cidr = Ipv6Cidr::new(PREFIX, 64);
        list.update(cidr, false, Some(Instant::from_secs(10)))
            .unwrap();
        assert_eq!(list.poll_at(), Some(Instant::from_secs(10)));
        list.expire(Instant::from_secs(9));
        assert!(list.lookup(&cidr).is_some());
        list.expire(Instant::from_secs(10));
        assert!(list.lookup(&cidr).is_none());
    }
}
