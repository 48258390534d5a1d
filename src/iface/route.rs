use heapless::Vec;

use crate::config::IFACE_MAX_ROUTER_COUNT;
use crate::time::Instant;
use crate::wire::Ipv6Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RouterListFull;

impl core::fmt::Display for RouterListFull {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Default router list full")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RouterListFull {}

/// A default router learned from a Router Advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Router {
    pub addr: Ipv6Address,
    pub expires_at: Instant,
}

/// The default router list.
#[derive(Debug)]
pub struct RouterList {
    storage: Vec<Router, IFACE_MAX_ROUTER_COUNT>,
}

impl Default for RouterList {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterList {
    /// Creates a new empty router list.
    pub fn new() -> Self {
        Self {
            storage: Vec::new(),
        }
    }

    pub fn lookup(&self, addr: &Ipv6Address) -> Option<&Router> {
        self.storage.iter().find(|r| r.addr == *addr)
    }

    /// Add a default router (ie. "ip -6 route add default via `addr`"), or
    /// refresh the lifetime of a known one.
    pub fn update(&mut self, addr: Ipv6Address, expires_at: Instant) -> Result<(), RouterListFull> {
        if let Some(router) = self.storage.iter_mut().find(|r| r.addr == addr) {
            router.expires_at = expires_at;
            return Ok(());
        }
        self.storage
            .push(Router { addr, expires_at })
            .map_err(|_| RouterListFull)?;
        net_trace!("router {}: added", addr);
        Ok(())
    }

    /// Withdraw a default router.
    pub fn remove(&mut self, addr: &Ipv6Address) -> Option<Router> {
        let index = self.storage.iter().position(|r| r.addr == *addr)?;
        net_trace!("router {}: removed", addr);
        Some(self.storage.remove(index))
    }

    /// The router to send off-link traffic to.
    pub fn default_router(&self) -> Option<Ipv6Address> {
        self.storage.first().map(|r| r.addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Router> {
        self.storage.iter()
    }

    pub(crate) fn expire(&mut self, now: Instant) {
        self.storage.retain(|r| {
            if r.expires_at <= now {
                net_debug!("router {}: lifetime expired", r.addr);
                false
            } else {
                true
            }
        })
    }

    pub(crate) fn poll_at(&self) -> Option<Instant> {
        self.storage.iter().map(|r| r.expires_at).min()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::ipv6::test::{MOCK_IP_ADDR_1, MOCK_IP_ADDR_2};

    #[test]
    fn test_update_and_withdraw() {
        let mut routers = RouterList::new();
        assert_eq!(routers.default_router(), None);

        routers
            .update(MOCK_IP_ADDR_1, Instant::from_secs(1800))
            .unwrap();
        routers
            .update(MOCK_IP_ADDR_2, Instant::from_secs(600))
            .unwrap();
        assert_eq!(routers.default_router(), Some(MOCK_IP_ADDR_1));
        assert_eq!(routers.poll_at(), Some(Instant::from_secs(600)));

        routers
            .update(MOCK_IP_ADDR_2, Instant::from_secs(3600))
            .unwrap();
        assert_eq!(routers.iter().count(), 2);

        assert!(routers.remove(&MOCK_IP_ADDR_1).is_some());
        assert_eq!(routers.default_router(), Some(MOCK_IP_ADDR_2));
    }

    #[test]
    fn test_expire() {
        let mut routers = RouterList::new();
        routers
            .update(MOCK_IP_ADDR_1, Instant::from_secs(10))
            .unwrap();
        routers.expire(Instant::from_secs(10));
        assert_eq!(routers.default_router(), None);
    }

    #[test]
    fn test_full() {
        let mut routers = RouterList::new();
        for i in 0..IFACE_MAX_ROUTER_COUNT {
            let addr = Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, i as u16 + 10);
            routers.update(addr, Instant::from_secs(10)).unwrap();
        }
        assert_eq!(
            routers.update(MOCK_IP_ADDR_1, Instant::from_secs(10)),
            Err(RouterListFull)
        );
    }
}
