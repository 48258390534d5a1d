use alloc::vec::Vec;

use crate::config::UDP_ENDPOINT_COUNT;
use crate::wire::{IpEndpoint, Ipv6Address, Ipv6Repr, UdpRepr};

const EPHEMERAL_PORT_FIRST: u16 = 49152;
const EPHEMERAL_PORT_LAST: u16 = 65535;

/// A bound UDP endpoint.
///
/// An unspecified remote address or a zero remote port accept datagrams
/// from any peer.
#[derive(Debug, Clone)]
pub(crate) struct Endpoint {
    local: IpEndpoint,
    remote: IpEndpoint,
    /// One datagram waiting for the next dispatch.
    staged: Option<(IpEndpoint, Vec<u8>)>,
}

impl Endpoint {
    pub(crate) fn local_endpoint(&self) -> IpEndpoint {
        self.local
    }

    pub(crate) fn remote_endpoint(&self) -> IpEndpoint {
        self.remote
    }

    fn accepts(&self, ip_repr: &Ipv6Repr, repr: &UdpRepr) -> bool {
        self.local.port == repr.dst_port
            && (self.local.addr.is_unspecified() || self.local.addr == ip_repr.dst_addr)
            && (self.remote.port == 0 || self.remote.port == repr.src_port)
            && (self.remote.addr.is_unspecified() || self.remote.addr == ip_repr.src_addr)
    }

    /// Stage a datagram. Returns false if one is staged already.
    pub(crate) fn stage(&mut self, remote: IpEndpoint, data: &[u8]) -> bool {
        if self.staged.is_some() {
            return false;
        }
        self.staged = Some((remote, data.to_vec()));
        true
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum BindError {
    PortInUse,
    NoResources,
}

/// The fixed table of UDP endpoints.
#[derive(Debug)]
pub(crate) struct EndpointTable {
    endpoints: [Option<Endpoint>; UDP_ENDPOINT_COUNT],
    last_port: u16,
}

impl EndpointTable {
    pub(crate) fn new() -> EndpointTable {
        EndpointTable {
            endpoints: core::array::from_fn(|_| None),
            last_port: EPHEMERAL_PORT_FIRST - 1,
        }
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Endpoint> {
        self.endpoints[index].as_ref()
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Endpoint> {
        self.endpoints[index].as_mut()
    }

    fn is_port_used(&self, local: &IpEndpoint) -> bool {
        self.endpoints.iter().flatten().any(|endpoint| {
            endpoint.local.port == local.port
                && (endpoint.local.addr == local.addr
                    || endpoint.local.addr.is_unspecified()
                    || local.addr.is_unspecified())
        })
    }

    /// Pick an unused port from the dynamic range.
    fn next_ephemeral_port(&mut self, addr: &Ipv6Address) -> Option<u16> {
        let range = (EPHEMERAL_PORT_LAST - EPHEMERAL_PORT_FIRST) as usize + 1;
        for _ in 0..range {
            self.last_port = match self.last_port {
                EPHEMERAL_PORT_LAST => EPHEMERAL_PORT_FIRST,
                port => port + 1,
            };
            if !self.is_port_used(&IpEndpoint::new(*addr, self.last_port)) {
                return Some(self.last_port);
            }
        }
        None
    }

    /// Bind a new endpoint. A zero local port takes an ephemeral one.
    pub(crate) fn bind(
        &mut self,
        local: IpEndpoint,
        remote: IpEndpoint,
    ) -> Result<usize, BindError> {
        let index = self
            .endpoints
            .iter()
            .position(Option::is_none)
            .ok_or(BindError::NoResources)?;
        let port = match local.port {
            0 => self
                .next_ephemeral_port(&local.addr)
                .ok_or(BindError::NoResources)?,
            _ if self.is_port_used(&local) => return Err(BindError::PortInUse),
            port => port,
        };

        let local = IpEndpoint::new(local.addr, port);
        net_trace!("udp: bound {} to {}", local, remote);
        self.endpoints[index] = Some(Endpoint {
            local,
            remote,
            staged: None,
        });
        Ok(index)
    }

    pub(crate) fn unbind(&mut self, index: usize) {
        self.endpoints[index] = None;
    }

    /// Find the endpoint a received datagram belongs to.
    pub(crate) fn process(&self, ip_repr: &Ipv6Repr, repr: &UdpRepr) -> Option<usize> {
        self.endpoints
            .iter()
            .position(|endpoint| matches!(endpoint, Some(e) if e.accepts(ip_repr, repr)))
    }

    /// Hand every staged datagram to `emit`, along with the local and remote
    /// endpoints it goes between.
    pub(crate) fn dispatch<F>(&mut self, mut emit: F)
    where
        F: FnMut(IpEndpoint, IpEndpoint, &[u8]),
    {
        for endpoint in self.endpoints.iter_mut().flatten() {
            if let Some((remote, data)) = endpoint.staged.take() {
                emit(endpoint.local, remote, &data);
            }
        }
    }

    pub(crate) fn has_staged(&self) -> bool {
        self.endpoints
            .iter()
            .flatten()
            .any(|endpoint| endpoint.staged.is_some())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::IpProtocol;

    const LOCAL_ADDR: Ipv6Address = Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);
    const REMOTE_ADDR: Ipv6Address = Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 2);

    fn datagram(src_port: u16, dst_port: u16) -> (Ipv6Repr, UdpRepr<'static>) {
        let repr = UdpRepr {
            src_port,
            dst_port,
            payload: b"abcdef",
        };
        let ip_repr = Ipv6Repr {
            src_addr: REMOTE_ADDR,
            dst_addr: LOCAL_ADDR,
            next_header: IpProtocol::Udp,
            payload_len: repr.buffer_len(),
            hop_limit: 64,
        };
        (ip_repr, repr)
    }

    #[test]
    fn test_ephemeral_ports() {
        let mut table = EndpointTable::new();
        let first = table.bind(IpEndpoint::default(), IpEndpoint::default()).unwrap();
        let second = table.bind(IpEndpoint::default(), IpEndpoint::default()).unwrap();
        assert_eq!(table.get(first).unwrap().local_endpoint().port, 49152);
        assert_eq!(table.get(second).unwrap().local_endpoint().port, 49153);
    }

    #[test]
    fn test_ephemeral_port_wraps_and_skips_used() {
        let mut table = EndpointTable::new();
        table.bind(IpEndpoint::from(49152), IpEndpoint::default()).unwrap();
        table.last_port = EPHEMERAL_PORT_LAST;
        let index = table.bind(IpEndpoint::default(), IpEndpoint::default()).unwrap();
        assert_eq!(table.get(index).unwrap().local_endpoint().port, 49153);
    }

    #[test]
    fn test_port_in_use() {
        let mut table = EndpointTable::new();
        table
            .bind(IpEndpoint::new(LOCAL_ADDR, 5683), IpEndpoint::default())
            .unwrap();
        assert_eq!(
            table.bind(IpEndpoint::new(LOCAL_ADDR, 5683), IpEndpoint::default()),
            Err(BindError::PortInUse)
        );
        assert_eq!(
            table.bind(IpEndpoint::from(5683), IpEndpoint::default()),
            Err(BindError::PortInUse)
        );
    }

    #[test]
    fn test_table_full() {
        let mut table = EndpointTable::new();
        for _ in 0..UDP_ENDPOINT_COUNT {
            table.bind(IpEndpoint::default(), IpEndpoint::default()).unwrap();
        }
        assert_eq!(
            table.bind(IpEndpoint::default(), IpEndpoint::default()),
            Err(BindError::NoResources)
        );
    }

    #[test]
    fn test_demux() {
        let mut table = EndpointTable::new();
        let connected = table
            .bind(IpEndpoint::from(7), IpEndpoint::new(REMOTE_ADDR, 1000))
            .unwrap();
        let (ip_repr, repr) = datagram(1000, 7);
        assert_eq!(table.process(&ip_repr, &repr), Some(connected));
        let (ip_repr, repr) = datagram(1001, 7);
        assert_eq!(table.process(&ip_repr, &repr), None);

        let any = table.bind(IpEndpoint::from(9), IpEndpoint::default()).unwrap();
        let (ip_repr, repr) = datagram(1001, 9);
        assert_eq!(table.process(&ip_repr, &repr), Some(any));
    }

    #[test]
    fn test_stage_and_dispatch() {
        let mut table = EndpointTable::new();
        let index = table.bind(IpEndpoint::from(7), IpEndpoint::default()).unwrap();
        let remote = IpEndpoint::new(REMOTE_ADDR, 1000);
        let endpoint = table.get_mut(index).unwrap();
        assert!(endpoint.stage(remote, b"one"));
        assert!(!endpoint.stage(remote, b"two"));
        assert!(table.has_staged());

        let mut sent = std::vec::Vec::new();
        table.dispatch(|local, remote, data| sent.push((local, remote, data.to_vec())));
        assert_eq!(sent, [(IpEndpoint::from(7), remote, b"one".to_vec())]);
        assert!(!table.has_staged());
    }
}
