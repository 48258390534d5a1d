use alloc::vec::Vec;
use core::fmt;

use heapless::Deque;

use super::tcp::{ConnectError, ConnectionTable, State as TcpState, TcpEvent};
use super::udp::{BindError, EndpointTable};
use super::AbortReason;
use crate::config::{CONTEXT_COUNT, CONTEXT_EVENT_QUEUE_COUNT, IFACE_LINK_MTU};
use crate::iface::InterfaceInner;
use crate::time::Instant;
use crate::wire::{IpEndpoint, Ipv6Repr, TcpRepr, UdpRepr, IPV6_HEADER_LEN, UDP_HEADER_LEN};

/// Largest UDP payload that fits the link without fragmentation.
const UDP_PAYLOAD_LIMIT: usize = IFACE_LINK_MTU - IPV6_HEADER_LEN - UDP_HEADER_LEN;

/// The transport protocol of a context.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Protocol {
    Tcp,
    Udp,
}

/// An application-level handle on a connection, a listener or a UDP endpoint.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ContextHandle(usize);

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Something that happened on a context.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Event {
    Connected,
    Received { data: Vec<u8>, remote: IpEndpoint },
    /// The data passed to the last `send` was acknowledged.
    Acked,
    /// The connection is closed. The handle is no longer valid.
    Closed,
    /// The connection was torn down. The handle is no longer valid.
    Aborted(AbortReason),
}

/// Error returned by [`Sockets::open`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenError {
    PortInUse,
    NoResources,
    /// The remote endpoint of an active open or the port of a listener is missing.
    Unaddressable,
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OpenError::PortInUse => write!(f, "port in use"),
            OpenError::NoResources => write!(f, "no resources"),
            OpenError::Unaddressable => write!(f, "unaddressable"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for OpenError {}

impl From<ConnectError> for OpenError {
    fn from(err: ConnectError) -> OpenError {
        match err {
            ConnectError::PortInUse => OpenError::PortInUse,
            ConnectError::NoResources => OpenError::NoResources,
        }
    }
}

impl From<BindError> for OpenError {
    fn from(err: BindError) -> OpenError {
        match err {
            BindError::PortInUse => OpenError::PortInUse,
            BindError::NoResources => OpenError::NoResources,
        }
    }
}

/// Error returned by [`Sockets::send`] and [`Sockets::send_to`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendError {
    InvalidHandle,
    /// A previous send has not gone out, or has not been acknowledged yet.
    Deferred,
    NotConnected,
    TooLarge,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SendError::InvalidHandle => write!(f, "invalid handle"),
            SendError::Deferred => write!(f, "deferred"),
            SendError::NotConnected => write!(f, "not connected"),
            SendError::TooLarge => write!(f, "too large"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SendError {}

/// Error returned by [`Sockets::close`] and [`Sockets::abort`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidHandle;

impl fmt::Display for InvalidHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid handle")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InvalidHandle {}

/// What a context is bound to.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Binding {
    Listen(u16),
    Tcp(usize),
    Udp(usize),
}

#[derive(Debug, Clone, Copy)]
struct Context {
    binding: Binding,
}

/// The sockets of an interface, and the application handles bound to them.
#[derive(Debug)]
pub struct Sockets {
    tcp: ConnectionTable,
    udp: EndpointTable,
    contexts: [Option<Context>; CONTEXT_COUNT],
    events: Deque<(ContextHandle, Event), CONTEXT_EVENT_QUEUE_COUNT>,
}

impl Default for Sockets {
    fn default() -> Self {
        Self::new()
    }
}

impl Sockets {
    pub fn new() -> Sockets {
        Sockets {
            tcp: ConnectionTable::new(),
            udp: EndpointTable::new(),
            contexts: [None; CONTEXT_COUNT],
            events: Deque::new(),
        }
    }

    /// Open a context.
    ///
    /// * UDP binds an endpoint. Without `local`, or with a zero local port,
    ///   an ephemeral port is used. Without `remote`, datagrams from any peer
    ///   are received, and [`send_to`] must be used.
    /// * TCP with `remote` starts an active open; the SYN goes out on the
    ///   next poll of the interface.
    /// * TCP without `remote` listens on the local port. The first
    ///   connection accepted on it is bound to the context.
    ///
    /// [`send_to`]: #method.send_to
    pub fn open(
        &mut self,
        protocol: Protocol,
        remote: Option<IpEndpoint>,
        local: Option<IpEndpoint>,
    ) -> Result<ContextHandle, OpenError> {
        let slot = self
            .contexts
            .iter()
            .position(Option::is_none)
            .ok_or(OpenError::NoResources)?;
        let local = local.unwrap_or_default();

        let binding = match (protocol, remote) {
            (Protocol::Udp, remote) => {
                Binding::Udp(self.udp.bind(local, remote.unwrap_or_default())?)
            }
            (Protocol::Tcp, Some(remote)) => {
                if !remote.is_specified() {
                    return Err(OpenError::Unaddressable);
                }
                Binding::Tcp(self.tcp.connect(local, remote)?)
            }
            (Protocol::Tcp, None) => {
                if local.port == 0 {
                    return Err(OpenError::Unaddressable);
                }
                self.tcp.listen(local.port)?;
                Binding::Listen(local.port)
            }
        };

        self.contexts[slot] = Some(Context { binding });
        let handle = ContextHandle(slot);
        net_debug!("context {}: opened {:?}", handle, binding);
        Ok(handle)
    }

    fn context(&self, handle: ContextHandle) -> Option<Context> {
        self.contexts.get(handle.0).copied().flatten()
    }

    /// Stage data on a connected context.
    pub fn send(&mut self, handle: ContextHandle, data: &[u8]) -> Result<(), SendError> {
        let context = self.context(handle).ok_or(SendError::InvalidHandle)?;
        match context.binding {
            Binding::Listen(_) => Err(SendError::NotConnected),
            Binding::Tcp(index) => {
                let conn = self.tcp.get_mut(index);
                if conn.state() != TcpState::Established {
                    return Err(SendError::NotConnected);
                }
                if data.len() > conn.mss() {
                    return Err(SendError::TooLarge);
                }
                if !conn.stage(data) {
                    return Err(SendError::Deferred);
                }
                #[cfg(any(test, feature = "verbose"))]
                net_trace!("context {}: staged {} octets", handle, data.len());
                Ok(())
            }
            Binding::Udp(index) => {
                let remote = self
                    .udp
                    .get(index)
                    .map(|endpoint| endpoint.remote_endpoint())
                    .ok_or(SendError::InvalidHandle)?;
                if !remote.is_specified() {
                    return Err(SendError::NotConnected);
                }
                self.stage_udp(index, remote, data)
            }
        }
    }

    /// Stage a datagram to `remote` on a UDP context.
    pub fn send_to(
        &mut self,
        handle: ContextHandle,
        remote: IpEndpoint,
        data: &[u8],
    ) -> Result<(), SendError> {
        let context = self.context(handle).ok_or(SendError::InvalidHandle)?;
        match context.binding {
            Binding::Udp(index) if remote.is_specified() => self.stage_udp(index, remote, data),
            Binding::Udp(_) => Err(SendError::NotConnected),
            _ => self.send(handle, data),
        }
    }

    fn stage_udp(&mut self, index: usize, remote: IpEndpoint, data: &[u8]) -> Result<(), SendError> {
        if data.len() > UDP_PAYLOAD_LIMIT {
            return Err(SendError::TooLarge);
        }
        let endpoint = self.udp.get_mut(index).ok_or(SendError::InvalidHandle)?;
        if !endpoint.stage(remote, data) {
            return Err(SendError::Deferred);
        }
        #[cfg(any(test, feature = "verbose"))]
        net_trace!("udp: staged {} octets to {}", data.len(), remote);
        Ok(())
    }

    /// Close a context.
    ///
    /// A TCP connection starts its close handshake, and the handle stays valid
    /// until [`Event::Closed`] is delivered. Anything else is freed at once.
    pub fn close(&mut self, handle: ContextHandle) -> Result<(), InvalidHandle> {
        let context = self.context(handle).ok_or(InvalidHandle)?;
        match context.binding {
            Binding::Tcp(index) => {
                if self.tcp.close(index) {
                    self.contexts[handle.0] = None;
                    self.push_event(handle, Event::Closed);
                }
            }
            Binding::Listen(port) => {
                self.tcp.unlisten(port);
                self.contexts[handle.0] = None;
            }
            Binding::Udp(index) => {
                self.udp.unbind(index);
                self.contexts[handle.0] = None;
            }
        }
        Ok(())
    }

    /// Reset a TCP connection. Anything else is closed.
    pub fn abort(&mut self, handle: ContextHandle) -> Result<(), InvalidHandle> {
        let context = self.context(handle).ok_or(InvalidHandle)?;
        match context.binding {
            Binding::Tcp(index) => {
                self.tcp.abort(index);
                Ok(())
            }
            _ => self.close(handle),
        }
    }

    /// Take the oldest pending event.
    pub fn poll_event(&mut self) -> Option<(ContextHandle, Event)> {
        self.events.pop_front()
    }

    /// The state of the TCP connection bound to `handle`, if any.
    pub fn tcp_state(&self, handle: ContextHandle) -> Option<TcpState> {
        match self.context(handle)?.binding {
            Binding::Tcp(index) => Some(self.tcp.get(index).state()),
            _ => None,
        }
    }

    pub fn local_endpoint(&self, handle: ContextHandle) -> Option<IpEndpoint> {
        match self.context(handle)?.binding {
            Binding::Listen(port) => Some(IpEndpoint::from(port)),
            Binding::Tcp(index) => Some(self.tcp.get(index).local_endpoint()),
            Binding::Udp(index) => self.udp.get(index).map(|e| e.local_endpoint()),
        }
    }

    pub fn remote_endpoint(&self, handle: ContextHandle) -> Option<IpEndpoint> {
        match self.context(handle)?.binding {
            Binding::Listen(_) => None,
            Binding::Tcp(index) => Some(self.tcp.get(index).remote_endpoint()),
            Binding::Udp(index) => self.udp.get(index).map(|e| e.remote_endpoint()),
        }
    }

    fn push_event(&mut self, handle: ContextHandle, event: Event) {
        push_event(&mut self.events, handle, event)
    }

    /// Deliver a received datagram. Returns false if no endpoint takes it.
    pub(crate) fn process_udp(&mut self, ip_repr: &Ipv6Repr, repr: &UdpRepr) -> bool {
        let Some(index) = self.udp.process(ip_repr, repr) else {
            return false;
        };
        let binding = Binding::Udp(index);
        if let Some(slot) = find_context(&self.contexts, binding) {
            let event = Event::Received {
                data: repr.payload.to_vec(),
                remote: IpEndpoint::new(ip_repr.src_addr, repr.src_port),
            };
            self.push_event(ContextHandle(slot), event);
        }
        true
    }

    pub(crate) fn dispatch_udp<F>(&mut self, mut emit: F)
    where
        F: FnMut(IpEndpoint, IpEndpoint, &[u8]),
    {
        self.udp.dispatch(|local, remote, data| emit(local, remote, data))
    }

    pub(crate) fn process_tcp<F>(
        &mut self,
        cx: &mut InterfaceInner,
        ip_repr: &Ipv6Repr,
        repr: &TcpRepr,
        emit: F,
    ) where
        F: FnMut(&mut InterfaceInner, &Ipv6Repr, &TcpRepr),
    {
        let Sockets {
            tcp,
            contexts,
            events,
            ..
        } = self;
        let mut accepted = None;
        tcp.process(
            cx,
            ip_repr,
            repr,
            |index, event| {
                if let TcpEvent::Accepted(port) = event {
                    accepted = Some(port);
                }
                deliver_tcp(contexts, events, index, event)
            },
            emit,
        );
        if let Some(port) = accepted {
            tcp.unlisten(port);
        }
    }

    pub(crate) fn dispatch_tcp<F>(&mut self, cx: &mut InterfaceInner, emit: F)
    where
        F: FnMut(&mut InterfaceInner, &Ipv6Repr, &TcpRepr),
    {
        let Sockets {
            tcp,
            contexts,
            events,
            ..
        } = self;
        tcp.dispatch(
            cx,
            |index, event| deliver_tcp(contexts, events, index, event),
            emit,
        );
    }

    pub(crate) fn poll_at(&self, now: Instant) -> Option<Instant> {
        if self.udp.has_staged() {
            return Some(now);
        }
        self.tcp.poll_at(now)
    }
}

fn find_context(contexts: &[Option<Context>; CONTEXT_COUNT], binding: Binding) -> Option<usize> {
    contexts
        .iter()
        .position(|context| matches!(context, Some(c) if c.binding == binding))
}

fn push_event(
    events: &mut Deque<(ContextHandle, Event), CONTEXT_EVENT_QUEUE_COUNT>,
    handle: ContextHandle,
    event: Event,
) {
    net_trace!("context {}: event queued", handle);
    if events.push_back((handle, event)).is_err() {
        net_debug!("context {}: event queue full, dropping event", handle);
    }
}

/// Route a connection event to the context bound to the connection.
fn deliver_tcp(
    contexts: &mut [Option<Context>; CONTEXT_COUNT],
    events: &mut Deque<(ContextHandle, Event), CONTEXT_EVENT_QUEUE_COUNT>,
    index: usize,
    event: TcpEvent,
) {
    if let TcpEvent::Accepted(port) = event {
        match find_context(contexts, Binding::Listen(port)) {
            Some(slot) => {
                if let Some(context) = contexts[slot].as_mut() {
                    context.binding = Binding::Tcp(index);
                }
            }
            None => net_debug!("tcp: no context listening on port {}", port),
        }
        return;
    }

    let Some(slot) = find_context(contexts, Binding::Tcp(index)) else {
        return;
    };
    let handle = ContextHandle(slot);
    let event = match event {
        TcpEvent::Accepted(_) => return,
        TcpEvent::Connected => Event::Connected,
        TcpEvent::Received { data, remote } => Event::Received {
            data: data.to_vec(),
            remote,
        },
        TcpEvent::Acked => Event::Acked,
        TcpEvent::Closed => Event::Closed,
        TcpEvent::Aborted(reason) => Event::Aborted(reason),
    };
    if matches!(event, Event::Closed | Event::Aborted(_)) {
        contexts[slot] = None;
    }
    push_event(events, handle, event)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::Ipv6Address;

    const REMOTE_ADDR: Ipv6Address = Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 2);

    fn remote(port: u16) -> Option<IpEndpoint> {
        Some(IpEndpoint::new(REMOTE_ADDR, port))
    }

    #[test]
    fn test_udp_port_in_use() {
        let mut sockets = Sockets::new();
        sockets
            .open(Protocol::Udp, None, Some(IpEndpoint::from(5683)))
            .unwrap();
        assert_eq!(
            sockets.open(Protocol::Udp, None, Some(IpEndpoint::from(5683))),
            Err(OpenError::PortInUse)
        );
        // TCP ports are a separate space.
        assert!(sockets
            .open(Protocol::Tcp, None, Some(IpEndpoint::from(5683)))
            .is_ok());
    }

    #[test]
    fn test_udp_ephemeral_port() {
        let mut sockets = Sockets::new();
        let handle = sockets.open(Protocol::Udp, remote(7), None).unwrap();
        let local = sockets.local_endpoint(handle).unwrap();
        assert!(local.port >= 49152);
        assert_eq!(sockets.remote_endpoint(handle), remote(7));
    }

    #[test]
    fn test_unaddressable() {
        let mut sockets = Sockets::new();
        assert_eq!(
            sockets.open(Protocol::Tcp, None, None),
            Err(OpenError::Unaddressable)
        );
        assert_eq!(
            sockets.open(Protocol::Tcp, Some(IpEndpoint::from(80)), None),
            Err(OpenError::Unaddressable)
        );
    }

    #[test]
    fn test_context_table_full() {
        let mut sockets = Sockets::new();
        let mut opened = 0;
        for port in 1..=crate::config::UDP_ENDPOINT_COUNT as u16 {
            sockets
                .open(Protocol::Udp, None, Some(IpEndpoint::from(port)))
                .unwrap();
            opened += 1;
        }
        while opened < CONTEXT_COUNT {
            sockets.open(Protocol::Tcp, remote(80), None).unwrap();
            opened += 1;
        }
        assert_eq!(
            sockets.open(Protocol::Udp, None, None),
            Err(OpenError::NoResources)
        );
    }

    #[test]
    fn test_send_errors() {
        let mut sockets = Sockets::new();
        let unconnected = sockets.open(Protocol::Udp, None, None).unwrap();
        assert_eq!(
            sockets.send(unconnected, b"x"),
            Err(SendError::NotConnected)
        );
        assert_eq!(
            sockets.send_to(unconnected, remote(7).unwrap(), &[0; UDP_PAYLOAD_LIMIT + 1]),
            Err(SendError::TooLarge)
        );
        assert_eq!(sockets.send_to(unconnected, remote(7).unwrap(), b"x"), Ok(()));
        assert_eq!(
            sockets.send_to(unconnected, remote(7).unwrap(), b"y"),
            Err(SendError::Deferred)
        );

        let listener = sockets
            .open(Protocol::Tcp, None, Some(IpEndpoint::from(80)))
            .unwrap();
        assert_eq!(sockets.send(listener, b"x"), Err(SendError::NotConnected));

        let connecting = sockets.open(Protocol::Tcp, remote(80), None).unwrap();
        assert_eq!(sockets.tcp_state(connecting), Some(TcpState::SynSent));
        assert_eq!(sockets.send(connecting, b"x"), Err(SendError::NotConnected));
    }

    #[test]
    fn test_close_udp_frees_handle() {
        let mut sockets = Sockets::new();
        let handle = sockets.open(Protocol::Udp, remote(7), None).unwrap();
        assert_eq!(sockets.close(handle), Ok(()));
        assert_eq!(sockets.send(handle, b"x"), Err(SendError::InvalidHandle));
        assert_eq!(sockets.close(handle), Err(InvalidHandle));
        assert_eq!(sockets.poll_event(), None);
    }

    #[test]
    fn test_close_syn_sent() {
        let mut sockets = Sockets::new();
        let handle = sockets.open(Protocol::Tcp, remote(80), None).unwrap();
        assert_eq!(sockets.close(handle), Ok(()));
        assert_eq!(sockets.poll_event(), Some((handle, Event::Closed)));
        assert_eq!(sockets.tcp_state(handle), None);
    }

    #[test]
    fn test_udp_receive_event() {
        let mut sockets = Sockets::new();
        let handle = sockets
            .open(Protocol::Udp, None, Some(IpEndpoint::from(7)))
            .unwrap();
        let repr = UdpRepr {
            src_port: 1000,
            dst_port: 7,
            payload: b"ping",
        };
        let ip_repr = Ipv6Repr {
            src_addr: REMOTE_ADDR,
            dst_addr: Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1),
            next_header: crate::wire::IpProtocol::Udp,
            payload_len: repr.buffer_len(),
            hop_limit: 64,
        };
        assert!(sockets.process_udp(&ip_repr, &repr));
        assert_eq!(
            sockets.poll_event(),
            Some((
                handle,
                Event::Received {
                    data: b"ping".to_vec(),
                    remote: remote(1000).unwrap(),
                }
            ))
        );

        let repr = UdpRepr {
            dst_port: 8,
            ..repr
        };
        assert!(!sockets.process_udp(&ip_repr, &repr));
    }
}
