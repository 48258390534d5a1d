//! Two interfaces on one simulated link, talking to each other through the
//! public API only.

use std::sync::atomic::{AtomicUsize, Ordering};

use tinyip6::iface::{Config, Interface, PacketBuffer};
use tinyip6::socket::{ContextHandle, Event, Protocol, Sockets, TcpState};
use tinyip6::time::{Duration, Instant};
use tinyip6::wire::{EthernetAddress, IpEndpoint, Ipv6Address};

const HW_A: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 0x0a]);
const HW_B: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 0x0b]);

const STEP: Duration = Duration::from_millis(10);
const DEADLINE: Duration = Duration::from_secs(30);

struct Node {
    iface: Interface,
    sockets: Sockets,
    events: Vec<(ContextHandle, Event)>,
}

impl Node {
    fn new(hardware_addr: EthernetAddress, seed: u64) -> Node {
        let mut config = Config::new(hardware_addr);
        config.random_seed = seed;
        Node {
            iface: Interface::new(config, Instant::ZERO),
            sockets: Sockets::new(),
            events: Vec::new(),
        }
    }

    fn addr(&self) -> Ipv6Address {
        self.iface.hardware_addr().link_local_address()
    }

    fn accepts_frame(&self, packet: &PacketBuffer) -> bool {
        match packet.link_dst() {
            Some(dst) => dst == self.iface.hardware_addr() || dst.is_multicast(),
            None => false,
        }
    }

    fn poll(&mut self, now: Instant) -> Vec<PacketBuffer> {
        let mut out = Vec::new();
        self.iface.poll(now, &mut self.sockets, |packet| out.push(packet));
        out
    }

    fn deliver(&mut self, now: Instant, frames: Vec<PacketBuffer>) -> Vec<PacketBuffer> {
        let mut out = Vec::new();
        for frame in frames {
            if !self.accepts_frame(&frame) {
                continue;
            }
            let Some(packet) = PacketBuffer::from_bytes(frame.into_bytes()) else {
                panic!("interface emitted a malformed datagram");
            };
            self.iface
                .receive(now, &mut self.sockets, packet, |packet| out.push(packet));
        }
        out
    }

    fn drain_events(&mut self) {
        while let Some(event) = self.sockets.poll_event() {
            self.events.push(event);
        }
    }

    fn take_event(&mut self, handle: ContextHandle, event: &Event) -> bool {
        match self
            .events
            .iter()
            .position(|(h, e)| *h == handle && e == event)
        {
            Some(index) => {
                self.events.remove(index);
                true
            }
            None => false,
        }
    }

    fn take_received(&mut self, handle: ContextHandle) -> Option<(Vec<u8>, IpEndpoint)> {
        let index = self
            .events
            .iter()
            .position(|(h, e)| *h == handle && matches!(e, Event::Received { .. }))?;
        match self.events.remove(index) {
            (_, Event::Received { data, remote }) => Some((data, remote)),
            _ => None,
        }
    }
}

struct Link {
    a: Node,
    b: Node,
    now: Instant,
}

impl Link {
    fn new() -> Link {
        let _ = env_logger::builder().is_test(true).try_init();
        Link {
            a: Node::new(HW_A, 0x5eed_0001),
            b: Node::new(HW_B, 0x5eed_0002),
            now: Instant::ZERO,
        }
    }

    /// Advance the clock one step: poll both nodes and carry every frame
    /// across until the link is quiet.
    fn step(&mut self) {
        let now = self.now;
        let to_b = self.a.poll(now);
        let to_a = self.b.poll(now);
        self.carry(to_a, to_b);
        self.a.drain_events();
        self.b.drain_events();
        self.now += STEP;
    }

    /// Deliver frames in both directions, along with every answer they
    /// provoke, until nothing is left in flight.
    fn carry(&mut self, mut to_a: Vec<PacketBuffer>, mut to_b: Vec<PacketBuffer>) {
        let now = self.now;
        while !to_a.is_empty() || !to_b.is_empty() {
            let from_b = self.b.deliver(now, core::mem::take(&mut to_b));
            let from_a = self.a.deliver(now, core::mem::take(&mut to_a));
            to_a = from_b;
            to_b = from_a;
        }
    }

    fn run_until<F>(&mut self, mut done: F)
    where
        F: FnMut(&mut Node, &mut Node) -> bool,
    {
        let deadline = self.now + DEADLINE;
        loop {
            self.step();
            if done(&mut self.a, &mut self.b) {
                return;
            }
            assert!(self.now < deadline, "link did not settle by {}", self.now);
        }
    }

    fn run_until_ready(&mut self) {
        self.run_until(|a, b| {
            let (addr_a, addr_b) = (a.addr(), b.addr());
            a.iface.addresses().is_usable(&addr_a) && b.iface.addresses().is_usable(&addr_b)
        });
    }
}

#[test]
fn test_duplicate_address_detection_passes() {
    let mut link = Link::new();
    link.run_until_ready();
    assert!(link.now < Instant::from_secs(3));
}

#[test]
fn test_echo() {
    static REPLIES: AtomicUsize = AtomicUsize::new(0);
    fn on_reply(_: Ipv6Address, ident: u16, seq_no: u16, data: &[u8]) {
        assert_eq!((ident, seq_no, data), (1, 1, &b"ping"[..]));
        REPLIES.fetch_add(1, Ordering::SeqCst);
    }

    let mut link = Link::new();
    link.run_until_ready();
    link.a.iface.add_echo_reply_callback(on_reply).unwrap();

    let dst = link.b.addr();
    let now = link.now;
    let mut frames = Vec::new();
    // The request is held until the solicitation for `dst` is answered.
    assert!(link
        .a
        .iface
        .send_echo_request(now, dst, 1, 1, b"ping", |packet| frames.push(packet)));
    link.carry(Vec::new(), frames);

    link.run_until(|_, _| REPLIES.load(Ordering::SeqCst) > 0);
    let neighbor = link.a.iface.neighbors().lookup(&dst).unwrap();
    assert_eq!(neighbor.lladdr(), Some(HW_B));
}

#[test]
fn test_udp_exchange() {
    let mut link = Link::new();
    link.run_until_ready();

    let server = link
        .b
        .sockets
        .open(Protocol::Udp, None, Some(IpEndpoint::from(7)))
        .unwrap();
    let server_endpoint = IpEndpoint::new(link.b.addr(), 7);
    let client = link
        .a
        .sockets
        .open(Protocol::Udp, Some(server_endpoint), None)
        .unwrap();
    let client_port = link.a.sockets.local_endpoint(client).unwrap().port;
    assert!(client_port >= 49152);

    link.a.sockets.send(client, b"ping").unwrap();
    let mut request = None;
    link.run_until(|_, b| {
        request = b.take_received(server);
        request.is_some()
    });
    let (data, remote) = request.unwrap();
    assert_eq!(data, b"ping");
    assert_eq!(remote, IpEndpoint::new(link.a.addr(), client_port));

    link.b.sockets.send_to(server, remote, b"pong").unwrap();
    let mut reply = None;
    link.run_until(|a, _| {
        reply = a.take_received(client);
        reply.is_some()
    });
    assert_eq!(reply.unwrap(), (b"pong".to_vec(), server_endpoint));
}

#[test]
fn test_tcp_session() {
    let mut link = Link::new();
    link.run_until_ready();

    let server = link
        .b
        .sockets
        .open(Protocol::Tcp, None, Some(IpEndpoint::from(80)))
        .unwrap();
    let remote = IpEndpoint::new(link.b.addr(), 80);
    let client = link
        .a
        .sockets
        .open(Protocol::Tcp, Some(remote), None)
        .unwrap();

    link.run_until(|a, b| {
        a.events.iter().any(|(h, e)| *h == client && *e == Event::Connected)
            && b.events.iter().any(|(h, e)| *h == server && *e == Event::Connected)
    });
    assert!(link.a.take_event(client, &Event::Connected));
    assert!(link.b.take_event(server, &Event::Connected));
    assert_eq!(link.a.sockets.tcp_state(client), Some(TcpState::Established));
    assert_eq!(
        link.b.sockets.remote_endpoint(server),
        link.a.sockets.local_endpoint(client)
    );

    link.a.sockets.send(client, b"GET /").unwrap();
    let mut request = None;
    link.run_until(|a, b| {
        if request.is_none() {
            request = b.take_received(server);
        }
        request.is_some() && a.events.iter().any(|(_, e)| *e == Event::Acked)
    });
    assert_eq!(request.unwrap().0, b"GET /");
    assert!(link.a.take_event(client, &Event::Acked));

    link.b.sockets.send(server, b"200 OK").unwrap();
    let mut response = None;
    link.run_until(|a, b| {
        if response.is_none() {
            response = a.take_received(client);
        }
        response.is_some() && b.events.iter().any(|(_, e)| *e == Event::Acked)
    });
    assert_eq!(response.unwrap().0, b"200 OK");

    link.a.sockets.close(client).unwrap();
    link.run_until(|a, b| {
        a.events.iter().any(|(h, e)| *h == client && *e == Event::Closed)
            && b.events.iter().any(|(h, e)| *h == server && *e == Event::Closed)
    });
    assert_eq!(link.a.sockets.tcp_state(client), None);
    assert_eq!(link.b.sockets.tcp_state(server), None);
}

#[test]
fn test_tcp_connection_refused() {
    let mut link = Link::new();
    link.run_until_ready();

    let remote = IpEndpoint::new(link.b.addr(), 8080);
    let client = link
        .a
        .sockets
        .open(Protocol::Tcp, Some(remote), None)
        .unwrap();
    link.run_until(|a, _| {
        a.events
            .iter()
            .any(|(h, e)| *h == client && matches!(e, Event::Aborted(_)))
    });
    assert_eq!(link.a.sockets.tcp_state(client), None);
}
