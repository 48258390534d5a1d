use super::*;

const LOCAL_PORT: u16 = 5683;
const REMOTE_PORT: u16 = 49200;

fn datagram(local: Ipv6Address, payload: &[u8]) -> PacketBuffer {
    let repr = UdpRepr {
        src_port: REMOTE_PORT,
        dst_port: LOCAL_PORT,
        payload,
    };
    udp_packet(REMOTE_ADDR, local, &repr)
}

#[test]
fn test_receive_datagram() {
    let (mut iface, mut sockets, now) = setup();
    let local = local_addr(&iface);
    let handle = sockets
        .open(Protocol::Udp, None, Some(IpEndpoint::from(LOCAL_PORT)))
        .unwrap();

    assert!(recv(&mut iface, &mut sockets, now, datagram(local, b"hello")).is_empty());
    assert_eq!(
        sockets.poll_event(),
        Some((
            handle,
            Event::Received {
                data: b"hello".to_vec(),
                remote: IpEndpoint::new(REMOTE_ADDR, REMOTE_PORT),
            }
        ))
    );
    assert_eq!(sockets.poll_event(), None);
}

#[test]
fn test_receive_behind_destination_options() {
    let (mut iface, mut sockets, now) = setup();
    let local = local_addr(&iface);
    let handle = sockets
        .open(Protocol::Udp, None, Some(IpEndpoint::from(LOCAL_PORT)))
        .unwrap();

    let repr = UdpRepr {
        src_port: REMOTE_PORT,
        dst_port: LOCAL_PORT,
        payload: b"opts",
    };
    let mut payload: Vec<u8> = vec![IpProtocol::Udp.into(), 0, 1, 4, 0, 0, 0, 0];
    payload.extend_from_slice(&udp_bytes(REMOTE_ADDR, local, &repr));
    let packet = ip_packet(REMOTE_ADDR, local, IpProtocol::Ipv6Opts, 64, &payload);

    assert!(recv(&mut iface, &mut sockets, now, packet).is_empty());
    assert!(matches!(
        sockets.poll_event(),
        Some((h, Event::Received { ref data, .. })) if h == handle && data == b"opts"
    ));
}

#[test]
fn test_bad_checksum_is_dropped() {
    let (mut iface, mut sockets, now) = setup();
    let local = local_addr(&iface);
    sockets
        .open(Protocol::Udp, None, Some(IpEndpoint::from(LOCAL_PORT)))
        .unwrap();

    let mut packet = datagram(local, b"hello");
    packet.payload_mut()[8] ^= 0xff;
    assert!(recv(&mut iface, &mut sockets, now, packet).is_empty());
    assert_eq!(sockets.poll_event(), None);
}

#[test]
fn test_port_unreachable() {
    let (mut iface, mut sockets, now) = setup();
    learn_remote(&mut iface, &mut sockets, now);
    let local = local_addr(&iface);

    let emitted = recv(&mut iface, &mut sockets, now, datagram(local, b"hello"));
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].src_addr(), local);
    assert_eq!(emitted[0].dst_addr(), REMOTE_ADDR);
    match parse_icmpv6(&emitted[0]) {
        Icmpv6Repr::DstUnreachable {
            reason: Icmpv6DstUnreachable::PortUnreachable,
            header,
            data,
        } => {
            assert_eq!(header.src_addr, REMOTE_ADDR);
            assert_eq!(header.next_header, IpProtocol::Udp);
            assert_eq!(&data[8..], b"hello");
        }
        repr => panic!("expected port unreachable, got {repr:?}"),
    }
}

#[test]
fn test_port_unreachable_disabled() {
    let mut config = Config::new(LOCAL_HW);
    config.send_router_solicitations = false;
    config.udp_port_unreachable = false;
    let (mut iface, mut sockets, now) = setup_with(config);
    learn_remote(&mut iface, &mut sockets, now);
    let local = local_addr(&iface);

    assert!(recv(&mut iface, &mut sockets, now, datagram(local, b"hello")).is_empty());
}

#[test]
fn test_no_port_unreachable_for_multicast() {
    let (mut iface, mut sockets, now) = setup();
    learn_remote(&mut iface, &mut sockets, now);

    let packet = datagram(IPV6_LINK_LOCAL_ALL_NODES, b"hello");
    assert!(recv(&mut iface, &mut sockets, now, packet).is_empty());
}

#[test]
fn test_send_datagram() {
    let (mut iface, mut sockets, now) = setup();
    learn_remote(&mut iface, &mut sockets, now);
    let local = local_addr(&iface);
    let remote = IpEndpoint::new(REMOTE_ADDR, REMOTE_PORT);
    let handle = sockets
        .open(Protocol::Udp, Some(remote), Some(IpEndpoint::from(LOCAL_PORT)))
        .unwrap();

    sockets.send(handle, b"first").unwrap();
    assert_eq!(
        sockets.send(handle, b"second"),
        Err(crate::socket::SendError::Deferred)
    );
    assert_eq!(iface.poll_at(now, &sockets), Some(now));

    let emitted = poll(&mut iface, &mut sockets, now);
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].src_addr(), local);
    assert_eq!(emitted[0].dst_addr(), REMOTE_ADDR);
    assert_eq!(emitted[0].hop_limit(), 64);
    assert_eq!(emitted[0].link_dst(), Some(REMOTE_HW));
    assert_eq!(
        parse_udp(&emitted[0]),
        UdpRepr {
            src_port: LOCAL_PORT,
            dst_port: REMOTE_PORT,
            payload: b"first",
        }
    );

    sockets.send(handle, b"second").unwrap();
}

#[test]
fn test_send_to_multicast() {
    let (mut iface, mut sockets, now) = setup();
    let group = Ipv6Address::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfd);
    let handle = sockets.open(Protocol::Udp, None, None).unwrap();

    sockets
        .send_to(handle, IpEndpoint::new(group, LOCAL_PORT), b"all")
        .unwrap();
    let emitted = poll(&mut iface, &mut sockets, now);
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].src_addr(), local_addr(&iface));
    assert_eq!(
        emitted[0].link_dst(),
        Some(EthernetAddress::from_ipv6_multicast(&group))
    );
    assert_eq!(parse_udp(&emitted[0]).payload, b"all");
}
