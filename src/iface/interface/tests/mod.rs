mod reassembly;
mod udp;

use std::vec::Vec;

use rstest::*;

use super::*;
use crate::socket::{Event, Protocol};
use crate::tests::*;

#[test]
#[should_panic(expected = "is not unicast")]
fn test_new_panics_on_multicast_hardware_address() {
    let config = Config::new(EthernetAddress([0x33, 0x33, 0, 0, 0, 1]));
    Interface::new(config, Instant::ZERO);
}

#[test]
fn test_link_local_address_is_tentative_first() {
    setup_logging();
    let iface = Interface::new(Config::new(LOCAL_HW), Instant::ZERO);
    let link_local = local_addr(&iface);
    assert!(iface.addresses().is_tentative(&link_local));
    assert!(!iface.addresses().is_usable(&link_local));
    assert_eq!(iface.get_source_address_ipv6(&REMOTE_ADDR), None);
}

#[test]
fn test_poll_at_follows_dad_timer() {
    setup_logging();
    let mut iface = Interface::new(Config::new(LOCAL_HW), Instant::ZERO);
    let sockets = Sockets::new();
    let at = iface.poll_at(Instant::ZERO, &sockets).unwrap();
    assert!(at < Instant::from_secs(1));
}

#[test]
fn test_multicast_groups() {
    let (mut iface, _, _) = setup();
    let group = Ipv6Address::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);
    assert!(iface.has_multicast_group(IPV6_LINK_LOCAL_ALL_NODES));
    assert!(!iface.has_multicast_group(IPV6_LINK_LOCAL_ALL_ROUTERS));
    assert!(!iface.has_multicast_group(group));

    assert_eq!(iface.join_multicast_group(group), Ok(true));
    assert_eq!(iface.join_multicast_group(group), Ok(false));
    assert!(iface.has_multicast_group(group));
    assert_eq!(
        iface.join_multicast_group(REMOTE_ADDR),
        Err(MulticastError::Unaddressable)
    );

    assert_eq!(iface.leave_multicast_group(group), Ok(true));
    assert_eq!(iface.leave_multicast_group(group), Ok(false));
    assert!(!iface.has_multicast_group(group));
}

#[test]
fn test_router_joins_all_routers() {
    let mut config = Config::new(LOCAL_HW);
    config.role = Role::Router;
    let (iface, _, _) = setup_with(config);
    assert!(iface.has_multicast_group(IPV6_LINK_LOCAL_ALL_ROUTERS));
}

#[test]
fn test_custom_icmpv6_handler() {
    fn handler(cx: &mut InterfaceInner, packet: PacketBuffer) -> Option<PacketBuffer> {
        let reply = Icmpv6Repr::EchoReply {
            ident: 0xbeef,
            seq_no: 0,
            data: &[],
        };
        Some(cx.icmpv6_packet(packet.dst_addr(), packet.src_addr(), 64, &reply))
    }

    let (mut iface, mut sockets, now) = setup();
    learn_remote(&mut iface, &mut sockets, now);
    iface
        .register_icmpv6_handler(Icmpv6Message::Unknown(200), None, handler)
        .unwrap();

    let mut bytes = vec![200, 0, 0, 0, 0, 0, 0, 0];
    let sum = checksum::upper_layer(&REMOTE_ADDR, &local_addr(&iface), IpProtocol::Icmpv6, &bytes);
    bytes[2..4].copy_from_slice(&sum.to_be_bytes());
    let packet = ip_packet(REMOTE_ADDR, local_addr(&iface), IpProtocol::Icmpv6, 64, &bytes);

    let emitted = recv(&mut iface, &mut sockets, now, packet);
    assert_eq!(emitted.len(), 1);
    assert!(matches!(
        parse_icmpv6(&emitted[0]),
        Icmpv6Repr::EchoReply { ident: 0xbeef, .. }
    ));
}

#[test]
fn test_send_echo_request_and_reply_callback() {
    use core::sync::atomic::{AtomicU16, Ordering};
    static REPLIES: AtomicU16 = AtomicU16::new(0);

    fn on_reply(src_addr: Ipv6Address, ident: u16, seq_no: u16, data: &[u8]) {
        assert_eq!(src_addr, REMOTE_ADDR);
        assert_eq!((ident, seq_no, data), (0x1234, 7, &b"ping"[..]));
        REPLIES.fetch_add(1, Ordering::SeqCst);
    }

    let (mut iface, mut sockets, now) = setup();
    learn_remote(&mut iface, &mut sockets, now);
    iface.add_echo_reply_callback(on_reply).unwrap();

    let mut emitted = Vec::new();
    assert!(iface.send_echo_request(now, REMOTE_ADDR, 0x1234, 7, b"ping", |p| emitted.push(p)));
    assert_eq!(emitted.len(), 1);
    assert_eq!(
        parse_icmpv6(&emitted[0]),
        Icmpv6Repr::EchoRequest {
            ident: 0x1234,
            seq_no: 7,
            data: b"ping",
        }
    );

    let reply = icmpv6_packet(
        REMOTE_ADDR,
        local_addr(&iface),
        64,
        &Icmpv6Repr::EchoReply {
            ident: 0x1234,
            seq_no: 7,
            data: b"ping",
        },
    );
    assert!(recv(&mut iface, &mut sockets, now, reply).is_empty());
    assert_eq!(REPLIES.load(Ordering::SeqCst), 1);
}
