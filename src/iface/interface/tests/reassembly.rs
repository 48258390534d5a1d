use super::*;

const IDENT: u32 = 0x0102_0304;

fn echo_request(local: Ipv6Address) -> Vec<u8> {
    let data: Vec<u8> = (0..56).collect();
    icmpv6_bytes(
        REMOTE_ADDR,
        local,
        &Icmpv6Repr::EchoRequest {
            ident: 1,
            seq_no: 2,
            data: &data,
        },
    )
}

fn fragment(local: Ipv6Address, offset: usize, data: &[u8], more_frags: bool) -> PacketBuffer {
    let flags = offset as u16 | more_frags as u16;
    let mut payload: Vec<u8> = vec![IpProtocol::Icmpv6.into(), 0];
    payload.extend_from_slice(&flags.to_be_bytes());
    payload.extend_from_slice(&IDENT.to_be_bytes());
    payload.extend_from_slice(data);
    ip_packet(REMOTE_ADDR, local, IpProtocol::Ipv6Frag, 64, &payload)
}

#[rstest]
#[case::in_order(false)]
#[case::out_of_order(true)]
fn test_reassemble_echo_request(#[case] reversed: bool) {
    let (mut iface, mut sockets, now) = setup();
    learn_remote(&mut iface, &mut sockets, now);
    let local = local_addr(&iface);
    let bytes = echo_request(local);

    let mut fragments = vec![
        fragment(local, 0, &bytes[..32], true),
        fragment(local, 32, &bytes[32..], false),
    ];
    if reversed {
        fragments.reverse();
    }
    let last = fragments.pop().unwrap();
    for fragment in fragments {
        assert!(recv(&mut iface, &mut sockets, now, fragment).is_empty());
    }

    let emitted = recv(&mut iface, &mut sockets, now, last);
    assert_eq!(emitted.len(), 1);
    match parse_icmpv6(&emitted[0]) {
        Icmpv6Repr::EchoReply {
            ident: 1,
            seq_no: 2,
            data,
        } => assert_eq!(data.len(), 56),
        repr => panic!("expected an echo reply, got {repr:?}"),
    }
}

#[test]
fn test_fragment_length_not_multiple_of_8() {
    let (mut iface, mut sockets, now) = setup();
    learn_remote(&mut iface, &mut sockets, now);
    let local = local_addr(&iface);
    let bytes = echo_request(local);

    let emitted = recv(&mut iface, &mut sockets, now, fragment(local, 0, &bytes[..30], true));
    assert_eq!(emitted.len(), 1);
    assert!(matches!(
        parse_icmpv6(&emitted[0]),
        Icmpv6Repr::ParamProblem {
            reason: Icmpv6ParamProblem::ErroneousHdrField,
            pointer: 4,
            ..
        }
    ));
}

fn time_exceeded(emitted: &[PacketBuffer]) -> Vec<&PacketBuffer> {
    emitted
        .iter()
        .filter(|packet| {
            matches!(
                parse_icmpv6(packet),
                Icmpv6Repr::TimeExceeded {
                    reason: Icmpv6TimeExceeded::FragReassemExceeded,
                    ..
                }
            )
        })
        .collect()
}

#[test]
fn test_reassembly_timeout() {
    let (mut iface, mut sockets, now) = setup();
    learn_remote(&mut iface, &mut sockets, now);
    let local = local_addr(&iface);
    let bytes = echo_request(local);

    recv(&mut iface, &mut sockets, now, fragment(local, 0, &bytes[..32], true));
    let later = now + Duration::from_secs(59);
    assert!(time_exceeded(&poll(&mut iface, &mut sockets, later)).is_empty());

    let later = now + Duration::from_secs(60);
    let emitted = poll(&mut iface, &mut sockets, later);
    let errors = time_exceeded(&emitted);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].dst_addr(), REMOTE_ADDR);

    // The buffer is free again.
    let emitted = recv(&mut iface, &mut sockets, later, fragment(local, 32, &bytes[32..], false));
    assert!(emitted.is_empty());
}

#[test]
fn test_reassembly_timeout_without_first_fragment() {
    let (mut iface, mut sockets, now) = setup();
    learn_remote(&mut iface, &mut sockets, now);
    let local = local_addr(&iface);
    let bytes = echo_request(local);

    recv(&mut iface, &mut sockets, now, fragment(local, 32, &bytes[32..], false));
    let emitted = poll(&mut iface, &mut sockets, now + Duration::from_secs(60));
    assert!(time_exceeded(&emitted).is_empty());
}
