/*! Low-level packet access and construction.

The `wire` module deals with the packet *representation*. It provides two levels
of functionality.

 * First, it provides functions to extract fields from sequences of octets,
   and to insert fields into sequences of octets. This happens `Packet` family of
   structures, e.g. [Ipv6Packet] or [TcpPacket].
 * Second, in cases where the space of valid field values is much smaller than the space
   of possible field values, it provides a compact, high-level representation
   of packet data that can be parsed from and emitted into a sequence of octets.
   This happens through the `Repr` family of structs and enums, e.g. [Icmpv6Repr] or [TcpRepr].

The functions in the `wire` module are designed for use together with `-Cpanic=abort`.

The `Packet` family of data structures guarantees that, if the `Packet::check_len()` method
returned `Ok(())`, then no accessor or setter method will panic; however, the guarantee
provided by `Packet::check_len()` may no longer hold after changing certain fields,
which are listed in the documentation for the specific packet.

The `Packet::new_checked` method is a shorthand for a combination of `Packet::new_unchecked`
and `Packet::check_len`.
When parsing untrusted input, it is *necessary* to use `Packet::new_checked()`;
so long as the buffer is not modified, no accessor will fail.
When emitting output, though, it is *incorrect* to use `Packet::new_checked()`;
the length check is likely to succeed on a zeroed buffer, but fail on a buffer
filled with data from a previous packet, such as when reusing buffers.
The buffer length for emission is not calculated by the `Packet` layer.

In the `Repr` family of data structures, the `Repr::parse()` method never panics
as long as `Packet::new_checked()` (or `Packet::check_len()`) has succeeded, and
the `Repr::emit()` method never panics as long as the underlying buffer is exactly
`Repr::buffer_len()` octets long.

# Examples

To emit an IPv6 header into an octet buffer, and then parse it back:

```rust
use tinyip6::wire::*;
let repr = Ipv6Repr {
    src_addr:    Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1),
    dst_addr:    Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 2),
    next_header: IpProtocol::Udp,
    payload_len: 10,
    hop_limit:   64,
};
let mut buffer = vec![0; repr.buffer_len() + repr.payload_len];
{ // emission
    let mut packet = Ipv6Packet::new_unchecked(&mut buffer);
    repr.emit(&mut packet);
}
{ // parsing
    let packet = Ipv6Packet::new_checked(&buffer)
                            .expect("truncated packet");
    let parsed = Ipv6Repr::parse(&packet)
                          .expect("malformed packet");
    assert_eq!(repr, parsed);
}
```
*/

mod field {
    pub type Field = ::core::ops::Range<usize>;
    pub type Rest = ::core::ops::RangeFrom<usize>;
}

mod ethernet;
pub(crate) mod icmpv6;
pub(crate) mod ip;
pub(crate) mod ipv6;
mod ipv6ext;
mod ipv6fragment;
mod ipv6option;
mod ipv6routing;
mod ndisc;
mod ndiscoption;
mod tcp;
mod udp;

use core::fmt;

pub use self::ethernet::Address as EthernetAddress;

pub use self::ip::{checksum, Endpoint as IpEndpoint, Protocol as IpProtocol};

pub use self::ipv6::{
    Address as Ipv6Address, Cidr as Ipv6Cidr, Packet as Ipv6Packet, Repr as Ipv6Repr,
    HEADER_LEN as IPV6_HEADER_LEN, LINK_LOCAL_ALL_NODES as IPV6_LINK_LOCAL_ALL_NODES,
    LINK_LOCAL_ALL_ROUTERS as IPV6_LINK_LOCAL_ALL_ROUTERS, MIN_MTU as IPV6_MIN_MTU,
};

pub(crate) use self::ipv6::{AddressExt as Ipv6AddressExt, MulticastScope};

pub use self::ipv6option::{
    FailureType as Ipv6OptionFailureType, Ipv6Option, Ipv6OptionsIterator,
    Repr as Ipv6OptionRepr, Type as Ipv6OptionType,
};

pub use self::ipv6ext::{Header as Ipv6ExtHeader, Repr as Ipv6ExtHeaderRepr};

pub use self::ipv6routing::{
    Header as Ipv6RoutingHeader, Type as Ipv6RoutingType,
    SEG_LEFT_OFFSET as IPV6_ROUTING_SEG_LEFT_OFFSET,
};

pub use self::ipv6fragment::{
    Header as Ipv6FragmentHeader, Repr as Ipv6FragmentRepr,
    HEADER_LEN as IPV6_FRAGMENT_HEADER_LEN,
};

pub use self::icmpv6::{
    DstUnreachable as Icmpv6DstUnreachable, Message as Icmpv6Message, Packet as Icmpv6Packet,
    ParamProblem as Icmpv6ParamProblem, Repr as Icmpv6Repr, TimeExceeded as Icmpv6TimeExceeded,
    HEADER_LEN as ICMPV6_HEADER_LEN,
};

pub use self::ndisc::{
    NeighborFlags as NdiscNeighborFlags, Repr as NdiscRepr, RouterFlags as NdiscRouterFlags,
};

pub use self::ndiscoption::{
    NdiscOption, NdiscOptionsIterator, INFINITE_LIFETIME as NDISC_INFINITE_LIFETIME,
    PrefixInfoFlags as NdiscPrefixInfoFlags,
    PrefixInformation as NdiscPrefixInformation, Repr as NdiscOptionRepr,
    Type as NdiscOptionType,
};

pub use self::udp::{Packet as UdpPacket, Repr as UdpRepr, HEADER_LEN as UDP_HEADER_LEN};

pub use self::tcp::{
    Control as TcpControl, Packet as TcpPacket, Repr as TcpRepr, SeqNumber as TcpSeqNumber,
    TcpOption, HEADER_LEN as TCP_HEADER_LEN,
};

/// Parsing a packet failed.
///
/// Either it is malformed, or it is not supported by tinyip6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Error;

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wire::Error")
    }
}

pub type Result<T> = core::result::Result<T, Error>;
