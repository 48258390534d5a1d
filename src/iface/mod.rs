/*! Network interface logic.

The `iface` module deals with the *network interface*. It walks the extension
headers of incoming datagrams, reassembles fragments, runs Neighbor Discovery
and address autoconfiguration, and hands upper-layer payloads to ICMPv6
handlers or to the sockets.

The tables it keeps (neighbors, addresses, on-link prefixes and default
routers) are fixed in size and exposed read-only through [Interface].
*/

pub mod address;
mod interface;
pub mod neighbor;
mod packet;
pub mod prefix;
mod reassembly;
pub mod route;
mod routing;

pub use self::address::{
    AddressEntry, Kind as AddressKind, State as AddressState, Table as AddressTable, TableFull,
};
pub use self::interface::{
    Config, Dispatch, EchoReplyCallback, Icmpv6Handler, Icmpv6HandlerFn, Interface,
    InterfaceInner, MulticastError, RegistryFull, Role,
};
pub use self::neighbor::{Cache as NeighborCache, CacheFull, Neighbor, State as NeighborState};
pub use self::packet::PacketBuffer;
pub use self::prefix::{AdvertisedPrefix, List as PrefixList, ListFull, Prefix};
pub use self::route::{Router, RouterList, RouterListFull};
pub use self::routing::{NoRouting, RoutingHooks, ROUTING_OPTION_TYPE};
