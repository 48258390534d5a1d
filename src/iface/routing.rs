use super::PacketBuffer;

/// Option type carrying routing-protocol information in a Hop-by-Hop header.
pub const ROUTING_OPTION_TYPE: u8 = 0x63;

/// Callbacks into a routing protocol running on top of the interface.
///
/// The interface calls these at fixed points of its input and output paths.
/// Every method has a no-op default, so a protocol only needs to implement
/// the hooks it cares about.
pub trait RoutingHooks {
    /// Check the data of a routing-protocol option found while walking a
    /// Hop-by-Hop or Destination Options header.
    ///
    /// Returning `false` drops the packet.
    fn verify_option(&mut self, data: &[u8]) -> bool {
        let _ = data;
        true
    }

    /// Called before a packet is forwarded. Returning `false` drops it.
    fn update_forward(&mut self, packet: &mut PacketBuffer) -> bool {
        let _ = packet;
        true
    }

    /// Called on every packet this node originates, before next-hop resolution.
    fn insert_header(&mut self, packet: &mut PacketBuffer) {
        let _ = packet;
    }

    /// Called on an echo reply built from a request, to turn any routing
    /// header copied from the request around.
    fn invert_header(&mut self, packet: &mut PacketBuffer) {
        let _ = packet;
    }

    /// Called when a default router became unreachable.
    fn global_repair(&mut self) {}
}

/// Routing hooks for a node that runs no routing protocol.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NoRouting;

impl RoutingHooks for NoRouting {}
