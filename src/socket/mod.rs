/*! Communication between endpoints.

The `socket` module holds the TCP connection table with its state machine,
the UDP endpoint table, and the context layer that binds application handles
to them.

Applications only deal with [Sockets]: they [open](Sockets::open) a context,
[send](Sockets::send) on it, and learn what happened to it through
[poll_event](Sockets::poll_event). The tables are fixed in size; see the crate
documentation for how to change their capacities.
*/

mod context;
mod tcp;
mod udp;

pub use self::context::{
    ContextHandle, Event, InvalidHandle, OpenError, Protocol, SendError, Sockets,
};
pub use self::tcp::{AbortReason, State as TcpState};
