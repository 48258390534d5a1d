#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

//! The _tinyip6_ library is a single-buffer IPv6 engine for resource-constrained
//! network nodes. It walks IPv6 extension headers, reassembles fragmented datagrams,
//! runs Neighbor Discovery with its neighbor, address, prefix and default-router
//! tables, and drives a per-connection TCP state machine with retransmission.
//!
//! # Table of contents
//! The _tinyip6_ library is built in a layered structure, with the layers corresponding
//! to the levels of API abstraction. Only the highest layers would be used by a typical
//! application; however, the goal of _tinyip6_ is not just to provide a simple interface
//! for writing applications but also to be a toolbox of networking primitives, so
//! every layer is fully exposed and documented.
//!
//! When discussing networking stacks and layering, often the [OSI model][osi] is invoked.
//! _tinyip6_ makes no effort to conform to the OSI model as it is not applicable to TCP/IP.
//!
//! ## The socket layer
//! The socket layer APIs are provided in the module [socket](socket/index.html); currently,
//! TCP connections and UDP endpoints are provided, bound to application handles through
//! the context layer in [Sockets](socket/struct.Sockets.html).
//!
//! ## The interface layer
//! The interface layer APIs are provided in the module [iface](iface/index.html); currently,
//! a single IPv6 interface is provided. The link layer is the caller's business: packets
//! go in and out of the interface as [PacketBuffer](iface/struct.PacketBuffer.html)s
//! that hold exactly one IPv6 datagram.
//!
//! ## The wire layers
//! The wire layer APIs are provided in the module [wire](wire/index.html).
//!
//! There are two levels of abstraction, with the higher providing a superset of functionality
//! of the lower. The lower level is the `Packet` family of structures, which allow access to
//! the fields of a raw octet buffer; the higher level is the `Repr` family, which provides
//! a compact, checked representation that can be parsed from and emitted into a buffer.
//!
//! # Configuration
//!
//! Table capacities are fixed at build time. Each can be overridden by setting an
//! environment variable named `TINYIP6_<NAME>` while building, for example
//! `TINYIP6_TCP_CONNECTION_COUNT=16`. See `build.rs` for the full list and the defaults.
//!
//! [osi]: https://en.wikipedia.org/wiki/OSI_model

#[cfg(all(feature = "log", feature = "defmt"))]
compile_error!("You must enable at most one of the following features: defmt, log");

extern crate alloc;

#[macro_use]
mod macros;
mod rand;


pub mod iface;
pub mod socket;
pub mod time;
pub mod wire;

#[allow(unused)]
mod config {
    include!(concat!(env!("OUT_DIR"), "/config.rs"));
}
