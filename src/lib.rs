//! Socket core: a POSIX-like socket abstraction over TCP/UDP/raw-IP/
//! raw-Ethernet transports, dual-stack IPv4/IPv6.

#![cfg_attr(not(test), no_std)]
#![allow(clippy::upper_case_acronyms)]

#[macro_use]
extern crate alloc;

#[macro_use]
extern crate log;

// layer 0
pub mod config;
pub mod error;

// layer 1
pub mod address;
pub mod transport;

// layer 2
pub mod event;
pub mod table;

// layer 3
pub mod connect;
pub mod io;
pub mod multicast;
pub mod options;
pub mod resolve;
pub mod select;

pub use address::{AddressFamily, IpAddr, SocketAddress};
pub use error::{NetError, NetResult, TransportStatus};
pub use event::{SpinWaiter, WaitEvent, Waiter};
pub use table::{SocketKind, SocketTable, SOCKETS};
pub use transport::{Endpoint, PollEvents, Transport};
