//! Compile-time bounds for the socket core.
//!
//! Gathered in one place instead of scattered literals, per the reference
//! crate's habit of keeping buffer-size constants near the smoltcp socket
//! constructors (see the `*_RECVBUF`/`*_SENDBUF` constants in its net module).

/// Number of socket-table slots. Capacity is static; `open` fails with
/// `NetError::MFile` once all slots are live (after the kill-oldest hook
/// also fails).
pub const MAX_SOCKETS: usize = 128;

/// Maximum multicast groups a single socket may join.
pub const MAX_GROUPS_PER_SOCKET: usize = 8;

/// Maximum source addresses tracked per multicast group filter.
pub const MAX_SOURCES_PER_GROUP: usize = 16;

/// Maximum network interfaces registered with `if_nametoindex`.
pub const MAX_INTERFACES: usize = 8;

/// Default TCP/UDP receive buffer size in bytes.
pub const DEFAULT_RX_BUFFER: usize = 8192;

/// Default TCP/UDP send buffer size in bytes.
pub const DEFAULT_TX_BUFFER: usize = 8192;

/// Default TCP maximum segment size.
pub const DEFAULT_MSS: u32 = 1460;

/// Ephemeral port range, inclusive lower bound.
pub const EPHEMERAL_PORT_LO: u16 = 49152;

/// Ephemeral port range, exclusive upper bound.
pub const EPHEMERAL_PORT_HI: u32 = 65536;

/// Sentinel timeout value meaning "block forever".
pub const TIMEOUT_INFINITE: u32 = u32::MAX;

/// Maximum depth of the per-socket datagram/raw receive queue.
pub const MAX_RECV_QUEUE: usize = 32;
