//! Socket table & allocator (C2) plus the `Socket` entity itself (§3).
//!
//! The global table and its guarding mutex are grounded directly on the
//! reference crate's
//! `pub static ref SOCKETS: Mutex<SocketSet<'static>> = Mutex::new(...)`
//! (`linux-object/src/net/mod.rs`) — one process-wide `lazy_static!`
//! `Mutex`, exactly this crate's `netMutex` (§5). Slots are held in a
//! `Vec` pre-sized to `MAX_SOCKETS` and never grown past it, rather than a
//! literal `[Slot; N]` array, since `WaitEvent` has no cheap `Default`/
//! `Copy` impl to seed a const-generic array with; the fixed-capacity
//! invariant is enforced by `open`'s linear scan failing once every slot
//! is live, not by the type system.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use lazy_static::lazy_static;
use spin::Mutex;

use crate::address::IpAddr;
use crate::config::*;
use crate::error::{NetError, NetResult};
use crate::event::WaitEvent;
use crate::multicast::MulticastState;
use crate::transport::{Endpoint, PollEvents, Transport};

bitflags::bitflags! {
    /// Socket option bits (§3, §4.3). Read/write only while holding
    /// `NET_MUTEX` (§4.3 final paragraph).
    pub struct OptionFlags: u32 {
        const REUSE_ADDR              = 1 << 0;
        const BROADCAST               = 1 << 1;
        const UDP_NO_CHECKSUM         = 1 << 2;
        const IPV4_DONT_FRAG          = 1 << 3;
        const IPV4_PKT_INFO           = 1 << 4;
        const IPV4_RECV_TOS           = 1 << 5;
        const IPV4_RECV_TTL           = 1 << 6;
        const IPV4_MULTICAST_LOOP     = 1 << 7;
        const IPV6_ONLY               = 1 << 8;
        const IPV6_DONT_FRAG          = 1 << 9;
        const IPV6_PKT_INFO           = 1 << 10;
        const IPV6_RECV_TRAFFIC_CLASS = 1 << 11;
        const IPV6_RECV_HOP_LIMIT     = 1 << 12;
        const IPV6_MULTICAST_LOOP     = 1 << 13;
        const TCP_NO_DELAY            = 1 << 14;
    }
}

/// Socket kind (§3 identity). `Unused` marks a free slot (invariant 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Unused,
    Stream,
    Dgram,
    RawIp,
    RawEth,
}

/// TCP-only shadow state (§3), mirrored from the transport for
/// introspection (`getsockopt(TCP_INFO)`-style callers); this crate never
/// mutates it directly, the transport does.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpShadow {
    pub snd_una: u32,
    pub snd_nxt: u32,
    pub snd_user: u32,
    pub rcv_user: u32,
    pub smss: u32,
    pub window_scale: u8,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAlive {
    pub enabled: bool,
    pub idle_ms: u32,
    pub interval_ms: u32,
    pub max_probes: u32,
}

/// WSAEventSelect-style user-registered event (§3): an opaque handle the
/// caller owns (an event object id, not interpreted by this crate),
/// a subscription mask, and a signaled-bits accumulator tracked
/// independently of the slot's own built-in `WaitEvent`. At most one per
/// socket (invariant 4) — registering again simply replaces it.
#[derive(Debug, Clone, Copy)]
pub struct UserEvent {
    pub handle: usize,
    pub mask: PollEvents,
    pub signaled: PollEvents,
}

/// One buffered datagram/raw packet (§3 receive queue), bounded at
/// `MAX_RECV_QUEUE` entries per socket.
pub struct QueuedPacket {
    pub data: Vec<u8>,
    pub source: Endpoint,
    pub dest: Option<IpAddr>,
    pub tos: Option<u8>,
    pub ttl: Option<u8>,
}

/// The central entity (§3). One instance per live table slot.
pub struct Socket {
    pub descriptor: usize,
    pub kind: SocketKind,
    pub protocol: u8,

    pub local: Endpoint,
    pub remote: Endpoint,
    pub iface: Option<usize>,

    pub options: OptionFlags,
    pub tos: u8,
    pub ttl: u8,
    pub multicast_ttl: u8,
    pub snd_buf: usize,
    pub rcv_buf: usize,
    pub mss: u32,
    pub keepalive: KeepAlive,
    pub linger_ms: Option<u32>,
    /// 0 ⇒ non-blocking; `config::TIMEOUT_INFINITE` ⇒ block forever.
    pub timeout_ms: u32,

    pub tcp_shadow: TcpShadow,

    pub errno: Option<NetError>,
    pub user_event: Option<UserEvent>,

    pub multicast: MulticastState,
    pub recv_queue: VecDeque<QueuedPacket>,

    pub transport: Option<Arc<dyn Transport>>,
}

impl Socket {
    fn reset(descriptor: usize) -> Socket {
        Socket {
            descriptor,
            kind: SocketKind::Unused,
            protocol: 0,
            local: Endpoint::UNSPECIFIED,
            remote: Endpoint::UNSPECIFIED,
            iface: None,
            options: OptionFlags::empty(),
            tos: 0,
            ttl: 64,
            multicast_ttl: 1,
            snd_buf: DEFAULT_TX_BUFFER,
            rcv_buf: DEFAULT_RX_BUFFER,
            mss: DEFAULT_MSS,
            keepalive: KeepAlive::default(),
            linger_ms: None,
            timeout_ms: TIMEOUT_INFINITE,
            tcp_shadow: TcpShadow {
                window_scale: Socket::window_scale_for(DEFAULT_RX_BUFFER),
                ..TcpShadow::default()
            },
            errno: None,
            user_event: None,
            multicast: MulticastState::new(),
            recv_queue: VecDeque::new(),
            transport: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.kind != SocketKind::Unused
    }

    pub fn is_nonblocking(&self) -> bool {
        self.timeout_ms == 0
    }

    /// `SO_ERROR`: read-and-clear (§4.9 final line).
    pub fn take_errno(&mut self) -> Option<NetError> {
        self.errno.take()
    }

    pub fn set_errno(&mut self, err: NetError) -> NetError {
        self.errno = Some(err);
        err
    }

    pub fn window_scale_for(rcv_buf: usize) -> u8 {
        // Standard "largest shift such that buffer >> shift <= 0xffff".
        let mut scale = 0u8;
        let mut size = rcv_buf;
        while size > 0xffff && scale < 14 {
            size >>= 1;
            scale += 1;
        }
        scale
    }

    /// Register (or replace) the user event for this socket. At most one
    /// lives at a time (invariant 4); a second call simply supersedes the
    /// first rather than erroring, mirroring `WSAEventSelect`'s own
    /// re-associate-on-reuse semantics.
    pub fn register_events(&mut self, handle: usize, mask: PollEvents) {
        self.user_event = Some(UserEvent { handle, mask, signaled: PollEvents::empty() });
    }

    pub fn unregister_events(&mut self) {
        self.user_event = None;
    }

    /// Latch `bits` into the user event's accumulator, restricted to its
    /// subscription mask — except `CLOSED`, which always latches
    /// regardless of subscription (§7's terminal-error notification).
    pub fn signal_user_event(&mut self, bits: PollEvents) {
        if let Some(ue) = self.user_event.as_mut() {
            let forced = bits & PollEvents::CLOSED;
            let masked = bits & ue.mask;
            ue.signaled |= forced | masked;
        }
    }
}

/// One table slot: a permanently-allocated event (invariant 3) plus the
/// socket state that gets reset on each `open`/`close` cycle.
struct Slot {
    event: WaitEvent,
    socket: Socket,
}

pub struct SocketTable {
    slots: Vec<Slot>,
}

impl SocketTable {
    pub(crate) fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_SOCKETS);
        for i in 0..MAX_SOCKETS {
            slots.push(Slot {
                event: WaitEvent::new(),
                socket: Socket::reset(i),
            });
        }
        SocketTable { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, descriptor: usize) -> NetResult<&Socket> {
        self.slots
            .get(descriptor)
            .map(|s| &s.socket)
            .ok_or(NetError::NotSock)
    }

    pub fn get_mut(&mut self, descriptor: usize) -> NetResult<&mut Socket> {
        self.slots
            .get_mut(descriptor)
            .map(|s| &mut s.socket)
            .ok_or(NetError::NotSock)
    }

    pub fn event(&self, descriptor: usize) -> NetResult<&WaitEvent> {
        self.slots
            .get(descriptor)
            .map(|s| &s.event)
            .ok_or(NetError::NotSock)
    }

    /// C2 `open`: validate kind, force the kind's canonical protocol and
    /// ephemeral-port request, scan for a free slot (falling back to the
    /// kill-oldest hook), and reset the chosen slot in place.
    pub fn open(&mut self, kind: SocketKind, protocol: u8, transport: Arc<dyn Transport>) -> NetResult<usize> {
        if kind == SocketKind::Unused {
            return Err(NetError::Invalid);
        }

        let index = match self.slots.iter().position(|s| !s.socket.is_live()) {
            Some(i) => i,
            None => self.reclaim_time_wait().ok_or(NetError::MFile)?,
        };

        let slot = &mut self.slots[index];
        slot.event.reset();
        let mut socket = Socket::reset(index);
        socket.kind = kind;
        socket.protocol = match kind {
            SocketKind::Stream => 6,  // IPPROTO_TCP
            SocketKind::Dgram => 17,  // IPPROTO_UDP
            _ => protocol,
        };
        socket.transport = Some(transport);
        slot.socket = socket;
        Ok(index)
    }

    /// §4.2's "kill oldest TIME-WAIT" fallback: ask each live stream
    /// socket's transport whether it's willing to be torn down, reusing
    /// the first that agrees.
    fn reclaim_time_wait(&mut self) -> Option<usize> {
        for slot in self.slots.iter_mut() {
            if slot.socket.kind == SocketKind::Stream {
                if let Some(t) = &slot.socket.transport {
                    if t.kill_if_time_wait() {
                        return Some(slot.socket.descriptor);
                    }
                }
            }
        }
        None
    }

    /// C2 `close`: drain the receive queue, mark the slot `Unused`. The
    /// event and descriptor persist (invariants 2, 3).
    pub fn close(&mut self, descriptor: usize) -> NetResult<()> {
        let slot = self.slots.get_mut(descriptor).ok_or(NetError::NotSock)?;
        if !slot.socket.is_live() {
            return Err(NetError::NotSock);
        }
        slot.socket.recv_queue.clear();
        slot.socket.signal_user_event(PollEvents::CLOSED);
        slot.event.signal_closed();
        let index = slot.socket.descriptor;
        slot.socket = Socket::reset(index);
        slot.event.reset();
        Ok(())
    }
}

lazy_static! {
    /// The single process-wide `netMutex` (§5). Every operation that reads
    /// or writes mutable socket state, or calls into a transport, takes
    /// this lock; it is released before returning and before any
    /// suspension point (§5's five-step release/wait/reacquire sequence).
    pub static ref SOCKETS: Mutex<SocketTable> = Mutex::new(SocketTable::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    #[test]
    fn descriptor_stable_across_open_close_cycles() {
        let mut table = SocketTable::new();
        let fd = table.open(SocketKind::Dgram, 0, Arc::new(MockTransport::new())).unwrap();
        let event_ptr_before = table.event(fd).unwrap() as *const WaitEvent;
        table.close(fd).unwrap();
        let fd2 = table.open(SocketKind::Dgram, 0, Arc::new(MockTransport::new())).unwrap();
        assert_eq!(fd, fd2);
        let event_ptr_after = table.event(fd2).unwrap() as *const WaitEvent;
        assert_eq!(event_ptr_before, event_ptr_after);
    }

    #[test]
    fn stream_open_forces_tcp_protocol() {
        let mut table = SocketTable::new();
        let fd = table.open(SocketKind::Stream, 0, Arc::new(MockTransport::new())).unwrap();
        assert_eq!(table.get(fd).unwrap().protocol, 6);
    }

    #[test]
    fn close_unused_socket_fails() {
        let mut table = SocketTable::new();
        assert!(table.close(0).is_err());
    }

    #[test]
    fn user_event_signal_is_masked_by_subscription() {
        let mut table = SocketTable::new();
        let fd = table.open(SocketKind::Dgram, 0, Arc::new(MockTransport::new())).unwrap();
        let sock = table.get_mut(fd).unwrap();
        sock.register_events(42, PollEvents::READABLE);
        sock.signal_user_event(PollEvents::WRITABLE);
        assert!(sock.user_event.unwrap().signaled.is_empty());
        sock.signal_user_event(PollEvents::READABLE);
        assert!(sock.user_event.unwrap().signaled.contains(PollEvents::READABLE));
    }

    #[test]
    fn registering_again_replaces_the_prior_user_event() {
        let mut table = SocketTable::new();
        let fd = table.open(SocketKind::Dgram, 0, Arc::new(MockTransport::new())).unwrap();
        let sock = table.get_mut(fd).unwrap();
        sock.register_events(1, PollEvents::READABLE);
        sock.signal_user_event(PollEvents::READABLE);
        sock.register_events(2, PollEvents::WRITABLE);
        let ue = sock.user_event.unwrap();
        assert_eq!(ue.handle, 2);
        assert!(ue.signaled.is_empty());
    }

    #[test]
    fn closed_bit_latches_even_when_not_subscribed() {
        let mut table = SocketTable::new();
        let fd = table.open(SocketKind::Dgram, 0, Arc::new(MockTransport::new())).unwrap();
        let sock = table.get_mut(fd).unwrap();
        sock.register_events(7, PollEvents::READABLE);
        sock.signal_user_event(PollEvents::CLOSED);
        assert!(sock.user_event.unwrap().signaled.contains(PollEvents::CLOSED));
    }

    #[test]
    fn close_clears_the_user_event_along_with_the_rest_of_the_slot() {
        let mut table = SocketTable::new();
        let fd = table.open(SocketKind::Dgram, 0, Arc::new(MockTransport::new())).unwrap();
        table.get_mut(fd).unwrap().register_events(7, PollEvents::READABLE);
        table.close(fd).unwrap();
        let fd2 = table.open(SocketKind::Dgram, 0, Arc::new(MockTransport::new())).unwrap();
        assert!(table.get(fd2).unwrap().user_event.is_none());
    }

    #[test]
    fn table_exhaustion_without_time_wait_candidates_fails() {
        let mut table = SocketTable::new();
        for _ in 0..MAX_SOCKETS {
            table.open(SocketKind::Dgram, 0, Arc::new(MockTransport::new())).unwrap();
        }
        assert_eq!(
            table.open(SocketKind::Dgram, 0, Arc::new(MockTransport::new())).unwrap_err(),
            NetError::MFile
        );
    }
}
