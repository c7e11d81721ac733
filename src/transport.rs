//! The external transport engine contract (C6's "transport coupling").
//!
//! Grounded directly on the reference crate's `Socket` trait
//! (`linux-object/src/net/mod.rs`): `read`/`write`/`poll`/`connect`/`bind`/
//! `listen`/`shutdown`/`accept`/`setsockopt`/`ioctl`, most with a default
//! `Err` body so a transport kind that doesn't support an operation (e.g. a
//! raw socket's `listen`) need not override it.
//!
//! Two differences from the reference, both deliberate:
//! - The reference trait is `#[async_trait]`; this crate's concurrency model
//!   (§5) is synchronous suspend-on-mutex, not an async executor, so this
//!   trait is a plain (non-async) trait.
//! - The reference's `poll(&self)` (tcp.rs) and `poll(&self, events:
//!   PollEvents)` (udp.rs) disagree on signature across transport kinds —
//!   an internal inconsistency. This trait standardizes on the udp.rs shape
//!   (an explicit interest mask in, a `PollEvents` result out) since C7
//!   needs to know which direction the caller actually asked about.

use crate::address::IpAddr;
use crate::error::TransportStatus;
use alloc::sync::Arc;

bitflags::bitflags! {
    /// Readiness bits a transport reports back to C7's event multiplexor.
    pub struct PollEvents: u8 {
        const READABLE = 0b0000_0001;
        const WRITABLE = 0b0000_0010;
        const ERROR    = 0b0000_0100;
        const CLOSED   = 0b0000_1000;
    }
}

/// `shutdown(how)` directions (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownHow {
    Receive,
    Send,
    Both,
}

/// A remote or local endpoint as seen by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub addr: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub const UNSPECIFIED: Endpoint = Endpoint {
        addr: IpAddr::Unspec,
        port: 0,
    };
}

/// One ancillary field a caller can override via `sendmsg`'s control
/// messages (§4.5), passed down to the transport so it can stamp the
/// outgoing packet instead of this layer having to understand packet
/// construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendHints {
    pub src_override: Option<IpAddr>,
    pub tos_override: Option<u8>,
    pub ttl_override: Option<u8>,
    pub dont_fragment: Option<bool>,
}

/// Per-packet metadata a transport hands back on `recv_from`, used to
/// populate `recvmsg`'s ancillary output (§4.5).
#[derive(Debug, Clone, Copy, Default)]
pub struct RecvMeta {
    pub dst: Option<IpAddr>,
    pub tos: Option<u8>,
    pub ttl: Option<u8>,
}

/// The contract a TCP/UDP/raw-IP/raw-Ethernet state machine must provide.
/// One implementation per live socket slot, held as `Arc<dyn Transport>`
/// (`Arc` rather than `Box` so a listening socket's freshly-`accept`ed
/// child can share bookkeeping with the engine without an extra indirection
/// layer, matching the reference crate's `Arc<dyn Socket>` return type from
/// `accept`).
pub trait Transport: Send + Sync {
    /// Non-blocking single read attempt. Returns the byte count and the
    /// remote endpoint the data arrived from (meaningful for
    /// datagram/raw kinds; the caller ignores it for stream kinds).
    fn recv(&self, buf: &mut [u8]) -> (Result<usize, TransportStatus>, Endpoint, RecvMeta);

    /// Non-blocking single write attempt. `dst` is `None` for stream
    /// sockets (the connected peer is implicit).
    fn send(&self, buf: &[u8], dst: Option<Endpoint>, hints: SendHints) -> Result<usize, TransportStatus>;

    /// Report readiness for the bits set in `interest`.
    fn poll(&self, interest: PollEvents) -> PollEvents;

    fn connect(&self, remote: Endpoint) -> Result<(), TransportStatus> {
        let _ = remote;
        Err(TransportStatus::NotSupported)
    }

    fn bind(&self, local: Endpoint) -> Result<(), TransportStatus> {
        let _ = local;
        Err(TransportStatus::NotSupported)
    }

    fn listen(&self, backlog: usize) -> Result<(), TransportStatus> {
        let _ = backlog;
        Err(TransportStatus::NotSupported)
    }

    fn accept(&self) -> Result<Arc<dyn Transport>, TransportStatus> {
        Err(TransportStatus::NotSupported)
    }

    fn shutdown(&self, how: ShutdownHow) -> Result<(), TransportStatus> {
        let _ = how;
        Err(TransportStatus::NotSupported)
    }

    fn local_endpoint(&self) -> Option<Endpoint> {
        None
    }

    fn remote_endpoint(&self) -> Option<Endpoint> {
        None
    }

    /// Transport-specific options this crate's C3 option engine doesn't
    /// itself model (e.g. `IP_HDRINCL` on a raw socket). Default: ignore.
    fn setsockopt(&self, level: usize, name: usize, data: &[u8]) -> Result<(), TransportStatus> {
        let _ = (level, name, data);
        Ok(())
    }

    fn ioctl(&self, request: usize, arg: usize) -> Result<usize, TransportStatus> {
        let _ = (request, arg);
        Ok(0)
    }

    /// Hook C2's allocator calls when the table is full and a stream
    /// socket is the oldest one sitting in TIME-WAIT (§4.2's
    /// "kill-oldest" recycling). Returns true if this transport agreed to
    /// be forcibly torn down.
    fn kill_if_time_wait(&self) -> bool {
        false
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use spin::Mutex;

    /// A deterministic in-memory transport used by this crate's own unit
    /// tests, standing in for the TCP/UDP/raw engine (out of scope per
    /// §1). Backed by a fixed ring so `recv` drains what `send` queued.
    pub struct MockTransport {
        inner: Mutex<MockInner>,
    }

    struct MockInner {
        queue: alloc::collections::VecDeque<(alloc::vec::Vec<u8>, Endpoint, Option<crate::address::IpAddr>)>,
        local: Option<Endpoint>,
        remote: Option<Endpoint>,
        connected: bool,
    }

    impl MockTransport {
        pub fn new() -> Self {
            MockTransport {
                inner: Mutex::new(MockInner {
                    queue: alloc::collections::VecDeque::new(),
                    local: None,
                    remote: None,
                    connected: false,
                }),
            }
        }

        /// Test hook: inject a datagram as if it arrived from `from`.
        pub fn deliver(&self, data: &[u8], from: Endpoint) {
            self.inner.lock().queue.push_back((data.to_vec(), from, None));
        }

        /// Test hook: inject a datagram as if it arrived from `from`,
        /// addressed to multicast group `dst` — exercises C4's accept
        /// rule through `crate::io::datagram_recv_from`.
        pub fn deliver_to(&self, data: &[u8], from: Endpoint, dst: crate::address::IpAddr) {
            self.inner.lock().queue.push_back((data.to_vec(), from, Some(dst)));
        }
    }

    impl Transport for MockTransport {
        fn recv(&self, buf: &mut [u8]) -> (Result<usize, TransportStatus>, Endpoint, RecvMeta) {
            let mut inner = self.inner.lock();
            match inner.queue.pop_front() {
                Some((data, from, dst)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    (Ok(n), from, RecvMeta { dst, ..RecvMeta::default() })
                }
                None => (Err(TransportStatus::Timeout), Endpoint::UNSPECIFIED, RecvMeta::default()),
            }
        }

        fn send(&self, buf: &[u8], dst: Option<Endpoint>, _hints: SendHints) -> Result<usize, TransportStatus> {
            let mut inner = self.inner.lock();
            let target = dst.or(inner.remote).ok_or(TransportStatus::NotConnected)?;
            inner.queue.push_back((buf.to_vec(), target, None));
            Ok(buf.len())
        }

        fn poll(&self, interest: PollEvents) -> PollEvents {
            let inner = self.inner.lock();
            let mut out = PollEvents::empty();
            if interest.contains(PollEvents::READABLE) && !inner.queue.is_empty() {
                out |= PollEvents::READABLE;
            }
            if interest.contains(PollEvents::WRITABLE) {
                out |= PollEvents::WRITABLE;
            }
            out
        }

        fn connect(&self, remote: Endpoint) -> Result<(), TransportStatus> {
            let mut inner = self.inner.lock();
            inner.remote = Some(remote);
            inner.connected = true;
            Ok(())
        }

        fn bind(&self, local: Endpoint) -> Result<(), TransportStatus> {
            self.inner.lock().local = Some(local);
            Ok(())
        }

        fn local_endpoint(&self) -> Option<Endpoint> {
            self.inner.lock().local
        }

        fn remote_endpoint(&self) -> Option<Endpoint> {
            self.inner.lock().remote
        }
    }
}
