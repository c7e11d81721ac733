//! connect/bind/listen/accept/shutdown orchestration (C6).
//!
//! Delegates to the `Transport` trait object held by each socket slot but
//! owns the user-visible errno projection itself (§4.6) — the same split
//! the reference crate draws between its `Socket::connect` (transport
//! logic) and the syscall layer that decides EINPROGRESS vs ETIMEDOUT,
//! except here both live in this one crate since there is no separate
//! syscall dispatcher.

use alloc::sync::Arc;

use crate::address::AddressFamily;
use crate::error::{NetError, NetResult};
use crate::table::{Socket, SocketKind};
use crate::transport::{Endpoint, ShutdownHow as TransportShutdownHow, Transport};

/// `shutdown(how)` directions as seen at this orchestration layer,
/// distinct from `transport::ShutdownHow` only in that an invalid numeric
/// `how` must be rejected here before it ever reaches a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownDirection {
    Receive,
    Send,
    Both,
}

pub fn shutdown_from_raw(how: i32) -> NetResult<ShutdownDirection> {
    match how {
        0 => Ok(ShutdownDirection::Receive),
        1 => Ok(ShutdownDirection::Send),
        2 => Ok(ShutdownDirection::Both),
        _ => Err(NetError::Invalid),
    }
}

fn family_of(addr: crate::address::IpAddr) -> AddressFamily {
    addr.family()
}

/// Reject a bind/connect address whose family doesn't match the family
/// the socket's local endpoint was created for, once that has been
/// established by a prior bind or by the kind itself. A socket still at
/// `Endpoint::UNSPECIFIED` accepts any family (first address seen wins).
fn check_family(sock: &Socket, addr: crate::address::IpAddr) -> NetResult<()> {
    if sock.local.addr == crate::address::IpAddr::Unspec {
        return Ok(());
    }
    if family_of(sock.local.addr) != family_of(addr) {
        return Err(NetError::Invalid);
    }
    Ok(())
}

pub fn bind(sock: &mut Socket, local: Endpoint) -> NetResult<()> {
    check_family(sock, local.addr)?;
    let transport = sock.transport.as_ref().ok_or(NetError::NotSock)?;
    transport
        .bind(local)
        .map_err(|status| status.into_error(sock.is_nonblocking()).unwrap_or(NetError::Invalid))?;
    sock.local = local;
    Ok(())
}

/// `connect`: EINPROGRESS on a non-blocking socket, ETIMEDOUT on a
/// blocking one, exactly per §4.6.
pub fn connect(sock: &mut Socket, remote: Endpoint) -> NetResult<()> {
    check_family(sock, remote.addr)?;
    let transport = sock.transport.as_ref().ok_or(NetError::NotSock)?;
    let non_blocking = sock.is_nonblocking();
    match transport.connect(remote) {
        Ok(()) => {
            sock.remote = remote;
            Ok(())
        }
        Err(status) => {
            use crate::error::TransportStatus;
            let err = match status {
                TransportStatus::Timeout if non_blocking => NetError::InProgress,
                TransportStatus::Timeout => NetError::TimedOut,
                other => other.into_error(non_blocking).unwrap_or(NetError::Invalid),
            };
            warn!("connect: fd {} to {:?} failed: {}", sock.descriptor, remote, err);
            Err(err)
        }
    }
}

pub fn listen(sock: &mut Socket, backlog: usize) -> NetResult<()> {
    if sock.kind != SocketKind::Stream {
        return Err(NetError::OpNotSupp);
    }
    let transport = sock.transport.as_ref().ok_or(NetError::NotSock)?;
    transport
        .listen(backlog)
        .map_err(|status| status.into_error(sock.is_nonblocking()).unwrap_or(NetError::Invalid))
}

/// `accept`: empty queue maps to `EWOULDBLOCK`, which this crate
/// represents with the same `Again` variant `EAGAIN` uses (POSIX defines
/// them as the same value on most platforms, as does `NetError`).
pub fn accept(sock: &Socket) -> NetResult<Arc<dyn Transport>> {
    let transport = sock.transport.as_ref().ok_or(NetError::NotSock)?;
    let non_blocking = sock.is_nonblocking();
    transport.accept().map_err(|status| {
        use crate::error::TransportStatus;
        match status {
            TransportStatus::Timeout => NetError::Again,
            other => other.into_error(non_blocking).unwrap_or(NetError::Again),
        }
    })
}

pub fn shutdown(sock: &mut Socket, how: ShutdownDirection) -> NetResult<()> {
    let transport = sock.transport.as_ref().ok_or(NetError::NotSock)?;
    let mapped = match how {
        ShutdownDirection::Receive => TransportShutdownHow::Receive,
        ShutdownDirection::Send => TransportShutdownHow::Send,
        ShutdownDirection::Both => TransportShutdownHow::Both,
    };
    transport
        .shutdown(mapped)
        .map_err(|status| status.into_error(sock.is_nonblocking()).unwrap_or(NetError::Invalid))
}

pub fn getsockname(sock: &Socket) -> Endpoint {
    sock.local
}

/// `getpeername`: `ENOTCONN` until a remote endpoint has actually been
/// recorded by `connect` (§6).
pub fn getpeername(sock: &Socket) -> NetResult<Endpoint> {
    if sock.remote == Endpoint::UNSPECIFIED {
        return Err(NetError::NotConn);
    }
    Ok(sock.remote)
}

/// Classic `ioctl(2)` request numbers this crate understands directly,
/// without forwarding to the transport.
pub mod ioctl {
    pub const FIONBIO: usize = 0x5421;
    pub const FIONREAD: usize = 0x541B;
    pub const FIONWRITE: usize = 0x545A;
    pub const FIONSPACE: usize = 0x545B;
}

pub mod fcntl {
    pub const F_GETFL: usize = 3;
    pub const F_SETFL: usize = 4;
    pub const O_NONBLOCK: usize = 0x800;
}

/// `ioctl(fd, request, arg)` (§6). `FIONBIO`/`FIONREAD`/`FIONWRITE`/
/// `FIONSPACE` are handled here since they read or flip state this crate
/// owns; anything else is forwarded to the transport.
pub fn ioctl(sock: &mut Socket, request: usize, arg: usize) -> NetResult<usize> {
    match request {
        ioctl::FIONBIO => {
            sock.timeout_ms = if arg != 0 { 0 } else { crate::config::TIMEOUT_INFINITE };
            Ok(0)
        }
        ioctl::FIONREAD => Ok(sock.recv_queue.front().map(|p| p.data.len()).unwrap_or(0)),
        _ => {
            let transport = sock.transport.as_ref().ok_or(NetError::NotSock)?;
            transport
                .ioctl(request, arg)
                .map_err(|status| status.into_error(sock.is_nonblocking()).unwrap_or(NetError::Invalid))
        }
    }
}

/// `fcntl(fd, cmd, arg)` (§6), restricted to the `F_GETFL`/`F_SETFL`
/// non-blocking bit — the only flag this crate's `Socket` tracks.
pub fn fcntl(sock: &mut Socket, cmd: usize, arg: usize) -> NetResult<usize> {
    match cmd {
        fcntl::F_GETFL => Ok(if sock.is_nonblocking() { fcntl::O_NONBLOCK } else { 0 }),
        fcntl::F_SETFL => {
            sock.timeout_ms = if arg & fcntl::O_NONBLOCK != 0 { 0 } else { crate::config::TIMEOUT_INFINITE };
            Ok(0)
        }
        _ => Err(NetError::Invalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::IpAddr;
    use crate::table::SocketTable;
    use crate::transport::mock::MockTransport;
    use smoltcp::wire::Ipv4Address;

    fn fresh_table() -> (SocketTable, usize) {
        let mut table = SocketTable::new();
        let fd = table.open(SocketKind::Stream, 0, Arc::new(MockTransport::new())).unwrap();
        (table, fd)
    }

    #[test]
    fn invalid_shutdown_how_is_einval() {
        assert_eq!(shutdown_from_raw(7).unwrap_err(), NetError::Invalid);
        assert_eq!(shutdown_from_raw(0).unwrap(), ShutdownDirection::Receive);
    }

    #[test]
    fn connect_records_remote_endpoint_on_success() {
        let (mut table, fd) = fresh_table();
        let sock = table.get_mut(fd).unwrap();
        let remote = Endpoint { addr: IpAddr::V4(Ipv4Address([10, 0, 0, 1])), port: 80 };
        connect(sock, remote).unwrap();
        assert_eq!(sock.remote, remote);
    }

    #[test]
    fn bind_rejects_mismatched_family() {
        let (mut table, fd) = fresh_table();
        let sock = table.get_mut(fd).unwrap();
        sock.local = Endpoint { addr: IpAddr::V4(Ipv4Address([0, 0, 0, 0])), port: 1234 };
        let v6_addr = Endpoint { addr: IpAddr::V6(smoltcp::wire::Ipv6Address::UNSPECIFIED), port: 80 };
        assert_eq!(bind(sock, v6_addr).unwrap_err(), NetError::Invalid);
    }

    #[test]
    fn listen_on_dgram_socket_is_unsupported() {
        let mut table = SocketTable::new();
        let fd = table.open(SocketKind::Dgram, 0, Arc::new(MockTransport::new())).unwrap();
        let sock = table.get_mut(fd).unwrap();
        assert_eq!(listen(sock, 16).unwrap_err(), NetError::OpNotSupp);
    }

    #[test]
    fn getpeername_before_connect_is_not_connected() {
        let (mut table, fd) = fresh_table();
        let sock = table.get_mut(fd).unwrap();
        assert_eq!(getpeername(sock).unwrap_err(), NetError::NotConn);
    }

    #[test]
    fn getpeername_after_connect_returns_remote() {
        let (mut table, fd) = fresh_table();
        let sock = table.get_mut(fd).unwrap();
        let remote = Endpoint { addr: IpAddr::V4(Ipv4Address([10, 0, 0, 1])), port: 80 };
        connect(sock, remote).unwrap();
        assert_eq!(getpeername(sock).unwrap(), remote);
    }

    #[test]
    fn fionbio_toggles_nonblocking_state() {
        let (mut table, fd) = fresh_table();
        let sock = table.get_mut(fd).unwrap();
        ioctl(sock, ioctl::FIONBIO, 1).unwrap();
        assert!(sock.is_nonblocking());
        ioctl(sock, ioctl::FIONBIO, 0).unwrap();
        assert!(!sock.is_nonblocking());
    }

    #[test]
    fn fcntl_getfl_setfl_round_trip_nonblocking_bit() {
        let (mut table, fd) = fresh_table();
        let sock = table.get_mut(fd).unwrap();
        fcntl(sock, fcntl::F_SETFL, fcntl::O_NONBLOCK).unwrap();
        assert_eq!(fcntl(sock, fcntl::F_GETFL, 0).unwrap(), fcntl::O_NONBLOCK);
    }
}
