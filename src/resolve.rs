//! Name resolution & formatters (C8) and the interface table (§4.10).
//!
//! Neither exists in the reference crate — `linux-object/src/net` never
//! implements `getaddrinfo`/`if_nametoindex`, deferring name resolution
//! to userspace entirely. This module is built from §4.8/§4.10's
//! algorithmic description directly, in the reference's habit of a
//! small `enum`-driven status plus a `log::debug!` on lookups (mirrored
//! here in spirit, kept undone where no socket-state mutation occurs).

use alloc::string::String;
use alloc::vec::Vec;

use crate::address::{AddressFamily, IpAddr};
use crate::config::MAX_INTERFACES;
use crate::error::NetError;

/// Result of handing a hostname to the external resolver (§4.8
/// "Resolver contract"). The DNS/mDNS wire protocol itself is out of
/// scope; this is the plug point an embedding application fills in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverStatus {
    Resolved(IpAddr),
    InProgress,
    Failed,
}

pub trait Resolver: Send + Sync {
    fn resolve(&self, hostname: &str, family: AddressFamily) -> ResolverStatus;
}

/// Default resolver for a crate used standalone: every lookup fails,
/// matching how the reference crate treats its transport interface (an
/// external collaborator reached only through a trait, never given a
/// default implementation of its own).
pub struct NullResolver;

impl Resolver for NullResolver {
    fn resolve(&self, _hostname: &str, _family: AddressFamily) -> ResolverStatus {
        ResolverStatus::Failed
    }
}

bitflags::bitflags! {
    pub struct AddrInfoFlags: u32 {
        const PASSIVE      = 0b0000_0001;
        const NUMERICHOST  = 0b0000_0010;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AddrInfoHints {
    pub family: AddressFamily,
    pub flags: AddrInfoFlags,
}

#[derive(Debug, Clone, Copy)]
pub struct AddrInfo {
    pub family: AddressFamily,
    pub addr: IpAddr,
    pub port: u16,
}

/// `EAI_*` codes, carried on `NetError` itself (§4.9).
pub type EaiResult<T> = Result<T, NetError>;

/// `getaddrinfo(node, service, hints)` → single-element result list
/// (§4.8: "no chaining in this core").
pub fn getaddrinfo(
    node: Option<&str>,
    service: Option<&str>,
    hints: AddrInfoHints,
    resolver: &dyn Resolver,
) -> EaiResult<Vec<AddrInfo>> {
    if node.is_none() && service.is_none() {
        return Err(NetError::EaiNoName);
    }

    let family = match hints.family {
        AddressFamily::Unspec | AddressFamily::Inet | AddressFamily::Inet6 => hints.family,
        _ => return Err(NetError::EaiFamily),
    };

    let port = match service {
        None => 0,
        Some(s) => s.parse::<u16>().map_err(|_| NetError::EaiService)?,
    };

    let addr = match node {
        None => {
            if !hints.flags.contains(AddrInfoFlags::PASSIVE) {
                return Err(NetError::EaiBadFlags);
            }
            match family {
                AddressFamily::Inet6 => IpAddr::V6_UNSPECIFIED,
                _ => IpAddr::V4_UNSPECIFIED,
            }
        }
        Some(text) => {
            if hints.flags.contains(AddrInfoFlags::NUMERICHOST) {
                crate::address::IpAddr::from_str(family, text).ok_or(NetError::EaiNoName)?
            } else {
                match resolver.resolve(text, family) {
                    ResolverStatus::Resolved(addr) => addr,
                    ResolverStatus::InProgress => return Err(NetError::EaiAgain),
                    ResolverStatus::Failed => return Err(NetError::EaiFail),
                }
            }
        }
    };

    Ok(alloc::vec![AddrInfo { family: addr.family(), addr, port }])
}

/// This crate's ownership is `Vec`/struct-based; `freeaddrinfo` is a
/// no-op compatibility entry point kept only so callers porting from a
/// C-shaped API have somewhere to put the call (§4.8).
pub fn freeaddrinfo(_list: Vec<AddrInfo>) {}

/// `getnameinfo`: format `addr` into `host` and `port` into `service`.
pub fn getnameinfo(addr: IpAddr, port: u16, host: &mut [u8], service: &mut [u8]) -> EaiResult<(usize, usize)> {
    let min_host = match addr.family() {
        AddressFamily::Inet6 => 40,
        AddressFamily::Inet => 16,
        _ => return Err(NetError::EaiFamily),
    };
    if host.len() < min_host || service.len() < 6 {
        return Err(NetError::EaiOverflow);
    }

    let mut text_buf = [0u8; 40];
    let text = addr.ntop(&mut text_buf).ok_or(NetError::EaiFamily)?;
    let text_bytes = text.as_bytes();
    host[..text_bytes.len()].copy_from_slice(text_bytes);
    host[text_bytes.len()] = 0;

    let port_text = format_u16(port);
    let port_bytes = port_text.as_bytes();
    service[..port_bytes.len()].copy_from_slice(port_bytes);
    service[port_bytes.len()] = 0;

    Ok((text_bytes.len(), port_bytes.len()))
}

fn format_u16(mut v: u16) -> String {
    if v == 0 {
        return String::from("0");
    }
    let mut digits = Vec::new();
    while v > 0 {
        digits.push(b'0' + (v % 10) as u8);
        v /= 10;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap()
}

/// Single-answer result for `gethostbyname_r` (§4.8). Failure reasons are
/// surfaced as a `NetError` drawn from `{HostNotFound, NoRecovery,
/// NoAddress}` rather than an out-pointer, since this is a Rust `Result`
/// API rather than a C ABI shim (§7).
pub fn gethostbyname_r(hostname: &str, family: AddressFamily, resolver: &dyn Resolver) -> Result<IpAddr, NetError> {
    match resolver.resolve(hostname, family) {
        ResolverStatus::Resolved(addr) => Ok(addr),
        ResolverStatus::InProgress => Err(NetError::NoRecovery),
        ResolverStatus::Failed => Err(NetError::HostNotFound),
    }
}

/// One entry in the interface table (§4.10). Populated by the embedding
/// application via `register_interface`; this core never probes
/// hardware.
#[derive(Debug, Clone)]
pub struct InterfaceEntry {
    pub name: String,
    /// Opaque handle into the embedding application's transport/driver
    /// layer; this crate never interprets it.
    pub handle: usize,
}

pub struct InterfaceTable {
    entries: Vec<InterfaceEntry>,
}

impl InterfaceTable {
    pub fn new() -> Self {
        InterfaceTable { entries: Vec::new() }
    }

    pub fn register_interface(&mut self, name: &str, handle: usize) -> Result<u32, NetError> {
        if self.entries.len() >= MAX_INTERFACES {
            return Err(NetError::NoBufs);
        }
        if self.entries.iter().any(|e| e.name == name) {
            return Err(NetError::Invalid);
        }
        self.entries.push(InterfaceEntry { name: String::from(name), handle });
        Ok(self.entries.len() as u32)
    }

    /// `if_nametoindex`: returned index is `internal_index + 1`; 0 means
    /// "no such interface" (§4.8).
    pub fn if_nametoindex(&self, name: &str) -> u32 {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .map(|i| (i + 1) as u32)
            .unwrap_or(0)
    }

    pub fn if_indextoname(&self, index: u32) -> Option<&str> {
        if index == 0 {
            return None;
        }
        self.entries.get((index - 1) as usize).map(|e| e.name.as_str())
    }
}

lazy_static::lazy_static! {
    /// The process-wide hostname `gethostname`/`sethostname` expose,
    /// guarded the same way `crate::table::SOCKETS` guards the socket
    /// table — one `spin::Mutex` behind a `lazy_static!`.
    static ref HOSTNAME: spin::Mutex<String> = spin::Mutex::new(String::from("localhost"));
}

pub fn set_hostname(name: &str) {
    *HOSTNAME.lock() = String::from(name);
}

/// `gethostname(buf)` (§6): copies the NUL-terminated name into `buf`,
/// `EINVAL` if it doesn't fit.
pub fn gethostname(buf: &mut [u8]) -> Result<usize, NetError> {
    let name = HOSTNAME.lock();
    let bytes = name.as_bytes();
    if buf.len() < bytes.len() + 1 {
        return Err(NetError::Invalid);
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    buf[bytes.len()] = 0;
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver(IpAddr);
    impl Resolver for FixedResolver {
        fn resolve(&self, _hostname: &str, _family: AddressFamily) -> ResolverStatus {
            ResolverStatus::Resolved(self.0)
        }
    }

    #[test]
    fn getaddrinfo_rejects_null_node_and_service() {
        let hints = AddrInfoHints { family: AddressFamily::Unspec, flags: AddrInfoFlags::empty() };
        let err = getaddrinfo(None, None, hints, &NullResolver).unwrap_err();
        assert_eq!(err, NetError::EaiNoName);
    }

    #[test]
    fn getaddrinfo_passive_without_node_uses_unspecified_address() {
        let hints = AddrInfoHints { family: AddressFamily::Inet, flags: AddrInfoFlags::PASSIVE };
        let result = getaddrinfo(None, Some("80"), hints, &NullResolver).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].port, 80);
        assert!(result[0].addr.is_unspecified());
    }

    #[test]
    fn getaddrinfo_without_passive_and_no_node_is_bad_flags() {
        let hints = AddrInfoHints { family: AddressFamily::Inet, flags: AddrInfoFlags::empty() };
        let err = getaddrinfo(None, Some("80"), hints, &NullResolver).unwrap_err();
        assert_eq!(err, NetError::EaiBadFlags);
    }

    #[test]
    fn getaddrinfo_nonnumeric_service_fails() {
        let hints = AddrInfoHints { family: AddressFamily::Inet, flags: AddrInfoFlags::PASSIVE };
        let err = getaddrinfo(None, Some("http"), hints, &NullResolver).unwrap_err();
        assert_eq!(err, NetError::EaiService);
    }

    #[test]
    fn getaddrinfo_uses_resolver_for_hostnames() {
        let addr = IpAddr::V4(smoltcp::wire::Ipv4Address([93, 184, 216, 34]));
        let resolver = FixedResolver(addr);
        let hints = AddrInfoHints { family: AddressFamily::Inet, flags: AddrInfoFlags::empty() };
        let result = getaddrinfo(Some("example.com"), Some("443"), hints, &resolver).unwrap();
        assert_eq!(result[0].addr, addr);
        assert_eq!(result[0].port, 443);
    }

    #[test]
    fn getnameinfo_rejects_undersized_host_buffer() {
        let addr = IpAddr::V4(smoltcp::wire::Ipv4Address([127, 0, 0, 1]));
        let mut host = [0u8; 4];
        let mut service = [0u8; 6];
        let err = getnameinfo(addr, 80, &mut host, &mut service).unwrap_err();
        assert_eq!(err, NetError::EaiOverflow);
    }

    #[test]
    fn interface_index_round_trips_with_plus_one_offset() {
        let mut table = InterfaceTable::new();
        table.register_interface("eth0", 0).unwrap();
        let idx = table.if_nametoindex("eth0");
        assert_eq!(idx, 1);
        assert_eq!(table.if_indextoname(idx), Some("eth0"));
        assert_eq!(table.if_nametoindex("nonexistent"), 0);
    }

    #[test]
    fn gethostbyname_maps_failure_to_host_not_found() {
        let err = gethostbyname_r("nowhere.invalid", AddressFamily::Inet, &NullResolver).unwrap_err();
        assert_eq!(err, NetError::HostNotFound);
    }

    // Both cases share one test: `HOSTNAME` is a single process-wide
    // global, so interleaving with a second #[test] that also calls
    // `set_hostname` would make either assert flaky on its own.
    #[test]
    fn gethostname_round_trips_and_rejects_undersized_buffer() {
        set_hostname("test-host");
        let mut buf = [0u8; 32];
        let n = gethostname(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"test-host");
        assert_eq!(buf[n], 0);

        let mut tiny = [0u8; 2];
        let err = gethostname(&mut tiny).unwrap_err();
        assert_eq!(err, NetError::Invalid);
    }
}
