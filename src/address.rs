//! Address model (C1): a tagged {Unspec, V4, V6} address plus the
//! family-tagged wire structures it projects to and from.
//!
//! Grounded on the reference crate's `SockAddrIn`/`SockAddrLl`/`SockAddr`
//! union (`linux-object/src/net/mod.rs`), generalized to dual-stack: the
//! reference only ever constructs `addr_in` (v4) and treats v6 as
//! `unimplemented!("only ipv4")`. This crate adds the v6 wire layout and a
//! real `IpAddr::V6` variant instead of leaving that branch unreachable.

use core::convert::TryFrom;
use core::fmt;
use smoltcp::wire::{Ipv4Address, Ipv6Address};

use crate::error::{NetError, NetResult};

/// Family-tagged address, independent of port. Closed sum type rather than
/// a family-dispatched union with zeroed pads (Design Note, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpAddr {
    Unspec,
    V4(Ipv4Address),
    V6(Ipv6Address),
}

impl IpAddr {
    pub const V4_UNSPECIFIED: IpAddr = IpAddr::V4(Ipv4Address([0, 0, 0, 0]));
    pub const V6_UNSPECIFIED: IpAddr = IpAddr::V6(Ipv6Address([0; 16]));

    pub const INADDR_LOOPBACK: Ipv4Address = Ipv4Address([127, 0, 0, 1]);
    pub const INADDR_BROADCAST: Ipv4Address = Ipv4Address([255, 255, 255, 255]);

    /// True for `Unspec`, or for the all-zero address of either family
    /// (invariant 6: emptiness is a closed operation per family).
    pub fn is_unspecified(&self) -> bool {
        match self {
            IpAddr::Unspec => true,
            IpAddr::V4(a) => *a == Ipv4Address([0, 0, 0, 0]),
            IpAddr::V6(a) => *a == Ipv6Address([0; 16]),
        }
    }

    pub fn family(&self) -> AddressFamily {
        match self {
            IpAddr::Unspec => AddressFamily::Unspec,
            IpAddr::V4(_) => AddressFamily::Inet,
            IpAddr::V6(_) => AddressFamily::Inet6,
        }
    }

    /// `inet_pton`-equivalent. Returns `1` on success, `0` on an invalid
    /// literal, `-1` on an unsupported family, matching §4.1 exactly.
    pub fn pton(family: AddressFamily, text: &str) -> i32 {
        match family {
            AddressFamily::Inet => match parse_v4(text) {
                Some(_) => 1,
                None => 0,
            },
            AddressFamily::Inet6 => match parse_v6(text) {
                Some(_) => 1,
                None => 0,
            },
            _ => -1,
        }
    }

    /// `inet_pton`, returning the parsed address on success.
    pub fn from_str(family: AddressFamily, text: &str) -> Option<IpAddr> {
        match family {
            AddressFamily::Inet => parse_v4(text).map(IpAddr::V4),
            AddressFamily::Inet6 => parse_v6(text).map(IpAddr::V6),
            _ => None,
        }
    }

    /// `inet_ntop`-equivalent. `buf` must be at least 16 bytes for v4, 40
    /// for v6 (§4.1); returns `None` (the `ntop` "NULL" convention) if not.
    pub fn ntop<'a>(&self, buf: &'a mut [u8]) -> Option<&'a str> {
        let min_len = match self {
            IpAddr::V4(_) => 16,
            IpAddr::V6(_) => 40,
            IpAddr::Unspec => return None,
        };
        if buf.len() < min_len {
            return None;
        }
        let text = match self {
            IpAddr::V4(a) => format_v4(*a),
            IpAddr::V6(a) => format_v6(*a),
            IpAddr::Unspec => unreachable!(),
        };
        let bytes = text.as_bytes();
        buf[..bytes.len()].copy_from_slice(bytes);
        core::str::from_utf8(&buf[..bytes.len()]).ok()
    }
}

impl fmt::Display for IpAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IpAddr::Unspec => write!(f, "*"),
            IpAddr::V4(a) => write!(f, "{}", format_v4(*a)),
            IpAddr::V6(a) => write!(f, "{}", format_v6(*a)),
        }
    }
}

/// `inet_ntoa`-equivalent, non-reentrant form: writes into a static buffer
/// behind a spinlock and returns a borrowed string.
///
/// Open question resolved (§9): both forms are kept. This one is documented
/// as unsafe to call concurrently from two tasks expecting stable results —
/// every other component in this crate uses `inet_ntoa_r` instead.
pub fn inet_ntoa(addr: Ipv4Address) -> &'static str {
    use spin::Mutex;
    static BUF: Mutex<[u8; 16]> = Mutex::new([0; 16]);
    let mut guard = BUF.lock();
    let text = format_v4(addr);
    let bytes = text.as_bytes();
    guard[..bytes.len()].copy_from_slice(bytes);
    guard[bytes.len()] = 0;
    // Safety: the bytes just written are valid UTF-8 ASCII and the buffer
    // outlives the lock guard for the 'static lifetime of BUF.
    let slice = unsafe { core::slice::from_raw_parts(guard.as_ptr(), bytes.len()) };
    core::str::from_utf8(slice).unwrap_or("")
}

/// Reentrant `inet_ntoa_r`: writes `a.b.c.d` into a fixed-size string.
pub fn inet_ntoa_r(addr: Ipv4Address) -> heapless_string16::String16 {
    heapless_string16::String16::from(format_v4(addr).as_str())
}

/// `inet_addr`: dotted-quad text to a network-byte-order `u32`, or
/// `INADDR_NONE` (all ones) on a malformed literal — historically
/// indistinguishable from a literal `255.255.255.255`, which is why
/// `inet_aton` exists as the non-ambiguous alternative (§6).
pub fn inet_addr(text: &str) -> u32 {
    match parse_v4(text) {
        Some(a) => u32::from_be_bytes(a.0),
        None => u32::MAX,
    }
}

/// `inet_aton`: same parse as `inet_addr`, but success/failure is an
/// explicit `bool` rather than overloading the result value.
pub fn inet_aton(text: &str, out: &mut Ipv4Address) -> bool {
    match parse_v4(text) {
        Some(a) => {
            *out = a;
            true
        }
        None => false,
    }
}

fn format_v4(a: Ipv4Address) -> alloc::string::String {
    let o = a.0;
    alloc::format!("{}.{}.{}.{}", o[0], o[1], o[2], o[3])
}

fn format_v6(a: Ipv6Address) -> alloc::string::String {
    // Canonical shortest-form per RFC 5952: collapse the longest run of
    // zero groups to "::". smoltcp's own Display already implements this.
    alloc::format!("{}", a)
}

fn parse_v4(text: &str) -> Option<Ipv4Address> {
    let mut parts = [0u8; 4];
    let mut count = 0;
    for (i, part) in text.split('.').enumerate() {
        if i >= 4 {
            return None;
        }
        parts[i] = part.parse::<u8>().ok()?;
        count += 1;
    }
    if count != 4 {
        return None;
    }
    Some(Ipv4Address(parts))
}

/// Minimal colon-hex parser covering the `::` zero-run compression form.
/// Does not handle embedded v4-in-v6 (`::ffff:1.2.3.4`) tails; none of the
/// testable properties in §8 require it.
fn parse_v6(text: &str) -> Option<Ipv6Address> {
    let (head, tail) = match text.find("::") {
        Some(pos) => (&text[..pos], &text[pos + 2..]),
        None => (text, ""),
    };

    let parse_groups = |s: &str| -> Option<alloc::vec::Vec<u16>> {
        if s.is_empty() {
            return Some(alloc::vec::Vec::new());
        }
        s.split(':')
            .map(|g| u16::from_str_radix(g, 16).ok())
            .collect()
    };

    let head_groups = parse_groups(head)?;
    let tail_groups = parse_groups(tail)?;

    let mut groups = [0u16; 8];
    if text.contains("::") {
        if head_groups.len() + tail_groups.len() > 8 {
            return None;
        }
        groups[..head_groups.len()].copy_from_slice(&head_groups);
        let start = 8 - tail_groups.len();
        groups[start..].copy_from_slice(&tail_groups);
    } else {
        if head_groups.len() != 8 {
            return None;
        }
        groups.copy_from_slice(&head_groups);
    }

    let mut octets = [0u8; 16];
    for (i, g) in groups.iter().enumerate() {
        octets[i * 2] = (g >> 8) as u8;
        octets[i * 2 + 1] = (g & 0xff) as u8;
    }
    Some(Ipv6Address(octets))
}

numeric_enum_macro::numeric_enum! {
    #[repr(u16)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Socket address family codes (§6). Closed set, unlike the reference
    /// crate's two disagreeing `AddressFamily` definitions (an open
    /// `enum_with_unknown!` in `socket_address.rs` vs. a closed
    /// `numeric_enum!` in `mod.rs`) — this crate keeps only the closed
    /// shape and rejects unknown families at the boundary instead of
    /// representing them.
    pub enum AddressFamily {
        Unspec = 0,
        Inet = 2,
        Inet6 = 10,
        Packet = 17,
    }
}

impl AddressFamily {
    pub fn from_u16(v: u16) -> NetResult<AddressFamily> {
        AddressFamily::try_from(v).map_err(|_| NetError::AfNoSupport)
    }
}

/// Wire-facing socket address, sized to the larger of the two variants
/// (§6: v4 is 16 bytes, v6 is 28 bytes). `SocketAddress::project` and
/// `SocketAddress::to_ip_port` are the two halves of the C1 boundary
/// projection the rest of the crate uses instead of touching `IpAddr`
/// fields directly.
#[derive(Debug, Clone, Copy)]
pub struct SocketAddress {
    pub family: AddressFamily,
    pub port: u16,
    pub addr: IpAddr,
    /// v6-only: flowinfo and scope id, always zero on v4.
    pub flowinfo: u32,
    pub scope_id: u32,
}

impl SocketAddress {
    pub const V4_WIRE_LEN: usize = 16;
    pub const V6_WIRE_LEN: usize = 28;

    /// Total operation: build a wire-facing address from an `IpAddr` and a
    /// host-order port (invariant: total whenever `addr`'s family is V4 or
    /// V6; an `Unspec` address yields a `Packet`-less, family-`Unspec`
    /// record used only for wildcard binds).
    pub fn project(addr: IpAddr, port: u16) -> SocketAddress {
        let family = addr.family();
        SocketAddress {
            family,
            port,
            addr,
            flowinfo: 0,
            scope_id: 0,
        }
    }

    /// Inverse of `project`: recover `(addr, port)`. Total when `family`
    /// matches the `addr` variant (property 5, §8).
    pub fn to_ip_port(&self) -> (IpAddr, u16) {
        (self.addr, self.port)
    }

    /// Parse a wire-format v4/v6 sockaddr buffer given its declared length.
    /// Invalid length or unknown family ⇒ `EINVAL` (§3).
    pub fn from_wire(family: AddressFamily, buf: &[u8]) -> NetResult<SocketAddress> {
        match family {
            AddressFamily::Inet => {
                if buf.len() < Self::V4_WIRE_LEN {
                    return Err(NetError::Invalid);
                }
                let port = u16::from_be_bytes([buf[2], buf[3]]);
                let addr = Ipv4Address([buf[4], buf[5], buf[6], buf[7]]);
                Ok(SocketAddress {
                    family,
                    port,
                    addr: IpAddr::V4(addr),
                    flowinfo: 0,
                    scope_id: 0,
                })
            }
            AddressFamily::Inet6 => {
                if buf.len() < Self::V6_WIRE_LEN {
                    return Err(NetError::Invalid);
                }
                let port = u16::from_be_bytes([buf[2], buf[3]]);
                let flowinfo = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[8..24]);
                let scope_id = u32::from_be_bytes([buf[24], buf[25], buf[26], buf[27]]);
                Ok(SocketAddress {
                    family,
                    port,
                    addr: IpAddr::V6(Ipv6Address(octets)),
                    flowinfo,
                    scope_id,
                })
            }
            _ => Err(NetError::Invalid),
        }
    }

    /// Serialize to a wire buffer (`buf` must be large enough for the
    /// family's layout; the v6 layout zeroes flowinfo/scope_id per §4.1).
    pub fn write_wire(&self, buf: &mut [u8]) -> NetResult<usize> {
        match self.addr {
            IpAddr::V4(a) => {
                if buf.len() < Self::V4_WIRE_LEN {
                    return Err(NetError::Invalid);
                }
                buf[0..2].copy_from_slice(&(AddressFamily::Inet as u16).to_le_bytes());
                buf[2..4].copy_from_slice(&self.port.to_be_bytes());
                buf[4..8].copy_from_slice(&a.0);
                buf[8..16].fill(0);
                Ok(Self::V4_WIRE_LEN)
            }
            IpAddr::V6(a) => {
                if buf.len() < Self::V6_WIRE_LEN {
                    return Err(NetError::Invalid);
                }
                buf[0..2].copy_from_slice(&(AddressFamily::Inet6 as u16).to_le_bytes());
                buf[2..4].copy_from_slice(&self.port.to_be_bytes());
                buf[4..8].fill(0);
                buf[8..24].copy_from_slice(&a.0);
                buf[24..28].fill(0);
                Ok(Self::V6_WIRE_LEN)
            }
            IpAddr::Unspec => Err(NetError::Invalid),
        }
    }
}

/// A tiny fixed-capacity string used by `inet_ntoa_r`, avoiding an
/// allocation for the common "print an IPv4 literal" path. Not a general
/// string type; kept local to this module.
pub mod heapless_string16 {
    use core::fmt;

    #[derive(Clone, Copy)]
    pub struct String16 {
        buf: [u8; 16],
        len: usize,
    }

    impl String16 {
        pub fn from(s: &str) -> Self {
            let mut buf = [0u8; 16];
            let len = s.len().min(16);
            buf[..len].copy_from_slice(&s.as_bytes()[..len]);
            String16 { buf, len }
        }

        pub fn as_str(&self) -> &str {
            core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
        }
    }

    impl fmt::Display for String16 {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "{}", self.as_str())
        }
    }
}
