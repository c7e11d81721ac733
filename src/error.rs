//! Socket-core error codes.
//!
//! Mirrors the reference crate's `LxError`: a `#[repr(isize)]` enum with a
//! `Display` impl giving the human-readable string, instead of a bag of
//! loose constants. `NetError` additionally folds in the `EAI_*`/hostent
//! name-resolution codes (§C8/§C9 of the spec) since this crate owns name
//! resolution directly rather than delegating errno mapping to a caller.

use core::fmt;

/// Result type used throughout the socket core.
pub type NetResult<T = ()> = Result<T, NetError>;

/// `send`/`recv`/… return a byte count on success.
pub type IoResult = NetResult<usize>;

#[allow(non_camel_case_types)]
#[repr(isize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    /// Invalid argument.
    Invalid = 22,
    /// Bad address / buffer too small for the requested copy.
    Fault = 14,
    /// No buffer space available (also used for multicast filter overflow).
    NoBufs = 105,
    /// Operation not supported on this socket kind or option.
    OpNotSupp = 95,
    /// Protocol option not available.
    NoProtoOpt = 92,
    /// Socket is not connected.
    NotConn = 107,
    /// Socket is already connected.
    IsConn = 106,
    /// Shutdown has already silenced this direction.
    Shutdown = 108,
    /// Operation would block (non-blocking call with nothing ready).
    Again = 11,
    /// Non-blocking connect still in progress.
    InProgress = 115,
    /// Operation timed out.
    TimedOut = 110,
    /// Peer reset the connection.
    ConnReset = 104,
    /// Peer refused the connection.
    ConnRefused = 111,
    /// Destination address unreachable.
    AddrNotAvail = 99,
    /// Message too long for the datagram transport.
    MsgSize = 90,
    /// Too many open sockets (table full, no TIME-WAIT slot to reclaim).
    MFile = 24,
    /// Socket operation attempted on a non-socket descriptor.
    NotSock = 88,
    /// Address family not supported.
    AfNoSupport = 97,

    /// `getaddrinfo`: neither node nor service given.
    EaiNoName = 200,
    /// `getaddrinfo`: unsupported address family in hints.
    EaiFamily = 201,
    /// `getaddrinfo`: service did not parse as a decimal port.
    EaiService = 202,
    /// `getaddrinfo`: flags combination is invalid (e.g. null node without `AI_PASSIVE`).
    EaiBadFlags = 203,
    /// `getaddrinfo`/resolver: try again later.
    EaiAgain = 204,
    /// `getaddrinfo`/resolver: non-recoverable failure.
    EaiFail = 205,
    /// `getnameinfo`: supplied buffer too small.
    EaiOverflow = 206,
    /// `getaddrinfo`/resolver: out of memory building the result.
    EaiMemory = 207,
    /// `gethostbyname`: host does not exist.
    HostNotFound = 208,
    /// `gethostbyname`: name server returned no address record.
    NoAddress = 209,
    /// `gethostbyname`: non-recoverable name server error.
    NoRecovery = 210,
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use NetError::*;
        let explain = match self {
            Invalid => "invalid argument",
            Fault => "bad address",
            NoBufs => "no buffer space available",
            OpNotSupp => "operation not supported",
            NoProtoOpt => "protocol option not available",
            NotConn => "transport endpoint is not connected",
            IsConn => "transport endpoint is already connected",
            Shutdown => "cannot send after transport endpoint shutdown",
            Again => "resource temporarily unavailable",
            InProgress => "operation now in progress",
            TimedOut => "connection timed out",
            ConnReset => "connection reset by peer",
            ConnRefused => "connection refused",
            AddrNotAvail => "cannot assign requested address",
            MsgSize => "message too long",
            MFile => "too many open sockets",
            NotSock => "socket operation on non-socket",
            AfNoSupport => "address family not supported by protocol",
            EaiNoName => "node or service name not known",
            EaiFamily => "ai_family not supported",
            EaiService => "service name not numeric",
            EaiBadFlags => "invalid flags value",
            EaiAgain => "temporary name resolution failure",
            EaiFail => "non-recoverable name resolution failure",
            EaiOverflow => "result buffer overflow",
            EaiMemory => "memory allocation failure",
            HostNotFound => "host not found",
            NoAddress => "valid name, no address record",
            NoRecovery => "non-recoverable name server error",
        };
        write!(f, "{}", explain)
    }
}

/// Status returned by the transport engine; this core translates it to a
/// `NetError` at the boundary (§4.9 / C9), choosing between the blocking and
/// non-blocking mapping where the table lists two outcomes for one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Ok,
    Timeout,
    EndOfStream,
    InvalidParameter,
    OutOfMemory,
    InProgress,
    Unreachable,
    ConnectionReset,
    ConnectionRefused,
    AlreadyConnected,
    NotConnected,
    MessageTooLong,
    NotSupported,
    ShutdownLocal,
}

impl TransportStatus {
    /// Map a transport status to a `NetError`, given whether the call was
    /// made on a non-blocking socket (affects the `Timeout`/`InProgress`
    /// mapping per §4.9).
    pub fn into_error(self, non_blocking: bool) -> Option<NetError> {
        use TransportStatus::*;
        match self {
            Ok => None,
            Timeout if non_blocking => Some(NetError::Again),
            Timeout => Some(NetError::TimedOut),
            EndOfStream => None,
            InvalidParameter => Some(NetError::Invalid),
            OutOfMemory => Some(NetError::NoBufs),
            InProgress => Some(NetError::InProgress),
            Unreachable => Some(NetError::AddrNotAvail),
            ConnectionReset => Some(NetError::ConnReset),
            ConnectionRefused => Some(NetError::ConnRefused),
            AlreadyConnected => Some(NetError::IsConn),
            NotConnected => Some(NetError::NotConn),
            MessageTooLong => Some(NetError::MsgSize),
            NotSupported => Some(NetError::OpNotSupp),
            ShutdownLocal => Some(NetError::Shutdown),
        }
    }
}
