//! Error taxonomy for the script-facing I/O surface.
//!
//! Every fallible operation exposed to script tasks returns [`Status<T>`],
//! the crate's rendition of a leading-boolean `(ok, value | error)` tuple.
//! The `Display` text of a [`Failure`] is the script-visible error value, so
//! the short runtime indicators render exactly as `"TIMEOUT"`, `"EOF"` and so
//! on, while connect-time resolution failures carry the resolver's own
//! message.

use thiserror::Error;

/// Result alias used by every script-facing operation.
pub type Status<T> = Result<T, Failure>;

/// A failed script-facing operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The operation's deadline elapsed before it could complete.
    #[error("TIMEOUT")]
    Timeout,

    /// The peer closed the stream.
    #[error("EOF")]
    Eof,

    /// Generic transport error.
    #[error("ERROR")]
    Error,

    /// The pending operation was cancelled before completion.
    #[error("CANCELLED")]
    Cancelled,

    /// The owning task was forcibly terminated.
    #[error("KILLED")]
    Killed,

    /// The socket is closed or was never connected.
    #[error("CLOSED")]
    Closed,

    /// `close` on an already-closed socket is a reported failure, not a
    /// no-op.
    #[error("trying to close a closed socket")]
    DoubleClose,

    /// Name resolution failed while connecting.
    #[error("{0}")]
    Resolve(ResolveError),

    /// `connect` was asked for TLS but the crate was built without it.
    #[error("TLS requested but not available")]
    TlsUnavailable,

    /// `connect` received a protocol token other than tcp/udp/tls.
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    /// TLS negotiation failed after the transport connected.
    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),

    /// A byte-pattern delimiter failed to compile or evaluate.
    #[error("pattern evaluation failed: {0}")]
    Pattern(String),

    /// A delimiter predicate reported an internal error.
    #[error("delimiter function failed: {0}")]
    DelimiterFn(String),

    /// A delimiter predicate returned a match that ends before it starts.
    #[error("delimiter match ends before it starts")]
    InvertedSpan,

    /// `done` was called by a task that does not hold the mutex.
    #[error("attempt to release a mutex held by another task")]
    NotMutexHolder,

    /// A capture operation was issued on a handle that is not open.
    #[error("capture handle is not open")]
    CaptureNotOpen,

    /// The capture filter expression could not be parsed.
    #[error("bad capture filter: {0}")]
    BadFilter(String),

    /// The named interface does not exist.
    #[error("no such interface: {0}")]
    NoInterface(String),

    /// A raw-frame operation was issued on a device that is not open.
    #[error("ethernet device is not open")]
    DeviceNotOpen,
}

/// The fixed set of resolution errors `connect` can report.
///
/// The messages are the resolver's canonical `gai_strerror` texts; scripts
/// match on them as strings.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Address family for hostname not supported")]
    AddressFamily,

    #[error("Temporary failure in name resolution")]
    TryAgain,

    #[error("Bad value for ai_flags")]
    BadFlags,

    #[error("Non-recoverable failure in name resolution")]
    Fail,

    #[error("ai_family not supported")]
    Family,

    #[error("Memory allocation failure")]
    Memory,

    #[error("No address associated with hostname")]
    NoData,

    #[error("Name or service not known")]
    NoName,

    #[error("Servname not supported for ai_socktype")]
    Service,

    #[error("ai_socktype not supported")]
    SockType,

    #[error("System error")]
    System,
}

// Present in glibc but not exported by the libc crate for every target.
const EAI_ADDRFAMILY: i32 = -9;
const EAI_NODATA: i32 = -5;

impl ResolveError {
    /// Maps a non-zero `getaddrinfo` return code to its error.
    pub(crate) fn from_code(code: i32) -> Self {
        match code {
            EAI_ADDRFAMILY => Self::AddressFamily,
            EAI_NODATA => Self::NoData,
            libc::EAI_AGAIN => Self::TryAgain,
            libc::EAI_BADFLAGS => Self::BadFlags,
            libc::EAI_FAIL => Self::Fail,
            libc::EAI_FAMILY => Self::Family,
            libc::EAI_MEMORY => Self::Memory,
            libc::EAI_NONAME => Self::NoName,
            libc::EAI_SERVICE => Self::Service,
            libc::EAI_SOCKTYPE => Self::SockType,
            _ => Self::System,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_indicators_render_verbatim() {
        assert_eq!(Failure::Timeout.to_string(), "TIMEOUT");
        assert_eq!(Failure::Eof.to_string(), "EOF");
        assert_eq!(Failure::Killed.to_string(), "KILLED");
        assert_eq!(Failure::Closed.to_string(), "CLOSED");
    }

    #[test]
    fn resolver_codes_map_to_fixed_strings() {
        assert_eq!(
            Failure::Resolve(ResolveError::from_code(libc::EAI_NONAME)).to_string(),
            "Name or service not known"
        );
        assert_eq!(
            ResolveError::from_code(libc::EAI_AGAIN),
            ResolveError::TryAgain
        );
        assert_eq!(ResolveError::from_code(-9999), ResolveError::System);
    }
}
