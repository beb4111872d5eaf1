//! Error types for the LODP packet engine.

use thiserror::Error;

/// Result type alias for LODP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the packet engine.
///
/// Receive-path protocol errors are reported to the host as return values
/// and are never signalled to the peer; no error packets exist on the wire.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Authentication failed under the key that was tried
    #[error("message authentication failed")]
    InvalidMac,

    /// Structural or semantic check failed: bad length, non-zero flags,
    /// wrong packet type for the session state, or an unimplemented type
    #[error("malformed or unexpected packet")]
    BadPacket,

    /// Handshake cookie matched under neither the current nor the
    /// previous cookie key
    #[error("handshake cookie did not verify")]
    InvalidCookie,

    /// No session was attached and the endpoint has no introduction keys,
    /// or a packet only a responder may process arrived at an initiator
    #[error("endpoint cannot act as a responder")]
    NotResponder,

    /// Key agreement failed or the handshake verifier did not match
    #[error("handshake key agreement failed")]
    BadHandshake,

    /// The packet buffer pool is exhausted
    #[error("no packet buffers available")]
    NoBufs,

    /// The payload would exceed the maximum segment size
    #[error("payload exceeds the maximum segment size")]
    MsgSize,

    /// Peer address family other than IPv4 or IPv6.
    ///
    /// With `std::net::SocketAddr` as the address type this cannot arise on
    /// the cookie path; the variant is kept for hosts that map their own
    /// address representations onto engine errors.
    #[error("unsupported address family")]
    AfNotSupport,

    /// The host's send hook failed
    #[error("send hook failed: {0:?}")]
    Network(std::io::ErrorKind),
}

impl Error {
    /// Check if this error indicates an authentication failure.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::InvalidMac | Error::InvalidCookie | Error::BadHandshake)
    }

    /// Check if this error is local resource pressure rather than a
    /// protocol violation by the peer.
    pub fn is_resource(&self) -> bool {
        matches!(self, Error::NoBufs | Error::MsgSize | Error::Network(_))
    }
}
