//! Per-peer session state.
//!
//! A session is the connection control block for one peer: role, state
//! machine position, the directional key pairs, and the transient material
//! a handshake needs. Sessions are owned by the host; the engine receives
//! them back by `&mut` alongside each matching datagram. The endpoint must
//! outlive its sessions, which the host upholds by construction.

use std::net::SocketAddr;

use zeroize::Zeroizing;

use crate::crypto::{
    derive_intro_keys, Digest, EphemeralKeypair, PublicKey, SymmetricKey,
};
use crate::ntor::{NtorOutput, SessionSecret};

/// Which side of the handshake a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// This side dialed out and runs INIT → HANDSHAKE → ESTABLISHED.
    Initiator,
    /// This side accepted a HANDSHAKE and starts in ESTABLISHED.
    Responder,
}

/// Session lifecycle states.
///
/// The state together with the role determines which packet types the
/// dispatcher will accept; everything else is dropped as a bad packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// INIT sent, waiting for INIT_ACK (initiator only).
    Init,
    /// Cookie received and HANDSHAKE sent, waiting for HANDSHAKE_ACK
    /// (initiator only).
    Handshake,
    /// Session keys in place; DATA and HEARTBEAT flow.
    Established,
    /// A fatal handshake error occurred; only destruction remains.
    Error,
}

/// Transient key material that only exists while a handshake can still
/// need it. Every field wipes itself on drop.
pub(crate) struct HandshakeMaterial {
    /// Our ephemeral keypair: x/X on the initiator, y/Y on the responder.
    pub(crate) ephemeral: EphemeralKeypair,
    /// The responder-opaque cookie from INIT_ACK (initiator only).
    pub(crate) cookie: Option<Zeroizing<Vec<u8>>>,
    /// Cached shared secret (responder, until first peer DATA).
    pub(crate) secret: Option<SessionSecret>,
    /// Cached verifier for HANDSHAKE_ACK retransmission (responder).
    pub(crate) verifier: Option<Digest>,
}

/// A per-peer connection control block.
pub struct Session {
    pub(crate) peer: SocketAddr,
    pub(crate) role: Role,
    pub(crate) state: SessionState,
    /// The responder's long-term public key B (initiator only).
    pub(crate) remote_static: Option<PublicKey>,
    /// Keys sealing traffic we transmit. Before the handshake completes on
    /// the initiator these are the responder's derived intro keys.
    pub(crate) tx_key: SymmetricKey,
    /// Keys opening traffic we receive. Before the handshake completes on
    /// the initiator these are our own freshly generated intro keys, as
    /// advertised in the INIT body.
    pub(crate) rx_key: SymmetricKey,
    pub(crate) handshake: Option<HandshakeMaterial>,
    pub(crate) seen_peer_data: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.peer)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("remote_static", &self.remote_static)
            .field("tx_key", &"<redacted>")
            .field("rx_key", &"<redacted>")
            .field("handshake", &self.handshake.as_ref().map(|_| "<redacted>"))
            .field("seen_peer_data", &self.seen_peer_data)
            .finish()
    }
}

impl Session {
    /// Build an initiator-side session dialing `remote_static`.
    pub(crate) fn new_initiator(peer: SocketAddr, remote_static: PublicKey) -> Self {
        Self {
            peer,
            role: Role::Initiator,
            state: SessionState::Init,
            remote_static: Some(remote_static),
            tx_key: derive_intro_keys(&remote_static),
            rx_key: SymmetricKey::random(),
            handshake: Some(HandshakeMaterial {
                ephemeral: EphemeralKeypair::generate(),
                cookie: None,
                secret: None,
                verifier: None,
            }),
            seen_peer_data: false,
        }
    }

    /// Build a responder-side session from a completed agreement.
    /// Responder sessions begin life established.
    pub(crate) fn new_responder(
        peer: SocketAddr,
        ephemeral: EphemeralKeypair,
        agreement: NtorOutput,
    ) -> Self {
        Self {
            peer,
            role: Role::Responder,
            state: SessionState::Established,
            remote_static: None,
            tx_key: agreement.tx_key,
            rx_key: agreement.rx_key,
            handshake: Some(HandshakeMaterial {
                ephemeral,
                cookie: None,
                secret: Some(agreement.secret),
                verifier: Some(agreement.verifier),
            }),
            seen_peer_data: false,
        }
    }

    /// Zero and release all transient handshake material: the stored
    /// cookie, the ephemeral keypair, the cached shared secret, and the
    /// cached verifier.
    pub(crate) fn scrub_handshake(&mut self) {
        self.handshake = None;
    }

    /// The peer this session talks to.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Which side of the handshake this session plays.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current state machine position.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session is established and carrying traffic.
    pub fn is_established(&self) -> bool {
        self.state == SessionState::Established
    }

    /// Whether any DATA has arrived from the peer yet.
    pub fn seen_peer_data(&self) -> bool {
        self.seen_peer_data
    }
}
