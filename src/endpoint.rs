//! Endpoint identity, host integration, and outgoing packet construction.
//!
//! An [`Endpoint`] is the process-wide responder identity: the long-term
//! X25519 keypair, the introduction keys derived from it, the cookie jar,
//! and the buffer pool. The host plugs in through the [`Handler`] trait
//! and owns every [`Session`]; the engine never stores one.
//!
//! Each endpoint is single-threaded: one packet is processed to completion
//! before the next, and nothing here suspends. The only blocking point is
//! the host's [`Handler::sendto`], whose failure propagates straight up.

use std::io;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::BufMut;
use tracing::debug;

use crate::buffer::{BufferPool, PacketBuffer};
use crate::cookie::CookieJar;
use crate::crypto::{derive_intro_keys, IdentityKeypair, PublicKey, SymmetricKey};
use crate::envelope;
use crate::error::{Error, Result};
use crate::packet::{self, Header, PacketType};
use crate::session::{Role, Session, SessionState};
use crate::LODP_MSS;

/// Default number of packet buffers an endpoint pre-allocates.
pub const DEFAULT_POOL_DEPTH: usize = 8;

/// Host-side integration surface.
///
/// The engine calls back into the host for transmission, connection
/// lifecycle events, and the optional policy hooks. Protocol errors on the
/// receive path are never delivered here; they come back as return values
/// from [`Endpoint::on_packet`].
pub trait Handler {
    /// Transmit one datagram to `peer`. May block; must not call back
    /// into the engine.
    fn sendto(&mut self, datagram: &[u8], peer: SocketAddr) -> io::Result<()>;

    /// A responder session completed its handshake. Ownership of the
    /// session transfers to the host, which must route future datagrams
    /// from `peer` back to it.
    fn on_accept(&mut self, session: Session, peer: SocketAddr);

    /// The initiator handshake concluded. Delivered exactly once per
    /// connect, with `Ok(())` or the fatal handshake error.
    fn on_connect(&mut self, session: &mut Session, status: Result<()>);

    /// Application payload arrived on an established session.
    fn on_recv(&mut self, session: &mut Session, payload: &[u8]);

    /// A HEARTBEAT_ACK echo arrived. Optional.
    fn on_heartbeat_ack(&mut self, _session: &mut Session, _payload: &[u8]) {}

    /// How many random padding bytes to append to the packet about to be
    /// sealed, given its current length and the segment ceiling. Optional;
    /// the engine clamps the answer to the space left.
    fn pad_len(&mut self, _current_len: usize, _max_len: usize) -> usize {
        0
    }

    /// Rate-limit gate, consulted before INIT and HEARTBEAT processing.
    /// Returning `false` drops the packet silently. Optional; see
    /// [`crate::ratelimit::RateLimiter`] for a ready-made policy.
    fn permit(&mut self, _peer: SocketAddr, _ptype: PacketType) -> bool {
        true
    }
}

/// Endpoint construction parameters.
pub struct EndpointConfig {
    /// Long-term identity. Present for endpoints that accept connections;
    /// its public half is what initiators dial.
    pub identity: Option<IdentityKeypair>,
    /// Packet buffer pool depth.
    pub pool_depth: usize,
}

impl EndpointConfig {
    /// Configuration for an initiator-only endpoint: no identity, no
    /// introduction keys, incoming handshakes refused.
    pub fn initiator() -> Self {
        Self {
            identity: None,
            pool_depth: DEFAULT_POOL_DEPTH,
        }
    }

    /// Configuration for a responder endpoint with the given identity.
    pub fn responder(identity: IdentityKeypair) -> Self {
        Self {
            identity: Some(identity),
            pool_depth: DEFAULT_POOL_DEPTH,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::initiator()
    }
}

/// A process-wide protocol endpoint.
pub struct Endpoint<H: Handler> {
    pub(crate) handler: H,
    pub(crate) identity: Option<IdentityKeypair>,
    pub(crate) intro_keys: Option<SymmetricKey>,
    pub(crate) cookie_jar: CookieJar,
    pub(crate) pool: BufferPool,
}

impl<H: Handler> Endpoint<H> {
    /// Create an endpoint, sampling the system clock for the cookie
    /// schedule.
    pub fn new(config: EndpointConfig, handler: H) -> Self {
        Self::new_at(config, handler, unix_now())
    }

    /// Create an endpoint with an explicit current time in seconds. Hosts
    /// with their own clock discipline drive rotation through the `_at`
    /// entry points with the same timebase.
    pub fn new_at(config: EndpointConfig, handler: H, now: u64) -> Self {
        let intro_keys = config
            .identity
            .as_ref()
            .map(|id| derive_intro_keys(&id.public()));
        Self {
            handler,
            identity: config.identity,
            intro_keys,
            cookie_jar: CookieJar::new(now),
            pool: BufferPool::new(config.pool_depth),
        }
    }

    /// Borrow the host handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutably borrow the host handler.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// The public half of this endpoint's identity, if it has one.
    pub fn public_key(&self) -> Option<PublicKey> {
        self.identity.as_ref().map(|id| id.public())
    }

    /// Whether this endpoint can accept incoming handshakes.
    pub fn has_intro_keys(&self) -> bool {
        self.intro_keys.is_some()
    }

    /// Open a connection to a responder known by its long-term public key.
    ///
    /// Creates the session and transmits INIT. The returned session is in
    /// the INIT state; completion is signalled later through
    /// [`Handler::on_connect`]. The host retransmits INIT on its own
    /// timers by calling [`Endpoint::send_init`] again.
    pub fn connect(&mut self, remote_static: PublicKey, peer: SocketAddr) -> Result<Session> {
        let mut session = Session::new_initiator(peer, remote_static);
        self.send_init(&mut session)?;
        Ok(session)
    }

    /// Transmit (or retransmit) the INIT packet for a session awaiting
    /// INIT_ACK.
    pub fn send_init(&mut self, session: &mut Session) -> Result<()> {
        assert_eq!(session.role, Role::Initiator);
        assert_eq!(session.state, SessionState::Init);

        let mut buf = self.pool.acquire().ok_or(Error::NoBufs)?;
        buf.set_len(packet::INIT_LEN);
        {
            let pt = buf.plaintext_mut();
            Header::write(pt, PacketType::Init, packet::INIT_BODY_LEN);
            let mut body = &mut pt[packet::BODY_OFFSET..];
            body.put_slice(session.rx_key.mac.as_bytes());
            body.put_slice(session.rx_key.bulk.as_bytes());
        }
        let result = self.seal_and_send(&session.tx_key, &mut buf, session.peer);
        self.pool.release(buf);
        result
    }

    /// Transmit (or retransmit) the HANDSHAKE packet echoing the stored
    /// cookie.
    pub fn send_handshake(&mut self, session: &mut Session) -> Result<()> {
        assert_eq!(session.role, Role::Initiator);
        assert_eq!(session.state, SessionState::Handshake);

        let material = session
            .handshake
            .as_ref()
            .expect("handshake material outlives the handshake phase");
        let cookie = material
            .cookie
            .as_ref()
            .expect("cookie is stored before HANDSHAKE is sent");
        let body_len = packet::HANDSHAKE_BODY_LEN + cookie.len();
        debug_assert!(packet::HDR_LEN + body_len <= LODP_MSS);

        let mut buf = self.pool.acquire().ok_or(Error::NoBufs)?;
        buf.set_len(packet::HDR_LEN + body_len);
        {
            let pt = buf.plaintext_mut();
            Header::write(pt, PacketType::Handshake, body_len);
            let mut body = &mut pt[packet::BODY_OFFSET..];
            body.put_slice(session.rx_key.mac.as_bytes());
            body.put_slice(session.rx_key.bulk.as_bytes());
            body.put_slice(material.ephemeral.public().as_bytes());
            body.put_slice(cookie);
        }
        let result = self.seal_and_send(&session.tx_key, &mut buf, session.peer);
        self.pool.release(buf);
        result
    }

    /// Send application payload over an established session.
    pub fn send_data(&mut self, session: &mut Session, payload: &[u8]) -> Result<()> {
        self.send_payload(session, PacketType::Data, payload)
    }

    /// Send a HEARTBEAT probe; the peer echoes the payload back.
    pub fn send_heartbeat(&mut self, session: &mut Session, payload: &[u8]) -> Result<()> {
        self.send_payload(session, PacketType::Heartbeat, payload)
    }

    fn send_payload(
        &mut self,
        session: &mut Session,
        ptype: PacketType,
        payload: &[u8],
    ) -> Result<()> {
        assert_eq!(session.state, SessionState::Established);

        if packet::HDR_LEN + payload.len() > LODP_MSS {
            return Err(Error::MsgSize);
        }

        let mut buf = self.pool.acquire().ok_or(Error::NoBufs)?;
        buf.set_len(packet::HDR_LEN + payload.len());
        {
            let pt = buf.plaintext_mut();
            Header::write(pt, ptype, payload.len());
            pt[packet::BODY_OFFSET..].copy_from_slice(payload);
        }
        let result = self.seal_and_send(&session.tx_key, &mut buf, session.peer);
        self.pool.release(buf);
        result
    }

    /// Apply the padding hook, seal, and hand the datagram to the host.
    pub(crate) fn seal_and_send(
        &mut self,
        keys: &SymmetricKey,
        buf: &mut PacketBuffer,
        peer: SocketAddr,
    ) -> Result<()> {
        let requested = self.handler.pad_len(buf.len(), LODP_MSS);
        if requested > 0 {
            let applied = envelope::pad(buf, requested);
            debug!(applied, len = buf.len(), "padded outgoing packet");
        }
        envelope::seal(keys, buf);
        self.handler
            .sendto(buf.ciphertext(), peer)
            .map_err(|e| Error::Network(e.kind()))
    }
}

/// Coarse wall-clock seconds for the cookie rotation schedule.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
