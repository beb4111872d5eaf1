//! Incoming packet validation and routing.
//!
//! The receive path: select a decryption key (session vs endpoint intro),
//! open the envelope, sanity-check the common header, then let the
//! per-type handler advance the session state machine. Errors stay local;
//! nothing is ever signalled back to the peer.

use std::net::SocketAddr;

use bytes::BufMut;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::buffer::PacketBuffer;
use crate::crypto::{Digest, EphemeralKeypair, PublicKey, SymmetricKey};
use crate::endpoint::{unix_now, Endpoint, Handler};
use crate::envelope;
use crate::error::{Error, Result};
use crate::ntor;
use crate::packet::{
    self, Header, HandshakeAckBody, HandshakeBody, PacketType, BODY_OFFSET, COOKIE_LEN,
    INIT_BODY_LEN,
};
use crate::session::{Role, Session, SessionState};
use crate::LODP_MSS;

/// Which key pair authenticated the packet.
enum Auth {
    /// The session's receive keys.
    Session,
    /// The endpoint's introduction keys.
    Intro,
}

impl<H: Handler> Endpoint<H> {
    /// Process one incoming datagram.
    ///
    /// The host passes the session it looked up by `peer`, or `None` if it
    /// knows of none; session identification deliberately lives outside
    /// the engine. Packet effects are serialized in arrival order.
    pub fn on_packet(
        &mut self,
        session: Option<&mut Session>,
        datagram: &[u8],
        peer: SocketAddr,
    ) -> Result<()> {
        self.on_packet_at(session, datagram, peer, unix_now())
    }

    /// [`Endpoint::on_packet`] with an explicit current time in seconds,
    /// for hosts that sample the clock themselves.
    pub fn on_packet_at(
        &mut self,
        session: Option<&mut Session>,
        datagram: &[u8],
        peer: SocketAddr,
        now: u64,
    ) -> Result<()> {
        // The tag and the TLV header must both be present before anything
        // is worth decrypting.
        if datagram.len() < packet::HDR_LEN || datagram.len() > LODP_MSS {
            return Err(Error::BadPacket);
        }

        let mut buf = self.pool.acquire().ok_or(Error::NoBufs)?;
        buf.load(datagram);
        let result = self.dispatch(session, &mut buf, peer, now);
        self.pool.release(buf);
        result
    }

    fn dispatch(
        &mut self,
        mut session: Option<&mut Session>,
        buf: &mut PacketBuffer,
        peer: SocketAddr,
        now: u64,
    ) -> Result<()> {
        // Key selection: session receive keys first; on a MAC mismatch
        // fall back to the endpoint intro keys, which is only legitimate
        // for a retransmitted HANDSHAKE.
        let auth = match session.as_deref_mut() {
            Some(s) => match envelope::open(&s.rx_key, buf) {
                Ok(()) => Some(Auth::Session),
                Err(Error::InvalidMac) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };
        let auth = match auth {
            Some(auth) => auth,
            None => {
                let intro = self.intro_keys.as_ref().ok_or(Error::NotResponder)?;
                envelope::open(intro, buf)?;
                Auth::Intro
            }
        };

        // Type-agnostic sanity checks. The MAC covered the length field,
        // so it can be trusted once it is consistent with the datagram.
        let hdr = Header::parse(buf.plaintext())?;
        let length = hdr.length as usize;
        if length < packet::TLV_LEN || length > buf.len() - packet::TAG_LEN {
            return Err(Error::BadPacket);
        }
        if hdr.flags != 0 {
            return Err(Error::BadPacket);
        }

        match session {
            Some(s) => {
                if let Auth::Intro = auth {
                    // A HANDSHAKE can arrive for an existing session when
                    // our HANDSHAKE_ACK was lost; anything else sealed
                    // under intro keys is bogus.
                    if hdr.ptype != PacketType::Handshake {
                        return Err(Error::BadPacket);
                    }
                    if s.role == Role::Initiator {
                        return Err(Error::NotResponder);
                    }
                    return self.on_handshake(Some(s), hdr, buf, peer, now);
                }
                match hdr.ptype {
                    PacketType::Data => self.on_data(s, hdr, buf),
                    PacketType::InitAck => self.on_init_ack(s, hdr, buf),
                    PacketType::HandshakeAck => self.on_handshake_ack(s, hdr, buf),
                    PacketType::Heartbeat => self.on_heartbeat(s, hdr, buf),
                    PacketType::HeartbeatAck => self.on_heartbeat_ack(s, hdr, buf),
                    // REKEY is reserved but unimplemented; INIT and
                    // HANDSHAKE never arrive under session keys.
                    PacketType::Init
                    | PacketType::Handshake
                    | PacketType::Rekey
                    | PacketType::RekeyAck => Err(Error::BadPacket),
                }
            }
            None => match hdr.ptype {
                PacketType::Init => self.on_init(hdr, buf, peer, now),
                PacketType::Handshake => self.on_handshake(None, hdr, buf, peer, now),
                _ => Err(Error::BadPacket),
            },
        }
    }

    /// INIT: mint a cookie and answer with INIT_ACK. No session state is
    /// created.
    fn on_init(
        &mut self,
        hdr: Header,
        buf: &PacketBuffer,
        peer: SocketAddr,
        now: u64,
    ) -> Result<()> {
        if hdr.length as usize != packet::TLV_LEN + INIT_BODY_LEN {
            return Err(Error::BadPacket);
        }
        if !self.handler.permit(peer, PacketType::Init) {
            debug!(%peer, "INIT dropped by rate-limit policy");
            return Ok(());
        }

        let mut intro = Zeroizing::new([0u8; INIT_BODY_LEN]);
        intro.copy_from_slice(&buf.plaintext()[BODY_OFFSET..BODY_OFFSET + INIT_BODY_LEN]);

        let cookie = self.cookie_jar.generate(now, peer, &intro[..]);
        let keys = SymmetricKey::from_wire(&intro[..]);

        let mut reply = self.pool.acquire().ok_or(Error::NoBufs)?;
        reply.set_len(packet::HDR_LEN + COOKIE_LEN);
        {
            let pt = reply.plaintext_mut();
            Header::write(pt, PacketType::InitAck, COOKIE_LEN);
            pt[BODY_OFFSET..].copy_from_slice(&cookie);
        }
        let result = self.seal_and_send(&keys, &mut reply, peer);
        self.pool.release(reply);
        result
    }

    /// HANDSHAKE: verify the cookie, then either complete a new responder
    /// session or retransmit a lost HANDSHAKE_ACK.
    fn on_handshake(
        &mut self,
        session: Option<&mut Session>,
        hdr: Header,
        buf: &PacketBuffer,
        peer: SocketAddr,
        now: u64,
    ) -> Result<()> {
        if hdr.length as usize != packet::TLV_LEN + packet::HANDSHAKE_BODY_LEN + COOKIE_LEN {
            return Err(Error::BadPacket);
        }
        let body = &buf.plaintext()[BODY_OFFSET..BODY_OFFSET + hdr.body_len()];
        let parsed = HandshakeBody::parse(body)?;

        self.cookie_jar
            .verify(now, peer, parsed.intro_keys, parsed.cookie)?;

        let peer_keys = SymmetricKey::from_wire(parsed.intro_keys);
        let initiator_public = PublicKey::from_bytes(parsed.public_key);

        // Chances are a HANDSHAKE_ACK goes out either way, so claim the
        // reply buffer up front; on exhaustion no session is created.
        let mut reply = self.pool.acquire().ok_or(Error::NoBufs)?;
        let outcome =
            self.handshake_reply(session, &peer_keys, &initiator_public, &mut reply, peer);
        self.pool.release(reply);
        outcome
    }

    fn handshake_reply(
        &mut self,
        session: Option<&mut Session>,
        peer_keys: &SymmetricKey,
        initiator_public: &PublicKey,
        reply: &mut PacketBuffer,
        peer: SocketAddr,
    ) -> Result<()> {
        if let Some(existing) = session {
            // The peer is re-handshaking at an address we already track.
            // Before any payload has flowed this is a lost HANDSHAKE_ACK:
            // answer from the cached verifier and skip the accept callback.
            // After payload, the peer is reusing the source address; ignore
            // it until the host times the stale session out.
            if existing.seen_peer_data {
                return Err(Error::BadPacket);
            }
            let material = existing.handshake.as_ref().ok_or(Error::BadPacket)?;
            let verifier = material.verifier.clone().ok_or(Error::BadPacket)?;
            write_handshake_ack(reply, material.ephemeral.public(), &verifier);
            debug!(%peer, "retransmitting HANDSHAKE_ACK");
            return self.seal_and_send(peer_keys, reply, peer);
        }

        let identity = self.identity.as_ref().ok_or(Error::NotResponder)?;
        let ephemeral = EphemeralKeypair::generate();
        let agreement = ntor::respond(&ephemeral, identity, initiator_public)?;

        write_handshake_ack(reply, ephemeral.public(), &agreement.verifier);
        let session = Session::new_responder(peer, ephemeral, agreement);

        let sent = self.seal_and_send(peer_keys, reply, peer);
        info!(%peer, "responder session established");
        self.handler.on_accept(session, peer);
        sent
    }

    /// INIT_ACK: stash the cookie and move the initiator on to HANDSHAKE.
    fn on_init_ack(&mut self, session: &mut Session, hdr: Header, buf: &PacketBuffer) -> Result<()> {
        if session.role != Role::Initiator || session.state != SessionState::Init {
            return Err(Error::BadPacket);
        }

        // The cookie is peer-opaque and its length responder-defined, but
        // it must exist and must still fit when echoed back.
        let cookie_len = hdr.body_len();
        if cookie_len == 0 {
            return Err(Error::BadPacket);
        }
        if packet::HDR_LEN + packet::HANDSHAKE_BODY_LEN + cookie_len > LODP_MSS {
            return Err(Error::BadPacket);
        }

        let cookie = Zeroizing::new(
            buf.plaintext()[BODY_OFFSET..BODY_OFFSET + cookie_len].to_vec(),
        );
        let material = session.handshake.as_mut().ok_or(Error::BadPacket)?;
        material.cookie = Some(cookie);
        session.state = SessionState::Handshake;

        match self.send_handshake(session) {
            Err(Error::NoBufs) => {
                session.state = SessionState::Error;
                self.handler.on_connect(session, Err(Error::NoBufs));
                Err(Error::NoBufs)
            }
            other => other,
        }
    }

    /// HANDSHAKE_ACK: finish ntor, check the verifier, and either
    /// establish the session or fail it. Either way the handshake
    /// transients are scrubbed and the host hears about it exactly once.
    fn on_handshake_ack(
        &mut self,
        session: &mut Session,
        hdr: Header,
        buf: &PacketBuffer,
    ) -> Result<()> {
        if session.role != Role::Initiator || session.state != SessionState::Handshake {
            return Err(Error::BadPacket);
        }
        if hdr.length as usize != packet::TLV_LEN + packet::HANDSHAKE_ACK_BODY_LEN {
            return Err(Error::BadPacket);
        }

        let body = &buf.plaintext()[BODY_OFFSET..BODY_OFFSET + hdr.body_len()];
        let parsed = HandshakeAckBody::parse(body)?;
        let responder_public = PublicKey::from_bytes(parsed.public_key);

        let status = {
            let material = session.handshake.as_ref().ok_or(Error::BadPacket)?;
            let remote_static = session.remote_static.ok_or(Error::BadPacket)?;
            match ntor::initiate(&material.ephemeral, &remote_static, &responder_public) {
                Ok(agreement) if agreement.verifier.ct_eq(parsed.verifier) => {
                    session.tx_key = agreement.tx_key;
                    session.rx_key = agreement.rx_key;
                    session.state = SessionState::Established;
                    Ok(())
                }
                Ok(_) => {
                    session.state = SessionState::Error;
                    Err(Error::BadHandshake)
                }
                Err(_) => {
                    session.state = SessionState::Error;
                    Err(Error::BadHandshake)
                }
            }
        };

        session.scrub_handshake();
        self.handler.on_connect(session, status);
        status
    }

    /// DATA: deliver the payload. The first packet from the peer also
    /// retires the responder's cached handshake material.
    fn on_data(&mut self, session: &mut Session, hdr: Header, buf: &PacketBuffer) -> Result<()> {
        if session.state != SessionState::Established {
            return Err(Error::BadPacket);
        }

        if !session.seen_peer_data {
            session.seen_peer_data = true;
            if session.role == Role::Responder {
                session.scrub_handshake();
            }
        }

        let payload = &buf.plaintext()[BODY_OFFSET..BODY_OFFSET + hdr.body_len()];
        self.handler.on_recv(session, payload);
        Ok(())
    }

    /// HEARTBEAT: echo the payload back in a HEARTBEAT_ACK.
    fn on_heartbeat(&mut self, session: &mut Session, hdr: Header, buf: &PacketBuffer) -> Result<()> {
        if session.state != SessionState::Established {
            return Err(Error::BadPacket);
        }
        if !self.handler.permit(session.peer, PacketType::Heartbeat) {
            debug!(peer = %session.peer, "HEARTBEAT dropped by rate-limit policy");
            return Ok(());
        }

        let body_len = hdr.body_len();
        let mut reply = self.pool.acquire().ok_or(Error::NoBufs)?;
        reply.set_len(packet::HDR_LEN + body_len);
        {
            let pt = reply.plaintext_mut();
            Header::write(pt, PacketType::HeartbeatAck, body_len);
            pt[BODY_OFFSET..]
                .copy_from_slice(&buf.plaintext()[BODY_OFFSET..BODY_OFFSET + body_len]);
        }
        let result = self.seal_and_send(&session.tx_key, &mut reply, session.peer);
        self.pool.release(reply);
        result
    }

    /// HEARTBEAT_ACK: hand the echoed payload to the host.
    fn on_heartbeat_ack(
        &mut self,
        session: &mut Session,
        hdr: Header,
        buf: &PacketBuffer,
    ) -> Result<()> {
        if session.state != SessionState::Established {
            return Err(Error::BadPacket);
        }

        let payload = &buf.plaintext()[BODY_OFFSET..BODY_OFFSET + hdr.body_len()];
        self.handler.on_heartbeat_ack(session, payload);
        Ok(())
    }
}

/// Fill a HANDSHAKE_ACK frame: Y followed by the verifier.
fn write_handshake_ack(buf: &mut PacketBuffer, public: PublicKey, verifier: &Digest) {
    buf.set_len(packet::HANDSHAKE_ACK_LEN);
    let pt = buf.plaintext_mut();
    Header::write(pt, PacketType::HandshakeAck, packet::HANDSHAKE_ACK_BODY_LEN);
    let mut body = &mut pt[BODY_OFFSET..];
    body.put_slice(public.as_bytes());
    body.put_slice(verifier.as_bytes());
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::net::SocketAddr;

    use crate::crypto::IdentityKeypair;
    use crate::endpoint::{Endpoint, EndpointConfig, Handler};
    use crate::error::Result;
    use crate::session::Session;

    #[derive(Default)]
    struct Host {
        sent: Vec<Vec<u8>>,
        accepted: Vec<Session>,
        received: Vec<Vec<u8>>,
    }

    impl Handler for Host {
        fn sendto(&mut self, datagram: &[u8], _peer: SocketAddr) -> io::Result<()> {
            self.sent.push(datagram.to_vec());
            Ok(())
        }
        fn on_accept(&mut self, session: Session, _peer: SocketAddr) {
            self.accepted.push(session);
        }
        fn on_connect(&mut self, _session: &mut Session, _status: Result<()>) {}
        fn on_recv(&mut self, _session: &mut Session, payload: &[u8]) {
            self.received.push(payload.to_vec());
        }
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    /// Run the full handshake and return both sides plus their sessions.
    fn establish() -> (Endpoint<Host>, Session, Endpoint<Host>, Session) {
        let identity = IdentityKeypair::generate();
        let public = identity.public();
        let mut a = Endpoint::new(EndpointConfig::initiator(), Host::default());
        let mut b = Endpoint::new(EndpointConfig::responder(identity), Host::default());

        let mut sa = a.connect(public, addr(2)).unwrap();
        let init = a.handler_mut().sent.pop().unwrap();
        b.on_packet(None, &init, addr(1)).unwrap();
        let init_ack = b.handler_mut().sent.pop().unwrap();
        a.on_packet(Some(&mut sa), &init_ack, addr(2)).unwrap();
        let handshake = a.handler_mut().sent.pop().unwrap();
        b.on_packet(None, &handshake, addr(1)).unwrap();
        let handshake_ack = b.handler_mut().sent.pop().unwrap();
        let sb = b.handler_mut().accepted.pop().unwrap();
        a.on_packet(Some(&mut sa), &handshake_ack, addr(2)).unwrap();

        (a, sa, b, sb)
    }

    #[test]
    fn test_initiator_scrubs_on_handshake_completion() {
        let (_a, sa, _b, sb) = establish();

        assert!(sa.is_established());
        assert!(sa.handshake.is_none(), "initiator kept handshake material");

        // The responder retains its cache until first peer DATA
        assert!(sb.handshake.is_some());
    }

    #[test]
    fn test_responder_scrubs_on_first_data() {
        let (mut a, mut sa, mut b, mut sb) = establish();

        a.send_data(&mut sa, b"first").unwrap();
        let data = a.handler_mut().sent.pop().unwrap();
        b.on_packet(Some(&mut sb), &data, addr(1)).unwrap();

        assert!(sb.seen_peer_data());
        assert!(sb.handshake.is_none(), "responder kept handshake material");

        // Subsequent DATA is unaffected by the retired cache
        a.send_data(&mut sa, b"second").unwrap();
        let data = a.handler_mut().sent.pop().unwrap();
        b.on_packet(Some(&mut sb), &data, addr(1)).unwrap();
        assert_eq!(b.handler().received.len(), 2);
    }

    #[test]
    fn test_session_keys_differ_from_intro_phase() {
        let (_a, sa, _b, sb) = establish();

        // Established traffic keys are the mirrored ntor outputs
        assert_eq!(sa.tx_key.mac.as_bytes(), sb.rx_key.mac.as_bytes());
        assert_eq!(sa.rx_key.bulk.as_bytes(), sb.tx_key.bulk.as_bytes());
    }
}
