//! Wire format: packet types, the common header, and body layouts.
//!
//! Every packet shares one frame:
//!
//! ```text
//! ┌──────────────┬─────────────┬──────┬───────┬──────────┬──────────┐
//! │ MAC (32)     │ IV (24)     │ type │ flags │ len (BE) │ body     │
//! ├──────────────┴─────────────┼──(1)─┴──(1)──┴───(2)────┴──────────┤
//! │ authentication tag         │ encrypted, authenticated           │
//! └────────────────────────────┴────────────────────────────────────┘
//! ```
//!
//! `length` counts the bytes from the type byte to the end of the
//! authenticated plaintext; it excludes the MAC and IV but includes the
//! four TLV bytes themselves. The flags byte is reserved and must be zero.

use bytes::{Buf, BufMut};

use crate::crypto::{
    BULK_IV_LEN, BULK_KEY_LEN, ECDH_PUBLIC_KEY_LEN, MAC_DIGEST_LEN, MAC_KEY_LEN,
};
use crate::error::{Error, Result};

/// Bytes of authentication tag prefix: MAC digest plus IV.
pub const TAG_LEN: usize = MAC_DIGEST_LEN + BULK_IV_LEN;

/// Bytes of the common Type/Flags/Length header.
pub const TLV_LEN: usize = 4;

/// Bytes from the start of a packet to the start of its body.
pub const HDR_LEN: usize = TAG_LEN + TLV_LEN;

/// Offset of a packet body within a buffer region.
pub const BODY_OFFSET: usize = HDR_LEN;

/// Length of a responder-generated cookie (one MAC digest).
pub const COOKIE_LEN: usize = MAC_DIGEST_LEN;

/// Fixed body length of an INIT packet: the initiator's advertised
/// introduction MAC and bulk keys, verbatim.
pub const INIT_BODY_LEN: usize = MAC_KEY_LEN + BULK_KEY_LEN;

/// Fixed portion of a HANDSHAKE body: intro keys plus the ephemeral
/// public key; the echoed cookie follows.
pub const HANDSHAKE_BODY_LEN: usize = INIT_BODY_LEN + ECDH_PUBLIC_KEY_LEN;

/// Fixed body length of a HANDSHAKE_ACK packet: the responder's ephemeral
/// public key plus the ntor verifier.
pub const HANDSHAKE_ACK_BODY_LEN: usize = ECDH_PUBLIC_KEY_LEN + MAC_DIGEST_LEN;

/// Total size of an INIT packet.
pub const INIT_LEN: usize = HDR_LEN + INIT_BODY_LEN;

/// Total size of a HANDSHAKE packet carrying a standard cookie.
pub const HANDSHAKE_LEN: usize = HDR_LEN + HANDSHAKE_BODY_LEN + COOKIE_LEN;

/// Total size of a HANDSHAKE_ACK packet.
pub const HANDSHAKE_ACK_LEN: usize = HDR_LEN + HANDSHAKE_ACK_BODY_LEN;

/// The nine packet types.
///
/// REKEY and REKEY_ACK are reserved by the numbering but unimplemented;
/// the dispatcher drops them.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Application payload over an established session
    Data = 0,
    /// Handshake step 1: initiator advertises its intro keys
    Init = 1,
    /// Handshake step 2: responder hands back a stateless cookie
    InitAck = 2,
    /// Handshake step 3: initiator echoes the cookie with its ephemeral key
    Handshake = 3,
    /// Handshake step 4: responder's ephemeral key and ntor verifier
    HandshakeAck = 4,
    /// Liveness probe with opaque payload
    Heartbeat = 5,
    /// Echo of a heartbeat payload
    HeartbeatAck = 6,
    /// Reserved
    Rekey = 7,
    /// Reserved
    RekeyAck = 8,
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PacketType::Data),
            1 => Ok(PacketType::Init),
            2 => Ok(PacketType::InitAck),
            3 => Ok(PacketType::Handshake),
            4 => Ok(PacketType::HandshakeAck),
            5 => Ok(PacketType::Heartbeat),
            6 => Ok(PacketType::HeartbeatAck),
            7 => Ok(PacketType::Rekey),
            8 => Ok(PacketType::RekeyAck),
            _ => Err(Error::BadPacket),
        }
    }
}

/// The decoded common Type/Flags/Length header.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    /// Packet type byte.
    pub ptype: PacketType,
    /// Flags byte; must be zero in this protocol version.
    pub flags: u8,
    /// Byte count from the type byte to the end of the plaintext.
    pub length: u16,
}

impl Header {
    /// Decode the header from the plaintext region of a decrypted packet.
    ///
    /// An unknown type byte is a malformed packet.
    pub fn parse(plaintext: &[u8]) -> Result<Self> {
        if plaintext.len() < HDR_LEN {
            return Err(Error::BadPacket);
        }
        let mut tlv = &plaintext[TAG_LEN..TAG_LEN + TLV_LEN];
        let ptype = PacketType::try_from(tlv.get_u8())?;
        let flags = tlv.get_u8();
        let length = tlv.get_u16();
        Ok(Self { ptype, flags, length })
    }

    /// Encode a header for a packet with `body_len` body bytes. Flags are
    /// always written as zero.
    pub fn write(plaintext: &mut [u8], ptype: PacketType, body_len: usize) {
        debug_assert!(plaintext.len() >= HDR_LEN + body_len);
        let mut tlv = &mut plaintext[TAG_LEN..];
        tlv.put_u8(ptype as u8);
        tlv.put_u8(0);
        tlv.put_u16((TLV_LEN + body_len) as u16);
    }

    /// Body byte count implied by the length field.
    pub fn body_len(&self) -> usize {
        self.length as usize - TLV_LEN
    }
}

/// Parsed view of a HANDSHAKE body.
pub struct HandshakeBody<'a> {
    /// The initiator's intro MAC and bulk keys, verbatim as transmitted.
    pub intro_keys: &'a [u8],
    /// The initiator's ephemeral public key X.
    pub public_key: [u8; ECDH_PUBLIC_KEY_LEN],
    /// The echoed cookie.
    pub cookie: &'a [u8],
}

impl<'a> HandshakeBody<'a> {
    /// Split a HANDSHAKE body into its fields. The caller has already
    /// checked the length against the fixed-plus-cookie size.
    pub fn parse(body: &'a [u8]) -> Result<Self> {
        if body.len() < HANDSHAKE_BODY_LEN {
            return Err(Error::BadPacket);
        }
        let mut public_key = [0u8; ECDH_PUBLIC_KEY_LEN];
        public_key.copy_from_slice(&body[INIT_BODY_LEN..HANDSHAKE_BODY_LEN]);
        Ok(Self {
            intro_keys: &body[..INIT_BODY_LEN],
            public_key,
            cookie: &body[HANDSHAKE_BODY_LEN..],
        })
    }
}

/// Parsed view of a HANDSHAKE_ACK body.
pub struct HandshakeAckBody<'a> {
    /// The responder's ephemeral public key Y.
    pub public_key: [u8; ECDH_PUBLIC_KEY_LEN],
    /// The ntor verifier the initiator must recompute.
    pub verifier: &'a [u8],
}

impl<'a> HandshakeAckBody<'a> {
    /// Split a HANDSHAKE_ACK body into its fields.
    pub fn parse(body: &'a [u8]) -> Result<Self> {
        if body.len() != HANDSHAKE_ACK_BODY_LEN {
            return Err(Error::BadPacket);
        }
        let mut public_key = [0u8; ECDH_PUBLIC_KEY_LEN];
        public_key.copy_from_slice(&body[..ECDH_PUBLIC_KEY_LEN]);
        Ok(Self {
            public_key,
            verifier: &body[ECDH_PUBLIC_KEY_LEN..],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let mut region = [0u8; HDR_LEN + 11];
        Header::write(&mut region, PacketType::Data, 11);

        let hdr = Header::parse(&region).unwrap();
        assert_eq!(hdr.ptype, PacketType::Data);
        assert_eq!(hdr.flags, 0);
        assert_eq!(hdr.length, (TLV_LEN + 11) as u16);
        assert_eq!(hdr.body_len(), 11);
    }

    #[test]
    fn test_length_is_big_endian() {
        let mut region = [0u8; HDR_LEN + 300];
        Header::write(&mut region, PacketType::Heartbeat, 300);

        let raw = &region[TAG_LEN + 2..TAG_LEN + 4];
        assert_eq!(u16::from_be_bytes([raw[0], raw[1]]), 304);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert_eq!(PacketType::try_from(9).unwrap_err(), Error::BadPacket);
        assert_eq!(PacketType::try_from(0xff).unwrap_err(), Error::BadPacket);

        let mut region = [0u8; HDR_LEN];
        region[TAG_LEN] = 42;
        assert_eq!(Header::parse(&region).unwrap_err(), Error::BadPacket);
    }

    #[test]
    fn test_undersized_region_rejected() {
        let region = [0u8; HDR_LEN - 1];
        assert_eq!(Header::parse(&region).unwrap_err(), Error::BadPacket);
    }

    #[test]
    fn test_handshake_body_parse() {
        let mut body = vec![0u8; HANDSHAKE_BODY_LEN + COOKIE_LEN];
        body[INIT_BODY_LEN] = 0xaa;
        body[HANDSHAKE_BODY_LEN] = 0xbb;

        let parsed = HandshakeBody::parse(&body).unwrap();
        assert_eq!(parsed.intro_keys.len(), INIT_BODY_LEN);
        assert_eq!(parsed.public_key[0], 0xaa);
        assert_eq!(parsed.cookie, &body[HANDSHAKE_BODY_LEN..]);

        assert!(HandshakeBody::parse(&body[..HANDSHAKE_BODY_LEN - 1]).is_err());
    }

    #[test]
    fn test_handshake_ack_body_parse() {
        let body = [0x11u8; HANDSHAKE_ACK_BODY_LEN];
        let parsed = HandshakeAckBody::parse(&body).unwrap();
        assert_eq!(parsed.public_key, [0x11; ECDH_PUBLIC_KEY_LEN]);
        assert_eq!(parsed.verifier.len(), MAC_DIGEST_LEN);

        assert!(HandshakeAckBody::parse(&body[..10]).is_err());
        assert!(HandshakeAckBody::parse(&[0u8; HANDSHAKE_ACK_BODY_LEN + 1]).is_err());
    }

    #[test]
    fn test_size_constants() {
        assert_eq!(TAG_LEN, 56);
        assert_eq!(HDR_LEN, 60);
        assert_eq!(INIT_LEN, 124);
        assert_eq!(HANDSHAKE_LEN, 188);
        assert_eq!(HANDSHAKE_ACK_LEN, 124);
        assert!(HANDSHAKE_LEN < crate::LODP_MSS);
    }
}
