//! The authenticated packet envelope.
//!
//! Encrypt-then-MAC over the common frame: a fresh random IV is written
//! into the ciphertext region, the body (type byte onward) is stream
//! encrypted under the bulk key, and the MAC over IV-through-end is placed
//! at the head of the packet. The MAC therefore covers the length field,
//! making later length parsing safe against tampering.
//!
//! Opening is the mirror image: recompute the MAC, compare it to the
//! received tag in constant time, and only then decrypt.

use subtle::ConstantTimeEq;

use crate::buffer::PacketBuffer;
use crate::crypto::{Iv, SecureRandom, SymmetricKey, BULK_IV_LEN, MAC_DIGEST_LEN};
use crate::error::{Error, Result};
use crate::packet::{HDR_LEN, TAG_LEN};
use crate::LODP_MSS;

/// Append up to `extra` random padding bytes to a filled plaintext packet,
/// clamped to the remaining segment size. Returns the count applied.
///
/// Padding goes after the body and before sealing; the length field keeps
/// its original value, so receivers ignore the padding bytes while the MAC
/// still covers them.
pub fn pad(buf: &mut PacketBuffer, extra: usize) -> usize {
    let applied = extra.min(LODP_MSS - buf.len());
    if applied > 0 {
        let old = buf.len();
        buf.set_len(old + applied);
        SecureRandom::fill(&mut buf.plaintext_mut()[old..]);
    }
    applied
}

/// Encrypt-then-MAC the plaintext region into the ciphertext region.
///
/// The plaintext must hold a complete packet: TLV header at the tag
/// offset, body and any padding after it.
pub fn seal(keys: &SymmetricKey, buf: &mut PacketBuffer) {
    debug_assert!(buf.len() >= HDR_LEN);
    debug_assert!(buf.len() <= LODP_MSS);

    let (pt, ct) = buf.split_mut();

    let iv = Iv::random();
    ct[MAC_DIGEST_LEN..TAG_LEN].copy_from_slice(iv.as_bytes());

    ct[TAG_LEN..].copy_from_slice(&pt[TAG_LEN..]);
    keys.bulk.apply(&iv, &mut ct[TAG_LEN..]);

    let digest = keys.mac.digest(&ct[MAC_DIGEST_LEN..]);
    ct[..MAC_DIGEST_LEN].copy_from_slice(digest.as_bytes());
}

/// Verify the MAC over the ciphertext region and decrypt the body into
/// the plaintext region.
///
/// The comparison is constant time; on mismatch nothing is decrypted and
/// `InvalidMac` is returned.
pub fn open(keys: &SymmetricKey, buf: &mut PacketBuffer) -> Result<()> {
    debug_assert!(buf.len() >= HDR_LEN);

    let (pt, ct) = buf.split_mut();

    let digest = keys.mac.digest(&ct[MAC_DIGEST_LEN..]);
    if !bool::from(digest.as_bytes().ct_eq(&ct[..MAC_DIGEST_LEN])) {
        return Err(Error::InvalidMac);
    }

    let iv_bytes: [u8; BULK_IV_LEN] = ct[MAC_DIGEST_LEN..TAG_LEN]
        .try_into()
        .expect("iv slice has fixed width");
    let iv = Iv::from_bytes(iv_bytes);

    pt[TAG_LEN..].copy_from_slice(&ct[TAG_LEN..]);
    keys.bulk.apply(&iv, &mut pt[TAG_LEN..]);
    Ok(())
}
