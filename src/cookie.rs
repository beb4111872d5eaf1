//! Stateless handshake cookies.
//!
//! Swiped shamelessly from the DTLS RFC: a cookie is a keyed MAC over the
//! peer's source address and the immutable intro-key material of its INIT
//! packet, so the responder keeps zero per-flow state between INIT and
//! HANDSHAKE. Replay is mitigated by rotating the cookie key every
//! [`ROTATE_INTERVAL`] seconds, with a grace window during which cookies
//! minted under the previous key still verify.
//!
//! Rotation is lazy: it happens on the first generate or verify call past
//! the deadline, sampled against the coarse wall-clock second count the
//! caller supplies.

use std::net::{IpAddr, SocketAddr};

use zeroize::Zeroizing;

use crate::crypto::MacKey;
use crate::error::{Error, Result};
use crate::packet::{COOKIE_LEN, INIT_BODY_LEN};

/// Seconds between cookie key rotations.
pub const ROTATE_INTERVAL: u64 = 30;

/// Seconds after a rotation during which the previous key is still accepted.
pub const GRACE_WINDOW: u64 = 15;

/// The responder's cookie keys: current, previous, and their schedule.
pub struct CookieJar {
    current: MacKey,
    previous: MacKey,
    rotated_at: u64,
    previous_expires_at: u64,
}

impl CookieJar {
    /// Create a jar with fresh random keys.
    ///
    /// The previous key starts as unrelated random material, so nothing
    /// verifies under it.
    pub fn new(now: u64) -> Self {
        Self {
            current: MacKey::random(),
            previous: MacKey::random(),
            rotated_at: now,
            previous_expires_at: now,
        }
    }

    /// Rotate unconditionally: the current key becomes the previous key
    /// and a fresh random key takes its place.
    pub fn rotate(&mut self, now: u64) {
        self.previous = std::mem::replace(&mut self.current, MacKey::random());
        self.rotated_at = now;
        self.previous_expires_at = now + GRACE_WINDOW;
    }

    fn maybe_rotate(&mut self, now: u64) {
        if now > self.rotated_at + ROTATE_INTERVAL {
            self.rotate(now);
        }
    }

    /// Mint a cookie for `peer` over the intro-key bytes carried in its
    /// INIT packet, rotating first if the rotation deadline has passed.
    pub fn generate(&mut self, now: u64, peer: SocketAddr, intro_keys: &[u8]) -> [u8; COOKIE_LEN] {
        self.maybe_rotate(now);
        compute(&self.current, peer, intro_keys)
    }

    /// Check a cookie echoed in a HANDSHAKE packet.
    ///
    /// Recomputes under the current key and compares in constant time; on
    /// mismatch, the previous key is tried if its grace window has not
    /// expired. Two mismatches mean the cookie is invalid.
    pub fn verify(
        &mut self,
        now: u64,
        peer: SocketAddr,
        intro_keys: &[u8],
        presented: &[u8],
    ) -> Result<()> {
        self.maybe_rotate(now);

        let cookie = compute(&self.current, peer, intro_keys);
        if constant_time_eq(&cookie, presented) {
            return Ok(());
        }

        if now > self.previous_expires_at {
            return Err(Error::InvalidCookie);
        }

        let cookie = compute(&self.previous, peer, intro_keys);
        if constant_time_eq(&cookie, presented) {
            Ok(())
        } else {
            Err(Error::InvalidCookie)
        }
    }
}

fn constant_time_eq(cookie: &[u8; COOKIE_LEN], presented: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    cookie.as_slice().ct_eq(presented).into()
}

/// cookie = MAC(key, addr || port || intro_mac_key || intro_bulk_key)
fn compute(key: &MacKey, peer: SocketAddr, intro_keys: &[u8]) -> [u8; COOKIE_LEN] {
    debug_assert_eq!(intro_keys.len(), INIT_BODY_LEN);

    let mut blob = Zeroizing::new([0u8; 16 + 2 + INIT_BODY_LEN]);
    let mut n = 0;
    match peer.ip() {
        IpAddr::V4(ip) => {
            blob[..4].copy_from_slice(&ip.octets());
            n += 4;
        }
        IpAddr::V6(ip) => {
            blob[..16].copy_from_slice(&ip.octets());
            n += 16;
        }
    }
    blob[n..n + 2].copy_from_slice(&peer.port().to_be_bytes());
    n += 2;
    blob[n..n + INIT_BODY_LEN].copy_from_slice(intro_keys);
    n += INIT_BODY_LEN;

    *key.digest(&blob[..n]).as_bytes()
}
