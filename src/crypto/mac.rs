//! Keyed MAC primitives.
//!
//! BLAKE2s-256 in keyed mode authenticates every packet, binds cookies to
//! peer addresses, and doubles as the extract/expand function of the ntor
//! handshake. Comparisons against peer-supplied digests are constant time.

use blake2::digest::{KeyInit, Mac};
use blake2::Blake2sMac256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{SecureRandom, MAC_DIGEST_LEN, MAC_KEY_LEN};

/// A MAC key.
///
/// Automatically zeroized when dropped. Keys built from ASCII labels (the
/// ntor KDF keys) are zero-padded to the full key length, so the label and
/// its padded form denote the same key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MacKey([u8; MAC_KEY_LEN]);

impl MacKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(bytes: [u8; MAC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random key.
    pub fn random() -> Self {
        Self(SecureRandom::bytes())
    }

    /// Build a key from an ASCII label, zero-padded to the key length.
    ///
    /// Panics at compile time if the label is longer than a key.
    pub const fn from_label(label: &[u8]) -> Self {
        let mut key = [0u8; MAC_KEY_LEN];
        let mut i = 0;
        while i < label.len() {
            key[i] = label[i];
            i += 1;
        }
        Self(key)
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with care - this is secret key material.
    pub fn as_bytes(&self) -> &[u8; MAC_KEY_LEN] {
        &self.0
    }

    /// Compute the MAC digest of `data` under this key.
    pub fn digest(&self, data: &[u8]) -> Digest {
        let mut mac = <Blake2sMac256 as KeyInit>::new((&self.0).into());
        mac.update(data);
        Digest(mac.finalize().into_bytes().into())
    }
}

/// A MAC digest.
///
/// Not `Copy`, and wiped on drop: digests also serve as cached handshake
/// verifiers, which must not linger in memory.
#[derive(Clone, Debug, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Digest([u8; MAC_DIGEST_LEN]);

impl Digest {
    /// Create a digest from raw bytes.
    pub fn from_bytes(bytes: [u8; MAC_DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; MAC_DIGEST_LEN] {
        &self.0
    }

    /// Compare against peer-supplied bytes in constant time.
    ///
    /// A slice of the wrong length compares unequal.
    pub fn ct_eq(&self, other: &[u8]) -> bool {
        self.0.as_slice().ct_eq(other).into()
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
