//! Bulk stream encryption.
//!
//! XChaCha20 keyed by the bulk half of a symmetric key pair. The extended
//! 192-bit nonce makes a fresh random IV per packet safe without any
//! counter state. Encryption and decryption are the same keystream XOR;
//! authentication lives in the envelope, not here.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::XChaCha20;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{SecureRandom, BULK_IV_LEN, BULK_KEY_LEN};

/// A bulk encryption key.
///
/// Automatically zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct BulkKey([u8; BULK_KEY_LEN]);

impl BulkKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(bytes: [u8; BULK_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random key.
    pub fn random() -> Self {
        Self(SecureRandom::bytes())
    }

    /// Get the raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with care - this is secret key material.
    pub fn as_bytes(&self) -> &[u8; BULK_KEY_LEN] {
        &self.0
    }

    /// XOR the keystream for `iv` over `data` in place.
    pub fn apply(&self, iv: &Iv, data: &mut [u8]) {
        let mut cipher = XChaCha20::new((&self.0).into(), (&iv.0).into());
        cipher.apply_keystream(data);
    }
}

/// A per-packet initialization vector.
///
/// Generated fresh for every sealed packet; transmitted in the clear and
/// authenticated by the envelope MAC.
#[derive(Clone, Copy, Debug)]
pub struct Iv([u8; BULK_IV_LEN]);

impl Iv {
    /// Create an IV from raw bytes.
    pub fn from_bytes(bytes: [u8; BULK_IV_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random IV.
    pub fn random() -> Self {
        Self(SecureRandom::bytes())
    }

    /// Get the raw IV bytes.
    pub fn as_bytes(&self) -> &[u8; BULK_IV_LEN] {
        &self.0
    }
}
