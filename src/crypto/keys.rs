//! X25519 key exchange primitives.
//!
//! Type-safe wrappers around X25519 operations with automatic zeroization
//! of secret material on drop. Every Diffie-Hellman exchange checks that
//! the peer's point was contributory; low-order and small-subgroup points
//! yield an all-zero shared secret and are rejected.

use rand_core::OsRng;
use x25519_dalek::{PublicKey as DalekPublic, ReusableSecret, StaticSecret};

use crate::crypto::{ECDH_PUBLIC_KEY_LEN, ECDH_SECRET_LEN};
use crate::error::{Error, Result};

/// An X25519 public key.
///
/// Safe to share publicly. Used for key exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(DalekPublic);

impl PublicKey {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; ECDH_PUBLIC_KEY_LEN]) -> Self {
        Self(DalekPublic::from(bytes))
    }

    /// Get the raw bytes of this public key.
    pub fn as_bytes(&self) -> &[u8; ECDH_PUBLIC_KEY_LEN] {
        self.0.as_bytes()
    }

    /// Convert to raw bytes.
    pub fn to_bytes(self) -> [u8; ECDH_PUBLIC_KEY_LEN] {
        self.0.to_bytes()
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// A long-term X25519 identity keypair (the responder's "B"/"b").
///
/// The secret half is automatically zeroized when dropped.
#[derive(Clone)]
pub struct IdentityKeypair {
    secret: StaticSecret,
}

impl IdentityKeypair {
    /// Generate a new random identity.
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Create from raw secret bytes.
    ///
    /// # Security
    ///
    /// The input bytes should come from a cryptographically secure source
    /// or previously exported identity material.
    pub fn from_bytes(bytes: [u8; ECDH_SECRET_LEN]) -> Self {
        Self {
            secret: StaticSecret::from(bytes),
        }
    }

    /// The public half of this identity.
    pub fn public(&self) -> PublicKey {
        PublicKey(DalekPublic::from(&self.secret))
    }

    /// Export the secret key bytes.
    ///
    /// # Security
    ///
    /// Handle the returned bytes with care and zeroize when done.
    pub fn to_bytes(&self) -> [u8; ECDH_SECRET_LEN] {
        self.secret.to_bytes()
    }

    /// Perform X25519 Diffie-Hellman key agreement with a validated peer.
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> Result<SharedSecret> {
        contributory(self.secret.diffie_hellman(&their_public.0))
    }
}

/// A per-session ephemeral X25519 keypair ("x"/"X" or "y"/"Y").
///
/// The ntor handshake exchanges with both the peer's ephemeral and its
/// long-term key, so the secret must survive more than one agreement.
/// It is automatically zeroized when dropped and cannot be exported.
pub struct EphemeralKeypair {
    secret: ReusableSecret,
    public: PublicKey,
}

impl EphemeralKeypair {
    /// Generate a new random ephemeral keypair.
    pub fn generate() -> Self {
        let secret = ReusableSecret::random_from_rng(OsRng);
        let public = PublicKey(DalekPublic::from(&secret));
        Self { secret, public }
    }

    /// The public half of this keypair.
    pub fn public(&self) -> PublicKey {
        self.public
    }

    /// Perform X25519 Diffie-Hellman key agreement with a validated peer.
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> Result<SharedSecret> {
        contributory(self.secret.diffie_hellman(&their_public.0))
    }
}

/// The result of a validated X25519 Diffie-Hellman key exchange.
///
/// Automatically zeroized when dropped.
pub struct SharedSecret([u8; ECDH_SECRET_LEN]);

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedSecret").field(&"<redacted>").finish()
    }
}

impl SharedSecret {
    /// Get the raw shared secret bytes.
    ///
    /// # Security
    ///
    /// This should be fed into a KDF before use as a key.
    pub fn as_bytes(&self) -> &[u8; ECDH_SECRET_LEN] {
        &self.0
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.0.zeroize();
    }
}

/// Reject exchanges where the peer's point did not contribute.
///
/// An all-zero output means the peer supplied the identity or another
/// low-order point; accepting it would let the peer force a known secret.
fn contributory(shared: x25519_dalek::SharedSecret) -> Result<SharedSecret> {
    if !shared.was_contributory() {
        return Err(Error::BadHandshake);
    }
    Ok(SharedSecret(shared.to_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ephemeral_key_exchange() {
        let alice = EphemeralKeypair::generate();
        let bob = EphemeralKeypair::generate();

        let alice_shared = alice.diffie_hellman(&bob.public()).unwrap();
        let bob_shared = bob.diffie_hellman(&alice.public()).unwrap();

        assert_eq!(alice_shared.as_bytes(), bob_shared.as_bytes());
    }

    #[test]
    fn test_identity_key_exchange() {
        let responder = IdentityKeypair::generate();
        let initiator = EphemeralKeypair::generate();

        let a = initiator.diffie_hellman(&responder.public()).unwrap();
        let b = responder.diffie_hellman(&initiator.public()).unwrap();

        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_identity_serialization() {
        let id = IdentityKeypair::generate();
        let restored = IdentityKeypair::from_bytes(id.to_bytes());
        assert_eq!(id.public(), restored.public());
    }

    #[test]
    fn test_low_order_point_rejected() {
        let id = IdentityKeypair::generate();
        let eph = EphemeralKeypair::generate();

        // The identity element is the canonical low-order point.
        let low_order = PublicKey::from_bytes([0u8; ECDH_PUBLIC_KEY_LEN]);

        assert_eq!(id.diffie_hellman(&low_order).unwrap_err(), Error::BadHandshake);
        assert_eq!(eph.diffie_hellman(&low_order).unwrap_err(), Error::BadHandshake);
    }

    #[test]
    fn test_ephemeral_secret_is_reusable() {
        let eph = EphemeralKeypair::generate();
        let peer1 = EphemeralKeypair::generate();
        let peer2 = IdentityKeypair::generate();

        let s1 = eph.diffie_hellman(&peer1.public()).unwrap();
        let s2 = eph.diffie_hellman(&peer2.public()).unwrap();

        assert_ne!(s1.as_bytes(), s2.as_bytes());
    }
}
