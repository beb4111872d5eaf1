//! Cryptographic primitives for the LODP engine.
//!
//! This module provides:
//! - Keyed BLAKE2s-256 MACs (packet authentication, cookies, the ntor KDF)
//! - XChaCha20 bulk stream encryption
//! - X25519 Elliptic Curve Diffie-Hellman key exchange
//! - HKDF-based derivation of directional session keys and intro keys
//! - Secure random number generation
//!
//! All secret material is zeroized on drop to prevent memory leakage. The
//! rest of the engine consumes these wrappers and never touches the
//! underlying crates directly.

mod kdf;
mod keys;
mod mac;
mod random;
mod stream;

pub use kdf::{derive_intro_keys, derive_session_keys, SymmetricKey};
pub use keys::{EphemeralKeypair, IdentityKeypair, PublicKey, SharedSecret};
pub use mac::{Digest, MacKey};
pub use random::SecureRandom;
pub use stream::{BulkKey, Iv};

/// Size of a MAC digest in bytes (BLAKE2s-256).
pub const MAC_DIGEST_LEN: usize = 32;

/// Size of a MAC key in bytes.
pub const MAC_KEY_LEN: usize = 32;

/// Size of a bulk (stream cipher) key in bytes.
pub const BULK_KEY_LEN: usize = 32;

/// Size of a bulk cipher IV in bytes (XChaCha20 nonce).
pub const BULK_IV_LEN: usize = 24;

/// Size of an X25519 public key in bytes.
pub const ECDH_PUBLIC_KEY_LEN: usize = 32;

/// Size of an X25519 shared secret in bytes.
pub const ECDH_SECRET_LEN: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_key_exchange_and_envelope_keys() {
        // Responder generates a long-term identity (done once)
        let responder = IdentityKeypair::generate();
        let responder_public = responder.public();

        // Initiator generates an ephemeral keypair (per session)
        let initiator = EphemeralKeypair::generate();
        let initiator_public = initiator.public();

        // Both sides compute the raw shared secret
        let initiator_shared = initiator.diffie_hellman(&responder_public).unwrap();
        let responder_shared = responder.diffie_hellman(&initiator_public).unwrap();

        assert_eq!(initiator_shared.as_bytes(), responder_shared.as_bytes());

        // Derive directional key pairs from the shared secret
        let (a_first, a_second) = derive_session_keys(initiator_shared.as_bytes());
        let (b_first, b_second) = derive_session_keys(responder_shared.as_bytes());

        assert_eq!(a_first.mac.as_bytes(), b_first.mac.as_bytes());
        assert_eq!(a_second.bulk.as_bytes(), b_second.bulk.as_bytes());

        // The two directions must not share key material
        assert_ne!(a_first.mac.as_bytes(), a_second.mac.as_bytes());
        assert_ne!(a_first.bulk.as_bytes(), a_second.bulk.as_bytes());
    }

    #[test]
    fn test_mac_and_stream_interoperate() {
        let key = SymmetricKey::random();
        let iv = Iv::random();

        let mut data = *b"attack at dawn..";
        key.bulk.apply(&iv, &mut data);
        assert_ne!(&data, b"attack at dawn..");

        let tag = key.mac.digest(&data);
        assert!(tag.ct_eq(tag.as_bytes()));

        key.bulk.apply(&iv, &mut data);
        assert_eq!(&data, b"attack at dawn..");
    }
}
