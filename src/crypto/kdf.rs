//! Key derivation.
//!
//! HKDF-SHA256 expands shared material into symmetric key pairs: the two
//! directional session key pairs after a completed ntor handshake, and the
//! introduction key pair an endpoint derives from its long-term public key
//! so that any initiator who knows that key can compute the same pair.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{BulkKey, MacKey, PublicKey, BULK_KEY_LEN, MAC_KEY_LEN};

const SESSION_SALT: &[u8] = b"lodp-kdf-session";
const INTRO_SALT: &[u8] = b"lodp-kdf-intro";

/// A symmetric key pair: one MAC key and one bulk encryption key.
///
/// Every envelope operation takes one of these; which pair is "right"
/// depends on direction and handshake phase. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    /// Key authenticating the packet envelope.
    pub mac: MacKey,
    /// Key encrypting the packet body.
    pub bulk: BulkKey,
}

impl SymmetricKey {
    /// Generate a fresh random key pair.
    pub fn random() -> Self {
        Self {
            mac: MacKey::random(),
            bulk: BulkKey::random(),
        }
    }

    /// Assemble a key pair from its two halves.
    pub fn from_parts(mac: [u8; MAC_KEY_LEN], bulk: [u8; BULK_KEY_LEN]) -> Self {
        Self {
            mac: MacKey::from_bytes(mac),
            bulk: BulkKey::from_bytes(bulk),
        }
    }

    /// Assemble a key pair from its wire representation: the MAC key
    /// immediately followed by the bulk key, as carried in INIT and
    /// HANDSHAKE bodies.
    pub fn from_wire(bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), MAC_KEY_LEN + BULK_KEY_LEN);
        let mut mac = [0u8; MAC_KEY_LEN];
        let mut bulk = [0u8; BULK_KEY_LEN];
        mac.copy_from_slice(&bytes[..MAC_KEY_LEN]);
        bulk.copy_from_slice(&bytes[MAC_KEY_LEN..MAC_KEY_LEN + BULK_KEY_LEN]);
        Self::from_parts(mac, bulk)
    }
}

/// Derive the two directional session key pairs from a shared secret.
///
/// Returns `(first, second)`. The initiator binds `tx = first, rx = second`;
/// the responder reverses the assignment, so both peers agree on which key
/// decrypts which direction.
pub fn derive_session_keys(secret: &[u8]) -> (SymmetricKey, SymmetricKey) {
    let hkdf = Hkdf::<Sha256>::new(Some(SESSION_SALT), secret);
    (
        expand_key(&hkdf, b"initiator"),
        expand_key(&hkdf, b"responder"),
    )
}

/// Derive an endpoint's introduction key pair from its long-term public key.
///
/// Deterministic: an initiator that learned the responder's public key out
/// of band computes the identical pair and can seal INIT and HANDSHAKE
/// packets the responder will accept before any session exists.
pub fn derive_intro_keys(public: &PublicKey) -> SymmetricKey {
    let hkdf = Hkdf::<Sha256>::new(Some(INTRO_SALT), public.as_bytes());
    expand_key(&hkdf, b"intro")
}

fn expand_key(hkdf: &Hkdf<Sha256>, info: &[u8]) -> SymmetricKey {
    let mut okm = zeroize::Zeroizing::new([0u8; MAC_KEY_LEN + BULK_KEY_LEN]);
    // Expansion only fails for outputs longer than 255 blocks
    hkdf.expand(info, &mut okm[..])
        .expect("okm length is valid for HKDF-SHA256");
    SymmetricKey::from_wire(&okm[..])
}
