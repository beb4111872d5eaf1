//! The modified ntor key agreement.
//!
//! One-way authenticated: the responder proves possession of its long-term
//! key "b", the initiator stays anonymous. Each side combines two X25519
//! exchanges, extracts a shared secret and a verifier with labeled MACs,
//! and expands the secret into the two directional session key pairs.
//!
//! ```text
//! initiator:  s1 = ECDH(x, Y)   s2 = ECDH(x, B)
//! responder:  s1 = ECDH(y, X)   s2 = ECDH(b, X)
//!
//! SecretInput  = s1 || s2 || B || X || Y || PROTOID
//! SharedSecret = MAC(ss_key, SecretInput)
//! Verify       = MAC(verify_key, SecretInput)
//! AuthInput    = Verify || B || Y || X || PROTOID || "Responder"
//! Auth         = MAC(auth_key, AuthInput)
//! ```
//!
//! `Auth` travels in HANDSHAKE_ACK as the verifier; the initiator
//! recomputes it and compares in constant time. The success path is
//! data-oblivious; failure paths may exit early because no indication of
//! failure is ever sent on the wire. All temporaries are wiped on every
//! exit.

use bytes::BufMut;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{
    derive_session_keys, Digest, EphemeralKeypair, IdentityKeypair, MacKey, PublicKey,
    SymmetricKey, ECDH_PUBLIC_KEY_LEN, ECDH_SECRET_LEN,
};
use crate::error::Result;
use crate::session::Role;

const PROTOID: &[u8] = b"lodp-ntor-1";
const RESPONDER: &[u8] = b"Responder";

const SS_KEY: MacKey = MacKey::from_label(b"lodp-ntor-1:key_extract");
const VERIFY_KEY: MacKey = MacKey::from_label(b"lodp-ntor-1:key_expand");
const AUTH_KEY: MacKey = MacKey::from_label(b"lodp-ntor-1:mac");

const SECRET_INPUT_LEN: usize =
    2 * ECDH_SECRET_LEN + 3 * ECDH_PUBLIC_KEY_LEN + PROTOID.len();
const AUTH_INPUT_LEN: usize =
    ECDH_SECRET_LEN + 3 * ECDH_PUBLIC_KEY_LEN + PROTOID.len() + RESPONDER.len();

/// The MAC-extracted shared secret, sized to one ECDH secret.
///
/// Cached on responder sessions until the first peer DATA packet so a lost
/// HANDSHAKE_ACK can be retransmitted without redoing the agreement.
/// Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionSecret([u8; ECDH_SECRET_LEN]);

impl SessionSecret {
    /// Get the raw secret bytes.
    pub fn as_bytes(&self) -> &[u8; ECDH_SECRET_LEN] {
        &self.0
    }
}

/// Everything a completed agreement yields.
pub struct NtorOutput {
    /// The extracted shared secret.
    pub secret: SessionSecret,
    /// The verifier transmitted (responder) or recomputed (initiator).
    pub verifier: Digest,
    /// Key pair for traffic this side transmits.
    pub tx_key: SymmetricKey,
    /// Key pair for traffic this side receives.
    pub rx_key: SymmetricKey,
}

impl std::fmt::Debug for NtorOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtorOutput")
            .field("secret", &"<redacted>")
            .field("verifier", &self.verifier)
            .field("tx_key", &"<redacted>")
            .field("rx_key", &"<redacted>")
            .finish()
    }
}

/// Complete the initiator side: `x` is ours, `Y` arrived in HANDSHAKE_ACK,
/// `B` is the responder's long-term key we dialed.
pub fn initiate(
    ephemeral: &EphemeralKeypair,
    remote_static: &PublicKey,
    responder_public: &PublicKey,
) -> Result<NtorOutput> {
    let s1 = ephemeral.diffie_hellman(responder_public)?;
    let s2 = ephemeral.diffie_hellman(remote_static)?;
    Ok(finish(
        Role::Initiator,
        s1.as_bytes(),
        s2.as_bytes(),
        remote_static,
        &ephemeral.public(),
        responder_public,
    ))
}

/// Complete the responder side: `y` is ours, `X` arrived in HANDSHAKE,
/// `b`/`B` is our endpoint identity.
pub fn respond(
    ephemeral: &EphemeralKeypair,
    identity: &IdentityKeypair,
    initiator_public: &PublicKey,
) -> Result<NtorOutput> {
    let s1 = ephemeral.diffie_hellman(initiator_public)?;
    let s2 = identity.diffie_hellman(initiator_public)?;
    Ok(finish(
        Role::Responder,
        s1.as_bytes(),
        s2.as_bytes(),
        &identity.public(),
        initiator_public,
        &ephemeral.public(),
    ))
}

fn finish(
    role: Role,
    s1: &[u8; ECDH_SECRET_LEN],
    s2: &[u8; ECDH_SECRET_LEN],
    b: &PublicKey,
    x: &PublicKey,
    y: &PublicKey,
) -> NtorOutput {
    let mut secret_input = Zeroizing::new([0u8; SECRET_INPUT_LEN]);
    {
        let mut w = &mut secret_input[..];
        w.put_slice(s1);
        w.put_slice(s2);
        w.put_slice(b.as_bytes());
        w.put_slice(x.as_bytes());
        w.put_slice(y.as_bytes());
        w.put_slice(PROTOID);
    }

    let secret = SessionSecret(*SS_KEY.digest(&secret_input[..]).as_bytes());
    let verify = Zeroizing::new(VERIFY_KEY.digest(&secret_input[..]));

    let mut auth_input = Zeroizing::new([0u8; AUTH_INPUT_LEN]);
    {
        let mut w = &mut auth_input[..];
        w.put_slice(verify.as_bytes());
        w.put_slice(b.as_bytes());
        w.put_slice(y.as_bytes());
        w.put_slice(x.as_bytes());
        w.put_slice(PROTOID);
        w.put_slice(RESPONDER);
    }
    let verifier = AUTH_KEY.digest(&auth_input[..]);

    let (first, second) = derive_session_keys(secret.as_bytes());
    let (tx_key, rx_key) = match role {
        Role::Initiator => (first, second),
        Role::Responder => (second, first),
    };

    NtorOutput {
        secret,
        verifier,
        tx_key,
        rx_key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_both_sides_agree() {
        let identity = IdentityKeypair::generate();
        let x = EphemeralKeypair::generate();
        let y = EphemeralKeypair::generate();

        let responder = respond(&y, &identity, &x.public()).unwrap();
        let initiator = initiate(&x, &identity.public(), &y.public()).unwrap();

        assert_eq!(initiator.secret.as_bytes(), responder.secret.as_bytes());
        assert_eq!(initiator.verifier, responder.verifier);

        // Keys are mirrored across the two roles
        assert_eq!(
            initiator.tx_key.mac.as_bytes(),
            responder.rx_key.mac.as_bytes()
        );
        assert_eq!(
            initiator.rx_key.bulk.as_bytes(),
            responder.tx_key.bulk.as_bytes()
        );

        // And the two directions do not share material
        assert_ne!(
            initiator.tx_key.mac.as_bytes(),
            initiator.rx_key.mac.as_bytes()
        );
    }

    #[test]
    fn test_wrong_identity_diverges() {
        let real = IdentityKeypair::generate();
        let fake = IdentityKeypair::generate();
        let x = EphemeralKeypair::generate();
        let y = EphemeralKeypair::generate();

        let responder = respond(&y, &real, &x.public()).unwrap();
        // An initiator dialing the wrong long-term key must not converge.
        let initiator = initiate(&x, &fake.public(), &y.public()).unwrap();

        assert_ne!(initiator.verifier, responder.verifier);
        assert_ne!(initiator.secret.as_bytes(), responder.secret.as_bytes());
    }

    #[test]
    fn test_low_order_peer_point_aborts() {
        let identity = IdentityKeypair::generate();
        let x = EphemeralKeypair::generate();
        let y = EphemeralKeypair::generate();

        let zero = PublicKey::from_bytes([0u8; ECDH_PUBLIC_KEY_LEN]);

        assert_eq!(
            initiate(&x, &identity.public(), &zero).unwrap_err(),
            Error::BadHandshake
        );
        assert_eq!(
            respond(&y, &identity, &zero).unwrap_err(),
            Error::BadHandshake
        );
    }

    #[test]
    fn test_verifier_binds_all_public_keys() {
        let identity = IdentityKeypair::generate();
        let x = EphemeralKeypair::generate();
        let y1 = EphemeralKeypair::generate();
        let y2 = EphemeralKeypair::generate();

        let a = initiate(&x, &identity.public(), &y1.public()).unwrap();
        let b = initiate(&x, &identity.public(), &y2.public()).unwrap();

        assert_ne!(a.verifier, b.verifier);
    }
}
