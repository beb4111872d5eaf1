//! # Lightweight Obfuscated Datagram Protocol (LODP)
//!
//! A connection-oriented, authenticated, encrypted datagram protocol that
//! rides on top of an unreliable datagram substrate (conceptually UDP). This
//! crate implements the packet processing engine: framing, the
//! encrypt-then-MAC envelope, the DoS-resistant three-way handshake with
//! stateless cookies, the modified ntor key agreement, and the per-session
//! state machine.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Host (sockets, timers, lookup)             │
//! ├─────────────────────────────────────────────────────────┤
//! │  Endpoint (identity, intro keys, cookie jar, dispatch)  │
//! ├─────────────────────────────────────────────────────────┤
//! │  Session state machine (INIT → HANDSHAKE → ESTABLISHED) │
//! ├─────────────────────────────────────────────────────────┤
//! │  Envelope (encrypt-then-MAC over the common header)     │
//! ├─────────────────────────────────────────────────────────┤
//! │  Crypto Layer (X25519, BLAKE2s-256, XChaCha20, HKDF)    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine performs no I/O of its own. The host feeds incoming datagrams
//! to [`Endpoint::on_packet`] together with the session it looked up by peer
//! address, and receives outgoing datagrams through the [`Handler::sendto`]
//! hook. One packet is processed to completion before the next; nothing in
//! the engine blocks or suspends.
//!
//! ## Design Goals
//!
//! 1. **Unobservability**: every byte on the wire is either a MAC tag, a
//!    random IV, or stream-cipher output; passive observers see uniformly
//!    random datagrams, optionally length-shaped by the padding hook
//! 2. **DoS resistance**: a responder keeps zero per-flow state between
//!    INIT and HANDSHAKE thanks to stateless cookies
//! 3. **Forward secrecy**: per-session ephemeral X25519 keys, with all
//!    handshake material scrubbed once it is no longer needed

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod buffer;
pub mod cookie;
pub mod crypto;
mod dispatch;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod ntor;
pub mod packet;
pub mod ratelimit;
pub mod session;

pub use endpoint::{Endpoint, EndpointConfig, Handler};
pub use error::{Error, Result};
pub use packet::PacketType;
pub use session::{Role, Session, SessionState};

/// Maximum size in bytes of any datagram the engine will produce or accept.
///
/// Chosen to fit within the IPv6 minimum MTU with room for lower-layer
/// headers; comfortably larger than the largest handshake packet.
pub const LODP_MSS: usize = 1280;
