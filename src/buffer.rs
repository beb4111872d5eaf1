//! Fixed-size scratch buffers for packet processing.
//!
//! Every packet operation works on a [`PacketBuffer`]: a pair of same-sized
//! regions, one holding plaintext and one ciphertext, each large enough for
//! a maximum-sized packet. The envelope always writes into the opposite
//! region from the one it reads, so neither side is ever half-transformed.
//!
//! Buffers come from a [`BufferPool`] of fixed depth; exhaustion is the
//! `NoBufs` condition the rest of the engine reports. A buffer is acquired
//! and released strictly around one packet operation and is wiped on
//! release, so key material copied through it never outlives the call.

use zeroize::Zeroize;

use crate::LODP_MSS;

/// A two-sided scratch buffer for one packet.
pub struct PacketBuffer {
    plaintext: Box<[u8; LODP_MSS]>,
    ciphertext: Box<[u8; LODP_MSS]>,
    len: usize,
}

impl PacketBuffer {
    /// Allocate a fresh zeroed buffer.
    pub fn new() -> Self {
        Self {
            plaintext: Box::new([0u8; LODP_MSS]),
            ciphertext: Box::new([0u8; LODP_MSS]),
            len: 0,
        }
    }

    /// Current packet length in bytes. Both regions share it.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer currently holds no packet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the packet length.
    ///
    /// Panics if `len` exceeds the maximum segment size; senders check
    /// payload sizes before building a packet.
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= LODP_MSS);
        self.len = len;
    }

    /// The plaintext region, up to the packet length.
    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext[..self.len]
    }

    /// Mutable plaintext region, up to the packet length.
    pub fn plaintext_mut(&mut self) -> &mut [u8] {
        &mut self.plaintext[..self.len]
    }

    /// The ciphertext region, up to the packet length.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext[..self.len]
    }

    /// Mutable ciphertext region, up to the packet length.
    pub fn ciphertext_mut(&mut self) -> &mut [u8] {
        &mut self.ciphertext[..self.len]
    }

    /// Both regions at once, for transforms that read one side and write
    /// the other.
    pub fn split_mut(&mut self) -> (&mut [u8], &mut [u8]) {
        (
            &mut self.plaintext[..self.len],
            &mut self.ciphertext[..self.len],
        )
    }

    /// Copy an incoming datagram into the ciphertext region.
    ///
    /// Panics if the datagram exceeds the maximum segment size; the
    /// dispatcher bounds-checks before loading.
    pub fn load(&mut self, datagram: &[u8]) {
        assert!(datagram.len() <= LODP_MSS);
        self.len = datagram.len();
        self.ciphertext[..self.len].copy_from_slice(datagram);
    }

    fn wipe(&mut self) {
        self.plaintext.zeroize();
        self.ciphertext.zeroize();
        self.len = 0;
    }
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// A pool of packet buffers with a fixed depth.
pub struct BufferPool {
    free: Vec<PacketBuffer>,
}

impl BufferPool {
    /// Create a pool holding `depth` buffers.
    pub fn new(depth: usize) -> Self {
        Self {
            free: (0..depth).map(|_| PacketBuffer::new()).collect(),
        }
    }

    /// Take a buffer from the pool, or `None` if it is exhausted.
    pub fn acquire(&mut self) -> Option<PacketBuffer> {
        self.free.pop()
    }

    /// Wipe a buffer and return it to the pool.
    pub fn release(&mut self, mut buf: PacketBuffer) {
        buf.wipe();
        self.free.push(buf);
    }

    /// Number of buffers currently available.
    pub fn available(&self) -> usize {
        self.free.len()
    }
}
