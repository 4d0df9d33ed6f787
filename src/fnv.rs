//! Streaming FNV-1a/32 checksum.
//!
//! Every payload in a stream is checksummed with 32-bit FNV-1a as it is
//! copied to disk, and verified the same way on the read path. The algorithm
//! is part of the on-disk format, so it is implemented here rather than
//! behind a hashing facade: for each input byte, XOR it into the state and
//! multiply by the FNV prime.

/// FNV-1a/32 offset basis.
const OFFSET_BASIS: u32 = 0x811C_9DC5;

/// FNV-1a/32 prime.
const PRIME: u32 = 0x0100_0193;

/// Incremental FNV-1a/32 accumulator.
///
/// Feed payload chunks with [`update`](Fnv1a32::update) in any split; the
/// digest depends only on the concatenated bytes.
#[derive(Debug, Clone, Copy)]
pub struct Fnv1a32 {
    state: u32,
}

impl Fnv1a32 {
    /// Create an accumulator seeded with the FNV offset basis.
    pub fn new() -> Fnv1a32 {
        Fnv1a32 {
            state: OFFSET_BASIS,
        }
    }

    /// Absorb a chunk of bytes.
    pub fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.state ^= u32::from(b);
            self.state = self.state.wrapping_mul(PRIME);
        }
    }

    /// The digest of everything absorbed so far.
    pub fn digest(&self) -> u32 {
        self.state
    }
}

impl Default for Fnv1a32 {
    fn default() -> Fnv1a32 {
        Fnv1a32::new()
    }
}

/// One-shot FNV-1a/32 of a byte slice.
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hasher = Fnv1a32::new();
    hasher.update(bytes);
    hasher.digest()
}
