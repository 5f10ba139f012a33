//! Hash indexes
//!
//! Key -> record mapping realized as a sequence of open-addressing table
//! generations of geometrically increasing capacity. Two variants share
//! the growth mechanism but differ on purpose:
//!
//! - [`GrowableHashIndex`]: probes with wraparound inside each generation,
//!   accelerated by per-generation bloom counter segments and an LRU
//!   position cache.
//! - [`CompactHashIndex`]: stores `{hash, key, address}` triples directly
//!   and clamps its probe range at the generation capacity (no
//!   wraparound); values live in a separate growable array reached
//!   through `address`. No bloom or cache layer.
//!
//! Keys are hashed over their canonical string form with a seeded 32-bit
//! xxHash; a distinct seed drives bloom bucketing.

mod bloom;
mod compact;
mod hash;

pub use bloom::BloomSegments;
pub use compact::CompactHashIndex;
pub use hash::GrowableHashIndex;

use xxhash_rust::xxh32::xxh32;

/// Capacity of the generation-id table of one hash index
pub const MAX_GENERATIONS: usize = 32;

/// Lookup strategy, fixed at construction from the index configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStrategy {
    /// Probe every generation
    PlainProbe,
    /// Consult the generation's bloom segment before probing
    BloomFilteredProbe,
}

/// Seeded 32-bit hash of a key's canonical string form
pub(crate) fn hash_key(key: &str, seed: u32) -> u32 {
    xxh32(key.as_bytes(), seed)
}
