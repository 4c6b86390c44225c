//! Modulo key sharding for cache clients.
//!
//! Maps a key to a server index with `hash(key) % server_count`. The hash
//! algorithm is a pluggable capability ([`KeyHasher`]); the default is a
//! CRC-32-derived 15-bit hash compatible with classic memcached clients.
//!
//! This is deliberately NOT consistent hashing: changing the server count
//! remaps nearly all keys. Callers that need minimal remapping on topology
//! change want a ketama-style ring instead; modulo sharding trades that
//! property for a trivially predictable, order-dependent mapping.

mod crc32;

pub use crc32::crc32;

/// Capability for hashing a key to an unsigned integer.
///
/// Implementations must be deterministic: equal keys hash equal, on every
/// platform, across every call.
pub trait KeyHasher {
    fn hash(&self, key: &[u8]) -> u32;
}

/// Default hasher: CRC-32 of the key, logically shifted right 16 bits and
/// masked to 15 bits.
///
/// The shift-and-mask keeps the value non-negative on platforms with
/// narrow integer types and matches the distribution used by the original
/// memcached client generation, so keys land on the same servers as those
/// clients would place them.
#[derive(Clone, Copy, Debug, Default)]
pub struct Crc32Hasher;

impl KeyHasher for Crc32Hasher {
    #[inline]
    fn hash(&self, key: &[u8]) -> u32 {
        (crc32(key) >> 16) & 0x7FFF
    }
}

/// Key-to-server-index distributor over an ordered server list.
///
/// The distributor is pure: it holds no server state, only the hash
/// capability. The caller supplies the current server count and receives
/// an index in `0..server_count`.
#[derive(Clone, Debug)]
pub struct Distributor<H = Crc32Hasher> {
    hasher: H,
}

impl Distributor<Crc32Hasher> {
    /// Distributor with the default CRC-32 hasher.
    pub fn new() -> Self {
        Distributor {
            hasher: Crc32Hasher,
        }
    }
}

impl Default for Distributor<Crc32Hasher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: KeyHasher> Distributor<H> {
    /// Distributor with a custom hash algorithm.
    pub fn with_hasher(hasher: H) -> Self {
        Distributor { hasher }
    }

    /// Map `key` to a server index in `0..server_count`.
    ///
    /// # Panics
    ///
    /// Panics if `server_count` is zero.
    #[inline]
    pub fn server_index(&self, key: &[u8], server_count: usize) -> usize {
        assert!(server_count > 0, "server_count must be non-zero");
        if server_count == 1 {
            return 0;
        }
        self.hasher.hash(key) as usize % server_count
    }
}
