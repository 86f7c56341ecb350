// src/load_balancer/hash.rs
//! Hash functions shared by the key-hash strategy and the ring.
//!
//! Everything goes through xxh3 so that placements are stable across
//! processes, platforms and restarts (unlike `std`'s randomly seeded hasher).

use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};

/// Hash a request key or a virtual-node label onto the 64-bit ring.
#[inline]
pub fn hash_key(key: &str) -> u64 {
    xxh3_64(key.as_bytes())
}

/// Hash one `(id, weight)` ring member for fingerprinting.
#[inline]
pub(crate) fn hash_member(id: &str, weight: u32) -> u64 {
    xxh3_64_with_seed(id.as_bytes(), u64::from(weight))
}
