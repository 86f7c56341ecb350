// src/load_balancer/ring.rs
//! Immutable hash ring with virtual nodes.
//!
//! A ring is built once from a set of `(id, weight)` members and never
//! mutated afterwards; topology changes produce a new ring that replaces the
//! old one wholesale. Each member owns `weight × virtual_nodes` positions,
//! labelled `{id}{separator}{i}` and hashed with xxh3. Members are sorted by
//! id before building, so the ring depends only on the member set and not on
//! the order it was supplied in.
//!
//! Two labels hashing to the same position are resolved by keeping the
//! lexicographically smaller label, so identical inputs always give
//! identical rings.

use crate::load_balancer::hash::{hash_key, hash_member};
use crate::registry::Server;
use serde::Serialize;
use std::sync::Arc;

/// Order-independent summary of a member set (ids and weights).
///
/// Combines per-member hashes with commutative operations, so any
/// permutation of the same servers yields the same fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    count: usize,
    sum: u64,
    xor: u64,
}

impl Fingerprint {
    pub const EMPTY: Fingerprint = Fingerprint {
        count: 0,
        sum: 0,
        xor: 0,
    };

    pub fn of(servers: &[Arc<Server>]) -> Self {
        servers
            .iter()
            .fold(Self::EMPTY, |fp, s| fp.with(s.id(), s.weight()))
    }

    fn with(self, id: &str, weight: u32) -> Self {
        let h = hash_member(id, weight);
        Self {
            count: self.count + 1,
            sum: self.sum.wrapping_add(h),
            xor: self.xor ^ h,
        }
    }
}

/// One `(hash, server)` position in a ring dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RingEntry {
    pub hash: u64,
    pub server: String,
}

#[derive(Debug)]
pub struct HashRing {
    fingerprint: Fingerprint,
    /// Sorted ascending, unique.
    positions: Vec<u64>,
    /// `owners[i]` is the member slot owning `positions[i]`.
    owners: Vec<u32>,
    /// Member ids, sorted; a member's slot is its index here.
    members: Vec<Arc<str>>,
}

impl HashRing {
    pub fn empty() -> Self {
        Self {
            fingerprint: Fingerprint::EMPTY,
            positions: Vec::new(),
            owners: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn build(servers: &[Arc<Server>], virtual_nodes: u32, separator: &str) -> Self {
        let mut members: Vec<(&str, u32)> = servers.iter().map(|s| (s.id(), s.weight())).collect();
        members.sort_unstable();
        members.dedup_by(|a, b| a.0 == b.0);

        let virtual_nodes = u64::from(virtual_nodes.max(1));
        let total: u64 = members
            .iter()
            .map(|(_, weight)| u64::from(*weight) * virtual_nodes)
            .sum();

        let mut labelled: Vec<(u64, String, u32)> = Vec::with_capacity(total as usize);
        for (slot, (id, weight)) in members.iter().enumerate() {
            for i in 0..u64::from(*weight) * virtual_nodes {
                let label = format!("{}{}{}", id, separator, i);
                labelled.push((hash_key(&label), label, slot as u32));
            }
        }

        labelled.sort_unstable_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        labelled.dedup_by_key(|entry| entry.0);

        let (positions, owners) = labelled.into_iter().map(|(hash, _, slot)| (hash, slot)).unzip();

        Self {
            fingerprint: Fingerprint::of(servers),
            positions,
            owners,
            members: members.into_iter().map(|(id, _)| Arc::from(id)).collect(),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Number of positions on the ring.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn member(&self, slot: usize) -> Option<&str> {
        self.members.get(slot).map(|id| &**id)
    }

    /// Slot of a member id, if it is on this ring.
    pub fn slot_of(&self, id: &str) -> Option<usize> {
        self.members.binary_search_by(|m| (**m).cmp(id)).ok()
    }

    /// Index of the first position at or clockwise after `hash`, wrapping.
    fn successor(&self, hash: u64) -> usize {
        let index = self.positions.partition_point(|&p| p < hash);
        if index == self.positions.len() {
            0
        } else {
            index
        }
    }

    /// Owner slots of every position, walking clockwise from `hash`'s
    /// successor once around the ring.
    pub fn walk(&self, hash: u64) -> impl Iterator<Item = usize> + '_ {
        let len = self.positions.len();
        let start = if len == 0 { 0 } else { self.successor(hash) };
        (0..len).map(move |step| self.owners[(start + step) % len] as usize)
    }

    /// The ring as ordered `(hash, server)` pairs.
    pub fn entries(&self) -> Vec<RingEntry> {
        self.positions
            .iter()
            .zip(&self.owners)
            .map(|(&hash, &slot)| RingEntry {
                hash,
                server: self.members[slot as usize].to_string(),
            })
            .collect()
    }
}
