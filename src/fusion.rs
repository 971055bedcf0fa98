//! Fusion node: O(1) predecessor search over at most 8 keys.
//!
//! The keys are viewed as leaves of a compressed binary trie. Only the bit
//! positions where the trie branches matter for navigation, and there are at
//! most 7 of them, so every key compresses to a sketch of at most 7 bits that
//! fits into one byte. The node keeps one byte per key in each of two words:
//!
//! - `branch`: the key's sketch restricted to the trie nodes on its path.
//! - `free`: the sketch bits of trie nodes *not* on its path.
//!
//! A query sketch is broadcast to all 8 bytes and compared against every key
//! at once. Exactly one key agrees with the query at every node of its own
//! path: the leaf that a blind descent through the trie reaches. That leaf
//! shares the longest common prefix with the query among all keys, which is
//! enough to pin down the exact predecessor with one more word-parallel match.

use crate::bits::{low_mask, msb, pcmpgtub, pext};
use crate::error::{Error, Result};
use crate::{Predecessor, QueryResult};

// =============================================================================
// Configuration
// =============================================================================

/// Maximum number of keys in a fusion node (one sketch byte per key).
pub const MAX_KEYS: usize = 8;

const BROADCAST: u64 = 0x0101_0101_0101_0101;

// Sketches never use the high bit of a byte, so a branch byte of 0x80 with no
// free bits can never match.
const UNUSED_BRANCH: u64 = 0x80 * BROADCAST;

// =============================================================================
// FusionNode
// =============================================================================

/// A compressed trie answering predecessor queries over up to [`MAX_KEYS`]
/// ascending keys in constant time.
///
/// The node keeps a copy of its keys for [`FusionNode::predecessor`]. The
/// derived words (`mask`, `branch`, `free`) only describe the trie shape, so
/// [`FusionNode::predecessor_in`] can answer against any key array that was
/// built from the same keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FusionNode {
    keys: [u64; MAX_KEYS],
    len: u8,
    mask: u64,
    branch: u64,
    free: u64,
}

impl FusionNode {
    /// Creates an empty node. Every query on it reports not found.
    pub const fn empty() -> Self {
        Self {
            keys: [0; MAX_KEYS],
            len: 0,
            mask: 0,
            branch: UNUSED_BRANCH,
            free: 0,
        }
    }

    /// Builds a node for `keys`, which must be strictly ascending and hold at
    /// most [`MAX_KEYS`] entries.
    pub fn new(keys: &[u64]) -> Result<Self> {
        if keys.len() > MAX_KEYS {
            return Err(Error::CapacityExceeded {
                len: keys.len(),
                max: MAX_KEYS,
            });
        }
        if let Some(i) = keys.windows(2).position(|w| w[0] >= w[1]) {
            return Err(Error::NotAscending { index: i + 1 });
        }

        // For sorted keys the trie's branching bits are exactly the highest
        // differing bits of adjacent pairs.
        let mask = keys
            .windows(2)
            .fold(0u64, |m, w| m | (1u64 << msb(w[0] ^ w[1])));

        let mut paths = [0u64; MAX_KEYS];
        mark_paths(keys, &mut paths[..keys.len()]);

        let sketch_bits = low_mask(mask.count_ones());
        let mut branch = UNUSED_BRANCH;
        let mut free = 0u64;
        for (i, &key) in keys.iter().enumerate() {
            let shift = 8 * i;
            let path = pext(paths[i], mask);
            branch &= !(0xFFu64 << shift);
            branch |= (pext(key, mask) & path) << shift;
            free |= (sketch_bits & !path) << shift;
        }

        let mut stored = [0u64; MAX_KEYS];
        stored[..keys.len()].copy_from_slice(keys);

        Ok(Self {
            keys: stored,
            len: keys.len() as u8,
            mask,
            branch,
            free,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The keys the node was built from.
    #[inline]
    pub fn keys(&self) -> &[u64] {
        &self.keys[..self.len()]
    }

    /// Bit positions where the trie branches.
    #[inline]
    pub fn mask(&self) -> u64 {
        self.mask
    }

    /// Per-key sketch bits on the key's trie path, one byte per key.
    #[inline]
    pub fn branch(&self) -> u64 {
        self.branch
    }

    /// Per-key sketch bits off the key's trie path, one byte per key.
    #[inline]
    pub fn free(&self) -> u64 {
        self.free
    }

    /// Rank of the largest stored key `<= x`.
    #[inline]
    pub fn predecessor(&self, x: u64) -> QueryResult {
        self.predecessor_in(&self.keys, x)
    }

    /// Rank of the largest key `<= x` in `keys`, which must be the keys (or an
    /// identical copy of the keys) this node was built from. An array shorter
    /// than the node reports not found.
    pub fn predecessor_in(&self, keys: &[u64], x: u64) -> QueryResult {
        if self.len == 0 || keys.len() < self.len() {
            return QueryResult::NOT_FOUND;
        }

        let q = pext(x, self.mask);
        let i = self.match_sketch(q);
        let y = keys[i];
        if x == y {
            return QueryResult::found(i as u64);
        }

        // All keys sharing x's bits above `j` agree with each other at bit `j`
        // and disagree with x there, so x lies entirely above or below them.
        // Descending with all-ones (or all-zeros) below `j` lands on the
        // largest (or smallest) of them.
        let j = msb(x ^ y);
        let below = pext(low_mask(j), self.mask);
        if (x >> j) & 1 == 1 {
            let r = self.match_sketch(q | below);
            QueryResult::found(r as u64)
        } else {
            match self.match_sketch(q & !below) {
                0 => QueryResult::NOT_FOUND,
                r => QueryResult::found(r as u64 - 1),
            }
        }
    }

    /// Index of the key whose trie path agrees with sketch `q` at every node.
    #[inline]
    fn match_sketch(&self, q: u64) -> usize {
        let diff = ((q * BROADCAST) | self.free) ^ (self.branch | self.free);
        let mismatch = pcmpgtub(diff, 0);
        let i = ((!mismatch).trailing_zeros() / 8) as usize;
        debug_assert!(i < self.len(), "no key matched sketch {q:#x}");
        i.min(self.len() - 1)
    }
}

/// Marks, for each key, the branching bits of the trie nodes on its path.
fn mark_paths(keys: &[u64], paths: &mut [u64]) {
    if keys.len() < 2 {
        return;
    }
    let bit = msb(keys[0] ^ keys[keys.len() - 1]);
    let split = keys.partition_point(|&k| (k >> bit) & 1 == 0);
    for p in paths.iter_mut() {
        *p |= 1u64 << bit;
    }
    let (lo, hi) = paths.split_at_mut(split);
    mark_paths(&keys[..split], lo);
    mark_paths(&keys[split..], hi);
}

impl Default for FusionNode {
    fn default() -> Self {
        Self::empty()
    }
}

impl Predecessor for FusionNode {
    #[inline]
    fn predecessor(&self, x: u64) -> QueryResult {
        FusionNode::predecessor(self, x)
    }
}
