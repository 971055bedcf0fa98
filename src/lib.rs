//! # pred-rs
//!
//! Predecessor search structures over machine-word keys: given a set of keys,
//! find the largest stored key `<= x`.
//!
//! - [`FusionNode`]: static, at most 8 keys, O(1) queries through
//!   word-parallel comparison of compressed key sketches.
//! - [`DynamicIndex`]: growable index over a 40-bit universe, built from a
//!   sparse top-level array over high-order bits and a chain of buckets over
//!   low-order bits.
//! - [`BinarySearch`]: the sorted-array baseline.
//!
//! All of them implement [`Predecessor`], so they can be swapped freely.
//!
//! ## Example
//!
//! ```rust
//! use pred_rs::{BitsetIndex, FusionNode, QueryResult};
//!
//! let node = FusionNode::new(&[10, 20, 30]).unwrap();
//! assert_eq!(node.predecessor(25), QueryResult::found(1));
//! assert!(!node.predecessor(5).found);
//!
//! let mut index = BitsetIndex::<8>::new();
//! for key in [5, 300, 1000] {
//!     index.insert(key).unwrap();
//! }
//! assert_eq!(index.predecessor(999), QueryResult::found(300));
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

pub mod binary_search;
pub mod bits;
pub mod dynamic;
pub mod error;
pub mod fusion;

pub use binary_search::BinarySearch;
pub use dynamic::{BitsetBucket, BitsetIndex, Bucket, DynamicIndex, ListBucket, ListIndex};
pub use error::{Error, Result};
pub use fusion::FusionNode;

// =============================================================================
// Query result and shared contract
// =============================================================================

/// Outcome of a predecessor query.
///
/// `position` is only meaningful when `found` is set. Rank-based structures
/// ([`FusionNode`], [`BinarySearch`]) report the rank of the predecessor,
/// [`DynamicIndex`] reports the key itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueryResult {
    pub found: bool,
    pub position: u64,
}

impl QueryResult {
    pub const NOT_FOUND: QueryResult = QueryResult {
        found: false,
        position: 0,
    };

    #[inline]
    pub const fn found(position: u64) -> Self {
        Self {
            found: true,
            position,
        }
    }

    #[inline]
    pub fn position(self) -> Option<u64> {
        self.found.then_some(self.position)
    }
}

impl From<Option<u64>> for QueryResult {
    #[inline]
    fn from(position: Option<u64>) -> Self {
        position.map_or(Self::NOT_FOUND, Self::found)
    }
}

/// A structure answering predecessor queries.
pub trait Predecessor {
    /// Finds the largest stored key `<= x`.
    fn predecessor(&self, x: u64) -> QueryResult;
}

/// A predecessor structure that can be built up one key at a time.
pub trait DynamicPredecessor: Predecessor + Default {
    fn insert(&mut self, key: u64) -> Result<()>;
}

#[cfg(test)]
mod proptests;
