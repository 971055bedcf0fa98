//! Baseline predecessor search over a sorted key array.

use crate::error::{Error, Result};
use crate::{DynamicPredecessor, Predecessor, QueryResult};

/// Predecessor search by binary search over an ascending `Vec<u64>`.
///
/// Positions are ranks into [`keys`](Self::keys). Inserting keeps the array
/// sorted, which costs O(n) per key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BinarySearch {
    keys: Vec<u64>,
}

impl BinarySearch {
    /// Wraps `keys`, which must be ascending (equal neighbours allowed);
    /// fails with [`Error::NotAscending`] otherwise.
    pub fn new(keys: Vec<u64>) -> Result<Self> {
        if let Some(i) = keys.windows(2).position(|w| w[0] > w[1]) {
            return Err(Error::NotAscending { index: i + 1 });
        }
        Ok(Self { keys })
    }

    #[inline]
    pub fn keys(&self) -> &[u64] {
        &self.keys
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn insert(&mut self, key: u64) {
        let at = self.keys.partition_point(|&k| k <= key);
        self.keys.insert(at, key);
    }

    /// Rank of the last key `<= x`.
    pub fn predecessor(&self, x: u64) -> QueryResult {
        match self.keys.partition_point(|&k| k <= x) {
            0 => QueryResult::NOT_FOUND,
            n => QueryResult::found(n as u64 - 1),
        }
    }
}

impl Predecessor for BinarySearch {
    #[inline]
    fn predecessor(&self, x: u64) -> QueryResult {
        BinarySearch::predecessor(self, x)
    }
}

impl DynamicPredecessor for BinarySearch {
    #[inline]
    fn insert(&mut self, key: u64) -> Result<()> {
        BinarySearch::insert(self, key);
        Ok(())
    }
}
