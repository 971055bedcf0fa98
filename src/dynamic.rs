//! Dynamic predecessor index over a 40-bit key universe.
//!
//! A key is split into a high-order prefix (`40 - S` bits) and a low-order
//! suffix (`S` bits). Every prefix that holds at least one key owns a bucket
//! storing the suffixes. Buckets form a chain in ascending prefix order and
//! each caches `prev_pred`, the largest key below its prefix range, so a query
//! that misses inside a bucket is answered without walking the chain.
//!
//! The top-level array has one slot per prefix up to the prefix of the
//! maximum. A slot names the bucket with the largest prefix `<=` the slot,
//! which is either the exact bucket or a "jump" entry to the nearest bucket
//! below. Slots under the prefix of the minimum stay empty.

use log::trace;

use crate::bits::low_mask;
use crate::error::{Error, Result};
use crate::{DynamicPredecessor, Predecessor, QueryResult};

// =============================================================================
// Configuration
// =============================================================================

/// Width of the key universe in bits. Keys must be `< 2^UNIVERSE_BITS`.
pub const UNIVERSE_BITS: u32 = 40;

/// Sampling width of [`BitsetIndex`] and [`ListIndex`] when none is given.
pub const DEFAULT_SAMPLING: u32 = 8;

// One value is reserved for `BucketRef::NULL`.
const MAX_BUCKETS: usize = u32::MAX as usize;

// =============================================================================
// Buckets
// =============================================================================

/// Storage for the suffixes of one prefix.
pub trait Bucket: Sized {
    /// Creates an empty bucket for suffixes of `sampling` bits.
    fn new(sampling: u32) -> Result<Self>;

    /// Adds `suffix`.
    fn set(&mut self, suffix: u64);

    /// Largest stored suffix `<= suffix`.
    fn predecessor_within(&self, suffix: u64) -> Option<u64>;

    /// Heap bytes held by the bucket.
    fn memory_usage(&self) -> usize;
}

/// A bitset with one bit per possible suffix.
///
/// `set` is O(1); `predecessor_within` scans downward word by word, O(2^S / 64)
/// in the worst case. Re-inserting a suffix is idempotent.
#[derive(Clone, Debug)]
pub struct BitsetBucket {
    words: Box<[u64]>,
}

impl Bucket for BitsetBucket {
    fn new(sampling: u32) -> Result<Self> {
        let len = (1usize << sampling).div_ceil(64);
        let mut words = Vec::new();
        words
            .try_reserve_exact(len)
            .map_err(|_| Error::AllocationFailed { bytes: len * 8 })?;
        words.resize(len, 0u64);
        Ok(Self {
            words: words.into_boxed_slice(),
        })
    }

    #[inline]
    fn set(&mut self, suffix: u64) {
        self.words[(suffix / 64) as usize] |= 1u64 << (suffix % 64);
    }

    fn predecessor_within(&self, suffix: u64) -> Option<u64> {
        let top = (suffix / 64) as usize;
        let first = self.words[top] & low_mask((suffix % 64) as u32 + 1);
        if first != 0 {
            return Some(top as u64 * 64 + u64::from(63 - first.leading_zeros()));
        }
        self.words[..top]
            .iter()
            .rposition(|&w| w != 0)
            .map(|i| i as u64 * 64 + u64::from(63 - self.words[i].leading_zeros()))
    }

    fn memory_usage(&self) -> usize {
        self.words.len() * 8
    }
}

/// An unordered list of suffixes in insertion order.
///
/// `set` is amortized O(1); `predecessor_within` is a linear scan over the
/// bucket's entries. Cheaper than [`BitsetBucket`] for sparse prefixes.
/// Re-inserting a suffix appends a duplicate entry.
#[derive(Clone, Debug, Default)]
pub struct ListBucket {
    suffixes: Vec<u64>,
}

impl Bucket for ListBucket {
    fn new(_sampling: u32) -> Result<Self> {
        Ok(Self::default())
    }

    #[inline]
    fn set(&mut self, suffix: u64) {
        self.suffixes.push(suffix);
    }

    fn predecessor_within(&self, suffix: u64) -> Option<u64> {
        self.suffixes.iter().copied().filter(|&s| s <= suffix).max()
    }

    fn memory_usage(&self) -> usize {
        self.suffixes.capacity() * 8
    }
}

// =============================================================================
// Bucket arena
// =============================================================================

/// Index of a bucket in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct BucketRef(u32);

impl BucketRef {
    const NULL: BucketRef = BucketRef(u32::MAX);

    #[inline]
    fn is_null(self) -> bool {
        self == Self::NULL
    }

    #[inline]
    fn idx(self) -> usize {
        debug_assert!(!self.is_null());
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
struct BucketEntry<B> {
    prefix: u64,
    /// Largest key below this bucket's prefix range; `None` for the first bucket.
    prev_pred: Option<u64>,
    next: BucketRef,
    slots: B,
}

// =============================================================================
// DynamicIndex
// =============================================================================

/// Growable predecessor index over keys `< 2^40`.
///
/// `S` is the number of low-order key bits handled by each bucket
/// (`1 <= S <= 39`); `B` picks the bucket representation.
///
/// Duplicates are accepted: [`len`](Self::len) counts every insertion, and
/// queries answer the same as if each key had been inserted once.
///
/// Memory grows with the largest key: the top array holds `prefix(max) + 1`
/// slots of 4 bytes, and every [`BitsetBucket`] takes `2^S` bits. An insert
/// whose allocation cannot be satisfied fails with
/// [`Error::AllocationFailed`] and leaves the index unchanged.
#[derive(Clone, Debug)]
pub struct DynamicIndex<B, const S: u32> {
    top: Vec<BucketRef>,
    buckets: Vec<BucketEntry<B>>,
    first: BucketRef,
    len: usize,
    min: u64,
    max: u64,
}

/// Dynamic index with bitset buckets.
pub type BitsetIndex<const S: u32 = DEFAULT_SAMPLING> = DynamicIndex<BitsetBucket, S>;

/// Dynamic index with list buckets.
pub type ListIndex<const S: u32 = DEFAULT_SAMPLING> = DynamicIndex<ListBucket, S>;

impl<B: Bucket, const S: u32> DynamicIndex<B, S> {
    const SAMPLING_OK: () = assert!(
        S >= 1 && S < UNIVERSE_BITS,
        "sampling width must be in 1..=39"
    );
    const SUFFIX_MASK: u64 = low_mask(S);

    /// Creates an empty index. Never fails; an out-of-range `S` is a compile
    /// error.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::SAMPLING_OK;
        Self {
            top: Vec::new(),
            buckets: Vec::new(),
            first: BucketRef::NULL,
            len: 0,
            min: 0,
            max: 0,
        }
    }

    /// Builds an index from keys in ascending order (duplicates allowed).
    /// Fails with [`Error::NotAscending`] on unsorted input, otherwise with the
    /// first error [`insert`](Self::insert) reports.
    pub fn from_sorted(keys: &[u64]) -> Result<Self> {
        if let Some(i) = keys.windows(2).position(|w| w[0] > w[1]) {
            return Err(Error::NotAscending { index: i + 1 });
        }
        let mut index = Self::new();
        for &key in keys {
            index.insert(key)?;
        }
        log::debug!(
            "built dynamic index: keys={} buckets={} top_slots={} sampling={}",
            index.len,
            index.buckets.len(),
            index.top.len(),
            S
        );
        Ok(index)
    }

    /// Number of successful inserts, duplicates included.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Smallest stored key, `None` when empty.
    #[inline]
    pub fn min(&self) -> Option<u64> {
        (self.len != 0).then_some(self.min)
    }

    /// Largest stored key, `None` when empty.
    #[inline]
    pub fn max(&self) -> Option<u64> {
        (self.len != 0).then_some(self.max)
    }

    /// Number of allocated buckets (distinct prefixes seen).
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn memory_usage(&self) -> usize {
        self.top.capacity() * std::mem::size_of::<BucketRef>()
            + self.buckets.capacity() * std::mem::size_of::<BucketEntry<B>>()
            + self
                .buckets
                .iter()
                .map(|b| b.slots.memory_usage())
                .sum::<usize>()
    }

    #[inline]
    fn prefix(key: u64) -> u64 {
        key >> S
    }

    #[inline]
    fn suffix(key: u64) -> u64 {
        key & Self::SUFFIX_MASK
    }

    fn alloc(
        &mut self,
        prefix: u64,
        prev_pred: Option<u64>,
        next: BucketRef,
        suffix: u64,
    ) -> Result<BucketRef> {
        if self.buckets.len() >= MAX_BUCKETS {
            return Err(Error::CapacityExceeded {
                len: self.buckets.len() + 1,
                max: MAX_BUCKETS,
            });
        }
        self.buckets
            .try_reserve(1)
            .map_err(|_| Error::AllocationFailed {
                bytes: std::mem::size_of::<BucketEntry<B>>(),
            })?;
        let mut slots = B::new(S)?;
        slots.set(suffix);
        let r = BucketRef(self.buckets.len() as u32);
        self.buckets.push(BucketEntry {
            prefix,
            prev_pred,
            next,
            slots,
        });
        trace!("allocated bucket {} for prefix {}", r.0, prefix);
        Ok(r)
    }

    /// Makes room for `top` to hold `slots` entries.
    fn reserve_top(&mut self, slots: usize) -> Result<()> {
        let additional = slots.saturating_sub(self.top.len());
        self.top
            .try_reserve(additional)
            .map_err(|_| Error::AllocationFailed {
                bytes: additional.saturating_mul(std::mem::size_of::<BucketRef>()),
            })
    }

    /// Inserts `key`. Fails with [`Error::KeyOutOfUniverse`] if `key >= 2^40`
    /// and with [`Error::AllocationFailed`] if a new bucket or the grown top
    /// array cannot be allocated; the index is unchanged on failure.
    pub fn insert(&mut self, key: u64) -> Result<()> {
        if key >> UNIVERSE_BITS != 0 {
            return Err(Error::KeyOutOfUniverse {
                key,
                bits: UNIVERSE_BITS,
            });
        }
        let prefix = Self::prefix(key);
        let suffix = Self::suffix(key);
        let slot = prefix as usize;

        if self.len == 0 {
            self.reserve_top(slot + 1)?;
            let b = self.alloc(prefix, None, BucketRef::NULL, suffix)?;
            self.first = b;
            self.top.clear();
            self.top.resize(slot + 1, BucketRef::NULL);
            self.top[slot] = b;
            self.min = key;
            self.max = key;
            self.len = 1;
            return Ok(());
        }

        if slot >= self.top.len() {
            // New maximum beyond the top array: append to the chain and cover
            // the gap with jump entries to the previous last bucket.
            let last = self.top[self.top.len() - 1];
            self.reserve_top(slot + 1)?;
            let b = self.alloc(prefix, Some(self.max), BucketRef::NULL, suffix)?;
            self.buckets[last.idx()].next = b;
            trace!("top array grows {} -> {}", self.top.len(), slot + 1);
            self.top.resize(slot + 1, last);
            self.top[slot] = b;
        } else if prefix < Self::prefix(self.min) {
            // New first bucket.
            let old_first = self.first;
            let b = self.alloc(prefix, None, old_first, suffix)?;
            self.buckets[old_first.idx()].prev_pred = Some(key);
            self.first = b;
            self.relink_top(slot, b);
        } else {
            let at = self.top[slot];
            if self.buckets[at.idx()].prefix == prefix {
                let entry = &mut self.buckets[at.idx()];
                entry.slots.set(suffix);
                let next = entry.next;
                if !next.is_null() {
                    let pp = &mut self.buckets[next.idx()].prev_pred;
                    *pp = Some(pp.map_or(key, |p| p.max(key)));
                }
            } else {
                // `at` is a jump entry: splice a new bucket in after it.
                let succ = self.buckets[at.idx()].next;
                debug_assert!(!succ.is_null(), "jump entry past the last bucket");
                let inherited = self.buckets[succ.idx()].prev_pred;
                let b = self.alloc(prefix, inherited, succ, suffix)?;
                self.buckets[at.idx()].next = b;
                self.buckets[succ.idx()].prev_pred = Some(key);
                self.relink_top(slot, b);
            }
        }

        self.len += 1;
        self.min = self.min.min(key);
        self.max = self.max.max(key);
        Ok(())
    }

    /// Points `top[slot]` at the new bucket `b` and redirects the run of stale
    /// entries after it (untouched slots or jumps to a lower bucket).
    fn relink_top(&mut self, slot: usize, b: BucketRef) {
        self.top[slot] = b;
        let Some(&stale) = self.top.get(slot + 1) else {
            return;
        };
        if !stale.is_null() && self.buckets[stale.idx()].prefix > slot as u64 {
            return;
        }
        for entry in self.top[slot + 1..]
            .iter_mut()
            .take_while(|e| **e == stale)
        {
            *entry = b;
        }
    }

    /// Largest stored key `<= x`.
    pub fn predecessor(&self, x: u64) -> QueryResult {
        if self.len == 0 || x < self.min {
            return QueryResult::NOT_FOUND;
        }
        if x >= self.max {
            return QueryResult::found(self.max);
        }

        let prefix = Self::prefix(x);
        let entry = &self.buckets[self.top[prefix as usize].idx()];
        let base = entry.prefix << S;
        if entry.prefix != prefix {
            // Jump entry: every key in the bucket is below x.
            return match entry.slots.predecessor_within(Self::SUFFIX_MASK) {
                Some(s) => QueryResult::found(base | s),
                None => QueryResult::NOT_FOUND,
            };
        }
        match entry.slots.predecessor_within(Self::suffix(x)) {
            Some(s) => QueryResult::found(base | s),
            None => entry
                .prev_pred
                .map_or(QueryResult::NOT_FOUND, QueryResult::found),
        }
    }

    /// Asserts the chain and top-array invariants.
    #[cfg(test)]
    pub(crate) fn validate(&self, keys: &std::collections::BTreeSet<u64>) {
        assert_eq!(self.is_empty(), keys.is_empty());
        if keys.is_empty() {
            return;
        }
        assert_eq!(self.min, *keys.first().unwrap(), "min");
        assert_eq!(self.max, *keys.last().unwrap(), "max");
        assert_eq!(self.top.len() as u64, Self::prefix(self.max) + 1);

        let mut prefixes = Vec::new();
        let mut cur = self.first;
        let mut prev_prefix = None;
        while !cur.is_null() {
            let entry = &self.buckets[cur.idx()];
            if let Some(p) = prev_prefix {
                assert!(entry.prefix > p, "chain not ascending: {p} then {}", entry.prefix);
            }
            let lower = entry.prefix << S;
            let expected = keys.range(..lower).next_back().copied();
            assert_eq!(entry.prev_pred, expected, "prev_pred of prefix {}", entry.prefix);
            prev_prefix = Some(entry.prefix);
            prefixes.push(entry.prefix);
            cur = entry.next;
        }
        assert_eq!(prefixes.len(), self.buckets.len(), "every bucket is chained");

        let min_prefix = Self::prefix(self.min) as usize;
        let mut next = prefixes.iter().peekable();
        let mut want = None;
        for (slot, r) in self.top.iter().enumerate() {
            if slot < min_prefix {
                assert!(r.is_null(), "slot {slot} below the minimum must be empty");
                continue;
            }
            while let Some(&p) = next.next_if(|&&p| p <= slot as u64) {
                want = Some(p);
            }
            assert!(!r.is_null(), "top slot {slot} is empty");
            assert_eq!(Some(self.buckets[r.idx()].prefix), want, "top slot {slot}");
        }
    }
}

impl<B: Bucket, const S: u32> Default for DynamicIndex<B, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Bucket, const S: u32> Predecessor for DynamicIndex<B, S> {
    #[inline]
    fn predecessor(&self, x: u64) -> QueryResult {
        DynamicIndex::predecessor(self, x)
    }
}

impl<B: Bucket, const S: u32> DynamicPredecessor for DynamicIndex<B, S> {
    #[inline]
    fn insert(&mut self, key: u64) -> Result<()> {
        DynamicIndex::insert(self, key)
    }
}
