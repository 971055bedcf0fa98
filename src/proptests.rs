use super::{
    BinarySearch, BitsetIndex, DynamicIndex, DynamicPredecessor, Error, FusionNode, ListIndex,
    QueryResult,
};

use proptest::prelude::*;
use std::collections::BTreeSet;

fn oracle(keys: &BTreeSet<u64>, x: u64) -> QueryResult {
    keys.range(..=x).next_back().copied().into()
}

#[derive(Clone, Debug)]
enum Op {
    Insert(u64),
    Query(u64),
}

fn ops_strategy(universe: u64) -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        40 => (0..universe).prop_map(Op::Insert),
        60 => (0..universe + 64).prop_map(Op::Query),
    ];
    prop::collection::vec(op, 0..=1000)
}

fn run_dynamic<T: DynamicPredecessor>(ops: Vec<Op>) -> Result<(T, BTreeSet<u64>), TestCaseError> {
    let mut t = T::default();
    let mut m = BTreeSet::new();
    for op in ops {
        match op {
            Op::Insert(k) => {
                t.insert(k).map_err(|e| TestCaseError::fail(e.to_string()))?;
                m.insert(k);
            }
            Op::Query(x) => {
                prop_assert_eq!(t.predecessor(x), oracle(&m, x), "x={}", x);
            }
        }
    }
    Ok((t, m))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_bitset_index_equivalence(ops in ops_strategy(1 << 16)) {
        let (t, m) = run_dynamic::<BitsetIndex<8>>(ops)?;
        t.validate(&m);
        if let (Some(&lo), Some(&hi)) = (m.first(), m.last()) {
            prop_assert_eq!(t.predecessor(hi), QueryResult::found(hi));
            prop_assert!(lo == 0 || !t.predecessor(lo - 1).found);
        }
    }

    #[test]
    fn prop_list_index_equivalence(ops in ops_strategy(1 << 14)) {
        let (t, m) = run_dynamic::<ListIndex<5>>(ops)?;
        t.validate(&m);
    }

    #[test]
    fn prop_sparse_wide_keys(ops in ops_strategy(1 << 32)) {
        let (t, m) = run_dynamic::<ListIndex<20>>(ops)?;
        t.validate(&m);
    }

    #[test]
    fn prop_binary_search_equivalence(keys in prop::collection::vec(any::<u64>(), 0..=300), xs in prop::collection::vec(any::<u64>(), 0..=100)) {
        let mut bs = BinarySearch::default();
        for &k in &keys {
            bs.insert(k);
        }
        let set: BTreeSet<u64> = keys.iter().copied().collect();
        for x in xs {
            let got = bs.predecessor(x).position().map(|r| bs.keys()[r as usize]);
            prop_assert_eq!(got, oracle(&set, x).position());
        }
    }

    #[test]
    fn prop_fusion_node_exact(keys in prop::collection::btree_set(any::<u64>(), 0..=8), xs in prop::collection::vec(any::<u64>(), 0..=64)) {
        let keys: Vec<u64> = keys.into_iter().collect();
        let node = FusionNode::new(&keys).unwrap();
        let bs = BinarySearch::new(keys.clone()).unwrap();
        for x in xs {
            prop_assert_eq!(node.predecessor(x), bs.predecessor(x), "keys={:?} x={}", keys, x);
        }
        for &k in &keys {
            for x in [k.wrapping_sub(1), k, k.wrapping_add(1)] {
                prop_assert_eq!(node.predecessor(x), bs.predecessor(x), "keys={:?} x={}", keys, x);
            }
        }
    }

    #[test]
    fn prop_fusion_node_clustered(base in any::<u64>(), offsets in prop::collection::btree_set(0u64..64, 1..=8)) {
        // Keys close together share long prefixes and branch at low bits only.
        let keys: Vec<u64> = offsets.iter().map(|&o| base.saturating_sub(64) + o).collect();
        let node = FusionNode::new(&keys).unwrap();
        let bs = BinarySearch::new(keys.clone()).unwrap();
        let lo = keys[0].saturating_sub(2);
        for x in lo..=lo.saturating_add(70) {
            prop_assert_eq!(node.predecessor(x), bs.predecessor(x), "keys={:?} x={}", keys, x);
        }
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

#[test]
fn exhaustive_insert_order_dynamic() {
    // With 4-bit sampling these fall into prefixes 0, 0, 1, 3, 3, 9, 64.
    let keys: Vec<u64> = vec![2, 9, 16, 48, 63, 150, 1024];
    let set: BTreeSet<u64> = keys.iter().copied().collect();

    for_each_permutation(&keys, |perm| {
        let mut bits: BitsetIndex<4> = DynamicIndex::new();
        let mut list: ListIndex<4> = DynamicIndex::new();
        for &k in &perm {
            bits.insert(k).unwrap();
            list.insert(k).unwrap();
        }
        bits.validate(&set);
        list.validate(&set);
        for x in 0..1100 {
            let want = oracle(&set, x);
            assert_eq!(bits.predecessor(x), want, "perm={perm:?} x={x}");
            assert_eq!(list.predecessor(x), want, "perm={perm:?} x={x}");
        }
    });
}

#[test]
fn exhaustive_fusion_permutations() {
    let keys: Vec<u64> = vec![0, 1, 7, 8, 255, 256, 1 << 39, u64::MAX];
    let sorted = keys.clone();

    let mut queries = vec![];
    for &k in &keys {
        queries.extend([k.wrapping_sub(1), k, k.wrapping_add(1)]);
    }
    for w in keys.windows(2) {
        queries.push(w[0] + (w[1] - w[0]) / 2);
    }

    let mut accepted = 0;
    for_each_permutation(&keys, |perm| match FusionNode::new(&perm) {
        Ok(node) => {
            accepted += 1;
            assert_eq!(perm, sorted);
            for &x in &queries {
                let want = sorted.iter().rposition(|&k| k <= x).map(|i| i as u64);
                assert_eq!(node.predecessor(x).position(), want, "x={x}");
            }
        }
        Err(e) => assert!(matches!(e, Error::NotAscending { .. })),
    });
    assert_eq!(accepted, 1);

    // Every prefix of the key set, too.
    for n in 0..=keys.len() {
        let node = FusionNode::new(&sorted[..n]).unwrap();
        for &x in &queries {
            let want = sorted[..n].iter().rposition(|&k| k <= x).map(|i| i as u64);
            assert_eq!(node.predecessor(x).position(), want, "n={n} x={x}");
        }
    }
}
