use super::tests::validate_trie;
use super::*;

use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::BTreeSet;

const WIDTH: u32 = 4;
const SPACE: u8 = 1 << WIDTH;

/// Reference allocator over a flat bitmap. Applies the same search policy as
/// the trie but decides fullness by scanning the range, so it checks the
/// pruning without sharing any of its bookkeeping.
struct FlatModel {
    taken: [bool; SPACE as usize],
}

impl FlatModel {
    fn new() -> Self {
        Self {
            taken: [false; SPACE as usize],
        }
    }

    fn range_full(&self, lo: u8, level: u32) -> bool {
        let hi = lo as usize + (1usize << level);
        self.taken[lo as usize..hi].iter().all(|&t| t)
    }

    fn allocate(&mut self, key: u8) -> Result<u8, AllocError> {
        self.allocate_in(0, key, WIDTH)
    }

    fn allocate_in(&mut self, lo: u8, key: u8, level: u32) -> Result<u8, AllocError> {
        if self.range_full(lo, level) {
            return Err(AllocError::AlreadyFull);
        }
        if level == 0 {
            self.taken[lo as usize] = true;
            return Ok(key);
        }
        let half = 1u8 << (level - 1);
        let bit = (key >> (level - 1)) & 1;
        let result = self.allocate_in(lo + bit * half, key, level - 1);
        if result == Err(AllocError::AlreadyFull) && bit == 0 {
            let key = (key + half) & !(half - 1);
            return self.allocate_in(lo + half, key, level - 1);
        }
        result
    }

    fn release(&mut self, key: u8) -> Result<(), ReleaseError> {
        let slot = &mut self.taken[key as usize];
        if !*slot {
            return Err(ReleaseError::DoubleRelease);
        }
        *slot = false;
        Ok(())
    }

    fn count(&self) -> usize {
        self.taken.iter().filter(|&&t| t).count()
    }
}

#[derive(Clone, Debug, Arbitrary)]
enum Op {
    Allocate(#[proptest(strategy = "0..SPACE")] u8),
    Release(#[proptest(strategy = "0..SPACE")] u8),
    Query(#[proptest(strategy = "0..SPACE")] u8),
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_matches_flat_model(ops in prop::collection::vec(any::<Op>(), 0..=400)) {
        let mut t: FullnessTrie<u8> = FullnessTrie::new(WIDTH).unwrap();
        let mut m = FlatModel::new();

        for op in ops {
            match op {
                Op::Allocate(key) => {
                    prop_assert_eq!(t.allocate(key), m.allocate(key));
                }
                Op::Release(key) => {
                    prop_assert_eq!(t.release(key), m.release(key));
                }
                Op::Query(key) => {
                    prop_assert_eq!(t.is_allocated(key), m.taken[key as usize]);
                }
            }
            prop_assert_eq!(t.count(), m.count());
            prop_assert_eq!(t.is_full(), m.count() == SPACE as usize);
        }

        let allocated = validate_trie(&t);
        let expected: Vec<u128> = (0..SPACE)
            .filter(|&k| m.taken[k as usize])
            .map(u128::from)
            .collect();
        prop_assert_eq!(allocated, expected);
    }

    #[test]
    fn prop_repeat_allocation_never_reuses_leaf(key in any::<u16>(), others in prop::collection::vec(any::<u16>(), 0..64)) {
        let mut t: FullnessTrie<u16> = FullnessTrie::new(16).unwrap();
        for k in others {
            let _ = t.allocate(k);
        }
        let first = t.allocate(key);
        let second = t.allocate(key);
        if let (Ok(a), Ok(b)) = (first, second) {
            prop_assert_ne!(a, b);
        }
        validate_trie(&t);
    }

    #[test]
    fn prop_release_round_trip(key in any::<u32>(), others in prop::collection::btree_set(any::<u32>(), 0..64)) {
        let mut t: FullnessTrie<u32> = FullnessTrie::new(32).unwrap();
        for &k in &others {
            t.allocate(k).unwrap();
        }
        let before = t.count();
        let nodes = t.node_count();

        let Ok(addr) = t.allocate(key) else {
            return Ok(());
        };
        prop_assert_eq!(t.count(), before + 1);
        prop_assert_eq!(t.release(addr), Ok(()));
        prop_assert_eq!(t.count(), before);
        prop_assert_eq!(t.node_count(), nodes);
        prop_assert_eq!(t.allocate(key), Ok(addr));
    }

    #[test]
    fn prop_double_release_keeps_count(keys in prop::collection::btree_set(any::<u32>(), 1..64), probe in any::<u32>()) {
        let mut t: FullnessTrie<u32> = FullnessTrie::new(32).unwrap();
        let live: BTreeSet<u32> = keys.iter().map(|&k| t.allocate(k).unwrap()).collect();
        let before = t.count();
        if !live.contains(&probe) {
            prop_assert_eq!(t.release(probe), Err(ReleaseError::DoubleRelease));
            prop_assert_eq!(t.count(), before);
            validate_trie(&t);
        }
    }
}

#[test]
fn exhaustive_fill_from_every_key_width_three() {
    for seed_key in 0..8u8 {
        let mut t: FullnessTrie<u8> = FullnessTrie::new(3).unwrap();
        let mut seen = BTreeSet::new();
        while !t.is_full() {
            let addr = match t.allocate(seed_key) {
                Ok(addr) => addr,
                // Stuck behind a one-branch. An all-zero key retries at every
                // level, so it finds a free address while the root is not full.
                Err(AllocError::AlreadyFull) => t.allocate(0).unwrap(),
                Err(AllocError::AllocationFailed) => unreachable!(),
            };
            assert!(seen.insert(addr), "{addr} allocated twice (seed {seed_key})");
        }
        assert_eq!(seen.len(), 8, "seed {seed_key}");
        assert_eq!(t.allocate(seed_key), Err(AllocError::AlreadyFull));
        validate_trie(&t);
    }
}

#[test]
fn exhaustive_release_order_width_three() {
    let mut base: FullnessTrie<u8> = FullnessTrie::new(3).unwrap();
    for k in 0..8 {
        assert_eq!(base.allocate(k), Ok(k));
    }

    let mut orders: Vec<Vec<u8>> = Vec::new();
    for k in 0..8u8 {
        // Rotations keep this small while hitting every leaf first once.
        let mut order: Vec<u8> = (0..8).collect();
        order.rotate_left(k as usize);
        orders.push(order.iter().rev().copied().collect());
        orders.push(order);
    }

    for order in orders {
        let mut t = base.clone();
        let mut remaining = 8;
        for k in order {
            assert_eq!(t.release(k), Ok(()));
            remaining -= 1;
            assert_eq!(t.count(), remaining);
            validate_trie(&t);
        }
        assert_eq!(t.node_count(), 1);
    }
}
