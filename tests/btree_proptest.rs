use cowbtree::{Action, BTree, TrackingAllocator};
use proptest::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeMap;

type Entry = (u8, u16);
type ByKey = fn(&Entry, &Entry) -> Ordering;

fn by_key(a: &Entry, b: &Entry) -> Ordering {
    a.0.cmp(&b.0)
}

#[derive(Debug, Clone)]
enum Operation {
    Set(u8, u16),
    Load(u8, u16),
    Delete(u8),
    Get(u8),
    PopMin,
    PopMax,
    Snapshot,
    DropOdd,
}

fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        4 => (any::<u8>(), any::<u16>()).prop_map(|(k, v)| Operation::Set(k, v)),
        1 => (any::<u8>(), any::<u16>()).prop_map(|(k, v)| Operation::Load(k, v)),
        2 => any::<u8>().prop_map(Operation::Delete),
        1 => any::<u8>().prop_map(Operation::Get),
        1 => Just(Operation::PopMin),
        1 => Just(Operation::PopMax),
        1 => Just(Operation::Snapshot),
        1 => Just(Operation::DropOdd),
    ]
}

proptest! {
    #[test]
    fn test_btree_matches_std_map(
        max_items in 4usize..12,
        ops in proptest::collection::vec(operation(), 1..300),
    ) {
        let alloc = TrackingAllocator::new();
        let mut std_map = BTreeMap::new();
        let mut tree = BTree::with_allocator(max_items, by_key as ByKey, alloc.clone());
        let mut snapshots: Vec<(BTree<Entry, ByKey, TrackingAllocator>, Vec<Entry>)> = Vec::new();

        for op in ops {
            match op {
                Operation::Set(k, v) => {
                    let std_res = std_map.insert(k, v);
                    let tree_res = tree.set((k, v)).unwrap().map(|(_, old)| old);
                    prop_assert_eq!(std_res, tree_res, "set result mismatch for key {}", k);
                }
                Operation::Load(k, v) => {
                    let std_res = std_map.insert(k, v);
                    let tree_res = tree.load((k, v)).unwrap().map(|(_, old)| old);
                    prop_assert_eq!(std_res, tree_res, "load result mismatch for key {}", k);
                }
                Operation::Delete(k) => {
                    let std_res = std_map.remove(&k);
                    let tree_res = tree.delete(&(k, 0)).unwrap().map(|(_, v)| v);
                    prop_assert_eq!(std_res, tree_res, "delete result mismatch for key {}", k);
                }
                Operation::Get(k) => {
                    let std_res = std_map.get(&k).copied();
                    let tree_res = tree.get(&(k, 0)).map(|&(_, v)| v);
                    prop_assert_eq!(std_res, tree_res, "get result mismatch for key {}", k);
                }
                Operation::PopMin => {
                    let std_res = std_map.pop_first();
                    prop_assert_eq!(std_res, tree.pop_min().unwrap());
                }
                Operation::PopMax => {
                    let std_res = std_map.pop_last();
                    prop_assert_eq!(std_res, tree.pop_max().unwrap());
                }
                Operation::Snapshot => {
                    let contents = std_map.iter().map(|(&k, &v)| (k, v)).collect();
                    snapshots.push((tree.clone(), contents));
                }
                Operation::DropOdd => {
                    std_map.retain(|_, v| *v % 2 == 0);
                    tree.ascend_mut(None, |(_, v)| {
                        if *v % 2 == 1 { Action::Delete } else { Action::None }
                    }).unwrap();
                }
            }
            prop_assert!(tree.sanity(), "{:?}", tree.check());
        }

        prop_assert_eq!(tree.len(), std_map.len(), "length mismatch");
        prop_assert!(tree.iter().copied().eq(std_map.iter().map(|(&k, &v)| (k, v))));
        prop_assert!(tree.iter().rev().copied().eq(std_map.iter().rev().map(|(&k, &v)| (k, v))));

        for (snapshot, contents) in &snapshots {
            prop_assert!(snapshot.sanity());
            prop_assert!(snapshot.iter().eq(contents.iter()), "snapshot changed");
        }

        drop(snapshots);
        drop(tree);
        prop_assert_eq!(alloc.live_blocks(), 0, "leaked nodes");
    }

    #[test]
    fn test_pivot_walks_match_ranges(
        keys in proptest::collection::btree_set(any::<u16>(), 0..200),
        pivot in any::<u16>(),
    ) {
        let mut tree = BTree::with_compare(6, cowbtree::Natural);
        for key in &keys {
            tree.set(*key).unwrap();
        }

        let mut up = Vec::new();
        tree.ascend(Some(&pivot), |k| { up.push(*k); true });
        prop_assert!(up.iter().eq(keys.range(pivot..)));

        let mut down = Vec::new();
        tree.descend(Some(&pivot), |k| { down.push(*k); true });
        prop_assert!(down.iter().eq(keys.range(..=pivot).rev()));

        let mut cursor = tree.cursor();
        prop_assert_eq!(cursor.seek(&pivot), keys.range(pivot..).next().is_some());
        prop_assert_eq!(cursor.item(), keys.range(pivot..).next());
        prop_assert_eq!(cursor.seek_back(&pivot), keys.range(..=pivot).next_back().is_some());
        prop_assert_eq!(cursor.item(), keys.range(..=pivot).next_back());
    }
}
