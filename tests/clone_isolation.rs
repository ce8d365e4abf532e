use cowbtree::{BTree, Natural, TrackingAllocator};
use std::sync::mpsc;
use std::thread;

#[test]
fn test_writes_do_not_leak_between_clones() {
    let mut a = BTree::with_compare(6, Natural);
    for key in 0..100u32 {
        a.set(key).unwrap();
    }
    let mut b = a.clone();

    a.set(1000).unwrap();
    b.delete(&50).unwrap();
    b.set(2000).unwrap();

    assert!(a.contains(&50) && a.contains(&1000) && !a.contains(&2000));
    assert!(!b.contains(&50) && !b.contains(&1000) && b.contains(&2000));
    assert_eq!(a.len(), 101);
    assert_eq!(b.len(), 100);
    a.check().unwrap();
    b.check().unwrap();
}

#[test]
fn test_update_in_place_is_private_to_the_writer() {
    let mut a = BTree::with_compare(4, |x: &(u8, String), y: &(u8, String)| x.0.cmp(&y.0));
    for key in 0..30u8 {
        a.set((key, format!("v{key}"))).unwrap();
    }
    let b = a.clone();
    a.ascend_mut(Some(&(10, String::new())), |item| {
        item.1.push_str("-edited");
        cowbtree::Action::Update
    })
    .unwrap();

    assert_eq!(a.get(&(12, String::new())).unwrap().1, "v12-edited");
    assert_eq!(b.get(&(12, String::new())).unwrap().1, "v12");
    assert_eq!(a.get(&(3, String::new())).unwrap().1, "v3");
}

#[test]
fn test_reader_thread_sees_a_frozen_snapshot() {
    let alloc = TrackingAllocator::new();
    let mut tree = BTree::with_allocator(8, Natural, alloc.clone());
    for key in 0..10_000u64 {
        tree.load(key).unwrap();
    }

    let (ready_tx, ready_rx) = mpsc::channel();
    let snapshot = tree.clone();
    let reader = thread::spawn(move || {
        ready_tx.send(()).unwrap();
        let mut rounds = 0;
        for _ in 0..20 {
            assert_eq!(snapshot.len(), 10_000);
            assert!(snapshot.iter().copied().eq(0..10_000));
            rounds += 1;
        }
        snapshot.check().unwrap();
        rounds
    });

    ready_rx.recv().unwrap();
    for key in (0..10_000u64).step_by(3) {
        tree.delete(&key).unwrap();
    }
    for key in 10_000..12_000u64 {
        tree.set(key).unwrap();
    }
    assert_eq!(reader.join().unwrap(), 20);
    tree.check().unwrap();

    drop(tree);
    assert_eq!(alloc.live_blocks(), 0, "the snapshot was the last owner of its nodes");
}

#[test]
fn test_clones_dropped_on_many_threads() {
    let alloc = TrackingAllocator::new();
    let mut tree = BTree::with_allocator(6, Natural, alloc.clone());
    for key in 0..2_000u32 {
        tree.set(key).unwrap();
    }

    let handles: Vec<_> = (0..4u32)
        .map(|worker| {
            let mut mine = tree.clone();
            thread::spawn(move || {
                for key in (worker..2_000).step_by(4) {
                    assert_eq!(mine.delete(&key).unwrap(), Some(key));
                }
                assert_eq!(mine.len(), 1_500);
                mine.check().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(tree.len(), 2_000);
    tree.check().unwrap();
    drop(tree);
    assert_eq!(alloc.live_blocks(), 0);
}
