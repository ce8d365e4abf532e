//! # `cowbtree` - Copy-on-write B-tree
//!
//! An in-memory ordered set stored in a B-tree whose nodes are shared between
//! clones and copied only when written. Node storage comes from an injected
//! allocator, and running out of memory is an ordinary, recoverable error.
//!
//! ## Guarantees
//!
//! ### Snapshots
//! - **O(1) clone**: a clone bumps the root's reference count and nothing else.
//! - **Isolation**: writes through one handle are never visible through another.
//!   A write copies every shared node on its path before touching it.
//! - **Thread-safe sharing**: reference counts are atomic, so clones may be
//!   moved to, read on and dropped on other threads.
//!
//! ### Allocation failure
//! - **Atomic**: `set`, `load`, `delete`, `pop_min` and `pop_max` either
//!   complete or leave the tree exactly as it was. Each one first counts the
//!   nodes it could need and allocates them before changing anything.
//! - **Item hand-back**: a failed `set` returns the item inside [`SetError`].
//! - **Flag**: [`BTree::oom`] reports whether the last mutating call failed.
//! - **Free reads**: lookups, walks, cursors and iterators never allocate.
//!
//! ## Architecture
//!
//! 1. **Allocator port** ([`NodeAllocator`]): [`Global`] forwards to the system
//!    allocator; [`TrackingAllocator`] counts blocks and injects failures.
//! 2. **Nodes**: one block per node holding a header, up to `M - 1` items and,
//!    for internal nodes, `M` child pointers.
//! 3. **Engine**: preemptive splits on the way down for inserts, merges and
//!    rotations on the way up for deletes.
//! 4. **Handle** ([`BTree`]): owns the root, the count, the order and the allocator.
//!
//! ## Example
//!
//! ```rust
//! use cowbtree::{Action, BTree};
//!
//! // Items are (key, hits); only the key decides the order.
//! let mut tree: BTree<(u32, u32), _> =
//!     BTree::with_compare(16, |a: &(u32, u32), b: &(u32, u32)| a.0.cmp(&b.0));
//! for key in 0..10 {
//!     tree.set((key, 0)).unwrap();
//! }
//! let before = tree.clone();
//!
//! // Drop odd keys and count a hit on the rest.
//! tree.ascend_mut(None, |(key, hits)| {
//!     if *key % 2 == 1 {
//!         return Action::Delete;
//!     }
//!     *hits += 1;
//!     Action::Update
//! })
//! .unwrap();
//!
//! assert_eq!(
//!     tree.iter().copied().collect::<Vec<_>>(),
//!     [(0, 1), (2, 1), (4, 1), (6, 1), (8, 1)]
//! );
//! assert_eq!(before.len(), 10);
//! assert_eq!(before.get(&(2, 0)), Some(&(2, 0)));
//! assert!(tree.sanity());
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod tracing_helpers;

pub mod alloc;
pub mod collections;

pub use alloc::{AllocError, Global, NodeAllocator, TrackingAllocator};
pub use collections::btree::{
    normalize_max_items, Action, BTree, Compare, Cursor, Iter, Natural, SanityError, SetError, TreeStats,
    DEFAULT_MAX_ITEMS, MAX_MAX_ITEMS, MIN_MAX_ITEMS,
};

// Compile-time assertions for memory layout
const _: () = {
    use core::mem;

    // The handle is a root pointer plus cached geometry. Loose bound.
    assert!(mem::size_of::<BTree<u64>>() <= mem::size_of::<usize>() * 12);

    // Allocator and order markers are zero-sized.
    assert!(mem::size_of::<Global>() == 0);
    assert!(mem::size_of::<Natural>() == 0);
    assert!(mem::size_of::<AllocError>() == 0);
};
