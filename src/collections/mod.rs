//! Collections backed by injectable node allocators.
//!
//! - `btree`: ordered set in a copy-on-write B-tree

pub mod btree;

pub use btree::{Action, BTree, Compare, Cursor, Iter, Natural, SanityError, SetError, TreeStats};
