//! Copy-on-write B-tree.
//!
//! - `node`: block layout and positional edits on a single node
//! - `reserve`: up-front allocation of the blocks a mutation may need
//! - `engine`: search and copy-on-write over a borrowed shape, order and allocator
//! - `mutate`: insert, replace and delete with splits, merges and rotations
//! - `traverse`: ordered walks, including walks that edit or delete
//! - `iter`: allocation-free cursors and iterators
//! - `sanity`: invariant checks and shape statistics
//! - `tree`: the public [`BTree`] handle

mod compare;
mod engine;
mod error;
mod iter;
mod mutate;
mod node;
mod reserve;
mod sanity;
mod traverse;
mod tree;

pub use compare::{Compare, Natural};
pub use error::{SanityError, SetError};
pub use iter::{Cursor, Iter};
pub use sanity::TreeStats;
pub use traverse::Action;
pub use tree::{normalize_max_items, BTree, DEFAULT_MAX_ITEMS, MAX_MAX_ITEMS, MIN_MAX_ITEMS};
