//! Error types for tree operations.

use crate::alloc::AllocError;
use core::fmt;

/// An insert that could not allocate. Carries the rejected item back.
///
/// The tree is unchanged when this is returned.
#[derive(Clone, PartialEq, Eq)]
pub struct SetError<T> {
    item: T,
}

impl<T> SetError<T> {
    pub(crate) fn new(item: T) -> Self {
        Self { item }
    }

    /// The item that was not inserted.
    pub fn item(&self) -> &T {
        &self.item
    }

    /// Takes back the item that was not inserted.
    pub fn into_item(self) -> T {
        self.item
    }
}

impl<T> fmt::Debug for SetError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetError").finish_non_exhaustive()
    }
}

impl<T> fmt::Display for SetError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("memory allocation failed; item was not inserted")
    }
}

impl<T> std::error::Error for SetError<T> {}

impl<T> From<SetError<T>> for AllocError {
    fn from(_: SetError<T>) -> Self {
        AllocError
    }
}

/// A structural invariant that [`BTree::check`](super::BTree::check) found broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanityError {
    /// Items are not strictly increasing within a node or across a separator.
    OutOfOrder {
        /// Depth of the offending node; the root is at 0.
        depth: usize,
    },
    /// Leaves sit at different depths.
    Unbalanced {
        /// Depth of the first leaf found.
        expected: usize,
        /// Depth of the leaf that disagrees.
        found: usize,
    },
    /// A non-root node holds fewer items than the minimum.
    Underfull {
        /// Depth of the node.
        depth: usize,
        /// Items it holds.
        len: usize,
        /// Items it should hold at least.
        min: usize,
    },
    /// A node holds more items than fit.
    Overfull {
        /// Depth of the node.
        depth: usize,
        /// Items it holds.
        len: usize,
        /// Items it can hold.
        max: usize,
    },
    /// The stored count differs from the number of reachable items.
    CountMismatch {
        /// The count the handle keeps.
        expected: usize,
        /// Items actually reachable.
        found: usize,
    },
    /// A reachable node has a reference count of zero.
    DeadNode {
        /// Depth of the node.
        depth: usize,
    },
    /// The root exists but holds no items.
    EmptyRoot,
}

impl fmt::Display for SanityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SanityError::OutOfOrder { depth } => {
                write!(f, "items out of order at depth {depth}")
            }
            SanityError::Unbalanced { expected, found } => {
                write!(f, "leaf at depth {found}, expected {expected}")
            }
            SanityError::Underfull { depth, len, min } => {
                write!(f, "node at depth {depth} holds {len} items, minimum is {min}")
            }
            SanityError::Overfull { depth, len, max } => {
                write!(f, "node at depth {depth} holds {len} items, maximum is {max}")
            }
            SanityError::CountMismatch { expected, found } => {
                write!(f, "tree reports {expected} items but holds {found}")
            }
            SanityError::DeadNode { depth } => {
                write!(f, "unreferenced node reachable at depth {depth}")
            }
            SanityError::EmptyRoot => f.write_str("root node is empty"),
        }
    }
}

impl std::error::Error for SanityError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_error_returns_item() {
        let err = SetError::new(String::from("k"));
        assert_eq!(err.to_string(), "memory allocation failed; item was not inserted");
        assert_eq!(format!("{err:?}"), "SetError { .. }");
        assert_eq!(err.into_item(), "k");
    }

    #[test]
    fn test_sanity_error_display() {
        let err = SanityError::Underfull { depth: 2, len: 1, min: 2 };
        assert_eq!(err.to_string(), "node at depth 2 holds 1 items, minimum is 2");
    }
}
