//! Structural verification and shape statistics.

use super::compare::Compare;
use super::engine::Engine;
use super::error::SanityError;
use super::node::NodePtr;
use crate::alloc::NodeAllocator;
use core::cmp::Ordering;
use serde::{Deserialize, Serialize};

/// A snapshot of a tree's shape, from [`BTree::stats`](super::BTree::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Items stored.
    pub len: usize,
    /// Levels from root to leaves; zero for an empty tree.
    pub height: usize,
    /// Nodes reachable from the root.
    pub nodes: usize,
    /// Of those, leaves.
    pub leaves: usize,
    /// Reachable nodes also referenced by another tree or node.
    pub shared_nodes: usize,
    /// Branching factor after normalization.
    pub max_items: usize,
    /// Size of one item in bytes.
    pub item_size: usize,
    /// Bytes of node storage reachable from the root.
    pub node_bytes: usize,
}

struct Walk<'t, T> {
    leaf_depth: Option<usize>,
    count: usize,
    lower: Option<&'t T>,
    upper: Option<&'t T>,
}

impl<'a, T, C, A> Engine<'a, T, C, A>
where
    C: Compare<T> + ?Sized,
    A: NodeAllocator + ?Sized,
{
    /// Verifies ordering, fill bounds, balance and the item count.
    pub(crate) fn check(&self, root: Option<NodePtr<T>>, len: usize) -> Result<(), SanityError> {
        let Some(root) = root else {
            return match len {
                0 => Ok(()),
                expected => Err(SanityError::CountMismatch { expected, found: 0 }),
            };
        };
        if root.len() == 0 {
            return Err(SanityError::EmptyRoot);
        }
        let mut walk = Walk {
            leaf_depth: None,
            count: 0,
            lower: None,
            upper: None,
        };
        self.check_node(root, 0, &mut walk)?;
        if walk.count != len {
            return Err(SanityError::CountMismatch {
                expected: len,
                found: walk.count,
            });
        }
        Ok(())
    }

    fn check_node<'t>(&self, node: NodePtr<T>, depth: usize, walk: &mut Walk<'t, T>) -> Result<(), SanityError> {
        let shape = self.shape;
        if node.ref_count() == 0 {
            return Err(SanityError::DeadNode { depth });
        }
        let len = node.len();
        if len > shape.max_len() {
            return Err(SanityError::Overfull {
                depth,
                len,
                max: shape.max_len(),
            });
        }
        if depth > 0 && len < shape.min_len() {
            return Err(SanityError::Underfull {
                depth,
                len,
                min: shape.min_len(),
            });
        }
        // SAFETY: nodes reachable from a live root stay live while borrowed.
        let items: &'t [T] = unsafe { node.items(shape) };
        let less = |a: &T, b: &T| self.cmp.compare(a, b) == Ordering::Less;
        let ordered = items.windows(2).all(|pair| less(&pair[0], &pair[1]))
            && walk.lower.zip(items.first()).map_or(true, |(lo, first)| less(lo, first))
            && walk.upper.zip(items.last()).map_or(true, |(last_bound, last)| less(last, last_bound));
        if !ordered {
            return Err(SanityError::OutOfOrder { depth });
        }
        walk.count += len;

        if node.is_leaf() {
            match walk.leaf_depth {
                None => walk.leaf_depth = Some(depth),
                Some(expected) if expected != depth => {
                    return Err(SanityError::Unbalanced {
                        expected,
                        found: depth,
                    });
                }
                Some(_) => {}
            }
            return Ok(());
        }

        let (lower, upper) = (walk.lower, walk.upper);
        for idx in 0..=len {
            walk.lower = if idx == 0 { lower } else { Some(&items[idx - 1]) };
            walk.upper = if idx == len { upper } else { Some(&items[idx]) };
            // SAFETY: internal node, idx <= len.
            let child = unsafe { node.child(shape, idx) };
            self.check_node(child, depth + 1, walk)?;
        }
        walk.lower = lower;
        walk.upper = upper;
        Ok(())
    }
}

impl<'a, T, C: ?Sized, A: ?Sized> Engine<'a, T, C, A> {
    /// Counts nodes and sharing below `node`.
    pub(crate) fn collect_stats(&self, node: NodePtr<T>, depth: usize, stats: &mut TreeStats) {
        stats.nodes += 1;
        stats.node_bytes += self.shape.layout(node.kind()).size();
        stats.height = stats.height.max(depth + 1);
        if node.is_shared() {
            stats.shared_nodes += 1;
        }
        if node.is_leaf() {
            stats.leaves += 1;
            return;
        }
        for idx in 0..=node.len() {
            // SAFETY: internal node, idx <= len.
            let child = unsafe { node.child(self.shape, idx) };
            self.collect_stats(child, depth + 1, stats);
        }
    }
}
