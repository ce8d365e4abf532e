//! Cursors and iterators.
//!
//! A cursor keeps its path in a fixed array of frames, so positioning and
//! stepping never allocate. An internal frame below the top of the stack
//! means "inside child `idx`"; the top frame always names the current item.

use super::compare::Compare;
use super::node::NodePtr;
use super::tree::BTree;
use crate::alloc::NodeAllocator;
use core::fmt;
use core::iter::FusedIterator;

/// Deepest path a cursor can hold. With at least two children per internal
/// node this bounds trees far beyond addressable memory.
const MAX_DEPTH: usize = 64;

struct Frame<T> {
    node: NodePtr<T>,
    idx: usize,
}

impl<T> Clone for Frame<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Frame<T> {}

/// A bidirectional position in a [`BTree`].
///
/// A cursor borrows the tree, so the tree cannot change while it exists.
///
/// ```rust
/// use cowbtree::BTree;
///
/// let mut tree = BTree::new();
/// for i in (0..100).step_by(10) {
///     tree.set(i).unwrap();
/// }
/// let mut cursor = tree.cursor();
/// assert!(cursor.seek(&35));
/// assert_eq!(cursor.item(), Some(&40));
/// assert!(cursor.prev());
/// assert_eq!(cursor.item(), Some(&30));
/// ```
pub struct Cursor<'a, T, C, A: NodeAllocator> {
    tree: &'a BTree<T, C, A>,
    stack: [Frame<T>; MAX_DEPTH],
    depth: usize,
}

impl<'a, T, C, A: NodeAllocator> Cursor<'a, T, C, A> {
    pub(super) fn new(tree: &'a BTree<T, C, A>) -> Self {
        Self {
            tree,
            stack: [Frame {
                node: NodePtr::dangling(),
                idx: 0,
            }; MAX_DEPTH],
            depth: 0,
        }
    }

    fn push(&mut self, node: NodePtr<T>, idx: usize) {
        assert!(self.depth < MAX_DEPTH, "tree deeper than {MAX_DEPTH} levels");
        self.stack[self.depth] = Frame { node, idx };
        self.depth += 1;
    }

    fn descend_left(&mut self, mut node: NodePtr<T>) {
        loop {
            self.push(node, 0);
            if node.is_leaf() {
                return;
            }
            // SAFETY: internal node of the borrowed tree.
            node = unsafe { node.child(&self.tree.shape, 0) };
        }
    }

    fn descend_right(&mut self, mut node: NodePtr<T>) {
        loop {
            let len = node.len();
            if node.is_leaf() {
                self.push(node, len - 1);
                return;
            }
            self.push(node, len);
            // SAFETY: internal node of the borrowed tree.
            node = unsafe { node.child(&self.tree.shape, len) };
        }
    }

    /// Pops finished frames until the top names an item.
    fn settle_forward(&mut self) -> bool {
        while self.depth > 0 {
            let frame = self.stack[self.depth - 1];
            if frame.idx < frame.node.len() {
                return true;
            }
            self.depth -= 1;
        }
        false
    }

    /// Steps the top frame back one item, popping frames that have none left.
    fn settle_backward(&mut self) -> bool {
        while self.depth > 0 {
            let frame = &mut self.stack[self.depth - 1];
            if frame.idx > 0 {
                frame.idx -= 1;
                return true;
            }
            self.depth -= 1;
        }
        false
    }

    /// Moves to the smallest item. Returns `false` on an empty tree.
    pub fn first(&mut self) -> bool {
        self.depth = 0;
        match self.tree.root {
            Some(root) => {
                self.descend_left(root);
                true
            }
            None => false,
        }
    }

    /// Moves to the largest item. Returns `false` on an empty tree.
    pub fn last(&mut self) -> bool {
        self.depth = 0;
        match self.tree.root {
            Some(root) => {
                self.descend_right(root);
                true
            }
            None => false,
        }
    }

    /// Advances to the next item. Returns `false`, and becomes unpositioned,
    /// when there is none.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        if self.depth == 0 {
            return false;
        }
        let top = self.depth - 1;
        let frame = self.stack[top];
        self.stack[top].idx += 1;
        if frame.node.is_leaf() {
            return self.settle_forward();
        }
        // SAFETY: internal node, idx + 1 <= len.
        let child = unsafe { frame.node.child(&self.tree.shape, frame.idx + 1) };
        self.descend_left(child);
        true
    }

    /// Steps back to the previous item. Returns `false`, and becomes
    /// unpositioned, when there is none.
    pub fn prev(&mut self) -> bool {
        if self.depth == 0 {
            return false;
        }
        let frame = self.stack[self.depth - 1];
        if frame.node.is_leaf() {
            return self.settle_backward();
        }
        // SAFETY: internal node, idx <= len.
        let child = unsafe { frame.node.child(&self.tree.shape, frame.idx) };
        self.descend_right(child);
        true
    }

    /// The item at the cursor, or `None` when unpositioned.
    pub fn item(&self) -> Option<&'a T> {
        if self.depth == 0 {
            return None;
        }
        let frame = self.stack[self.depth - 1];
        // SAFETY: the top frame names a live item; the tree is borrowed for 'a.
        Some(unsafe { frame.node.item(&self.tree.shape, frame.idx) })
    }
}

impl<'a, T, C: Compare<T>, A: NodeAllocator> Cursor<'a, T, C, A> {
    /// Moves to the first item `>= key`. Returns `false` if there is none.
    pub fn seek(&mut self, key: &T) -> bool {
        self.depth = 0;
        let Some(mut node) = self.tree.root else {
            return false;
        };
        let tree = self.tree;
        let engine = tree.engine();
        loop {
            match engine.search(node, key) {
                Ok(idx) => {
                    self.push(node, idx);
                    return true;
                }
                Err(idx) => {
                    self.push(node, idx);
                    if node.is_leaf() {
                        return self.settle_forward();
                    }
                    // SAFETY: internal node, idx <= len.
                    node = unsafe { node.child(&tree.shape, idx) };
                }
            }
        }
    }

    /// Moves to the last item `<= key`. Returns `false` if there is none.
    pub fn seek_back(&mut self, key: &T) -> bool {
        self.depth = 0;
        let Some(mut node) = self.tree.root else {
            return false;
        };
        let tree = self.tree;
        let engine = tree.engine();
        loop {
            match engine.search(node, key) {
                Ok(idx) => {
                    self.push(node, idx);
                    return true;
                }
                Err(idx) => {
                    self.push(node, idx);
                    if node.is_leaf() {
                        return self.settle_backward();
                    }
                    // SAFETY: internal node, idx <= len.
                    node = unsafe { node.child(&tree.shape, idx) };
                }
            }
        }
    }
}

impl<T: fmt::Debug, C, A: NodeAllocator> fmt::Debug for Cursor<'_, T, C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("item", &self.item())
            .field("depth", &self.depth)
            .finish()
    }
}

/// An in-order iterator over a [`BTree`], created by [`BTree::iter`].
pub struct Iter<'a, T, C, A: NodeAllocator> {
    front: Cursor<'a, T, C, A>,
    back: Cursor<'a, T, C, A>,
    remaining: usize,
}

impl<'a, T, C, A: NodeAllocator> Iter<'a, T, C, A> {
    pub(super) fn new(tree: &'a BTree<T, C, A>) -> Self {
        let mut front = Cursor::new(tree);
        let mut back = Cursor::new(tree);
        front.first();
        back.last();
        Self {
            front,
            back,
            remaining: tree.len(),
        }
    }
}

impl<'a, T, C, A: NodeAllocator> Iterator for Iter<'a, T, C, A> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.front.item()?;
        self.front.next();
        self.remaining -= 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T, C, A: NodeAllocator> DoubleEndedIterator for Iter<'a, T, C, A> {
    fn next_back(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.back.item()?;
        self.back.prev();
        self.remaining -= 1;
        Some(item)
    }
}

impl<T, C, A: NodeAllocator> ExactSizeIterator for Iter<'_, T, C, A> {}

impl<T, C, A: NodeAllocator> FusedIterator for Iter<'_, T, C, A> {}

impl<'a, T, C, A: NodeAllocator> IntoIterator for &'a BTree<T, C, A> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T, C, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
