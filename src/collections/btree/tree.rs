//! The [`BTree`] handle.

use super::compare::{Compare, Natural};
use super::engine::Engine;
use super::error::{SanityError, SetError};
use super::iter::{Cursor, Iter};
use super::mutate::Target;
use super::node::{NodePtr, Shape};
use super::sanity::TreeStats;
use super::traverse::{Action, Direction, Flow};
use crate::alloc::{AllocError, Global, NodeAllocator};
use crate::tracing_helpers::debug_log;
use core::fmt;
use core::mem;

/// Branching factor used by [`BTree::new`] and when `0` is requested.
pub const DEFAULT_MAX_ITEMS: usize = 64;
/// Smallest accepted branching factor.
pub const MIN_MAX_ITEMS: usize = 4;
/// Largest accepted branching factor.
pub const MAX_MAX_ITEMS: usize = 4096;

/// Rounds a requested branching factor to one the tree supports: `0` picks
/// the default, odd values round down, the result is clamped to
/// [`MIN_MAX_ITEMS`]`..=`[`MAX_MAX_ITEMS`].
pub fn normalize_max_items(max_items: usize) -> usize {
    if max_items == 0 {
        return DEFAULT_MAX_ITEMS;
    }
    (max_items & !1).clamp(MIN_MAX_ITEMS, MAX_MAX_ITEMS)
}

/// An ordered set of `T` stored in a copy-on-write B-tree.
///
/// Cloning is O(1): the clone shares every node with the original, and each
/// side copies only the nodes on the paths it later writes. Node storage comes
/// from the allocator `A`; when it fails, the operation reports the failure
/// and the tree is left exactly as it was.
///
/// Items are ordered by `C`. Two items comparing equal are the same entry, so
/// items can carry a payload next to the part the comparator looks at.
///
/// ```rust
/// use cowbtree::BTree;
///
/// let mut tree = BTree::new();
/// for word in ["pear", "apple", "fig"] {
///     tree.set(word).unwrap();
/// }
/// let snapshot = tree.clone();
/// tree.delete(&"fig").unwrap();
///
/// assert_eq!(tree.iter().copied().collect::<Vec<_>>(), ["apple", "pear"]);
/// assert_eq!(snapshot.len(), 3);
/// ```
pub struct BTree<T, C = Natural, A: NodeAllocator = Global> {
    pub(super) root: Option<NodePtr<T>>,
    len: usize,
    oom: bool,
    pub(super) shape: Shape<T>,
    cmp: C,
    alloc: A,
}

// SAFETY: nodes are only written through a path of exclusively owned nodes,
// and shared nodes are reclaimed through an atomic reference count. Items may
// be dropped or cloned on whichever thread releases or copies their node.
unsafe impl<T: Send + Sync, C: Send, A: NodeAllocator + Send> Send for BTree<T, C, A> {}
// SAFETY: `&BTree` only reads nodes.
unsafe impl<T: Send + Sync, C: Sync, A: NodeAllocator + Sync> Sync for BTree<T, C, A> {}

impl<T: Ord> BTree<T> {
    /// Creates an empty tree ordered by `Ord`, with the default branching factor.
    pub fn new() -> Self {
        Self::with_allocator(DEFAULT_MAX_ITEMS, Natural, Global)
    }
}

impl<T: Ord> Default for BTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C: Compare<T>> BTree<T, C> {
    /// Creates an empty tree with a custom order.
    ///
    /// `max_items` is normalized by [`normalize_max_items`].
    pub fn with_compare(max_items: usize, compare: C) -> Self {
        Self::with_allocator(max_items, compare, Global)
    }
}

impl<T, C: Compare<T>, A: NodeAllocator> BTree<T, C, A> {
    /// Creates an empty tree with a custom order and allocator.
    ///
    /// # Panics
    ///
    /// If a node of `max_items` items of `T` does not fit in `isize::MAX` bytes.
    pub fn with_allocator(max_items: usize, compare: C, alloc: A) -> Self {
        let max_items = normalize_max_items(max_items);
        let shape = Shape::new(max_items)
            .unwrap_or_else(|_| panic!("node of {max_items} items overflows the address space"));
        Self {
            root: None,
            len: 0,
            oom: false,
            shape,
            cmp: compare,
            alloc,
        }
    }

    pub(super) fn engine(&self) -> Engine<'_, T, C, A> {
        Engine::new(&self.shape, &self.cmp, &self.alloc)
    }

    /// Returns the item equal to `key`.
    pub fn get(&self, key: &T) -> Option<&T> {
        let (node, idx) = self.engine().locate(self.root?, key)?;
        // SAFETY: live item; the borrow of self keeps it alive.
        Some(unsafe { node.item(&self.shape, idx) })
    }

    /// Returns `true` if an item equal to `key` is stored.
    pub fn contains(&self, key: &T) -> bool {
        self.get(key).is_some()
    }

    /// Returns the smallest item.
    pub fn min(&self) -> Option<&T> {
        let (node, idx) = self.engine().leftmost(self.root?);
        // SAFETY: as for `get`.
        Some(unsafe { node.item(&self.shape, idx) })
    }

    /// Returns the largest item.
    pub fn max(&self) -> Option<&T> {
        let (node, idx) = self.engine().rightmost(self.root?);
        // SAFETY: as for `get`.
        Some(unsafe { node.item(&self.shape, idx) })
    }

    /// Visits items in ascending order until `visit` returns `false`.
    ///
    /// With a pivot the walk starts at the first item `>= pivot`. Returns
    /// `false` if the visitor stopped the walk.
    pub fn ascend<'t, F>(&'t self, pivot: Option<&T>, mut visit: F) -> bool
    where
        F: FnMut(&'t T) -> bool,
    {
        match self.root {
            Some(root) => self.engine().ascend(root, pivot, &mut visit),
            None => true,
        }
    }

    /// Visits items in descending order until `visit` returns `false`.
    ///
    /// With a pivot the walk starts at the last item `<= pivot`. Returns
    /// `false` if the visitor stopped the walk.
    pub fn descend<'t, F>(&'t self, pivot: Option<&T>, mut visit: F) -> bool
    where
        F: FnMut(&'t T) -> bool,
    {
        match self.root {
            Some(root) => self.engine().descend(root, pivot, &mut visit),
            None => true,
        }
    }

    /// Verifies every structural invariant of the tree.
    ///
    /// # Errors
    ///
    /// The first broken invariant found.
    pub fn check(&self) -> Result<(), SanityError> {
        self.engine().check(self.root, self.len)
    }

    /// Returns `true` if [`BTree::check`] finds nothing wrong.
    pub fn sanity(&self) -> bool {
        self.check().is_ok()
    }
}

impl<T, C, A: NodeAllocator> BTree<T, C, A> {
    /// Number of items stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no items are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Levels from root to leaf; `0` when empty.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut next = self.root;
        while let Some(node) = next {
            height += 1;
            // SAFETY: internal node of this tree.
            next = (!node.is_leaf()).then(|| unsafe { node.child(&self.shape, 0) });
        }
        height
    }

    /// The branching factor: most children per node, one more than the most
    /// items per node.
    #[inline]
    pub fn max_items(&self) -> usize {
        self.shape.max_items()
    }

    /// Size in bytes of one item.
    #[inline]
    pub fn item_size(&self) -> usize {
        mem::size_of::<T>()
    }

    /// Whether the last mutating call failed to allocate.
    ///
    /// Cleared by the next mutating call that succeeds.
    #[inline]
    pub fn oom(&self) -> bool {
        self.oom
    }

    /// The allocator nodes come from.
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// The ordering in use.
    pub fn comparator(&self) -> &C {
        &self.cmp
    }

    /// An unpositioned cursor. Call [`Cursor::first`], [`Cursor::last`],
    /// [`Cursor::seek`] or [`Cursor::seek_back`] to place it.
    pub fn cursor(&self) -> Cursor<'_, T, C, A> {
        Cursor::new(self)
    }

    /// Iterates over all items in order.
    pub fn iter(&self) -> Iter<'_, T, C, A> {
        Iter::new(self)
    }

    /// Node and sharing statistics.
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats {
            len: self.len,
            max_items: self.shape.max_items(),
            item_size: mem::size_of::<T>(),
            ..TreeStats::default()
        };
        if let Some(root) = self.root {
            let engine = Engine {
                shape: &self.shape,
                cmp: &self.cmp,
                alloc: &self.alloc,
            };
            engine.collect_stats(root, 0, &mut stats);
        }
        stats
    }

    /// Removes every item. Nodes still shared with clones stay alive for them.
    pub fn clear(&mut self) {
        if let Some(root) = self.root.take() {
            // SAFETY: the handle gives up its root reference.
            unsafe { root.release(&self.shape, &self.alloc) };
        }
        self.len = 0;
        self.oom = false;
    }
}

impl<T: Clone, C: Compare<T>, A: NodeAllocator> BTree<T, C, A> {
    /// Inserts `item`, or replaces the stored item equal to it and returns
    /// the old one.
    ///
    /// # Errors
    ///
    /// When a node cannot be allocated. The tree is unchanged and the item
    /// comes back inside the error.
    pub fn set(&mut self, item: T) -> Result<Option<T>, SetError<T>> {
        let engine = Engine::new(&self.shape, &self.cmp, &self.alloc);
        match engine.set(&mut self.root, item) {
            Ok(replaced) => {
                if replaced.is_none() {
                    self.len += 1;
                }
                self.oom = false;
                Ok(replaced)
            }
            Err((item, _)) => {
                debug_log!(len = self.len, "set failed to allocate");
                self.oom = true;
                Err(SetError::new(item))
            }
        }
    }

    /// Like [`BTree::set`], but appends in place when `item` sorts after the
    /// current maximum and the rightmost leaf has room. Loading sorted input
    /// this way skips the search on most calls.
    ///
    /// # Errors
    ///
    /// As for [`BTree::set`].
    pub fn load(&mut self, item: T) -> Result<Option<T>, SetError<T>> {
        let engine = Engine::new(&self.shape, &self.cmp, &self.alloc);
        match engine.append(self.root, item) {
            Ok(()) => {
                self.len += 1;
                self.oom = false;
                Ok(None)
            }
            Err(item) => self.set(item),
        }
    }

    /// Removes and returns the item equal to `key`.
    ///
    /// # Errors
    ///
    /// When copying a shared node fails. The tree is unchanged. Deleting an
    /// absent key never allocates.
    pub fn delete(&mut self, key: &T) -> Result<Option<T>, AllocError> {
        self.remove(Target::Key(key))
    }

    /// Removes and returns the smallest item.
    ///
    /// # Errors
    ///
    /// As for [`BTree::delete`].
    pub fn pop_min(&mut self) -> Result<Option<T>, AllocError> {
        self.remove(Target::Min)
    }

    /// Removes and returns the largest item.
    ///
    /// # Errors
    ///
    /// As for [`BTree::delete`].
    pub fn pop_max(&mut self) -> Result<Option<T>, AllocError> {
        self.remove(Target::Max)
    }

    fn remove(&mut self, target: Target<'_, T>) -> Result<Option<T>, AllocError> {
        let engine = Engine::new(&self.shape, &self.cmp, &self.alloc);
        let result = engine.delete(&mut self.root, target);
        match &result {
            Ok(Some(_)) => self.len -= 1,
            Ok(None) => {}
            Err(_) => {
                debug_log!(len = self.len, "delete failed to allocate");
            }
        }
        self.oom = result.is_err();
        result
    }

    /// Visits items in ascending order with mutable access.
    ///
    /// The visitor may change an item in place as long as its position in
    /// the order stays the same, and answers with an [`Action`]. Shared nodes
    /// are copied as the walk reaches them.
    ///
    /// # Errors
    ///
    /// When copying a node fails. Actions already applied stay applied; the
    /// item being visited and everything after it are untouched.
    pub fn ascend_mut<F>(&mut self, pivot: Option<&T>, visit: F) -> Result<(), AllocError>
    where
        F: FnMut(&mut T) -> Action,
    {
        self.walk_mut(pivot, Direction::Ascend, visit)
    }

    /// Visits items in descending order with mutable access.
    ///
    /// # Errors
    ///
    /// As for [`BTree::ascend_mut`].
    pub fn descend_mut<F>(&mut self, pivot: Option<&T>, visit: F) -> Result<(), AllocError>
    where
        F: FnMut(&mut T) -> Action,
    {
        self.walk_mut(pivot, Direction::Descend, visit)
    }

    fn walk_mut<F>(&mut self, pivot: Option<&T>, direction: Direction, mut visit: F) -> Result<(), AllocError>
    where
        F: FnMut(&mut T) -> Action,
    {
        let engine = Engine::new(&self.shape, &self.cmp, &self.alloc);
        let mut resume: Option<T> = None;
        loop {
            let from = match &resume {
                Some(key) => Some((key, false)),
                None => pivot.map(|key| (key, true)),
            };
            match engine.act(&mut self.root, from, direction, &mut visit) {
                Flow::Continue | Flow::Stop => break,
                Flow::Delete(key) => {
                    match engine.delete(&mut self.root, Target::Key(&key)) {
                        Ok(Some(_)) => self.len -= 1,
                        Ok(None) => {}
                        Err(err) => {
                            self.oom = true;
                            return Err(err);
                        }
                    }
                    resume = Some(key);
                }
                Flow::Failed(err) => {
                    debug_log!(len = self.len, "mutable walk failed to allocate");
                    self.oom = true;
                    return Err(err);
                }
            }
        }
        self.oom = false;
        Ok(())
    }
}

impl<T, C: Clone, A: NodeAllocator + Clone> Clone for BTree<T, C, A> {
    /// O(1): the clone shares the root with `self`.
    fn clone(&self) -> Self {
        if let Some(root) = self.root {
            root.retain();
        }
        Self {
            root: self.root,
            len: self.len,
            oom: false,
            shape: self.shape,
            cmp: self.cmp.clone(),
            alloc: self.alloc.clone(),
        }
    }
}

impl<T, C, A: NodeAllocator> Drop for BTree<T, C, A> {
    fn drop(&mut self) {
        if let Some(root) = self.root.take() {
            // SAFETY: the handle gives up its root reference.
            unsafe { root.release(&self.shape, &self.alloc) };
        }
    }
}

impl<T: fmt::Debug, C, A: NodeAllocator> fmt::Debug for BTree<T, C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: Ord + Clone> FromIterator<T> for BTree<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut tree = BTree::new();
        tree.extend(iter);
        tree
    }
}

impl<T: Clone, C: Compare<T>, A: NodeAllocator> Extend<T> for BTree<T, C, A> {
    /// # Panics
    ///
    /// If a node cannot be allocated; use [`BTree::set`] to handle that.
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            if let Err(err) = self.set(item) {
                panic!("btree extend: {err}");
            }
        }
    }
}
