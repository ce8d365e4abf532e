//! Node layout and positional item storage.
//!
//! A node is a single block from the tree's allocator: a [`Header`], room for
//! `M - 1` items, and for internal nodes room for `M` child pointers after the
//! items. Leaf and internal blocks have different layouts; both are computed
//! once per tree into a [`Shape`].
//!
//! Nodes carry a reference count. A node whose count is above one is shared
//! with another tree (directly or through a shared ancestor) and is never
//! written; writers copy it first. All positional operations below assume the
//! node is exclusively owned by the caller.

use crate::alloc::NodeAllocator;
use core::alloc::{Layout, LayoutError};
use core::marker::PhantomData;
use core::ptr::{self, NonNull};
use core::slice;
use core::sync::atomic::{fence, AtomicUsize, Ordering};

#[repr(C)]
pub(crate) struct Header {
    rc: AtomicUsize,
    len: usize,
    leaf: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Leaf,
    Internal,
}

/// Block geometry of every node in one tree.
pub(crate) struct Shape<T> {
    max_items: usize,
    leaf: Layout,
    internal: Layout,
    items_offset: usize,
    children_offset: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Shape<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Shape<T> {}

impl<T> Shape<T> {
    /// Computes leaf and internal layouts for branching factor `max_items`.
    pub(crate) fn new(max_items: usize) -> Result<Self, LayoutError> {
        debug_assert!(max_items >= 4 && max_items % 2 == 0);
        let header = Layout::new::<Header>();
        let (leaf, items_offset) = header.extend(Layout::array::<T>(max_items - 1)?)?;
        let (internal, children_offset) = leaf.extend(Layout::array::<NodePtr<T>>(max_items)?)?;
        Ok(Self {
            max_items,
            leaf: leaf.pad_to_align(),
            internal: internal.pad_to_align(),
            items_offset,
            children_offset,
            _marker: PhantomData,
        })
    }

    #[inline]
    pub(crate) fn max_items(&self) -> usize {
        self.max_items
    }

    /// Most items a node can hold.
    #[inline]
    pub(crate) fn max_len(&self) -> usize {
        self.max_items - 1
    }

    /// Fewest items a non-root node may hold.
    #[inline]
    pub(crate) fn min_len(&self) -> usize {
        self.max_items / 2 - 1
    }

    #[inline]
    pub(crate) fn layout(&self, kind: Kind) -> Layout {
        match kind {
            Kind::Leaf => self.leaf,
            Kind::Internal => self.internal,
        }
    }
}

/// A pointer to a live node.
pub(crate) struct NodePtr<T> {
    ptr: NonNull<Header>,
    _marker: PhantomData<*const T>,
}

impl<T> Clone for NodePtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodePtr<T> {}

impl<T> PartialEq for NodePtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T> Eq for NodePtr<T> {}

impl<T> NodePtr<T> {
    /// A placeholder that must never be dereferenced.
    pub(crate) const fn dangling() -> Self {
        Self {
            ptr: NonNull::dangling(),
            _marker: PhantomData,
        }
    }

    /// Writes an empty node header into `block` with a reference count of one.
    ///
    /// # Safety
    /// `block` must come from the tree's allocator with `shape.layout(kind)`.
    pub(crate) unsafe fn init(block: NonNull<u8>, kind: Kind) -> Self {
        let ptr = block.cast::<Header>();
        ptr.as_ptr().write(Header {
            rc: AtomicUsize::new(1),
            len: 0,
            leaf: kind == Kind::Leaf,
        });
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn rc(&self) -> &AtomicUsize {
        // SAFETY: a NodePtr only exists for live nodes; the counter is atomic.
        unsafe { &(*self.ptr.as_ptr()).rc }
    }

    #[inline]
    pub(crate) fn len(self) -> usize {
        // SAFETY: live node; shared nodes are never written.
        unsafe { (*self.ptr.as_ptr()).len }
    }

    #[inline]
    fn set_len(self, len: usize) {
        // SAFETY: only called on exclusively owned nodes.
        unsafe { (*self.ptr.as_ptr()).len = len }
    }

    #[inline]
    pub(crate) fn is_leaf(self) -> bool {
        // SAFETY: live node; the flag never changes after init.
        unsafe { (*self.ptr.as_ptr()).leaf }
    }

    #[inline]
    pub(crate) fn kind(self) -> Kind {
        if self.is_leaf() {
            Kind::Leaf
        } else {
            Kind::Internal
        }
    }

    #[inline]
    pub(crate) fn ref_count(self) -> usize {
        self.rc().load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn is_shared(self) -> bool {
        self.ref_count() > 1
    }

    /// Adds a reference from a new parent or tree handle.
    #[inline]
    pub(crate) fn retain(self) {
        self.rc().fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn items_ptr(self, shape: &Shape<T>) -> *mut T {
        // SAFETY: the items region lies inside every node block.
        unsafe { self.ptr.as_ptr().cast::<u8>().add(shape.items_offset).cast() }
    }

    #[inline]
    fn children_ptr(self, shape: &Shape<T>) -> *mut NodePtr<T> {
        debug_assert!(!self.is_leaf(), "leaves have no child region");
        // SAFETY: internal blocks extend past the children offset.
        unsafe { self.ptr.as_ptr().cast::<u8>().add(shape.children_offset).cast() }
    }

    /// # Safety
    /// The node must be live for `'a` and not written while the slice is held.
    #[inline]
    pub(crate) unsafe fn items<'a>(self, shape: &Shape<T>) -> &'a [T] {
        slice::from_raw_parts(self.items_ptr(shape), self.len())
    }

    /// # Safety
    /// The node must be exclusively owned and live for `'a`.
    #[inline]
    pub(crate) unsafe fn items_mut<'a>(self, shape: &Shape<T>) -> &'a mut [T] {
        slice::from_raw_parts_mut(self.items_ptr(shape), self.len())
    }

    /// # Safety
    /// The node must be live for `'a` and `idx < len`.
    #[inline]
    pub(crate) unsafe fn item<'a>(self, shape: &Shape<T>, idx: usize) -> &'a T {
        debug_assert!(idx < self.len());
        &*self.items_ptr(shape).add(idx)
    }

    /// # Safety
    /// The node must be internal and `idx <= len`.
    #[inline]
    pub(crate) unsafe fn child(self, shape: &Shape<T>, idx: usize) -> NodePtr<T> {
        *self.child_slot(shape, idx)
    }

    /// # Safety
    /// The node must be internal and `idx <= len`.
    #[inline]
    pub(crate) unsafe fn child_slot(self, shape: &Shape<T>, idx: usize) -> *mut NodePtr<T> {
        debug_assert!(idx <= self.len());
        self.children_ptr(shape).add(idx)
    }

    /// Inserts `item` at `idx`, shifting later items right.
    ///
    /// # Safety
    /// Exclusive, not full, `idx <= len`. Internal nodes must be fixed up by
    /// the caller; use [`NodePtr::insert_split`] for them.
    pub(crate) unsafe fn insert_item(self, shape: &Shape<T>, idx: usize, item: T) {
        let len = self.len();
        debug_assert!(len < shape.max_len() && idx <= len);
        let items = self.items_ptr(shape);
        ptr::copy(items.add(idx), items.add(idx + 1), len - idx);
        items.add(idx).write(item);
        self.set_len(len + 1);
    }

    /// Inserts `item` at `idx` with `right` as the child that follows it.
    ///
    /// # Safety
    /// Exclusive internal node, not full, `idx <= len`.
    pub(crate) unsafe fn insert_split(self, shape: &Shape<T>, idx: usize, item: T, right: NodePtr<T>) {
        let len = self.len();
        debug_assert!(len < shape.max_len() && idx <= len);
        let items = self.items_ptr(shape);
        let children = self.children_ptr(shape);
        ptr::copy(items.add(idx), items.add(idx + 1), len - idx);
        items.add(idx).write(item);
        ptr::copy(children.add(idx + 1), children.add(idx + 2), len - idx);
        children.add(idx + 1).write(right);
        self.set_len(len + 1);
    }

    /// Removes and returns the item at `idx` of a leaf.
    ///
    /// # Safety
    /// Exclusive leaf, `idx < len`.
    pub(crate) unsafe fn remove_item(self, shape: &Shape<T>, idx: usize) -> T {
        let len = self.len();
        debug_assert!(self.is_leaf() && idx < len);
        let items = self.items_ptr(shape);
        let item = items.add(idx).read();
        ptr::copy(items.add(idx + 1), items.add(idx), len - idx - 1);
        self.set_len(len - 1);
        item
    }

    /// Removes the separator at `idx` together with the child to its right.
    ///
    /// # Safety
    /// Exclusive internal node, `idx < len`.
    pub(crate) unsafe fn remove_separator(self, shape: &Shape<T>, idx: usize) -> (T, NodePtr<T>) {
        let len = self.len();
        debug_assert!(idx < len);
        let items = self.items_ptr(shape);
        let children = self.children_ptr(shape);
        let item = items.add(idx).read();
        let right = children.add(idx + 1).read();
        ptr::copy(items.add(idx + 1), items.add(idx), len - idx - 1);
        ptr::copy(children.add(idx + 2), children.add(idx + 1), len - idx - 1);
        self.set_len(len - 1);
        (item, right)
    }

    /// # Safety
    /// Exclusive, not full; `child` is `Some` exactly when the node is internal.
    pub(crate) unsafe fn push_front(self, shape: &Shape<T>, item: T, child: Option<NodePtr<T>>) {
        let len = self.len();
        let items = self.items_ptr(shape);
        ptr::copy(items, items.add(1), len);
        items.write(item);
        if let Some(child) = child {
            let children = self.children_ptr(shape);
            ptr::copy(children, children.add(1), len + 1);
            children.write(child);
        }
        self.set_len(len + 1);
    }

    /// # Safety
    /// Exclusive, not full; `child` is `Some` exactly when the node is internal.
    pub(crate) unsafe fn push_back(self, shape: &Shape<T>, item: T, child: Option<NodePtr<T>>) {
        let len = self.len();
        self.items_ptr(shape).add(len).write(item);
        if let Some(child) = child {
            self.children_ptr(shape).add(len + 1).write(child);
        }
        self.set_len(len + 1);
    }

    /// # Safety
    /// Exclusive, non-empty.
    pub(crate) unsafe fn pop_front(self, shape: &Shape<T>) -> (T, Option<NodePtr<T>>) {
        let len = self.len();
        debug_assert!(len > 0);
        let items = self.items_ptr(shape);
        let item = items.read();
        ptr::copy(items.add(1), items, len - 1);
        let child = if self.is_leaf() {
            None
        } else {
            let children = self.children_ptr(shape);
            let child = children.read();
            ptr::copy(children.add(1), children, len);
            Some(child)
        };
        self.set_len(len - 1);
        (item, child)
    }

    /// # Safety
    /// Exclusive, non-empty.
    pub(crate) unsafe fn pop_back(self, shape: &Shape<T>) -> (T, Option<NodePtr<T>>) {
        let len = self.len();
        debug_assert!(len > 0);
        let item = self.items_ptr(shape).add(len - 1).read();
        let child = if self.is_leaf() {
            None
        } else {
            Some(self.children_ptr(shape).add(len).read())
        };
        self.set_len(len - 1);
        (item, child)
    }

    /// Moves the upper half into a fresh node built in `block` and returns the
    /// median with the new right sibling.
    ///
    /// # Safety
    /// Exclusive and full; `block` has the layout of this node's kind.
    pub(crate) unsafe fn split(self, shape: &Shape<T>, block: NonNull<u8>) -> (T, NodePtr<T>) {
        let len = self.len();
        debug_assert_eq!(len, shape.max_len());
        let mid = len / 2;
        let right = NodePtr::init(block, self.kind());
        let items = self.items_ptr(shape);
        let median = items.add(mid).read();
        ptr::copy_nonoverlapping(items.add(mid + 1), right.items_ptr(shape), len - mid - 1);
        if !self.is_leaf() {
            ptr::copy_nonoverlapping(
                self.children_ptr(shape).add(mid + 1),
                right.children_ptr(shape),
                len - mid,
            );
        }
        self.set_len(mid);
        right.set_len(len - mid - 1);
        (median, right)
    }

    /// Appends `separator` and all of `right` to this node. `right` is left
    /// empty; its block still has to be freed.
    ///
    /// # Safety
    /// Both exclusive and of the same kind; the result must fit.
    pub(crate) unsafe fn merge(self, shape: &Shape<T>, separator: T, right: NodePtr<T>) {
        let len = self.len();
        let right_len = right.len();
        debug_assert!(len + right_len < shape.max_len() + 1);
        let items = self.items_ptr(shape);
        items.add(len).write(separator);
        ptr::copy_nonoverlapping(right.items_ptr(shape), items.add(len + 1), right_len);
        if !self.is_leaf() {
            ptr::copy_nonoverlapping(
                right.children_ptr(shape),
                self.children_ptr(shape).add(len + 1),
                right_len + 1,
            );
        }
        self.set_len(len + 1 + right_len);
        right.set_len(0);
    }

    /// Copies this node into `block`: items are cloned, children are shared.
    ///
    /// # Safety
    /// `block` has the layout of this node's kind. A panicking `Clone` leaks
    /// the block and the items cloned so far.
    pub(crate) unsafe fn clone_into(self, shape: &Shape<T>, block: NonNull<u8>) -> NodePtr<T>
    where
        T: Clone,
    {
        let copy = NodePtr::init(block, self.kind());
        let dst = copy.items_ptr(shape);
        for (idx, item) in self.items(shape).iter().enumerate() {
            dst.add(idx).write(item.clone());
        }
        if !self.is_leaf() {
            let children = copy.children_ptr(shape);
            for idx in 0..=self.len() {
                let child = self.child(shape, idx);
                child.retain();
                children.add(idx).write(child);
            }
        }
        copy.set_len(self.len());
        copy
    }

    /// Drops one reference. The last reference drops the items, releases the
    /// children and returns the block to the allocator.
    ///
    /// # Safety
    /// The caller gives up the reference it held.
    pub(crate) unsafe fn release<A: NodeAllocator + ?Sized>(self, shape: &Shape<T>, alloc: &A) {
        if self.rc().fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        fence(Ordering::Acquire);
        let len = self.len();
        ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.items_ptr(shape), len));
        if !self.is_leaf() {
            for idx in 0..=len {
                self.child(shape, idx).release(shape, alloc);
            }
        }
        self.free_block(shape, alloc);
    }

    /// Returns the block to the allocator without touching its contents.
    ///
    /// # Safety
    /// Items and children must have been moved out or be trivially forgettable.
    pub(crate) unsafe fn free_block<A: NodeAllocator + ?Sized>(self, shape: &Shape<T>, alloc: &A) {
        alloc.deallocate(self.ptr.cast(), shape.layout(self.kind()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{Global, TrackingAllocator};

    fn leaf_with(shape: &Shape<u32>, alloc: &impl NodeAllocator, items: &[u32]) -> NodePtr<u32> {
        let block = alloc.allocate(shape.layout(Kind::Leaf)).unwrap();
        let node = unsafe { NodePtr::init(block, Kind::Leaf) };
        for (idx, item) in items.iter().enumerate() {
            unsafe { node.insert_item(shape, idx, *item) };
        }
        node
    }

    #[test]
    fn test_fill_bounds() {
        let shape = Shape::<u64>::new(6).unwrap();
        assert_eq!(shape.max_len(), 5);
        assert_eq!(shape.min_len(), 2);
        assert!(shape.layout(Kind::Internal).size() > shape.layout(Kind::Leaf).size());
    }

    #[test]
    fn test_insert_remove_positional() {
        let shape = Shape::<u32>::new(6).unwrap();
        let node = leaf_with(&shape, &Global, &[10, 30]);
        unsafe {
            node.insert_item(&shape, 1, 20);
            assert_eq!(node.items(&shape), &[10, 20, 30]);
            assert_eq!(node.remove_item(&shape, 0), 10);
            assert_eq!(node.items(&shape), &[20, 30]);
            node.release(&shape, &Global);
        }
    }

    #[test]
    fn test_split_and_merge_leaf() {
        let shape = Shape::<u32>::new(6).unwrap();
        let alloc = TrackingAllocator::new();
        let node = leaf_with(&shape, &alloc, &[1, 2, 3, 4, 5]);
        unsafe {
            let block = alloc.allocate(shape.layout(Kind::Leaf)).unwrap();
            let (median, right) = node.split(&shape, block);
            assert_eq!(median, 3);
            assert_eq!(node.items(&shape), &[1, 2]);
            assert_eq!(right.items(&shape), &[4, 5]);

            node.merge(&shape, median, right);
            assert_eq!(node.items(&shape), &[1, 2, 3, 4, 5]);
            right.free_block(&shape, &alloc);
            node.release(&shape, &alloc);
        }
        assert_eq!(alloc.live_blocks(), 0);
    }

    #[test]
    fn test_clone_into_shares_nothing_but_children() {
        let shape = Shape::<String>::new(4).unwrap();
        let alloc = TrackingAllocator::new();
        let block = alloc.allocate(shape.layout(Kind::Leaf)).unwrap();
        let node = unsafe { NodePtr::init(block, Kind::Leaf) };
        unsafe {
            node.insert_item(&shape, 0, "a".to_string());
            node.retain();
            assert!(node.is_shared());

            let block = alloc.allocate(shape.layout(Kind::Leaf)).unwrap();
            let copy = node.clone_into(&shape, block);
            assert_eq!(copy.ref_count(), 1);
            copy.items_mut(&shape)[0].push('b');
            assert_eq!(node.items(&shape)[0], "a");
            assert_eq!(copy.items(&shape)[0], "ab");

            copy.release(&shape, &alloc);
            node.release(&shape, &alloc);
            assert_eq!(alloc.live_blocks(), 1);
            node.release(&shape, &alloc);
        }
        assert_eq!(alloc.live_blocks(), 0);
    }
}
