//! The tree engine: node geometry, ordering and allocator bundled by reference.
//!
//! The handle keeps the root separately and passes it in as `&mut Option<_>`,
//! which keeps the engine's shared borrows disjoint from the root.

use super::compare::Compare;
use super::node::{NodePtr, Shape};
use super::reserve::{Need, Reserve};
use crate::alloc::{AllocError, NodeAllocator};

pub(crate) struct Engine<'a, T, C: ?Sized, A: ?Sized> {
    pub(crate) shape: &'a Shape<T>,
    pub(crate) cmp: &'a C,
    pub(crate) alloc: &'a A,
}

/// Turns the root into a raw child slot, the same kind internal nodes hand out.
pub(crate) fn root_slot<T>(root: &mut Option<NodePtr<T>>) -> Option<*mut NodePtr<T>> {
    root.as_mut().map(|slot| slot as *mut NodePtr<T>)
}

impl<'a, T, C, A> Engine<'a, T, C, A>
where
    C: Compare<T> + ?Sized,
    A: NodeAllocator + ?Sized,
{
    pub(crate) fn new(shape: &'a Shape<T>, cmp: &'a C, alloc: &'a A) -> Self {
        Self { shape, cmp, alloc }
    }

    /// Binary search within one node: `Ok` on a hit, else the child index.
    #[inline]
    pub(crate) fn search(&self, node: NodePtr<T>, key: &T) -> Result<usize, usize> {
        // SAFETY: nodes reachable from a live root are live.
        let items = unsafe { node.items(self.shape) };
        items.binary_search_by(|probe| self.cmp.compare(probe, key))
    }

    /// Finds the node and slot holding an item equal to `key`.
    pub(crate) fn locate(&self, root: NodePtr<T>, key: &T) -> Option<(NodePtr<T>, usize)> {
        let mut node = root;
        loop {
            match self.search(node, key) {
                Ok(idx) => return Some((node, idx)),
                Err(_) if node.is_leaf() => return None,
                // SAFETY: internal node, idx <= len.
                Err(idx) => node = unsafe { node.child(self.shape, idx) },
            }
        }
    }

    pub(crate) fn leftmost(&self, root: NodePtr<T>) -> (NodePtr<T>, usize) {
        let mut node = root;
        while !node.is_leaf() {
            // SAFETY: internal node.
            node = unsafe { node.child(self.shape, 0) };
        }
        (node, 0)
    }

    pub(crate) fn rightmost(&self, root: NodePtr<T>) -> (NodePtr<T>, usize) {
        let mut node = root;
        while !node.is_leaf() {
            // SAFETY: internal node.
            node = unsafe { node.child(self.shape, node.len()) };
        }
        (node, node.len() - 1)
    }

    /// Makes the node in `slot` exclusive, copying it from the reserve if it
    /// is shared. The copy replaces the original in `slot`.
    ///
    /// # Safety
    /// `slot` is the root slot or a child slot of an exclusive node.
    pub(crate) unsafe fn make_mut(
        &self,
        slot: *mut NodePtr<T>,
        reserve: &mut Reserve<'_, T, A>,
    ) -> NodePtr<T>
    where
        T: Clone,
    {
        let node = *slot;
        if !node.is_shared() {
            return node;
        }
        let copy = node.clone_into(self.shape, reserve.take(node.kind()));
        *slot = copy;
        node.release(self.shape, self.alloc);
        copy
    }

    /// Like [`Engine::make_mut`], allocating the copy on demand.
    ///
    /// # Safety
    /// As for [`Engine::make_mut`].
    pub(crate) unsafe fn make_mut_now(&self, slot: *mut NodePtr<T>) -> Result<NodePtr<T>, AllocError>
    where
        T: Clone,
    {
        let node = *slot;
        if !node.is_shared() {
            return Ok(node);
        }
        let mut reserve = Reserve::fill(self.shape, self.alloc, Need::one(node.kind()))?;
        Ok(self.make_mut(slot, &mut reserve))
    }
}
