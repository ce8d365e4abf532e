//! Insert, replace and delete.
//!
//! Every mutation runs in two phases. The plan walks the path read-only and
//! counts the clones and splits it might need; the reserve allocates those
//! blocks; only then does the tree change, and from that point nothing can
//! fail. Splits happen preemptively on the way down, and underfull children
//! are repaired on the way back up, so each mutation visits a path once.

use super::compare::Compare;
use super::engine::{root_slot, Engine};
use super::node::{Kind, NodePtr};
use super::reserve::{Need, Reserve};
use crate::alloc::{AllocError, NodeAllocator};
use crate::tracing_helpers::{debug_log, trace_log};
use core::cmp::Ordering;
use core::mem;

/// Which item a delete removes.
pub(crate) enum Target<'k, T> {
    Key(&'k T),
    Min,
    Max,
}

impl<T> Clone for Target<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Target<'_, T> {}

impl<'a, T, C, A> Engine<'a, T, C, A>
where
    T: Clone,
    C: Compare<T> + ?Sized,
    A: NodeAllocator + ?Sized,
{
    /// Inserts `item`, or replaces the equal item and returns it.
    ///
    /// On allocation failure the tree is unchanged and the item is handed back.
    pub(crate) fn set(
        &self,
        root: &mut Option<NodePtr<T>>,
        item: T,
    ) -> Result<Option<T>, (T, AllocError)> {
        let Some(slot) = root_slot(root) else {
            return self.plant(root, item).map(|()| None);
        };
        // SAFETY: the root slot is live for the whole call.
        let need = self.plan_set(unsafe { *slot }, &item);
        let mut reserve = match Reserve::fill(self.shape, self.alloc, need) {
            Ok(reserve) => reserve,
            Err(err) => return Err((item, err)),
        };
        // SAFETY: the reserve covers every clone and split the plan found.
        Ok(unsafe { self.set_reserved(slot, item, &mut reserve) })
    }

    /// Starts an empty tree with a one-item leaf.
    fn plant(&self, root: &mut Option<NodePtr<T>>, item: T) -> Result<(), (T, AllocError)> {
        match self.alloc.allocate(self.shape.layout(Kind::Leaf)) {
            Ok(block) => {
                // SAFETY: fresh leaf block.
                unsafe {
                    let leaf = NodePtr::init(block, Kind::Leaf);
                    leaf.insert_item(self.shape, 0, item);
                    *root = Some(leaf);
                }
                Ok(())
            }
            Err(err) => {
                debug_log!("first leaf allocation failed");
                Err((item, err))
            }
        }
    }

    fn plan_set(&self, root: NodePtr<T>, item: &T) -> Need {
        let shape = self.shape;
        let mut need = Need::default();
        let mut node = root;
        let mut shared = false;
        let mut depth = 0usize;
        loop {
            shared |= node.is_shared();
            if shared {
                need.add(node.kind());
            }
            if node.len() == shape.max_len() {
                need.add(node.kind());
                if depth == 0 {
                    need.add(Kind::Internal);
                }
            }
            match self.search(node, item) {
                Ok(_) => return need,
                Err(_) if node.is_leaf() => return need,
                // SAFETY: internal node, idx <= len.
                Err(idx) => node = unsafe { node.child(shape, idx) },
            }
            depth += 1;
        }
    }

    unsafe fn split_child(&self, parent: NodePtr<T>, idx: usize, reserve: &mut Reserve<'_, T, A>) {
        let child = parent.child(self.shape, idx);
        let (median, right) = child.split(self.shape, reserve.take(child.kind()));
        parent.insert_split(self.shape, idx, median, right);
        trace_log!(idx, left = child.len(), right = right.len(), "split node");
    }

    unsafe fn set_reserved(
        &self,
        slot: *mut NodePtr<T>,
        item: T,
        reserve: &mut Reserve<'_, T, A>,
    ) -> Option<T> {
        let shape = self.shape;
        let mut node = self.make_mut(slot, reserve);
        if node.len() == shape.max_len() {
            let grown = NodePtr::init(reserve.take(Kind::Internal), Kind::Internal);
            grown.child_slot(shape, 0).write(node);
            *slot = grown;
            self.split_child(grown, 0, reserve);
            trace_log!("root grew");
            node = grown;
        }
        loop {
            let mut idx = match self.search(node, &item) {
                Ok(idx) => return Some(mem::replace(&mut node.items_mut(shape)[idx], item)),
                Err(idx) => idx,
            };
            if node.is_leaf() {
                node.insert_item(shape, idx, item);
                return None;
            }
            let child = self.make_mut(node.child_slot(shape, idx), reserve);
            if child.len() == shape.max_len() {
                self.split_child(node, idx, reserve);
                match self.cmp.compare(&item, node.item(shape, idx)) {
                    Ordering::Less => {}
                    Ordering::Equal => {
                        return Some(mem::replace(&mut node.items_mut(shape)[idx], item));
                    }
                    Ordering::Greater => idx += 1,
                }
            }
            node = node.child(shape, idx);
        }
    }

    /// Appends `item` in place when it sorts after every item, the rightmost
    /// path is exclusive and the last leaf has room. Otherwise hands it back.
    pub(crate) fn append(&self, root: Option<NodePtr<T>>, item: T) -> Result<(), T> {
        let Some(mut node) = root else {
            return Err(item);
        };
        loop {
            if node.is_shared() {
                return Err(item);
            }
            if node.is_leaf() {
                break;
            }
            // SAFETY: internal node.
            node = unsafe { node.child(self.shape, node.len()) };
        }
        let len = node.len();
        if len == self.shape.max_len() {
            return Err(item);
        }
        // SAFETY: the root is never an empty leaf, so len > 0.
        let last = unsafe { node.item(self.shape, len - 1) };
        if self.cmp.compare(&item, last) != Ordering::Greater {
            return Err(item);
        }
        // SAFETY: exclusive leaf with room; appending keeps the order.
        unsafe { node.insert_item(self.shape, len, item) };
        Ok(())
    }

    /// Removes the targeted item. A key that is not present costs nothing.
    pub(crate) fn delete(
        &self,
        root: &mut Option<NodePtr<T>>,
        target: Target<'_, T>,
    ) -> Result<Option<T>, AllocError> {
        let Some(slot) = root_slot(root) else {
            return Ok(None);
        };
        // SAFETY: the root slot is live for the whole call.
        let top = unsafe { *slot };
        if let Target::Key(key) = target {
            if self.locate(top, key).is_none() {
                return Ok(None);
            }
        }
        let need = self.plan_delete(top, target);
        let mut reserve = Reserve::fill(self.shape, self.alloc, need)?;
        // SAFETY: the target exists and the reserve covers every clone on the
        // path and on the siblings it may borrow from or merge with.
        unsafe {
            let node = self.make_mut(slot, &mut reserve);
            let removed = self.delete_in(node, target, &mut reserve);
            if node.len() == 0 {
                *root = if node.is_leaf() {
                    None
                } else {
                    Some(node.child(self.shape, 0))
                };
                node.free_block(self.shape, self.alloc);
                trace_log!("root shrank");
            }
            Ok(Some(removed))
        }
    }

    fn plan_delete(&self, root: NodePtr<T>, target: Target<'_, T>) -> Need {
        let shape = self.shape;
        let mut need = Need::default();
        let mut node = root;
        let mut target = target;
        let mut shared = node.is_shared();
        if shared {
            need.add(node.kind());
        }
        while !node.is_leaf() {
            let idx = match target {
                Target::Key(key) => match self.search(node, key) {
                    Ok(idx) => {
                        target = Target::Max;
                        idx
                    }
                    Err(idx) => idx,
                },
                Target::Min => 0,
                Target::Max => node.len(),
            };
            // SAFETY: internal node, every index used is <= len.
            unsafe {
                let child = node.child(shape, idx);
                let sibling = node.child(shape, if idx == node.len() { idx - 1 } else { idx + 1 });
                shared |= child.is_shared();
                if shared {
                    need.add(child.kind());
                }
                if shared || sibling.is_shared() {
                    need.add(sibling.kind());
                }
                node = child;
            }
        }
        need
    }

    /// # Safety
    /// `node` is exclusive and holds the target in its subtree.
    unsafe fn delete_in(&self, node: NodePtr<T>, target: Target<'_, T>, reserve: &mut Reserve<'_, T, A>) -> T {
        let shape = self.shape;
        let found = match target {
            Target::Key(key) => self.search(node, key),
            Target::Min if node.is_leaf() => Ok(0),
            Target::Min => Err(0),
            Target::Max if node.is_leaf() => Ok(node.len() - 1),
            Target::Max => Err(node.len()),
        };
        if node.is_leaf() {
            let Ok(idx) = found else {
                unreachable!("deleted key vanished between lookup and removal");
            };
            return node.remove_item(shape, idx);
        }
        let (idx, removed) = match found {
            Ok(idx) => {
                let child = self.make_mut(node.child_slot(shape, idx), reserve);
                let predecessor = self.delete_in(child, Target::Max, reserve);
                (idx, mem::replace(&mut node.items_mut(shape)[idx], predecessor))
            }
            Err(idx) => {
                let child = self.make_mut(node.child_slot(shape, idx), reserve);
                (idx, self.delete_in(child, target, reserve))
            }
        };
        self.rebalance(node, idx, reserve);
        removed
    }

    /// Restores the fill bound of child `idx` by merging it with a sibling or
    /// rotating one item over from the fuller sibling.
    unsafe fn rebalance(&self, node: NodePtr<T>, idx: usize, reserve: &mut Reserve<'_, T, A>) {
        let shape = self.shape;
        if node.child(shape, idx).len() >= shape.min_len() {
            return;
        }
        let idx = if idx == node.len() { idx - 1 } else { idx };
        let left = self.make_mut(node.child_slot(shape, idx), reserve);
        let right = self.make_mut(node.child_slot(shape, idx + 1), reserve);
        if left.len() + right.len() < shape.max_len() {
            let (separator, _) = node.remove_separator(shape, idx);
            left.merge(shape, separator, right);
            right.free_block(shape, self.alloc);
            trace_log!(idx, len = left.len(), "merged siblings");
        } else if left.len() < right.len() {
            let (first, child) = right.pop_front(shape);
            let separator = mem::replace(&mut node.items_mut(shape)[idx], first);
            left.push_back(shape, separator, child);
        } else {
            let (last, child) = left.pop_back(shape);
            let separator = mem::replace(&mut node.items_mut(shape)[idx], last);
            right.push_front(shape, separator, child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::TrackingAllocator;
    use crate::collections::btree::compare::Natural;
    use crate::collections::btree::node::Shape;

    struct Fixture {
        shape: Shape<u32>,
        alloc: TrackingAllocator,
        root: Option<NodePtr<u32>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                shape: Shape::new(4).unwrap(),
                alloc: TrackingAllocator::new(),
                root: None,
            }
        }

        fn engine(&self) -> Engine<'_, u32, Natural, TrackingAllocator> {
            Engine::new(&self.shape, &Natural, &self.alloc)
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            if let Some(root) = self.root.take() {
                unsafe { root.release(&self.shape, &self.alloc) };
            }
            if !std::thread::panicking() {
                assert_eq!(self.alloc.live_blocks(), 0);
            }
        }
    }

    #[test]
    fn test_plan_counts_root_split() {
        let mut fx = Fixture::new();
        let mut root = fx.root.take();
        for i in 0..3 {
            fx.engine().set(&mut root, i).unwrap();
        }
        let need = fx.engine().plan_set(root.unwrap(), &10);
        assert_eq!(need, Need { leaves: 1, internals: 1 });
        fx.root = root;
    }

    #[test]
    fn test_delete_min_max() {
        let mut fx = Fixture::new();
        let mut root = fx.root.take();
        for i in 0..20 {
            fx.engine().set(&mut root, i).unwrap();
        }
        assert_eq!(fx.engine().delete(&mut root, Target::Min), Ok(Some(0)));
        assert_eq!(fx.engine().delete(&mut root, Target::Max), Ok(Some(19)));
        assert_eq!(fx.engine().delete(&mut root, Target::Key(&7)), Ok(Some(7)));
        assert_eq!(fx.engine().delete(&mut root, Target::Key(&7)), Ok(None));
        fx.root = root;
    }

    #[test]
    fn test_append_refuses_out_of_order() {
        let mut fx = Fixture::new();
        let mut root = fx.root.take();
        fx.engine().set(&mut root, 5).unwrap();
        assert_eq!(fx.engine().append(root, 3), Err(3));
        assert_eq!(fx.engine().append(root, 9), Ok(()));
        fx.root = root;
    }
}
