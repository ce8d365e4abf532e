//! Ordered walks, read-only and mutating.

use super::compare::Compare;
use super::engine::{root_slot, Engine};
use super::node::NodePtr;
use crate::alloc::{AllocError, NodeAllocator};

/// What a mutating traversal does after visiting an item.
///
/// Returned by the visitor passed to
/// [`BTree::ascend_mut`](super::BTree::ascend_mut) and
/// [`BTree::descend_mut`](super::BTree::descend_mut).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// Keep going; the item was not changed.
    #[default]
    None,
    /// Keep going; the item was changed in place without changing its order.
    Update,
    /// Remove the item, then keep going.
    Delete,
    /// Stop the traversal.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Ascend,
    Descend,
}

/// How a mutating walk ended.
pub(crate) enum Flow<T> {
    Continue,
    Stop,
    /// The visitor asked to delete this item; the walk stopped there.
    Delete(T),
    Failed(AllocError),
}

macro_rules! forward {
    ($flow:expr) => {
        match $flow {
            Flow::Continue => {}
            other => return other,
        }
    };
}

impl<'a, T, C, A> Engine<'a, T, C, A>
where
    C: Compare<T> + ?Sized,
    A: NodeAllocator + ?Sized,
{
    /// Visits items in ascending order, starting at the first item `>= pivot`.
    /// Returns `false` if the visitor stopped the walk.
    pub(crate) fn ascend<F>(&self, node: NodePtr<T>, pivot: Option<&T>, visit: &mut F) -> bool
    where
        F: FnMut(&'a T) -> bool,
    {
        let shape = self.shape;
        let leaf = node.is_leaf();
        // SAFETY: read-only walk below a live root; the handle's borrow keeps
        // every node alive for 'a.
        unsafe {
            let start = match pivot.map(|key| self.search(node, key)) {
                Some(Ok(idx)) => idx,
                Some(Err(idx)) => {
                    if !leaf && !self.ascend(node.child(shape, idx), pivot, visit) {
                        return false;
                    }
                    idx
                }
                None => {
                    if !leaf && !self.ascend(node.child(shape, 0), None, visit) {
                        return false;
                    }
                    0
                }
            };
            for idx in start..node.len() {
                if !visit(node.item(shape, idx)) {
                    return false;
                }
                if !leaf && !self.ascend(node.child(shape, idx + 1), None, visit) {
                    return false;
                }
            }
        }
        true
    }

    /// Visits items in descending order, starting at the last item `<= pivot`.
    pub(crate) fn descend<F>(&self, node: NodePtr<T>, pivot: Option<&T>, visit: &mut F) -> bool
    where
        F: FnMut(&'a T) -> bool,
    {
        let shape = self.shape;
        let leaf = node.is_leaf();
        // SAFETY: as for `ascend`.
        unsafe {
            let top = match pivot.map(|key| self.search(node, key)) {
                Some(Ok(idx)) => idx + 1,
                Some(Err(idx)) => {
                    if !leaf && !self.descend(node.child(shape, idx), pivot, visit) {
                        return false;
                    }
                    idx
                }
                None => {
                    let len = node.len();
                    if !leaf && !self.descend(node.child(shape, len), None, visit) {
                        return false;
                    }
                    len
                }
            };
            for idx in (0..top).rev() {
                if !visit(node.item(shape, idx)) {
                    return false;
                }
                if !leaf && !self.descend(node.child(shape, idx), None, visit) {
                    return false;
                }
            }
        }
        true
    }
}

impl<'a, T, C, A> Engine<'a, T, C, A>
where
    T: Clone,
    C: Compare<T> + ?Sized,
    A: NodeAllocator + ?Sized,
{
    /// Walks the tree handing out `&mut T`, copying shared nodes on the way.
    ///
    /// `from` is a pivot and whether it is inclusive. The walk stops at the
    /// first item the visitor wants deleted and returns a clone of it; the
    /// caller deletes it and resumes past it.
    pub(crate) fn act<F>(
        &self,
        root: &mut Option<NodePtr<T>>,
        from: Option<(&T, bool)>,
        direction: Direction,
        visit: &mut F,
    ) -> Flow<T>
    where
        F: FnMut(&mut T) -> Action,
    {
        let Some(slot) = root_slot(root) else {
            return Flow::Continue;
        };
        // SAFETY: the root slot is live; every node entered is made exclusive first.
        unsafe {
            let node = match self.make_mut_now(slot) {
                Ok(node) => node,
                Err(err) => return Flow::Failed(err),
            };
            match direction {
                Direction::Ascend => self.act_ascend(node, from, visit),
                Direction::Descend => self.act_descend(node, from, visit),
            }
        }
    }

    unsafe fn act_child<F>(
        &self,
        node: NodePtr<T>,
        idx: usize,
        from: Option<(&T, bool)>,
        direction: Direction,
        visit: &mut F,
    ) -> Flow<T>
    where
        F: FnMut(&mut T) -> Action,
    {
        match self.make_mut_now(node.child_slot(self.shape, idx)) {
            Ok(child) => match direction {
                Direction::Ascend => self.act_ascend(child, from, visit),
                Direction::Descend => self.act_descend(child, from, visit),
            },
            Err(err) => Flow::Failed(err),
        }
    }

    unsafe fn act_item<F>(&self, node: NodePtr<T>, idx: usize, visit: &mut F) -> Flow<T>
    where
        F: FnMut(&mut T) -> Action,
    {
        match visit(&mut node.items_mut(self.shape)[idx]) {
            Action::None | Action::Update => Flow::Continue,
            Action::Stop => Flow::Stop,
            Action::Delete => Flow::Delete(node.item(self.shape, idx).clone()),
        }
    }

    unsafe fn act_ascend<F>(&self, node: NodePtr<T>, from: Option<(&T, bool)>, visit: &mut F) -> Flow<T>
    where
        F: FnMut(&mut T) -> Action,
    {
        let leaf = node.is_leaf();
        let up = Direction::Ascend;
        let start = match from.map(|(key, inclusive)| (self.search(node, key), inclusive)) {
            None => {
                if !leaf {
                    forward!(self.act_child(node, 0, None, up, visit));
                }
                0
            }
            Some((Err(idx), _)) => {
                if !leaf {
                    forward!(self.act_child(node, idx, from, up, visit));
                }
                idx
            }
            Some((Ok(idx), true)) => idx,
            Some((Ok(idx), false)) => {
                if !leaf {
                    forward!(self.act_child(node, idx + 1, None, up, visit));
                }
                idx + 1
            }
        };
        for idx in start..node.len() {
            forward!(self.act_item(node, idx, visit));
            if !leaf {
                forward!(self.act_child(node, idx + 1, None, up, visit));
            }
        }
        Flow::Continue
    }

    unsafe fn act_descend<F>(&self, node: NodePtr<T>, from: Option<(&T, bool)>, visit: &mut F) -> Flow<T>
    where
        F: FnMut(&mut T) -> Action,
    {
        let leaf = node.is_leaf();
        let down = Direction::Descend;
        let top = match from.map(|(key, inclusive)| (self.search(node, key), inclusive)) {
            None => {
                let len = node.len();
                if !leaf {
                    forward!(self.act_child(node, len, None, down, visit));
                }
                len
            }
            Some((Err(idx), _)) => {
                if !leaf {
                    forward!(self.act_child(node, idx, from, down, visit));
                }
                idx
            }
            Some((Ok(idx), true)) => idx + 1,
            Some((Ok(idx), false)) => {
                if !leaf {
                    forward!(self.act_child(node, idx, None, down, visit));
                }
                idx
            }
        };
        for idx in (0..top).rev() {
            forward!(self.act_item(node, idx, visit));
            if !leaf {
                forward!(self.act_child(node, idx, None, down, visit));
            }
        }
        Flow::Continue
    }
}
