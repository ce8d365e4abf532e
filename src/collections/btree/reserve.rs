//! Up-front block reservation.
//!
//! A mutation first walks its path read-only and counts the blocks it could
//! possibly need. Those blocks are allocated into a [`Reserve`] before the
//! tree is touched, so an allocation failure always leaves the tree exactly
//! as it was. Unused blocks go back to the allocator when the reserve drops.

use super::node::{Kind, Shape};
use crate::alloc::{AllocError, NodeAllocator};
use crate::tracing_helpers::debug_log;
use core::ptr::NonNull;

/// Upper bound on the blocks one mutation allocates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Need {
    pub(crate) leaves: usize,
    pub(crate) internals: usize,
}

impl Need {
    pub(crate) fn one(kind: Kind) -> Self {
        let mut need = Self::default();
        need.add(kind);
        need
    }

    #[inline]
    pub(crate) fn add(&mut self, kind: Kind) {
        match kind {
            Kind::Leaf => self.leaves += 1,
            Kind::Internal => self.internals += 1,
        }
    }

    pub(crate) fn total(self) -> usize {
        self.leaves + self.internals
    }
}

/// Pre-allocated node blocks, one intrusive free list per node kind.
///
/// The first word of each free block links to the next one.
pub(crate) struct Reserve<'a, T, A: NodeAllocator + ?Sized> {
    shape: &'a Shape<T>,
    alloc: &'a A,
    leaves: Option<NonNull<u8>>,
    internals: Option<NonNull<u8>>,
}

impl<'a, T, A: NodeAllocator + ?Sized> Reserve<'a, T, A> {
    /// Allocates every block in `need`, or none of them.
    pub(crate) fn fill(shape: &'a Shape<T>, alloc: &'a A, need: Need) -> Result<Self, AllocError> {
        let mut reserve = Self {
            shape,
            alloc,
            leaves: None,
            internals: None,
        };
        for (kind, count) in [(Kind::Leaf, need.leaves), (Kind::Internal, need.internals)] {
            for _ in 0..count {
                let block = alloc.allocate(shape.layout(kind)).map_err(|err| {
                    debug_log!(
                        leaves = need.leaves,
                        internals = need.internals,
                        "node reservation failed"
                    );
                    err
                })?;
                // SAFETY: fresh block of this kind's layout, large enough for a link.
                unsafe { reserve.push(kind, block) };
            }
        }
        Ok(reserve)
    }

    fn head(&mut self, kind: Kind) -> &mut Option<NonNull<u8>> {
        match kind {
            Kind::Leaf => &mut self.leaves,
            Kind::Internal => &mut self.internals,
        }
    }

    unsafe fn push(&mut self, kind: Kind, block: NonNull<u8>) {
        let head = self.head(kind);
        block.cast::<Option<NonNull<u8>>>().as_ptr().write(*head);
        *head = Some(block);
    }

    /// Hands out one reserved block of `kind`.
    ///
    /// # Panics
    /// If the planning pass undercounted; this is a logic error in the tree.
    pub(crate) fn take(&mut self, kind: Kind) -> NonNull<u8> {
        let head = self.head(kind);
        let Some(block) = *head else {
            unreachable!("node reserve exhausted for {kind:?} blocks");
        };
        // SAFETY: every listed block starts with the link written by `push`.
        *head = unsafe { block.cast::<Option<NonNull<u8>>>().as_ptr().read() };
        block
    }
}

impl<T, A: NodeAllocator + ?Sized> Drop for Reserve<'_, T, A> {
    fn drop(&mut self) {
        for kind in [Kind::Leaf, Kind::Internal] {
            while let Some(block) = *self.head(kind) {
                // SAFETY: listed blocks are unused and carry a link word.
                unsafe {
                    *self.head(kind) = block.cast::<Option<NonNull<u8>>>().as_ptr().read();
                    self.alloc.deallocate(block, self.shape.layout(kind));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::TrackingAllocator;

    #[test]
    fn test_unused_blocks_are_returned() {
        let shape = Shape::<u64>::new(8).unwrap();
        let alloc = TrackingAllocator::new();
        let need = Need {
            leaves: 3,
            internals: 2,
        };
        let mut reserve = Reserve::fill(&shape, &alloc, need).unwrap();
        assert_eq!(alloc.live_blocks(), need.total());

        let leaf = reserve.take(Kind::Leaf);
        drop(reserve);
        assert_eq!(alloc.live_blocks(), 1);
        unsafe { alloc.deallocate(leaf, shape.layout(Kind::Leaf)) };
    }

    #[test]
    fn test_failed_fill_frees_partial_reserve() {
        let shape = Shape::<u64>::new(8).unwrap();
        let alloc = TrackingAllocator::new();
        alloc.fail_nth(3);
        let need = Need {
            leaves: 2,
            internals: 2,
        };
        assert!(Reserve::fill(&shape, &alloc, need).is_err());
        assert_eq!(alloc.live_blocks(), 0);
        assert_eq!(alloc.failures(), 1);
    }

    #[test]
    #[should_panic(expected = "node reserve exhausted")]
    fn test_take_beyond_plan_panics() {
        let shape = Shape::<u64>::new(8).unwrap();
        let alloc = TrackingAllocator::new();
        let mut reserve = Reserve::fill(&shape, &alloc, Need::one(Kind::Leaf)).unwrap();
        let _ = reserve.take(Kind::Internal);
    }
}
