use core::alloc::Layout;
use core::ptr::{self, NonNull};
use std::sync::Arc;

/// A trait for the allocators that back tree nodes.
///
/// Every node a tree creates, and every node it frees, goes through the
/// allocator the tree was built with. Failure is an ordinary outcome: an
/// implementation returns [`AllocError`] and the tree aborts the current
/// mutation without changing anything.
///
/// Trees created by cloning share nodes, and any of the clones may end up
/// releasing a shared node. Clones of an allocator must therefore accept
/// blocks handed out by any other clone.
pub trait NodeAllocator {
    /// Allocates memory according to the given layout.
    ///
    /// # Errors
    /// Returns `AllocError` if allocation fails.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Resizes a block, moving it if needed.
    ///
    /// The default implementation allocates a new block, copies the smaller of
    /// the two sizes and releases the old block. On failure the old block is
    /// left untouched.
    ///
    /// # Errors
    /// Returns `AllocError` if the new block cannot be obtained.
    ///
    /// # Safety
    /// `ptr` must denote a block currently allocated by this allocator with
    /// layout `old`, and `new` must have the same alignment as `old`.
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old: Layout,
        new: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        let block = self.allocate(new)?;
        ptr::copy_nonoverlapping(ptr.as_ptr(), block.as_ptr(), old.size().min(new.size()));
        self.deallocate(ptr, old);
        Ok(block)
    }

    /// Deallocates memory.
    ///
    /// # Safety
    /// `ptr` must denote a block of memory currently allocated by this allocator.
    /// `layout` must be the same layout that was used to allocate that block of memory.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

impl<A: NodeAllocator + ?Sized> NodeAllocator for &A {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old: Layout,
        new: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        (**self).reallocate(ptr, old, new)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout);
    }
}

impl<A: NodeAllocator + ?Sized> NodeAllocator for Arc<A> {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old: Layout,
        new: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        (**self).reallocate(ptr, old, new)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).deallocate(ptr, layout);
    }
}

/// The error type for allocation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError;

impl core::fmt::Display for AllocError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("memory allocation failed")
    }
}

impl std::error::Error for AllocError {}
