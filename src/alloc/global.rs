//! The process allocator as a [`NodeAllocator`].

use crate::alloc::{AllocError, NodeAllocator};
use core::alloc::Layout;
use core::ptr::NonNull;
use std::alloc::{GlobalAlloc, System};

/// Routes node storage to the system allocator.
///
/// A null return from the system allocator is reported as [`AllocError`]
/// instead of aborting the process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Global;

impl NodeAllocator for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(layout.size() > 0, "node layouts are never zero-sized");
        // SAFETY: node layouts always have a non-zero size.
        NonNull::new(unsafe { System.alloc(layout) }).ok_or(AllocError)
    }

    #[inline]
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old: Layout,
        new: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        debug_assert_eq!(old.align(), new.align());
        NonNull::new(System.realloc(ptr.as_ptr(), old, new.size())).ok_or(AllocError)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        System.dealloc(ptr.as_ptr(), layout);
    }
}
