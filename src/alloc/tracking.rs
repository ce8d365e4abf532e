//! `TrackingAllocator`: an accounting allocator with fault injection.
//!
//! Wraps another [`NodeAllocator`], keeps live block/byte counts and can be
//! told to fail chosen calls. Clones share their counters and fault policy,
//! so the allocator of a tree and of all trees cloned from it report as one.
//!
//! ```rust
//! use cowbtree::alloc::TrackingAllocator;
//! use cowbtree::{BTree, Natural};
//!
//! let alloc = TrackingAllocator::new();
//! let mut tree = BTree::with_allocator(6, Natural, alloc.clone());
//! for i in 0..100 {
//!     tree.set(i).unwrap();
//! }
//! assert!(alloc.live_blocks() > 0);
//!
//! // The snapshot shares every node, so the next write must copy its path.
//! let snapshot = tree.clone();
//! alloc.fail_nth(1);
//! assert!(tree.set(1000).is_err());
//! assert!(tree.oom());
//!
//! drop(snapshot);
//! drop(tree);
//! assert_eq!(alloc.live_blocks(), 0);
//! ```

use crate::alloc::{AllocError, Global, NodeAllocator};
use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use crossbeam_utils::CachePadded;
use std::sync::{Arc, Mutex, PoisonError};

type Predicate = Arc<dyn Fn(u64) -> bool + Send + Sync>;

/// Which calls the allocator refuses.
#[derive(Clone, Default)]
enum Fault {
    #[default]
    Never,
    /// Fail the call with this number, once.
    At(u64),
    /// Fail every call whose number is a multiple of this.
    Every(u64),
    /// Fail calls for which the predicate holds.
    When(Predicate),
}

impl Fault {
    fn fails(&self, call: u64) -> bool {
        match self {
            Fault::Never => false,
            Fault::At(n) => call == *n,
            Fault::Every(k) => call % *k == 0,
            Fault::When(pred) => pred(call),
        }
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Never => f.write_str("Never"),
            Fault::At(n) => f.debug_tuple("At").field(n).finish(),
            Fault::Every(k) => f.debug_tuple("Every").field(k).finish(),
            Fault::When(_) => f.write_str("When(..)"),
        }
    }
}

#[derive(Debug, Default)]
struct Ledger {
    calls: CachePadded<AtomicU64>,
    failures: CachePadded<AtomicU64>,
    live_blocks: CachePadded<AtomicUsize>,
    live_bytes: CachePadded<AtomicUsize>,
    fault: Mutex<Fault>,
}

impl Ledger {
    /// Numbers the call and decides whether it fails.
    fn admit(&self) -> Result<(), AllocError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let fault = self.fault.lock().unwrap_or_else(PoisonError::into_inner);
        if fault.fails(call) {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(AllocError);
        }
        Ok(())
    }

    fn set_fault(&self, fault: Fault) {
        *self.fault.lock().unwrap_or_else(PoisonError::into_inner) = fault;
    }
}

/// An allocator that counts what it hands out and fails on request.
#[derive(Debug, Clone)]
pub struct TrackingAllocator<A = Global> {
    inner: A,
    ledger: Arc<Ledger>,
}

impl TrackingAllocator<Global> {
    /// Creates a tracking allocator over the system allocator.
    pub fn new() -> Self {
        Self::wrap(Global)
    }
}

impl Default for TrackingAllocator<Global> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> TrackingAllocator<A> {
    /// Creates a tracking allocator over `inner`.
    pub fn wrap(inner: A) -> Self {
        Self {
            inner,
            ledger: Arc::new(Ledger::default()),
        }
    }

    /// Number of allocate/reallocate calls made so far, failed ones included.
    pub fn calls(&self) -> u64 {
        self.ledger.calls.load(Ordering::Relaxed)
    }

    /// Number of calls that were refused.
    pub fn failures(&self) -> u64 {
        self.ledger.failures.load(Ordering::Relaxed)
    }

    /// Number of blocks currently allocated.
    pub fn live_blocks(&self) -> usize {
        self.ledger.live_blocks.load(Ordering::Acquire)
    }

    /// Number of bytes currently allocated.
    pub fn live_bytes(&self) -> usize {
        self.ledger.live_bytes.load(Ordering::Acquire)
    }

    /// Makes the `n`-th call from now fail, once. `n = 1` is the next call.
    pub fn fail_nth(&self, n: u64) {
        assert!(n > 0, "call numbers start at 1");
        self.ledger.set_fault(Fault::At(self.calls() + n));
    }

    /// Makes every `k`-th call fail, counting from the first call ever made.
    pub fn fail_every(&self, k: u64) {
        assert!(k > 0, "fault period must be positive");
        self.ledger.set_fault(Fault::Every(k));
    }

    /// Fails every call whose number satisfies `pred`.
    pub fn fail_when<F>(&self, pred: F)
    where
        F: Fn(u64) -> bool + Send + Sync + 'static,
    {
        self.ledger.set_fault(Fault::When(Arc::new(pred)));
    }

    /// Stops injecting failures.
    pub fn heal(&self) {
        self.ledger.set_fault(Fault::Never);
    }

    /// Returns the wrapped allocator.
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: NodeAllocator> NodeAllocator for TrackingAllocator<A> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        self.ledger.admit()?;
        let ptr = self.inner.allocate(layout)?;
        self.ledger.live_blocks.fetch_add(1, Ordering::AcqRel);
        self.ledger.live_bytes.fetch_add(layout.size(), Ordering::AcqRel);
        Ok(ptr)
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old: Layout,
        new: Layout,
    ) -> Result<NonNull<u8>, AllocError> {
        self.ledger.admit()?;
        let moved = self.inner.reallocate(ptr, old, new)?;
        self.ledger.live_bytes.fetch_sub(old.size(), Ordering::AcqRel);
        self.ledger.live_bytes.fetch_add(new.size(), Ordering::AcqRel);
        Ok(moved)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.inner.deallocate(ptr, layout);
        self.ledger.live_blocks.fetch_sub(1, Ordering::AcqRel);
        self.ledger.live_bytes.fetch_sub(layout.size(), Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: Layout = Layout::new::<[u64; 2]>();

    #[test]
    fn test_counts_live_blocks() {
        let alloc = TrackingAllocator::new();
        let a = alloc.allocate(LAYOUT).unwrap();
        let b = alloc.allocate(LAYOUT).unwrap();
        assert_eq!(alloc.live_blocks(), 2);
        assert_eq!(alloc.live_bytes(), 2 * LAYOUT.size());
        unsafe {
            alloc.deallocate(a, LAYOUT);
            alloc.deallocate(b, LAYOUT);
        }
        assert_eq!(alloc.live_blocks(), 0);
        assert_eq!(alloc.live_bytes(), 0);
        assert_eq!(alloc.calls(), 2);
    }

    #[test]
    fn test_fail_nth_fires_once() {
        let alloc = TrackingAllocator::new();
        alloc.fail_nth(2);
        let first = alloc.allocate(LAYOUT).unwrap();
        assert_eq!(alloc.allocate(LAYOUT), Err(AllocError));
        let third = alloc.allocate(LAYOUT).unwrap();
        assert_eq!(alloc.failures(), 1);
        assert_eq!(alloc.live_blocks(), 2);
        unsafe {
            alloc.deallocate(first, LAYOUT);
            alloc.deallocate(third, LAYOUT);
        }
    }

    #[test]
    fn test_clones_share_the_ledger() {
        let alloc = TrackingAllocator::new();
        let other = alloc.clone();
        let ptr = other.allocate(LAYOUT).unwrap();
        assert_eq!(alloc.live_blocks(), 1);
        alloc.fail_every(1);
        assert!(other.allocate(LAYOUT).is_err());
        alloc.heal();
        unsafe { alloc.deallocate(ptr, LAYOUT) };
        assert_eq!(other.live_blocks(), 0);
    }

    #[test]
    fn test_fail_when_predicate() {
        let alloc = TrackingAllocator::new();
        alloc.fail_when(|call| call % 2 == 1);
        assert!(alloc.allocate(LAYOUT).is_err());
        let ptr = alloc.allocate(LAYOUT).unwrap();
        unsafe { alloc.deallocate(ptr, LAYOUT) };
        assert_eq!(alloc.failures(), 1);
    }
}
