//! Allocator port for tree nodes.
//!
//! - `allocator`: the [`NodeAllocator`] trait and [`AllocError`]
//! - `global`: the system allocator
//! - `tracking`: an accounting allocator with fault injection

pub mod allocator;
pub mod global;
pub mod tracking;

pub use allocator::{AllocError, NodeAllocator};
pub use global::Global;
pub use tracking::TrackingAllocator;
