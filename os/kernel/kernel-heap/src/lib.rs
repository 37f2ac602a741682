//! # Kernel heap
//!
//! A page-granular heap allocator for kernel code, including interrupt
//! handlers. Each allocation owns a span of whole pages carved from a bounded
//! virtual window by a [`RangeAllocator`] and backed by a [`Pager`]. The
//! span's first bytes hold an [`AllocationHeader`]; the header is found again
//! from the bare data pointer by address arithmetic alone (see [`header`]).
//!
//! | Type | Role |
//! |------|------|
//! | [`Heap`] | allocate, reallocate, free and string duplication over owned collaborators |
//! | [`LockedHeap`] | a [`Heap`] behind an interrupt-masking spin lock; implements [`GlobalAlloc`](core::alloc::GlobalAlloc) |
//! | [`FreeRangeAllocator`] | first-fit, coalescing virtual range allocator |
//! | [`FramePager`] | [`Pager`] over a [`PageTable`] and a [`PhysFrameAlloc`] |
//!
//! Exhaustion is reported as null (or a [`HeapError`]); corruption and misuse
//! stop the kernel through [`fatal!`].
//!
//! ```
//! # use kernel_heap::*;
//! # use kernel_memory_addresses::VirtualAddress;
//! // A window the heap never gets any frames for.
//! struct NoMemory;
//! impl Pager for NoMemory {
//!     fn map(&mut self, _: VirtualAddress, _: u64, _: MapFlags) -> Result<(), MapError> {
//!         Err(MapError::OutOfMemory)
//!     }
//!     fn unmap(&mut self, _: VirtualAddress, _: u64) {}
//! }
//!
//! let window = FreeRangeAllocator::<16>::new(VirtualAddress::new(0xFFFF_C000_0000_0000), 1 << 20);
//! let mut heap = Heap::new(window, NoMemory);
//!
//! assert_eq!(heap.try_allocate_aligned(16, 64), Err(HeapError::OutOfMemory(MapError::OutOfMemory)));
//! assert!(heap.allocate(0).is_null());
//! assert!(heap.range().is_fully_reclaimed());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod fatal;
pub mod header;
mod heap;
mod locked;
mod pager;
mod range;

pub use header::{AllocationHeader, HEADER_SIZE, MAGIC, MAX_ALIGN, PAGE_SIZE};
pub use heap::{Heap, HeapError};
pub use locked::LockedHeap;
pub use pager::{FramePager, MapError, MapFlags, PageTable, Pager, PhysFrameAlloc};
pub use range::{FreeRange, FreeRangeAllocator, RangeAllocator, RangeError};
