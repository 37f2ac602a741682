//! A lock-wrapped heap usable as `#[global_allocator]`.
//!
//! Every entry point masks interrupts on the current core and then takes a
//! spin lock, so an interrupt handler can never re-enter the heap, its range
//! allocator or its pager while one of them is mid-update, and other cores
//! are serialized.

use crate::fatal_assert;
use crate::header::PAGE_SIZE;
use crate::heap::Heap;
use crate::pager::Pager;
use crate::range::RangeAllocator;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr;
use kernel_sync::SpinMutex;

/// A [`Heap`] behind an interrupt-masking spin lock.
///
/// # Example
///
/// ```ignore
/// #[global_allocator]
/// static HEAP: LockedHeap<FreeRangeAllocator<256>, KernelPager> = LockedHeap::empty();
///
/// fn init_heap(window: VirtualAddress, len: u64, pager: KernelPager) {
///     HEAP.init(Heap::new(FreeRangeAllocator::new(window, len), pager));
/// }
/// ```
pub struct LockedHeap<R, P> {
    inner: SpinMutex<Option<Heap<R, P>>>,
}

impl<R, P> LockedHeap<R, P> {
    /// A heap that refuses every allocation until [`init`](Self::init).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            inner: SpinMutex::new(None),
        }
    }

    #[must_use]
    pub const fn new(heap: Heap<R, P>) -> Self {
        Self {
            inner: SpinMutex::new(Some(heap)),
        }
    }

    /// Installs the heap.
    ///
    /// # Panics
    /// Via [`fatal!`](crate::fatal!) if a heap is already installed.
    pub fn init(&self, heap: Heap<R, P>) {
        let mut slot = self.inner.lock_irq();
        fatal_assert!(slot.is_none(), "kernel heap: initialized twice");
        *slot = Some(heap);
        log::debug!("kernel heap: initialized");
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock_irq().is_some()
    }

    /// Removes the heap, leaving the allocator empty. Live allocations stay
    /// mapped and reserved.
    pub fn take(&self) -> Option<Heap<R, P>> {
        self.inner.lock_irq().take()
    }

    /// Runs `f` on the heap with interrupts masked and the lock held.
    ///
    /// Returns `None` if no heap is installed.
    pub fn with_heap<U>(&self, f: impl FnOnce(&mut Heap<R, P>) -> U) -> Option<U> {
        self.inner.lock_irq().as_mut().map(f)
    }
}

impl<R: RangeAllocator, P: Pager> LockedHeap<R, P> {
    pub fn allocate(&self, size: usize) -> *mut u8 {
        self.with_heap(|h| h.allocate(size))
            .unwrap_or(ptr::null_mut())
    }

    pub fn allocate_aligned(&self, align: usize, size: usize) -> *mut u8 {
        self.with_heap(|h| h.allocate_aligned(align, size))
            .unwrap_or(ptr::null_mut())
    }

    /// # Safety
    /// See [`Heap::reallocate`].
    pub unsafe fn reallocate(&self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        self.with_heap(|h| unsafe { h.reallocate(ptr, new_size) })
            .unwrap_or(ptr::null_mut())
    }

    /// # Safety
    /// See [`Heap::free`].
    pub unsafe fn free(&self, ptr: *mut u8) {
        let freed = self.with_heap(|h| unsafe { h.free(ptr) });
        fatal_assert!(
            freed.is_some() || ptr.is_null(),
            "kernel heap: free of {ptr:p} before initialization"
        );
    }

    pub fn duplicate_string(&self, src: &[u8]) -> *mut u8 {
        self.with_heap(|h| h.duplicate_string(src))
            .unwrap_or(ptr::null_mut())
    }

    pub fn duplicate_string_bounded(&self, src: &[u8], max: usize) -> *mut u8 {
        self.with_heap(|h| h.duplicate_string_bounded(src, max))
            .unwrap_or(ptr::null_mut())
    }
}

impl<R, P> Default for LockedHeap<R, P> {
    fn default() -> Self {
        Self::empty()
    }
}

// Layouts aligned above the page size cannot be served and get null rather
// than the fatal path, as `GlobalAlloc` callers expect.
unsafe impl<R: RangeAllocator + Send, P: Pager + Send> GlobalAlloc for LockedHeap<R, P> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > PAGE_SIZE {
            return ptr::null_mut();
        }
        self.allocate_aligned(layout.align(), layout.size())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { self.free(ptr) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        // Fresh allocations are always zeroed.
        unsafe { self.alloc(layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > PAGE_SIZE {
            return ptr::null_mut();
        }
        self.with_heap(|h| unsafe { h.reallocate_aligned(ptr, layout.align(), new_size) })
            .unwrap_or(ptr::null_mut())
    }
}
