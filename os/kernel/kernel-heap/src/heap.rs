//! The heap allocator proper.
//!
//! Every allocation gets its own page-aligned span from the range allocator,
//! backed by the pager:
//!
//! ```text
//! allocate:  reserve span ─▶ map span ─▶ write header ─▶ zero data ─▶ ptr
//! free:      ptr ─▶ locate header ─▶ unmap span ─▶ release span
//! ```
//!
//! Allocation is page granular: even a one-byte request occupies a page.

use crate::header::{self, AllocationHeader, MAX_ALIGN, PAGE_SIZE, data_offset};
use crate::pager::{MapError, MapFlags, Pager};
use crate::range::{RangeAllocator, RangeError};
use crate::{fatal, fatal_assert};
use core::ptr::{self, NonNull};
use kernel_memory_addresses::VirtualAddress;

/// Why an allocation could not be served.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
    /// Zero bytes were requested; nothing is allocated.
    #[error("zero-sized allocation")]
    ZeroSize,
    /// Header, padding and data do not fit in the address space.
    #[error("allocation size overflows the address space")]
    TooLarge,
    /// No virtual span was available.
    #[error("no virtual span: {0}")]
    RangeExhausted(#[from] RangeError),
    /// The span could not be backed with physical memory.
    #[error("span not backed: {0}")]
    OutOfMemory(#[from] MapError),
}

/// A heap instance owning its range allocator and pager.
///
/// `Heap` is not synchronized; wrap it in a
/// [`LockedHeap`](crate::LockedHeap) to share it with other cores or with
/// interrupt handlers.
#[derive(Debug)]
pub struct Heap<R, P> {
    range: R,
    pager: P,
}

impl<R: RangeAllocator, P: Pager> Heap<R, P> {
    pub const fn new(range: R, pager: P) -> Self {
        Self { range, pager }
    }

    pub const fn range(&self) -> &R {
        &self.range
    }

    pub const fn pager(&self) -> &P {
        &self.pager
    }

    pub fn into_parts(self) -> (R, P) {
        (self.range, self.pager)
    }

    /// Allocates `size` zeroed bytes aligned to `align`.
    ///
    /// # Errors
    /// See [`HeapError`]. On error nothing is left reserved or mapped.
    ///
    /// # Panics
    /// Via [`fatal!`] if `align` is not a power of two or exceeds
    /// [`PAGE_SIZE`].
    pub fn try_allocate_aligned(
        &mut self,
        align: usize,
        size: usize,
    ) -> Result<NonNull<u8>, HeapError> {
        fatal_assert!(
            align.is_power_of_two(),
            "kernel heap: alignment {align} is not a power of two"
        );
        fatal_assert!(
            align <= PAGE_SIZE,
            "kernel heap: alignment {align} exceeds the page size"
        );
        if size == 0 {
            return Err(HeapError::ZeroSize);
        }

        let offset = data_offset(align);
        let span_size = offset.checked_add(size).ok_or(HeapError::TooLarge)?;
        let span_len = span_size as u64;

        let start = self.range.reserve(span_len).inspect_err(|e| {
            log::warn!("kernel heap: cannot reserve {span_size:#x} bytes: {e}");
        })?;

        if let Err(e) = self.pager.map(start, span_len, MapFlags::HEAP) {
            log::warn!("kernel heap: cannot back span {start}+{span_size:#x}: {e}");
            self.pager.unmap(start, span_len);
            self.release_span(start, span_size);
            return Err(e.into());
        }

        // SAFETY: the span is freshly mapped and owned by this allocation.
        unsafe { header::write(start, span_size) };

        let data = start + offset as u64;
        let Some(ptr) = NonNull::new(data.as_mut_ptr::<u8>()) else {
            fatal!("kernel heap: span {start} wraps the address space");
        };
        // SAFETY: `[data, data + size)` lies inside the mapped span.
        unsafe { ptr.as_ptr().write_bytes(0, size) };

        log::trace!("kernel heap: {size:#x} bytes (align {align}) at {data}, span {start}+{span_size:#x}");
        Ok(ptr)
    }

    /// Allocates `size` zeroed bytes aligned to `align`, or returns null.
    ///
    /// A zero `size` returns null without allocating.
    ///
    /// # Panics
    /// Via [`fatal!`] on an invalid alignment, see
    /// [`try_allocate_aligned`](Self::try_allocate_aligned).
    pub fn allocate_aligned(&mut self, align: usize, size: usize) -> *mut u8 {
        self.try_allocate_aligned(align, size)
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// Allocates `size` zeroed bytes aligned to [`MAX_ALIGN`], or returns null.
    pub fn allocate(&mut self, size: usize) -> *mut u8 {
        self.allocate_aligned(MAX_ALIGN, size)
    }

    /// Moves an allocation into a fresh one of `new_size` bytes.
    ///
    /// A null `ptr` allocates; a zero `new_size` frees `ptr` and returns null.
    /// Otherwise the first `min(old size, new_size)` bytes are copied and the
    /// old allocation is freed. If the new allocation fails, null is returned
    /// and `ptr` stays valid.
    ///
    /// # Safety
    /// `ptr` must be null or a live pointer returned by this heap.
    pub unsafe fn reallocate(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        unsafe { self.reallocate_aligned(ptr, MAX_ALIGN, new_size) }
    }

    /// [`reallocate`](Self::reallocate) with an explicit alignment for the
    /// new allocation.
    ///
    /// # Safety
    /// `ptr` must be null or a live pointer returned by this heap.
    pub unsafe fn reallocate_aligned(
        &mut self,
        ptr: *mut u8,
        align: usize,
        new_size: usize,
    ) -> *mut u8 {
        let Some(old) = NonNull::new(ptr) else {
            return self.allocate_aligned(align, new_size);
        };
        if new_size == 0 {
            unsafe { self.free(ptr) };
            return ptr::null_mut();
        }

        // Validate the old pointer before touching the collaborators.
        let (start, hdr) = unsafe { Self::span_of(old) };
        let old_len = header::data_len(start, &hdr, old);

        let new = self.allocate_aligned(align, new_size);
        if new.is_null() {
            return new;
        }

        // SAFETY: distinct spans never overlap; both regions are mapped.
        unsafe { ptr::copy_nonoverlapping(old.as_ptr(), new, old_len.min(new_size)) };
        self.unmap_and_release(start, hdr.span_size());
        new
    }

    /// Frees an allocation. Null is ignored.
    ///
    /// # Safety
    /// `ptr` must be null or a live pointer returned by this heap. A freed
    /// or foreign pointer stops the kernel if its page is still readable.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        let (start, hdr) = unsafe { Self::span_of(ptr) };
        log::trace!("kernel heap: free {ptr:p}, span {start}+{:#x}", hdr.span_size());
        self.unmap_and_release(start, hdr.span_size());
    }

    /// Copies `src` up to its first NUL into a fresh NUL-terminated
    /// allocation, or returns null.
    pub fn duplicate_string(&mut self, src: &[u8]) -> *mut u8 {
        self.duplicate_string_bounded(src, usize::MAX)
    }

    /// Like [`duplicate_string`](Self::duplicate_string) but copies at most
    /// `max` bytes before the terminator.
    pub fn duplicate_string_bounded(&mut self, src: &[u8], max: usize) -> *mut u8 {
        let len = src
            .iter()
            .take(max)
            .position(|&b| b == 0)
            .unwrap_or_else(|| src.len().min(max));
        let Some(len_with_nul) = len.checked_add(1) else {
            return ptr::null_mut();
        };

        let dst = self.allocate(len_with_nul);
        if !dst.is_null() {
            // SAFETY: `dst` holds `len + 1` bytes.
            unsafe {
                ptr::copy_nonoverlapping(src.as_ptr(), dst, len);
                dst.add(len).write(0);
            }
        }
        dst
    }

    /// Header of a live allocation.
    ///
    /// # Safety
    /// `ptr` must be a live pointer returned by this heap.
    pub unsafe fn header(&self, ptr: NonNull<u8>) -> AllocationHeader {
        unsafe { Self::span_of(ptr) }.1
    }

    /// Start of the span backing a live allocation, and its header.
    ///
    /// # Safety
    /// `ptr` must be a live pointer returned by this heap.
    pub unsafe fn span(&self, ptr: NonNull<u8>) -> (VirtualAddress, AllocationHeader) {
        unsafe { Self::span_of(ptr) }
    }

    /// Bytes usable from `ptr` on; the size originally requested.
    ///
    /// # Safety
    /// `ptr` must be a live pointer returned by this heap.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        let (start, hdr) = unsafe { Self::span_of(ptr) };
        header::data_len(start, &hdr, ptr)
    }

    unsafe fn span_of(ptr: NonNull<u8>) -> (VirtualAddress, AllocationHeader) {
        let start = unsafe { header::locate(ptr) };
        let hdr = unsafe { header::read(start) };
        let end = start.as_u64().saturating_add(hdr.span_size() as u64);
        fatal_assert!(
            hdr.span_size() > header::HEADER_SIZE && (ptr.addr().get() as u64) < end,
            "kernel heap: header at {start} does not cover {ptr:p} (span size {:#x})",
            hdr.span_size()
        );
        (start, hdr)
    }

    fn unmap_and_release(&mut self, start: VirtualAddress, span_size: usize) {
        self.pager.unmap(start, span_size as u64);
        self.release_span(start, span_size);
    }

    fn release_span(&mut self, start: VirtualAddress, span_size: usize) {
        if let Err(e) = self.range.release(start, span_size as u64) {
            fatal!("kernel heap: range allocator rejected span {start}+{span_size:#x}: {e}");
        }
    }
}
