//! Allocation header and back-pointer-free header recovery.
//!
//! Every heap span starts on a page boundary with an [`AllocationHeader`]:
//!
//! ```text
//! span start (page aligned)
//! v
//! +--------+-----------+---------+------------------------+
//! | magic  | span_size | padding | data (size bytes)      |
//! +--------+-----------+---------+------------------------+
//! |<--- data_offset(align) ----->|
//! |<-------------------- span_size ---------------------->|
//! ```
//!
//! The data pointer alone is enough to find the header again: round down to
//! the page, and if the header cannot fit between that page base and the
//! pointer, the span must have started one page earlier. Padding never
//! exceeds one page because alignments are capped at the page size.

use core::ptr::NonNull;
use kernel_memory_addresses::{PageSize, Size4K, VirtualAddress, align_up};

/// Sentinel marking a live allocation.
pub const MAGIC: u32 = 0x1d57_8e50;

/// Page size of every span; also the largest supported alignment.
#[allow(clippy::cast_possible_truncation)]
pub const PAGE_SIZE: usize = Size4K::SIZE as usize;

/// Alignment used when the caller does not ask for one; matches
/// `max_align_t` on x86-64.
pub const MAX_ALIGN: usize = 16;

/// Size of the header at the start of every span.
pub const HEADER_SIZE: usize = size_of::<AllocationHeader>();

/// Metadata written once at allocation time and never changed afterwards.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationHeader {
    magic: u32,
    span_size: usize,
}

impl AllocationHeader {
    #[must_use]
    pub const fn new(span_size: usize) -> Self {
        Self {
            magic: MAGIC,
            span_size,
        }
    }

    #[must_use]
    pub const fn magic(&self) -> u32 {
        self.magic
    }

    /// Total bytes of the span, header and padding included. This is exactly
    /// what gets unmapped and released on free.
    #[must_use]
    pub const fn span_size(&self) -> usize {
        self.span_size
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }
}

/// Offset of the data region for the given alignment: the first offset
/// `>= HEADER_SIZE` that is a multiple of `align`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn data_offset(align: usize) -> usize {
    align_up(HEADER_SIZE as u64, align as u64) as usize
}

/// Finds the span start for a data pointer handed out by the heap.
///
/// Stops the kernel if the recovered header does not carry [`MAGIC`]: the
/// pointer is foreign, already freed, or the header was overwritten.
///
/// # Safety
/// The page the recovery lands on must be mapped and readable.
pub(crate) unsafe fn locate(ptr: NonNull<u8>) -> VirtualAddress {
    let data = VirtualAddress::from_nonnull(ptr);
    let mut page = data.page::<Size4K>();
    if data - page.base() < HEADER_SIZE as u64 {
        page = page.prev();
    }

    let start = page.base();
    let header = start.as_ptr::<AllocationHeader>();
    // SAFETY: caller guarantees the page is mapped; only the magic is read
    // before validation.
    let magic = unsafe { (&raw const (*header).magic).read() };
    crate::fatal_assert!(
        magic == MAGIC,
        "kernel heap: corrupted or foreign pointer {data} (header at {start} has magic {magic:#010x})"
    );
    start
}

/// Reads the header at a span start previously returned by [`locate`].
///
/// # Safety
/// `start` must be the start of a live span.
pub(crate) unsafe fn read(start: VirtualAddress) -> AllocationHeader {
    unsafe { start.as_ptr::<AllocationHeader>().read() }
}

/// Writes a fresh header at `start`.
///
/// # Safety
/// `start` must be mapped, writable and exclusively owned by the caller.
pub(crate) unsafe fn write(start: VirtualAddress, span_size: usize) {
    unsafe {
        start
            .as_mut_ptr::<AllocationHeader>()
            .write(AllocationHeader::new(span_size));
    }
}

/// Usable bytes between `ptr` and the end of the span starting at `start`.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn data_len(start: VirtualAddress, header: &AllocationHeader, ptr: NonNull<u8>) -> usize {
    let end = start + header.span_size() as u64;
    (end - VirtualAddress::from_nonnull(ptr)) as usize
}
