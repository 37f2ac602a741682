//! Virtual address range allocation.
//!
//! [`RangeAllocator`] is the contract the heap consumes: hand out disjoint,
//! page-aligned spans of kernel virtual address space and take them back.
//! [`FreeRangeAllocator`] is a `no_std` implementation over a single bounded
//! window, keeping an address-sorted free list of fixed capacity.

use heapless::Vec;
use kernel_memory_addresses::{PageSize, Size4K, VirtualAddress, checked_align_up};

/// Errors reported by a [`RangeAllocator`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    /// No free span of the requested size is left.
    #[error("virtual address range exhausted")]
    Exhausted,
    /// The span was never reserved as given (unaligned, outside the window,
    /// or overlapping free space).
    #[error("invalid virtual address range")]
    Invalid,
    /// The span could not be recorded because the free list is at capacity.
    /// Only reachable by releasing part of a reservation.
    #[error("range allocator free list is full")]
    FreeListFull,
}

/// Hands out and reclaims disjoint spans of virtual addresses.
pub trait RangeAllocator {
    /// Reserves a previously unused, page-aligned span of at least `size`
    /// bytes.
    ///
    /// # Errors
    /// [`RangeError::Exhausted`] if no span fits or the allocator cannot
    /// track another reservation.
    fn reserve(&mut self, size: u64) -> Result<VirtualAddress, RangeError>;

    /// Returns a span obtained from [`reserve`](Self::reserve) with the same
    /// `size`.
    ///
    /// # Errors
    /// [`RangeError::Invalid`] if the span was not reserved as given, or
    /// [`RangeError::FreeListFull`] if the freed span cannot be recorded.
    fn release(&mut self, addr: VirtualAddress, size: u64) -> Result<(), RangeError>;
}

/// A contiguous free range; base and size are page-aligned, size > 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeRange {
    pub base: u64,
    pub size: u64,
}

impl FreeRange {
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base + self.size
    }
}

/// First-fit range allocator over a fixed virtual window.
///
/// The free list is sorted by base address and adjacent entries are always
/// coalesced. Any two holes are separated by at least one live reservation,
/// so there are never more than `live + 1` holes. Reservations are capped at
/// `N - 1`, which keeps every release of a whole reservation within the
/// list's capacity; running into the cap is exhaustion, reported by
/// [`reserve`](RangeAllocator::reserve).
#[derive(Debug)]
pub struct FreeRangeAllocator<const N: usize> {
    base: u64,
    size: u64,
    live: usize,
    free: Vec<FreeRange, N>,
}

impl<const N: usize> FreeRangeAllocator<N> {
    /// An allocator with no backing window; every reservation fails.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            base: 0,
            size: 0,
            live: 0,
            free: Vec::new(),
        }
    }

    /// Creates an allocator covering `[base, base + size)`.
    ///
    /// `base` is rounded up and `size` down to whole pages.
    #[must_use]
    pub fn new(base: VirtualAddress, size: u64) -> Self {
        let mut this = Self::empty();
        let start = base.as_u64().next_multiple_of(Size4K::SIZE);
        let end = base.as_u64().saturating_add(size) & !Size4K::MASK;
        if end > start && N > 0 {
            this.base = start;
            this.size = end - start;
            let _ = this.free.push(FreeRange {
                base: start,
                size: end - start,
            });
        }
        this
    }

    /// Start of the managed window.
    #[must_use]
    pub const fn window_base(&self) -> VirtualAddress {
        VirtualAddress::new(self.base)
    }

    /// Size in bytes of the managed window.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.size
    }

    /// Number of reservations not yet released.
    #[must_use]
    pub const fn live_reservations(&self) -> usize {
        self.live
    }

    /// Most reservations that can be live at once.
    #[must_use]
    pub const fn max_reservations() -> usize {
        N.saturating_sub(1)
    }

    /// Total bytes currently free.
    #[must_use]
    pub fn free_bytes(&self) -> u64 {
        self.free.iter().map(|r| r.size).sum()
    }

    /// Free ranges in address order.
    #[must_use]
    pub fn free_ranges(&self) -> &[FreeRange] {
        &self.free
    }

    /// `true` once every reservation has been released and coalesced back
    /// into a single range spanning the whole window.
    #[must_use]
    pub fn is_fully_reclaimed(&self) -> bool {
        match self.free.as_slice() {
            [] => self.size == 0,
            [only] => only.base == self.base && only.size == self.size,
            _ => false,
        }
    }

    /// Index of the first entry with `base > addr`.
    fn insertion_index(&self, addr: u64) -> usize {
        self.free.partition_point(|r| r.base <= addr)
    }
}

impl<const N: usize> RangeAllocator for FreeRangeAllocator<N> {
    fn reserve(&mut self, size: u64) -> Result<VirtualAddress, RangeError> {
        let size = checked_align_up(size, Size4K::SIZE).ok_or(RangeError::Exhausted)?;
        if size == 0 {
            return Err(RangeError::Invalid);
        }
        if self.live >= Self::max_reservations() {
            return Err(RangeError::Exhausted);
        }

        let idx = self
            .free
            .iter()
            .position(|r| r.size >= size)
            .ok_or(RangeError::Exhausted)?;

        let entry = self.free[idx];
        if entry.size == size {
            self.free.remove(idx);
        } else {
            self.free[idx] = FreeRange {
                base: entry.base + size,
                size: entry.size - size,
            };
        }
        self.live += 1;
        Ok(VirtualAddress::new(entry.base))
    }

    fn release(&mut self, addr: VirtualAddress, size: u64) -> Result<(), RangeError> {
        let base = addr.as_u64();
        let size = checked_align_up(size, Size4K::SIZE).ok_or(RangeError::Invalid)?;
        let end = base.checked_add(size).ok_or(RangeError::Invalid)?;
        if size == 0
            || !addr.is_aligned::<Size4K>()
            || base < self.base
            || end > self.base + self.size
        {
            return Err(RangeError::Invalid);
        }

        let idx = self.insertion_index(base);

        // Overlap with free space means a double release or a bogus span.
        if idx > 0 && self.free[idx - 1].end() > base {
            return Err(RangeError::Invalid);
        }
        if idx < self.free.len() && self.free[idx].base < end {
            return Err(RangeError::Invalid);
        }

        let merge_prev = idx > 0 && self.free[idx - 1].end() == base;
        let merge_next = idx < self.free.len() && self.free[idx].base == end;

        match (merge_prev, merge_next) {
            (true, true) => {
                let next = self.free.remove(idx);
                self.free[idx - 1].size += size + next.size;
            }
            (true, false) => {
                self.free[idx - 1].size += size;
            }
            (false, true) => {
                self.free[idx].base = base;
                self.free[idx].size += size;
            }
            (false, false) => {
                self.free
                    .insert(idx, FreeRange { base, size })
                    .map_err(|_| RangeError::FreeListFull)?;
            }
        }
        self.live = self.live.saturating_sub(1);
        Ok(())
    }
}
