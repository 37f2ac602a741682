//! Host fixtures: a page-aligned buffer standing in for the kernel heap
//! window, and a pager that tracks what it has "mapped".

#![allow(dead_code)]

use kernel_heap::{FreeRangeAllocator, Heap, MapError, MapFlags, PAGE_SIZE, Pager};
use kernel_memory_addresses::{Size4K, VirtualAddress, VirtualPage};
use std::alloc::{self, Layout};
use std::collections::BTreeSet;
use std::ptr::NonNull;

/// Byte written over freshly mapped pages; the heap must zero what it hands out.
pub const FRESH: u8 = 0xA5;
/// Byte written over unmapped pages, so stale headers never match.
pub const POISON: u8 = 0xDE;

pub type TestHeap = Heap<FreeRangeAllocator<1024>, TrackingPager>;

/// Page-aligned host memory playing the role of the heap's virtual window.
pub struct Pool {
    base: NonNull<u8>,
    layout: Layout,
}

impl Pool {
    pub fn new(pages: usize) -> Self {
        let layout = Layout::from_size_align(pages * PAGE_SIZE, PAGE_SIZE).unwrap();
        let base = NonNull::new(unsafe { alloc::alloc_zeroed(layout) }).expect("host pool");
        Self { base, layout }
    }

    pub fn base(&self) -> VirtualAddress {
        VirtualAddress::from_nonnull(self.base)
    }

    pub fn len(&self) -> u64 {
        self.layout.size() as u64
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}

/// Pager over host memory that is always there.
///
/// Keeps the set of mapped pages, hands out at most `frames` pages at once,
/// and fills pages on map and unmap so stale reads show up.
#[derive(Debug)]
pub struct TrackingPager {
    mapped: BTreeSet<u64>,
    frames: usize,
    pub map_calls: usize,
    pub unmap_calls: usize,
    pub last_flags: Option<MapFlags>,
}

impl TrackingPager {
    pub fn with_frames(frames: usize) -> Self {
        Self {
            mapped: BTreeSet::new(),
            frames,
            map_calls: 0,
            unmap_calls: 0,
            last_flags: None,
        }
    }

    pub fn unlimited() -> Self {
        Self::with_frames(usize::MAX)
    }

    pub fn mapped_pages(&self) -> usize {
        self.mapped.len()
    }

    pub fn frames_left(&self) -> usize {
        self.frames
    }

    pub fn is_mapped(&self, addr: VirtualAddress) -> bool {
        self.mapped
            .contains(&addr.page::<Size4K>().base().as_u64())
    }
}

impl Pager for TrackingPager {
    fn map(&mut self, base: VirtualAddress, len: u64, flags: MapFlags) -> Result<(), MapError> {
        self.map_calls += 1;
        self.last_flags = Some(flags);
        for page in VirtualPage::<Size4K>::range(base, len) {
            if self.frames == 0 {
                return Err(MapError::OutOfMemory);
            }
            if !self.mapped.insert(page.base().as_u64()) {
                return Err(MapError::AlreadyMapped);
            }
            self.frames -= 1;
            unsafe { page.base().as_mut_ptr::<u8>().write_bytes(FRESH, PAGE_SIZE) };
        }
        Ok(())
    }

    fn unmap(&mut self, base: VirtualAddress, len: u64) {
        self.unmap_calls += 1;
        for page in VirtualPage::<Size4K>::range(base, len) {
            if self.mapped.remove(&page.base().as_u64()) {
                self.frames += 1;
                unsafe { page.base().as_mut_ptr::<u8>().write_bytes(POISON, PAGE_SIZE) };
            }
        }
    }
}

/// A heap over its own pool. Field order drops the heap before the pool.
pub struct Fixture {
    pub heap: TestHeap,
    pool: Pool,
}

impl Fixture {
    pub fn new(pages: usize) -> Self {
        Self::with_pager(pages, TrackingPager::unlimited())
    }

    pub fn with_pager(pages: usize, pager: TrackingPager) -> Self {
        let pool = Pool::new(pages);
        let range = FreeRangeAllocator::new(pool.base(), pool.len());
        Self {
            heap: Heap::new(range, pager),
            pool,
        }
    }

    pub fn pool_base(&self) -> VirtualAddress {
        self.pool.base()
    }

    /// No reservation and no mapping is left behind.
    pub fn assert_clean(&self) {
        assert!(self.heap.range().is_fully_reclaimed(), "{:?}", self.heap.range().free_ranges());
        assert_eq!(self.heap.pager().mapped_pages(), 0);
    }
}

/// Span of a live allocation as `[start, end)`.
pub fn span_of(heap: &TestHeap, ptr: *mut u8) -> (u64, u64) {
    let (start, header) = unsafe { heap.span(NonNull::new(ptr).unwrap()) };
    (start.as_u64(), start.as_u64() + header.span_size() as u64)
}

/// Asserts that no two spans overlap.
pub fn assert_disjoint(mut spans: Vec<(u64, u64)>) {
    spans.sort_unstable();
    for pair in spans.windows(2) {
        assert!(
            pair[0].1 <= pair[1].0,
            "spans {:#x?} and {:#x?} overlap",
            pair[0],
            pair[1]
        );
    }
}

/// Small xorshift generator; deterministic across runs.
pub struct XorShift(u64);

impl XorShift {
    pub const fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    pub fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}
