//! Paging Subsystem seam.
//!
//! The heap only needs to back a virtual span with frames and to tear that
//! backing down again; [`Pager`] is exactly that. [`FramePager`] builds one
//! from a page table that maps single 4 KiB pages and a physical frame
//! allocator.

use kernel_memory_addresses::{PhysicalAddress, Size4K, VirtualAddress, VirtualPage};

bitflags::bitflags! {
    /// Protection flags for a heap mapping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapFlags: u64 {
        /// Page is writable.
        const WRITABLE   = 1 << 0;
        /// Page is not flushed on address-space switch.
        const GLOBAL     = 1 << 1;
        /// Page is accessible from user mode.
        const USER       = 1 << 2;
        /// Instruction fetches fault.
        const NO_EXECUTE = 1 << 3;
    }
}

impl MapFlags {
    /// Flags for kernel heap spans.
    pub const HEAP: Self = Self::WRITABLE.union(Self::GLOBAL).union(Self::NO_EXECUTE);
}

/// Errors reported by a [`Pager`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    /// No physical frame (or page-table frame) could be obtained.
    #[error("out of physical memory")]
    OutOfMemory,
    /// The page already has a translation.
    #[error("page already mapped")]
    AlreadyMapped,
}

/// Backs virtual spans with physical memory.
pub trait Pager {
    /// Maps every page in `[base, base + len)` to a fresh frame.
    ///
    /// # Errors
    /// On failure the range may be partially mapped; callers must
    /// [`unmap`](Self::unmap) it before reusing the addresses.
    fn map(&mut self, base: VirtualAddress, len: u64, flags: MapFlags) -> Result<(), MapError>;

    /// Removes every translation in `[base, base + len)` and returns the
    /// frames. Pages without a translation are skipped.
    fn unmap(&mut self, base: VirtualAddress, len: u64);
}

/// A page table that installs single 4 KiB translations.
pub trait PageTable {
    /// Maps `page` to `frame`.
    ///
    /// # Errors
    /// [`MapError::AlreadyMapped`] if `page` has a translation, or
    /// [`MapError::OutOfMemory`] if an intermediate table could not be
    /// allocated.
    fn map_4k(
        &mut self,
        page: VirtualPage<Size4K>,
        frame: PhysicalAddress,
        flags: MapFlags,
    ) -> Result<(), MapError>;

    /// Removes the translation for `page` and returns the frame it pointed
    /// to, if any.
    fn unmap_4k(&mut self, page: VirtualPage<Size4K>) -> Option<PhysicalAddress>;
}

/// Source of 4 KiB physical frames.
pub trait PhysFrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalAddress>;
    fn free_4k(&mut self, frame: PhysicalAddress);
}

/// [`Pager`] that backs each page with its own frame.
#[derive(Debug)]
pub struct FramePager<T, F> {
    table: T,
    frames: F,
}

impl<T: PageTable, F: PhysFrameAlloc> FramePager<T, F> {
    pub const fn new(table: T, frames: F) -> Self {
        Self { table, frames }
    }

    pub const fn table(&self) -> &T {
        &self.table
    }

    pub const fn frames(&self) -> &F {
        &self.frames
    }

    pub fn into_parts(self) -> (T, F) {
        (self.table, self.frames)
    }
}

impl<T: PageTable, F: PhysFrameAlloc> Pager for FramePager<T, F> {
    fn map(&mut self, base: VirtualAddress, len: u64, flags: MapFlags) -> Result<(), MapError> {
        for page in VirtualPage::<Size4K>::range(base, len) {
            let Some(frame) = self.frames.alloc_4k() else {
                log::warn!("no frame left to back {page}");
                return Err(MapError::OutOfMemory);
            };
            if let Err(e) = self.table.map_4k(page, frame, flags) {
                self.frames.free_4k(frame);
                return Err(e);
            }
        }
        Ok(())
    }

    fn unmap(&mut self, base: VirtualAddress, len: u64) {
        for page in VirtualPage::<Size4K>::range(base, len) {
            if let Some(frame) = self.table.unmap_4k(page) {
                self.frames.free_4k(frame);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const PAGE: u64 = 4096;

    #[derive(Default)]
    struct Table {
        entries: HashMap<u64, (PhysicalAddress, MapFlags)>,
    }

    impl PageTable for Table {
        fn map_4k(
            &mut self,
            page: VirtualPage<Size4K>,
            frame: PhysicalAddress,
            flags: MapFlags,
        ) -> Result<(), MapError> {
            let key = page.base().as_u64();
            if self.entries.contains_key(&key) {
                return Err(MapError::AlreadyMapped);
            }
            self.entries.insert(key, (frame, flags));
            Ok(())
        }

        fn unmap_4k(&mut self, page: VirtualPage<Size4K>) -> Option<PhysicalAddress> {
            self.entries.remove(&page.base().as_u64()).map(|(f, _)| f)
        }
    }

    struct Frames {
        free: Vec<PhysicalAddress>,
    }

    impl Frames {
        fn with(count: u64) -> Self {
            Self {
                free: (0..count)
                    .rev()
                    .map(|i| PhysicalAddress::new(0x20_0000 + i * PAGE))
                    .collect(),
            }
        }
    }

    impl PhysFrameAlloc for Frames {
        fn alloc_4k(&mut self) -> Option<PhysicalAddress> {
            self.free.pop()
        }

        fn free_4k(&mut self, frame: PhysicalAddress) {
            assert!(!self.free.contains(&frame), "frame {frame} freed twice");
            self.free.push(frame);
        }
    }

    const BASE: VirtualAddress = VirtualAddress::new(0xFFFF_9000_0000_0000);

    #[test]
    fn maps_each_page_with_its_own_frame() {
        let mut pager = FramePager::new(Table::default(), Frames::with(8));
        pager.map(BASE, 3 * PAGE, MapFlags::HEAP).unwrap();

        let entries = &pager.table().entries;
        assert_eq!(entries.len(), 3);
        assert!(entries.values().all(|(_, f)| *f == MapFlags::HEAP));
        assert_eq!(pager.frames().free.len(), 5);
    }

    #[test]
    fn partial_page_is_backed() {
        let mut pager = FramePager::new(Table::default(), Frames::with(8));
        pager.map(BASE, PAGE + 1, MapFlags::WRITABLE).unwrap();
        assert_eq!(pager.table().entries.len(), 2);
    }

    #[test]
    fn unmap_returns_frames() {
        let mut pager = FramePager::new(Table::default(), Frames::with(4));
        pager.map(BASE, 4 * PAGE, MapFlags::HEAP).unwrap();
        pager.unmap(BASE, 4 * PAGE);

        let (table, frames) = pager.into_parts();
        assert!(table.entries.is_empty());
        assert_eq!(frames.free.len(), 4);
    }

    #[test]
    fn out_of_frames_leaves_partial_mapping_that_unmap_cleans_up() {
        let mut pager = FramePager::new(Table::default(), Frames::with(2));
        assert_eq!(
            pager.map(BASE, 4 * PAGE, MapFlags::HEAP),
            Err(MapError::OutOfMemory)
        );
        assert_eq!(pager.table().entries.len(), 2);

        pager.unmap(BASE, 4 * PAGE);
        assert!(pager.table().entries.is_empty());
        assert_eq!(pager.frames().free.len(), 2);
    }

    #[test]
    fn already_mapped_returns_the_frame() {
        let mut pager = FramePager::new(Table::default(), Frames::with(4));
        pager.map(BASE + PAGE, PAGE, MapFlags::HEAP).unwrap();
        assert_eq!(
            pager.map(BASE, 2 * PAGE, MapFlags::HEAP),
            Err(MapError::AlreadyMapped)
        );
        // One frame backs BASE, one backs BASE + PAGE; the rejected one is back.
        assert_eq!(pager.frames().free.len(), 2);
    }

    #[test]
    fn heap_flags() {
        assert!(MapFlags::HEAP.contains(MapFlags::WRITABLE | MapFlags::GLOBAL));
        assert!(!MapFlags::HEAP.contains(MapFlags::USER));
    }
}
