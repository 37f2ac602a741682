use crate::align::align_down;
use crate::{MemoryAddress, PageSize, VirtualAddress};
use core::fmt;
use core::marker::PhantomData;

/// Virtual memory page base for size `S`.
///
/// A `VirtualPage<S>` represents the **page-aligned base** of a virtual page of
/// size `S` (`S::SIZE` bytes).
///
/// ### Invariants
/// - The low `S::SHIFT` bits of the base are always zero (page aligned).
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0xFFFF_FFFF_8000_1234);
/// let vp = va.page::<Size4K>();
/// assert_eq!(vp.base().as_u64() & (Size4K::SIZE - 1), 0);
/// assert_eq!(vp.prev().base().as_u64(), 0xFFFF_FFFF_8000_0000);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage<S: PageSize> {
    base: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> VirtualPage<S> {
    /// Page that contains `addr` (aligns down to page boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: VirtualAddress) -> Self {
        Self {
            base: align_down(addr.as_u64(), S::SIZE),
            _size: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress(MemoryAddress::new(self.base))
    }

    /// The page immediately below this one.
    #[inline]
    #[must_use]
    pub const fn prev(self) -> Self {
        Self {
            base: self.base - S::SIZE,
            _size: PhantomData,
        }
    }

    /// Iterates over the pages covering `[start, start + len)`.
    ///
    /// `start` is rounded down to its page; a partial trailing page is included.
    pub fn range(start: VirtualAddress, len: u64) -> impl Iterator<Item = Self> {
        let first = Self::containing_address(start);
        let end = start.as_u64() + len;
        let count = if len == 0 {
            0
        } else {
            (end - first.base).div_ceil(S::SIZE)
        };
        (0..count).map(move |i| Self {
            base: first.base + i * S::SIZE,
            _size: PhantomData,
        })
    }
}

impl<S> fmt::Display for VirtualPage<S>
where
    S: PageSize,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}/{}", self.base, S::as_str())
    }
}

impl<S: PageSize> fmt::Debug for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VirtualPage<{}>({:#018X})",
            core::any::type_name::<S>(),
            self.base
        )
    }
}

impl<S: PageSize> TryFrom<VirtualAddress> for VirtualPage<S> {
    type Error = ();

    #[inline]
    fn try_from(va: VirtualAddress) -> Result<Self, ()> {
        if va.is_aligned::<S>() {
            Ok(va.page())
        } else {
            Err(())
        }
    }
}
