use crate::MemoryAddress;
use core::fmt;

/// Physical memory address.
///
/// A thin wrapper around [`MemoryAddress`] that denotes **physical** addresses.
/// Frames handed out by a physical frame allocator are page-aligned
/// `PhysicalAddress` values; the type keeps them from being mixed up with the
/// [`VirtualAddress`](super::VirtualAddress) they get mapped under.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// let frame = PhysicalAddress::new(0x0000_0010_2000_0000);
/// assert_eq!(frame.as_u64(), 0x10_2000_0000);
/// assert_eq!(frame.to_string(), "0x0000001020000000");
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(pub(crate) MemoryAddress);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}
