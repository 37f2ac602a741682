//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses and page bases used by the
//! kernel heap and its paging collaborators.
//!
//! ## Overview
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MemoryAddress`] | A raw 64-bit address, either physical or virtual. |
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | Virtual (page-table translated) memory. |
//! | [`PhysicalAddress`] | Physical memory, e.g. a frame handed out by a frame allocator. |
//!
//! The page size is carried at the type level through [`PageSize`]; the
//! kernel heap works exclusively in [`Size4K`] granules.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let data = VirtualAddress::new(0xFFFF_8000_0000_2010);
//!
//! // Round down to the containing page and measure the distance.
//! let page = data.page::<Size4K>();
//! assert_eq!(page.base().as_u64(), 0xFFFF_8000_0000_2000);
//! assert_eq!(data - page.base(), 0x10);
//!
//! // Step back a page.
//! assert_eq!(page.prev().base().as_u64(), 0xFFFF_8000_0000_1000);
//! ```
//!
//! ## Pointers
//!
//! Addresses created from pointers via [`VirtualAddress::from_ptr`] expose the
//! pointer's provenance; [`VirtualAddress::as_mut_ptr`] reconstructs a pointer
//! from it. Dereferencing such a pointer is only sound while the address is
//! backed by mapped memory.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

mod align;
mod memory_address;
mod page_size;
mod physical_address;
mod virtual_address;
mod virtual_page;

pub use align::{align_down, align_up, checked_align_up};
pub use memory_address::MemoryAddress;
pub use page_size::{PageSize, Size4K};
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;
