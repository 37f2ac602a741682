//! # Kernel synchronization primitives
//!
//! A [`Mutex`] generic over its raw lock, a spinning [`RawSpin`] raw lock, and
//! interrupt masking via [`IrqGuard`]. [`Mutex::lock_irq`] combines both and
//! is the entry discipline for state shared with interrupt handlers on the
//! same core, such as the kernel heap and its range and paging collaborators.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod mutex;
mod raw_spin;

pub use irq::{IrqGuard, IrqMutex};
pub use mutex::{Mutex, MutexGuard};
pub use raw_spin::RawSpin;

pub type SpinMutex<T> = Mutex<T, RawSpin>;

impl<T> SpinMutex<T> {
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self::from_raw(RawSpin::new(), value)
    }
}

pub trait RawLock {
    fn raw_lock(&self);
    fn raw_try_lock(&self) -> bool;
}

pub trait RawUnlock {
    /// # Safety
    /// The caller must currently hold the lock.
    unsafe fn raw_unlock(&self);
}
